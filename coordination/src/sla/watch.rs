//! Watch trigger ("data kicker") keeping the policy in sync with timeouts

use crate::error::NanoResult;
use crate::store::{NodePath, Transaction, TransactionExt};
use serde::{Deserialize, Serialize};

pub const KICKER_NAME: &str = "nano-sla-timeouts-kicker";
/// Action the kicker invokes on the kick node
pub const INIT_SLA_ACTION: &str = "init-sla-policy";

/// Standing registration: changes under `monitor` invoke `action_name` on `kick_node`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchTrigger {
    pub name: String,
    pub monitor: String,
    pub kick_node: String,
    pub action_name: String,
}

impl WatchTrigger {
    /// The kicker re-running policy reconciliation on timeout edits
    pub fn sla_timeouts() -> Self {
        Self {
            name: KICKER_NAME.to_string(),
            monitor: NodePath::SlaTimeouts.to_string(),
            kick_node: NodePath::Sla.to_string(),
            action_name: INIT_SLA_ACTION.to_string(),
        }
    }
}

/// Create or update the single timeouts kicker
pub fn reconcile_watch(txn: &mut dyn Transaction) -> NanoResult<WatchTrigger> {
    let kicker = WatchTrigger::sla_timeouts();
    if txn.kicker(KICKER_NAME)?.as_ref() != Some(&kicker) {
        txn.put_kicker(kicker.clone())?;
        tracing::info!(kicker = KICKER_NAME, monitor = %kicker.monitor, "Watch trigger registered");
    }
    Ok(kicker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{with_write, MemoryStore, Principal};

    #[test]
    fn test_reconcile_twice_keeps_one_kicker() {
        let store = MemoryStore::new();
        with_write(&store, &Principal::admin(), reconcile_watch).unwrap();
        with_write(&store, &Principal::admin(), reconcile_watch).unwrap();

        let tree = store.tree();
        assert_eq!(tree.kickers.len(), 1);
        let kicker = &tree.kickers[KICKER_NAME];
        assert_eq!(kicker.monitor, "/nano:nano/nano:sla/nano:timeouts");
        assert_eq!(kicker.kick_node, "/nano:nano/nano:sla");
        assert_eq!(kicker.action_name, "init-sla-policy");
    }

    #[test]
    fn test_reconcile_restores_edited_kicker() {
        let store = MemoryStore::new();
        with_write(&store, &Principal::admin(), |txn| {
            let mut kicker = WatchTrigger::sla_timeouts();
            kicker.action_name = "something-else".to_string();
            txn.put_kicker(kicker)?;
            Ok(())
        })
        .unwrap();
        with_write(&store, &Principal::admin(), reconcile_watch).unwrap();
        assert_eq!(store.tree().kickers[KICKER_NAME], WatchTrigger::sla_timeouts());
    }
}
