//! In-process configuration store
//!
//! Each write transaction works on a private copy of the tree and swaps it in
//! on commit, so readers never observe a partial update. Commits are
//! last-committed-wins unless the store is [`MemoryStore::strict`], in which
//! case a transaction that started before another commit fails with
//! [`StoreError::Conflict`].
//!
//! After every commit the store compares each kicker's monitored subtree
//! before and after the swap and queues a [`Kick`] for the ones that changed.
//! The owner drains them with [`ConfigStore::drain_kicks`] and invokes the
//! named actions.

use super::model::{ServiceRecord, SlaTimeouts, WebexSettings};
use super::path::{NodePath, ServiceId};
use super::{
    ConfigStore, ListKind, Node, Principal, StoreError, StoreResult, Transaction, TxnMode,
};
use crate::sla::policy::SlaPolicy;
use crate::sla::watch::WatchTrigger;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// The whole persisted model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigTree {
    #[serde(default)]
    pub services: BTreeMap<ServiceId, ServiceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<SlaTimeouts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webex: Option<WebexSettings>,
    #[serde(default)]
    pub policies: BTreeMap<String, SlaPolicy>,
    #[serde(default)]
    pub kickers: BTreeMap<String, WatchTrigger>,
}

impl ConfigTree {
    pub fn get(&self, path: &NodePath) -> StoreResult<Option<Node>> {
        Ok(match path {
            NodePath::Service(id) => self.services.get(id).cloned().map(Node::Service),
            NodePath::SlaTimeouts => self.timeouts.map(Node::Timeouts),
            NodePath::Webex => self.webex.clone().map(Node::Webex),
            NodePath::Policy(name) => self.policies.get(name).cloned().map(Node::Policy),
            NodePath::Kicker(name) => self.kickers.get(name).cloned().map(Node::Kicker),
            NodePath::ServiceAction { .. } | NodePath::Sla | NodePath::SlaTimeoutAction => {
                return Err(StoreError::NotAddressable {
                    path: path.to_string(),
                })
            }
        })
    }

    pub fn set(&mut self, path: &NodePath, node: Node) -> StoreResult<()> {
        match (path, node) {
            (NodePath::Service(id), Node::Service(record)) if &record.id == id => {
                self.services.insert(id.clone(), record);
            }
            (NodePath::SlaTimeouts, Node::Timeouts(timeouts)) => self.timeouts = Some(timeouts),
            (NodePath::Webex, Node::Webex(settings)) => self.webex = Some(settings),
            (NodePath::Policy(name), Node::Policy(policy)) if &policy.name == name => {
                self.policies.insert(name.clone(), policy);
            }
            (NodePath::Kicker(name), Node::Kicker(kicker)) if &kicker.name == name => {
                self.kickers.insert(name.clone(), kicker);
            }
            (NodePath::ServiceAction { .. } | NodePath::Sla | NodePath::SlaTimeoutAction, _) => {
                return Err(StoreError::NotAddressable {
                    path: path.to_string(),
                })
            }
            (path, node) => {
                return Err(StoreError::TypeMismatch {
                    path: path.to_string(),
                    expected: expected_kind(path),
                    found: node.kind(),
                })
            }
        }
        Ok(())
    }

    pub fn delete(&mut self, path: &NodePath) -> StoreResult<bool> {
        Ok(match path {
            NodePath::Service(id) => self.services.remove(id).is_some(),
            NodePath::SlaTimeouts => self.timeouts.take().is_some(),
            NodePath::Webex => self.webex.take().is_some(),
            NodePath::Policy(name) => self.policies.remove(name).is_some(),
            NodePath::Kicker(name) => self.kickers.remove(name).is_some(),
            NodePath::ServiceAction { .. } | NodePath::Sla | NodePath::SlaTimeoutAction => {
                return Err(StoreError::NotAddressable {
                    path: path.to_string(),
                })
            }
        })
    }

    pub fn keys(&self, list: ListKind) -> Vec<NodePath> {
        match list {
            ListKind::Services => self.services.keys().cloned().map(NodePath::Service).collect(),
            ListKind::Policies => self.policies.keys().cloned().map(NodePath::Policy).collect(),
            ListKind::Kickers => self.kickers.keys().cloned().map(NodePath::Kicker).collect(),
        }
    }

    /// Comparable rendering of everything at or below `path`
    fn subtree(&self, path: &NodePath) -> serde_json::Value {
        let value = match path {
            NodePath::Sla => serde_json::to_value((&self.timeouts, &self.webex)),
            NodePath::SlaTimeouts | NodePath::SlaTimeoutAction => {
                serde_json::to_value(self.timeouts)
            }
            NodePath::Webex => serde_json::to_value(&self.webex),
            NodePath::Service(id) | NodePath::ServiceAction { service: id, .. } => {
                serde_json::to_value(self.services.get(id))
            }
            NodePath::Policy(name) => serde_json::to_value(self.policies.get(name)),
            NodePath::Kicker(name) => serde_json::to_value(self.kickers.get(name)),
        };
        value.unwrap_or(serde_json::Value::Null)
    }
}

fn expected_kind(path: &NodePath) -> &'static str {
    match path {
        NodePath::Service(_) => "service",
        NodePath::SlaTimeouts => "timeouts",
        NodePath::Webex => "webex",
        NodePath::Policy(_) => "policy",
        NodePath::Kicker(_) => "kicker",
        _ => "data node",
    }
}

/// A kicker whose monitored subtree changed in a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kick {
    pub kicker: String,
    pub kick_node: NodePath,
    pub action_name: String,
}

#[derive(Default)]
struct StoreInner {
    tree: ConfigTree,
    version: u64,
    kicks: Vec<Kick>,
}

/// Mutex-guarded tree with optional JSON snapshot persistence
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
    snapshot: Option<PathBuf>,
    strict: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by a JSON snapshot; a missing file starts empty
    pub fn open(snapshot: impl AsRef<Path>) -> StoreResult<Self> {
        let snapshot = snapshot.as_ref().to_path_buf();
        let tree = if snapshot.exists() {
            let raw = std::fs::read_to_string(&snapshot)?;
            serde_json::from_str(&raw).map_err(|e| StoreError::Persistence(e.to_string()))?
        } else {
            ConfigTree::default()
        };
        tracing::debug!(path = %snapshot.display(), "Opened configuration snapshot");
        Ok(Self {
            inner: Mutex::new(StoreInner {
                tree,
                ..Default::default()
            }),
            snapshot: Some(snapshot),
            strict: false,
        })
    }

    /// Reject commits from transactions that began before another commit
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Copy of the committed tree
    pub fn tree(&self) -> ConfigTree {
        self.lock().tree.clone()
    }

    pub fn version(&self) -> u64 {
        self.lock().version
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, tree: &ConfigTree) -> StoreResult<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let raw =
            serde_json::to_string_pretty(tree).map_err(|e| StoreError::Persistence(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn commit_tree(&self, base_version: u64, tree: ConfigTree) -> StoreResult<()> {
        let mut inner = self.lock();
        if self.strict && inner.version != base_version {
            return Err(StoreError::Conflict {
                expected: base_version,
                actual: inner.version,
            });
        }

        self.persist(&tree)?;

        let mut fired = Vec::new();
        for kicker in tree.kickers.values() {
            let monitor = match kicker.monitor.parse::<NodePath>() {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(
                        kicker = %kicker.name,
                        error = %e,
                        "Kicker monitors an unknown path"
                    );
                    continue;
                }
            };
            if inner.tree.subtree(&monitor) != tree.subtree(&monitor) {
                match kicker.kick_node.parse::<NodePath>() {
                    Ok(kick_node) => fired.push(Kick {
                        kicker: kicker.name.clone(),
                        kick_node,
                        action_name: kicker.action_name.clone(),
                    }),
                    Err(e) => {
                        tracing::warn!(
                            kicker = %kicker.name,
                            error = %e,
                            "Kicker has an unknown kick node"
                        );
                    }
                }
            }
        }

        inner.tree = tree;
        inner.version += 1;
        for kick in &fired {
            tracing::info!(kicker = %kick.kicker, action = %kick.action_name, "Kicker fired");
        }
        inner.kicks.extend(fired);
        Ok(())
    }
}

impl ConfigStore for MemoryStore {
    fn begin(
        &self,
        mode: TxnMode,
        principal: &Principal,
    ) -> StoreResult<Box<dyn Transaction + '_>> {
        let inner = self.lock();
        Ok(Box::new(MemoryTxn {
            store: self,
            working: inner.tree.clone(),
            base_version: inner.version,
            mode,
            principal: principal.clone(),
            dirty: false,
        }))
    }

    fn drain_kicks(&self) -> Vec<Kick> {
        std::mem::take(&mut self.lock().kicks)
    }
}

struct MemoryTxn<'a> {
    store: &'a MemoryStore,
    working: ConfigTree,
    base_version: u64,
    mode: TxnMode,
    principal: Principal,
    dirty: bool,
}

impl MemoryTxn<'_> {
    fn ensure_writable(&self, path: &NodePath) -> StoreResult<()> {
        if self.mode == TxnMode::ReadWrite {
            Ok(())
        } else {
            Err(StoreError::AccessDenied {
                principal: self.principal.to_string(),
                path: path.to_string(),
            })
        }
    }
}

impl Transaction for MemoryTxn<'_> {
    fn mode(&self) -> TxnMode {
        self.mode
    }

    fn principal(&self) -> &Principal {
        &self.principal
    }

    fn get(&self, path: &NodePath) -> StoreResult<Option<Node>> {
        self.working.get(path)
    }

    fn set(&mut self, path: &NodePath, node: Node) -> StoreResult<()> {
        self.ensure_writable(path)?;
        self.working.set(path, node)?;
        self.dirty = true;
        Ok(())
    }

    fn delete(&mut self, path: &NodePath) -> StoreResult<bool> {
        self.ensure_writable(path)?;
        let removed = self.working.delete(path)?;
        self.dirty |= removed;
        Ok(removed)
    }

    fn keys(&self, list: ListKind) -> StoreResult<Vec<NodePath>> {
        Ok(self.working.keys(list))
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        if self.mode == TxnMode::Read || !self.dirty {
            self.dirty = false;
            return Ok(());
        }
        let tree = std::mem::take(&mut self.working);
        self.dirty = false;
        self.store.commit_tree(self.base_version, tree)
    }
}

impl Drop for MemoryTxn<'_> {
    fn drop(&mut self) {
        if self.dirty {
            tracing::debug!(principal = %self.principal, "Transaction aborted, changes discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NanoError;
    use crate::store::{with_write, TransactionExt};

    fn admin() -> Principal {
        Principal::admin()
    }

    #[test]
    fn test_uncommitted_changes_are_discarded() {
        let store = MemoryStore::new();
        {
            let mut txn = store.begin(TxnMode::ReadWrite, &admin()).unwrap();
            txn.set(
                &NodePath::SlaTimeouts,
                Node::Timeouts(SlaTimeouts {
                    jeopardy: 1,
                    violation: 2,
                }),
            )
            .unwrap();
        }
        assert!(store.tree().timeouts.is_none());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_error_in_scope_aborts() {
        let store = MemoryStore::new();
        let result: Result<(), NanoError> = with_write(&store, &admin(), |txn| {
            txn.set(
                &NodePath::SlaTimeouts,
                Node::Timeouts(SlaTimeouts {
                    jeopardy: 1,
                    violation: 2,
                }),
            )?;
            Err(NanoError::invalid_input("boom"))
        });
        assert!(result.is_err());
        assert!(store.tree().timeouts.is_none());
    }

    #[test]
    fn test_read_transaction_denies_writes() {
        let store = MemoryStore::new();
        let mut txn = store.begin(TxnMode::Read, &Principal::new("oper")).unwrap();
        let err = txn
            .set(&NodePath::SlaTimeouts, Node::Timeouts(SlaTimeouts::default()))
            .unwrap_err();
        assert!(matches!(err, StoreError::AccessDenied { .. }), "{err}");
    }

    #[test]
    fn test_strict_store_detects_conflict() {
        let store = MemoryStore::new().strict();
        let mut first = store.begin(TxnMode::ReadWrite, &admin()).unwrap();
        let mut second = store.begin(TxnMode::ReadWrite, &admin()).unwrap();

        first
            .set(&NodePath::SlaTimeouts, Node::Timeouts(SlaTimeouts::default()))
            .unwrap();
        first.commit().unwrap();

        second
            .set(
                &NodePath::SlaTimeouts,
                Node::Timeouts(SlaTimeouts {
                    jeopardy: 9,
                    violation: 10,
                }),
            )
            .unwrap();
        let err = second.commit().unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 0, actual: 1 }));
    }

    #[test]
    fn test_last_commit_wins_by_default() {
        let store = MemoryStore::new();
        let mut first = store.begin(TxnMode::ReadWrite, &admin()).unwrap();
        let mut second = store.begin(TxnMode::ReadWrite, &admin()).unwrap();
        first
            .set(&NodePath::SlaTimeouts, Node::Timeouts(SlaTimeouts::default()))
            .unwrap();
        second
            .set(
                &NodePath::SlaTimeouts,
                Node::Timeouts(SlaTimeouts {
                    jeopardy: 9,
                    violation: 10,
                }),
            )
            .unwrap();
        first.commit().unwrap();
        second.commit().unwrap();
        assert_eq!(store.tree().timeouts.unwrap().jeopardy, 9);
    }

    #[test]
    fn test_type_mismatch_on_wrong_node() {
        let mut tree = ConfigTree::default();
        let err = tree
            .set(&NodePath::Webex, Node::Timeouts(SlaTimeouts::default()))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::TypeMismatch {
                expected: "webex",
                found: "timeouts",
                ..
            }
        ));
    }

    #[test]
    fn test_kicker_fires_only_on_monitored_change() {
        let store = MemoryStore::new();
        with_write(&store, &admin(), |txn| {
            txn.put_kicker(WatchTrigger::sla_timeouts())?;
            Ok(())
        })
        .unwrap();
        assert!(store.drain_kicks().is_empty(), "creating the kicker must not fire it");

        with_write(&store, &admin(), |txn| {
            txn.set(
                &NodePath::Webex,
                Node::Webex(WebexSettings {
                    bot_token: "t".into(),
                    room_id: "r".into(),
                }),
            )?;
            Ok(())
        })
        .unwrap();
        assert!(store.drain_kicks().is_empty(), "webex is outside the monitored subtree");

        with_write(&store, &admin(), |txn| {
            txn.set(
                &NodePath::SlaTimeouts,
                Node::Timeouts(SlaTimeouts {
                    jeopardy: 5,
                    violation: 10,
                }),
            )?;
            Ok(())
        })
        .unwrap();
        let kicks = store.drain_kicks();
        assert_eq!(kicks.len(), 1);
        assert_eq!(kicks[0].action_name, "init-sla-policy");
        assert_eq!(kicks[0].kick_node, NodePath::Sla);
        assert!(store.drain_kicks().is_empty());
    }

    #[test]
    fn test_snapshot_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("state.json");
        {
            let store = MemoryStore::open(&file).unwrap();
            with_write(&store, &admin(), |txn| {
                txn.put_service(ServiceRecord::new(
                    ServiceId::new("svc-1").unwrap(),
                    "ios0",
                    "10.0.0.53",
                ))?;
                Ok(())
            })
            .unwrap();
        }
        let reopened = MemoryStore::open(&file).unwrap();
        let tree = reopened.tree();
        assert_eq!(tree.services.len(), 1);
        assert_eq!(tree.services.values().next().unwrap().device, "ios0");
    }
}
