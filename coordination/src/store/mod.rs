//! Configuration Store: transactional access to the persisted model
//!
//! Everything that must survive between invocations (service plans, SLA
//! policy, operator timeouts, watch registrations) lives behind
//! [`ConfigStore`]. Callers open exactly one transaction per operation and
//! either commit it or let it drop, which aborts.
//!
//! # Scoped access
//!
//! ```rust,ignore
//! use nano_coordination::store::{with_write, MemoryStore, Principal, TransactionExt};
//!
//! let store = MemoryStore::new();
//! with_write(&store, &Principal::admin(), |txn| {
//!     let timeouts = txn.timeouts()?;
//!     Ok(timeouts.jeopardy)
//! })?;
//! ```

pub mod memory;
pub mod model;
pub mod path;

pub use memory::{ConfigTree, Kick, MemoryStore};
pub use model::{ResolverConfig, ServiceRecord, SlaTimeouts, WebexSettings};
pub use path::{NodePath, ServiceId};

use crate::error::NanoResult;
use crate::sla::policy::SlaPolicy;
use crate::sla::watch::WatchTrigger;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a configuration store or its transactions
#[derive(Error, Debug)]
pub enum StoreError {
    /// Nothing stored at the path
    #[error("node not found: {path}")]
    NotFound { path: String },

    /// Principal/mode does not allow the operation
    #[error("access denied for '{principal}' on {path}")]
    AccessDenied { principal: String, path: String },

    /// Store changed underneath a write transaction
    #[error("transaction conflict: store moved from version {expected} to {actual}")]
    Conflict { expected: u64, actual: u64 },

    /// Stored node has a different type than requested
    #[error("node at {path} is {found}, expected {expected}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Boundary path string did not parse
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Path names an action point or container, not a data node
    #[error("path {path} does not address a data node")]
    NotAddressable { path: String },

    /// Snapshot could not be read or written
    #[error("snapshot persistence failed: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transaction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TxnMode {
    Read,
    ReadWrite,
}

/// User a transaction is opened on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal(String);

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn admin() -> Self {
        Self::new("admin")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Principal {
    fn default() -> Self {
        Self::admin()
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tagged handle for a stored node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Service(ServiceRecord),
    Timeouts(SlaTimeouts),
    Webex(WebexSettings),
    Policy(SlaPolicy),
    Kicker(WatchTrigger),
}

impl Node {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Service(_) => "service",
            Self::Timeouts(_) => "timeouts",
            Self::Webex(_) => "webex",
            Self::Policy(_) => "policy",
            Self::Kicker(_) => "kicker",
        }
    }
}

/// Keyed lists that can be enumerated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Services,
    Policies,
    Kickers,
}

/// An open transaction. Dropping it without [`Transaction::commit`] aborts.
pub trait Transaction: Send {
    fn mode(&self) -> TxnMode;

    fn principal(&self) -> &Principal;

    fn get(&self, path: &NodePath) -> StoreResult<Option<Node>>;

    /// Create or replace the node at `path`
    fn set(&mut self, path: &NodePath, node: Node) -> StoreResult<()>;

    /// Remove the node; returns whether anything was removed
    fn delete(&mut self, path: &NodePath) -> StoreResult<bool>;

    fn keys(&self, list: ListKind) -> StoreResult<Vec<NodePath>>;

    fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Transaction factory
pub trait ConfigStore: Send + Sync {
    fn begin(&self, mode: TxnMode, principal: &Principal)
        -> StoreResult<Box<dyn Transaction + '_>>;

    /// Take the kicks queued by commits so far. Stores without watch support
    /// never queue any.
    fn drain_kicks(&self) -> Vec<Kick> {
        Vec::new()
    }
}

/// Run `f` inside a read transaction, released on every exit path
pub fn with_read<T>(
    store: &dyn ConfigStore,
    principal: &Principal,
    f: impl FnOnce(&dyn Transaction) -> NanoResult<T>,
) -> NanoResult<T> {
    let txn = store.begin(TxnMode::Read, principal)?;
    f(txn.as_ref())
}

/// Run `f` inside a read-write transaction; commits on `Ok`, aborts on `Err`
pub fn with_write<T>(
    store: &dyn ConfigStore,
    principal: &Principal,
    f: impl FnOnce(&mut dyn Transaction) -> NanoResult<T>,
) -> NanoResult<T> {
    let mut txn = store.begin(TxnMode::ReadWrite, principal)?;
    let out = f(txn.as_mut())?;
    txn.commit()?;
    Ok(out)
}

/// Typed accessors over the tagged node interface
pub trait TransactionExt {
    fn service(&self, id: &ServiceId) -> StoreResult<ServiceRecord>;
    fn put_service(&mut self, record: ServiceRecord) -> StoreResult<()>;
    fn service_ids(&self) -> StoreResult<Vec<ServiceId>>;
    /// Operator timeouts; model defaults when never set
    fn timeouts(&self) -> StoreResult<SlaTimeouts>;
    fn webex(&self) -> StoreResult<WebexSettings>;
    fn policy(&self, name: &str) -> StoreResult<Option<SlaPolicy>>;
    fn put_policy(&mut self, policy: SlaPolicy) -> StoreResult<()>;
    fn policy_names(&self) -> StoreResult<Vec<String>>;
    fn kicker(&self, name: &str) -> StoreResult<Option<WatchTrigger>>;
    fn put_kicker(&mut self, kicker: WatchTrigger) -> StoreResult<()>;
}

fn mismatch(path: &NodePath, expected: &'static str, found: &Node) -> StoreError {
    StoreError::TypeMismatch {
        path: path.to_string(),
        expected,
        found: found.kind(),
    }
}

impl<T: Transaction + ?Sized> TransactionExt for T {
    fn service(&self, id: &ServiceId) -> StoreResult<ServiceRecord> {
        let path = NodePath::Service(id.clone());
        match self.get(&path)? {
            Some(Node::Service(record)) => Ok(record),
            Some(other) => Err(mismatch(&path, "service", &other)),
            None => Err(StoreError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    fn put_service(&mut self, record: ServiceRecord) -> StoreResult<()> {
        let path = NodePath::Service(record.id.clone());
        self.set(&path, Node::Service(record))
    }

    fn service_ids(&self) -> StoreResult<Vec<ServiceId>> {
        Ok(self
            .keys(ListKind::Services)?
            .into_iter()
            .filter_map(|path| path.service_id().cloned())
            .collect())
    }

    fn timeouts(&self) -> StoreResult<SlaTimeouts> {
        let path = NodePath::SlaTimeouts;
        match self.get(&path)? {
            Some(Node::Timeouts(timeouts)) => Ok(timeouts),
            Some(other) => Err(mismatch(&path, "timeouts", &other)),
            None => Ok(SlaTimeouts::default()),
        }
    }

    fn webex(&self) -> StoreResult<WebexSettings> {
        let path = NodePath::Webex;
        match self.get(&path)? {
            Some(Node::Webex(settings)) => Ok(settings),
            Some(other) => Err(mismatch(&path, "webex", &other)),
            None => Err(StoreError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    fn policy(&self, name: &str) -> StoreResult<Option<SlaPolicy>> {
        let path = NodePath::Policy(name.to_string());
        match self.get(&path)? {
            Some(Node::Policy(policy)) => Ok(Some(policy)),
            Some(other) => Err(mismatch(&path, "policy", &other)),
            None => Ok(None),
        }
    }

    fn put_policy(&mut self, policy: SlaPolicy) -> StoreResult<()> {
        let path = NodePath::Policy(policy.name.clone());
        self.set(&path, Node::Policy(policy))
    }

    fn policy_names(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .keys(ListKind::Policies)?
            .into_iter()
            .filter_map(|path| match path {
                NodePath::Policy(name) => Some(name),
                _ => None,
            })
            .collect())
    }

    fn kicker(&self, name: &str) -> StoreResult<Option<WatchTrigger>> {
        let path = NodePath::Kicker(name.to_string());
        match self.get(&path)? {
            Some(Node::Kicker(kicker)) => Ok(Some(kicker)),
            Some(other) => Err(mismatch(&path, "kicker", &other)),
            None => Ok(None),
        }
    }

    fn put_kicker(&mut self, kicker: WatchTrigger) -> StoreResult<()> {
        let path = NodePath::Kicker(kicker.name.clone());
        self.set(&path, Node::Kicker(kicker))
    }
}
