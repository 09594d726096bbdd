//! SLA Module: progress monitoring for nano services
//!
//! - [`policy`]: the singleton escalation policy derived from operator timeouts
//! - [`watch`]: the kicker re-running policy reconciliation on timeout edits
//! - [`monitor`]: per-service triggers and their deadline evaluation

pub mod monitor;
pub mod policy;
pub mod watch;

pub use monitor::{trigger_name, SlaMonitor, TriggerState, TriggerStatus, BREACH_ACTION};
pub use policy::{reconcile_policy, SlaPolicy, POLICY_NAME};
pub use watch::{reconcile_watch, WatchTrigger, INIT_SLA_ACTION, KICKER_NAME};
