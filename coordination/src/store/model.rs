//! Stored node types owned by the nano service model

use super::path::ServiceId;
use crate::plan::types::Plan;
use crate::sla::monitor::TriggerStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A declared nano service instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: ServiceId,
    /// Managed device the service is provisioned on
    pub device: String,
    /// Name server address feeding the resolver template
    pub name_server: String,
    pub plan: Plan,
    /// Resolver configuration written by the `nano-name-server` template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver: Option<ResolverConfig>,
    /// Progress-monitoring triggers keyed by trigger name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub trigger_status: BTreeMap<String, TriggerStatus>,
}

impl ServiceRecord {
    /// New service with the fixed nano plan, nothing reached yet
    pub fn new(id: ServiceId, device: impl Into<String>, name_server: impl Into<String>) -> Self {
        Self {
            id,
            device: device.into(),
            name_server: name_server.into(),
            plan: Plan::nano(),
            resolver: None,
            trigger_status: BTreeMap::new(),
        }
    }
}

/// DNS resolver settings pushed to the device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub name_servers: Vec<String>,
    pub domain_list: Vec<String>,
    pub domain_name: String,
    pub domain_lookup: bool,
}

/// Operator-facing SLA timeouts, in minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaTimeouts {
    pub jeopardy: u32,
    pub violation: u32,
}

impl Default for SlaTimeouts {
    fn default() -> Self {
        Self {
            jeopardy: 30,
            violation: 60,
        }
    }
}

/// Bot credentials; either literal values or `%ENV{NAME}` placeholders
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebexSettings {
    pub bot_token: String,
    pub room_id: String,
}

impl std::fmt::Debug for WebexSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebexSettings")
            .field("bot_token", &"<redacted>")
            .field("room_id", &self.room_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_service_starts_unreached() {
        let record = ServiceRecord::new(ServiceId::new("svc-1").unwrap(), "ios0", "10.0.0.53");
        assert!(record.resolver.is_none());
        assert!(record.trigger_status.is_empty());
        assert!(!record.plan.is_ready());
    }

    #[test]
    fn test_webex_debug_redacts_token() {
        let settings = WebexSettings {
            bot_token: "super-secret".to_string(),
            room_id: "room-1".to_string(),
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("room-1"));
    }
}
