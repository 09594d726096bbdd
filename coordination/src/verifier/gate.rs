//! Verification gate: approve or block a provisioning step from device facts
//!
//! Fail-closed: anything other than a simulated device or a parsed
//! `0x2102` config register blocks progression.

use super::channel::CommandChannel;
use super::parser::FactsParser;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Marker printed by simulated (netsim) devices
pub const SIMULATION_MARKER: &str = "NETSIM";
/// Config register of a normally booting device
pub const EXPECTED_CONFIG_REGISTER: &str = "0x2102";

pub const MSG_SIMULATED: &str = "Netsim device detected, It's OK, skipping checks.";
pub const MSG_PASS: &str = "Config register check: PASS";
pub const MSG_FAILED: &str = "Config register check: FAILED";

/// How the gate reached its decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Simulated,
    Passed,
    RegisterMismatch { found: String },
    /// Command, timeout or parse failure
    Error { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub passed: bool,
    pub message: String,
    pub verdict: Verdict,
}

impl VerificationResult {
    fn from_verdict(verdict: Verdict) -> Self {
        let (passed, message) = match &verdict {
            Verdict::Simulated => (true, MSG_SIMULATED.to_string()),
            Verdict::Passed => (true, MSG_PASS.to_string()),
            Verdict::RegisterMismatch { .. } => (false, MSG_FAILED.to_string()),
            Verdict::Error { reason } => (false, format!("verification error: {reason}")),
        };
        Self {
            passed,
            message,
            verdict,
        }
    }

    /// Command or parse failure rather than a failed check
    pub fn is_error(&self) -> bool {
        matches!(self.verdict, Verdict::Error { .. })
    }
}

/// Decide on raw `show version` output
pub fn check_output(raw: &str, parser: &dyn FactsParser) -> VerificationResult {
    if raw.contains(SIMULATION_MARKER) {
        return VerificationResult::from_verdict(Verdict::Simulated);
    }
    let verdict = match parser.parse(raw) {
        Ok(facts) if facts.curr_config_register == EXPECTED_CONFIG_REGISTER => Verdict::Passed,
        Ok(facts) => Verdict::RegisterMismatch {
            found: facts.curr_config_register,
        },
        Err(e) => Verdict::Error {
            reason: e.to_string(),
        },
    };
    VerificationResult::from_verdict(verdict)
}

/// Runs `show version` on a device and checks the result
pub struct VerificationGate {
    channel: Arc<dyn CommandChannel>,
    parser: Arc<dyn FactsParser>,
    timeout: Duration,
}

impl VerificationGate {
    pub fn new(
        channel: Arc<dyn CommandChannel>,
        parser: Arc<dyn FactsParser>,
        timeout: Duration,
    ) -> Self {
        Self {
            channel,
            parser,
            timeout,
        }
    }

    pub async fn verify(&self, device: &str) -> VerificationResult {
        let output =
            tokio::time::timeout(self.timeout, self.channel.execute(device, &["show", "version"]))
                .await;

        let result = match output {
            Ok(Ok(raw)) => check_output(&raw, self.parser.as_ref()),
            Ok(Err(e)) => VerificationResult::from_verdict(Verdict::Error {
                reason: e.to_string(),
            }),
            Err(_) => VerificationResult::from_verdict(Verdict::Error {
                reason: format!("show version timed out after {}ms", self.timeout.as_millis()),
            }),
        };

        match &result.verdict {
            Verdict::Error { reason } => {
                tracing::warn!(device, reason = %reason, "Verification could not run, blocking")
            }
            Verdict::RegisterMismatch { found } => {
                tracing::warn!(device, register = %found, "Config register check failed")
            }
            Verdict::Simulated | Verdict::Passed => {
                tracing::info!(device, msg = %result.message, "Verification passed")
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::parser::ShowVersionParser;

    fn ios(register: &str) -> String {
        format!(
            "Cisco IOS Software, C2900 Software (C2900-UNIVERSALK9-M), Version 15.4(3)M2, RELEASE SOFTWARE (fc2)\n\
             r1 uptime is 5 minutes\n\
             Configuration register is {register}\n"
        )
    }

    #[test]
    fn test_simulated_device_skips_checks() {
        let result = check_output("Cisco IOS ... NETSIM ...", &ShowVersionParser);
        assert!(result.passed);
        assert_eq!(result.message, MSG_SIMULATED);
    }

    #[test]
    fn test_expected_register_passes() {
        let result = check_output(&ios("0x2102"), &ShowVersionParser);
        assert!(result.passed);
        assert_eq!(result.message, "Config register check: PASS");
    }

    #[test]
    fn test_other_register_fails() {
        let result = check_output(&ios("0x2142"), &ShowVersionParser);
        assert!(!result.passed);
        assert!(!result.is_error());
        assert_eq!(result.message, "Config register check: FAILED");
    }

    #[test]
    fn test_unparseable_output_fails_closed() {
        let result = check_output("garbage", &ShowVersionParser);
        assert!(!result.passed);
        assert!(result.is_error());
    }
}
