//! Verifier Module: Device state checks around provisioning
//!
//! The gate runs one diagnostic command on the target device, parses the
//! output and returns pass/fail. It never lets a step through on an error.
//!
//! # Pipeline
//!
//! ```text
//! CommandChannel::execute("show version") ─► NETSIM? ─► FactsParser ─► config register == 0x2102
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use nano_coordination::verifier::{ProcessChannel, ShowVersionParser, VerificationGate};
//!
//! let gate = VerificationGate::new(
//!     Arc::new(ProcessChannel::new("ssh {device} {command}")?),
//!     Arc::new(ShowVersionParser),
//!     Duration::from_secs(30),
//! );
//! let result = gate.verify("ios0").await;
//! println!("{}: {}", result.passed, result.message);
//! ```

pub mod channel;
pub mod gate;
pub mod parser;

pub use channel::{ChannelError, CommandChannel, ProcessChannel, DEFAULT_COMMAND};
pub use gate::{check_output, Verdict, VerificationGate, VerificationResult};
pub use parser::{FactsParser, ParseError, ShowVersion, ShowVersionParser};
