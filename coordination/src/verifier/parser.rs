//! `show version` parser for IOS / IOS-XE devices

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;

static VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Cisco IOS[^\n]*?,\s*Version\s+(?P<version>[^\s,]+)")
        .expect("VERSION regex should compile")
});

static UPTIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?P<hostname>\S+)\s+uptime is\s+(?P<uptime>.+?)\s*$")
        .expect("UPTIME regex should compile")
});

static CONFIG_REGISTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^Configuration register is\s+(?P<curr>0x[0-9A-Fa-f]+)(?:\s*\(will be\s+(?P<next>0x[0-9A-Fa-f]+)\s+at next reload\))?",
    )
    .expect("CONFIG_REGISTER regex should compile")
});

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("output is not IOS show version")]
    UnrecognizedFormat,

    #[error("show version output has no {0}")]
    MissingField(&'static str),
}

/// Facts extracted from `show version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowVersion {
    pub version: String,
    pub hostname: Option<String>,
    pub uptime: Option<String>,
    pub curr_config_register: String,
    /// Register value after the next reload, when it differs
    pub next_config_register: Option<String>,
}

/// Structured parser over raw command output
pub trait FactsParser: Send + Sync {
    fn parse(&self, raw: &str) -> Result<ShowVersion, ParseError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ShowVersionParser;

impl FactsParser for ShowVersionParser {
    fn parse(&self, raw: &str) -> Result<ShowVersion, ParseError> {
        let version = VERSION
            .captures(raw)
            .ok_or(ParseError::UnrecognizedFormat)?["version"]
            .to_string();
        let uptime = UPTIME.captures(raw);
        let register = CONFIG_REGISTER
            .captures(raw)
            .ok_or(ParseError::MissingField("configuration register"))?;

        Ok(ShowVersion {
            version,
            hostname: uptime.as_ref().map(|c| c["hostname"].to_string()),
            uptime: uptime.as_ref().map(|c| c["uptime"].to_string()),
            curr_config_register: register["curr"].to_string(),
            next_config_register: register.name("next").map(|m| m.as_str().to_string()),
        })
    }
}
