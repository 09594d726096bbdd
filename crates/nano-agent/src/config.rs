use anyhow::{Context, Result};
use nano_coordination::notify::DEFAULT_API_BASE;
use nano_coordination::verifier::DEFAULT_COMMAND;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Snapshot file and commit mode of the configuration store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub path: PathBuf,
    /// Fail stale write transactions instead of last-commit-wins
    pub strict: bool,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: std::env::var("NANO_STORE_PATH")
                .unwrap_or_else(|_| "nano-state.json".into())
                .into(),
            strict: false,
        }
    }
}

/// Message template location; built-in templates when unset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TemplatesSection {
    pub dir: Option<PathBuf>,
}

impl Default for TemplatesSection {
    fn default() -> Self {
        Self {
            dir: std::env::var("NANO_TEMPLATES_DIR").ok().map(PathBuf::from),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebexSection {
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for WebexSection {
    fn default() -> Self {
        Self {
            api_base: std::env::var("WEBEX_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.into()),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifierSection {
    /// Command template with `{device}` and `{command}` placeholders
    pub command: String,
    pub timeout_secs: u64,
}

impl Default for VerifierSection {
    fn default() -> Self {
        Self {
            command: std::env::var("NANO_VERIFY_COMMAND")
                .unwrap_or_else(|_| DEFAULT_COMMAND.into()),
            timeout_secs: 30,
        }
    }
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NanoConfig {
    /// User every operation runs as
    pub principal: String,
    pub store: StoreSection,
    pub templates: TemplatesSection,
    pub webex: WebexSection,
    pub verifier: VerifierSection,
}

impl Default for NanoConfig {
    fn default() -> Self {
        Self {
            principal: std::env::var("NANO_PRINCIPAL").unwrap_or_else(|_| "admin".into()),
            store: StoreSection::default(),
            templates: TemplatesSection::default(),
            webex: WebexSection::default(),
            verifier: VerifierSection::default(),
        }
    }
}

impl NanoConfig {
    /// Load from a TOML file, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn webex_timeout(&self) -> Duration {
        Duration::from_secs(self.webex.timeout_secs)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verifier.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = NanoConfig::from_toml(
            r#"
            [store]
            path = "/var/lib/nano/state.json"
            strict = true

            [verifier]
            timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.store.path, PathBuf::from("/var/lib/nano/state.json"));
        assert!(config.store.strict);
        assert_eq!(config.verify_timeout(), Duration::from_secs(5));
        assert!(!config.verifier.command.is_empty());
        assert_eq!(config.webex.timeout_secs, 30);
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nano.toml");
        std::fs::write(
            &file,
            "principal = \"oper\"\n[webex]\napi_base = \"http://localhost:8080/v1\"\n",
        )
        .unwrap();
        let config = NanoConfig::load(Some(file.as_path())).unwrap();
        assert_eq!(config.principal, "oper");
        assert_eq!(config.webex.api_base, "http://localhost:8080/v1");
    }

    #[test]
    fn test_unknown_types_rejected() {
        assert!(NanoConfig::from_toml("[store]\nstrict = \"yes\"").is_err());
        let dir = tempfile::tempdir().unwrap();
        assert!(NanoConfig::load(Some(dir.path().join("missing.toml").as_path())).is_err());
    }
}
