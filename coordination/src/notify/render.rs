//! Message template rendering
//!
//! Templates use `{{ name }}` placeholders. Every placeholder must have a
//! parameter. Values are escaped for their context: templates whose name ends
//! in `.json` get JSON string escaping, all others HTML escaping.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;
use thiserror::Error;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(?P<name>[A-Za-z0-9_-]+)\s*\}\}")
        .expect("PLACEHOLDER regex should compile")
});

/// Errors raised while loading or rendering a message template
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template '{0}' not found")]
    NotFound(String),

    #[error("template '{template}' references undefined parameter '{name}'")]
    MissingParameter { template: String, name: String },

    #[error("failed to read template '{template}': {source}")]
    Io {
        template: String,
        #[source]
        source: std::io::Error,
    },

    /// Rendered card is not JSON or has no attachments array
    #[error("rendered card '{template}' is invalid: {reason}")]
    InvalidCard { template: String, reason: String },
}

/// Named-template renderer
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, name: &str, params: &BTreeMap<String, String>)
        -> Result<String, TemplateError>;
}

fn json_escape(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

fn html_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Substitute placeholders in `source`
pub fn render_source(
    name: &str,
    source: &str,
    params: &BTreeMap<String, String>,
) -> Result<String, TemplateError> {
    let escape_json = name.ends_with(".json");
    let mut missing = None;
    let rendered = PLACEHOLDER.replace_all(source, |caps: &Captures<'_>| {
        let key = &caps["name"];
        match params.get(key) {
            Some(value) if escape_json => json_escape(value),
            Some(value) => html_escape(value),
            None => {
                missing.get_or_insert_with(|| key.to_string());
                String::new()
            }
        }
    });
    if let Some(key) = missing {
        return Err(TemplateError::MissingParameter {
            template: name.to_string(),
            name: key,
        });
    }
    Ok(rendered.into_owned())
}

/// Templates read from a directory on every render
#[derive(Debug, Clone)]
pub struct FileTemplates {
    dir: PathBuf,
}

impl FileTemplates {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TemplateRenderer for FileTemplates {
    fn render(
        &self,
        name: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<String, TemplateError> {
        let path = self.dir.join(name);
        let source = match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TemplateError::NotFound(name.to_string()))
            }
            Err(source) => {
                return Err(TemplateError::Io {
                    template: name.to_string(),
                    source,
                })
            }
        };
        render_source(name, &source, params)
    }
}

/// Templates held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryTemplates {
    sources: BTreeMap<String, String>,
}

impl MemoryTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    /// The message templates shipped with the crate
    pub fn builtin() -> Self {
        Self::new()
            .with(
                "approval-requested.md",
                include_str!("../../templates/approval-requested.md"),
            )
            .with(
                "approval-requested-ac.json",
                include_str!("../../templates/approval-requested-ac.json"),
            )
            .with(
                "timeout-breach.md",
                include_str!("../../templates/timeout-breach.md"),
            )
            .with(
                "timeout-breach-ac.json",
                include_str!("../../templates/timeout-breach-ac.json"),
            )
    }

    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.sources.insert(name.into(), source.into());
        self
    }
}

impl TemplateRenderer for MemoryTemplates {
    fn render(
        &self,
        name: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<String, TemplateError> {
        let source = self
            .sources
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
        render_source(name, source, params)
    }
}
