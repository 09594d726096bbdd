//! Builds the application from configuration with the production adapters

use crate::config::NanoConfig;
use anyhow::{Context, Result};
use nano_coordination::notify::{
    FileTemplates, MemoryTemplates, SecretResolver, TemplateRenderer, WebexClient,
};
use nano_coordination::plan::BuiltinTemplates;
use nano_coordination::verifier::{ProcessChannel, ShowVersionParser};
use nano_coordination::{AppDeps, Application, ConfigStore, MemoryStore, Principal};
use std::sync::Arc;

pub fn build(config: &NanoConfig) -> Result<Application> {
    let mut store = MemoryStore::open(&config.store.path).with_context(|| {
        format!("Failed to open store at {}", config.store.path.display())
    })?;
    if config.store.strict {
        store = store.strict();
    }
    let store: Arc<dyn ConfigStore> = Arc::new(store);

    let renderer: Arc<dyn TemplateRenderer> = match &config.templates.dir {
        Some(dir) => Arc::new(FileTemplates::new(dir)),
        None => Arc::new(MemoryTemplates::builtin()),
    };
    let backend = WebexClient::new(&config.webex.api_base, config.webex_timeout())
        .context("Failed to build Webex client")?;
    let channel = ProcessChannel::new(&config.verifier.command)
        .context("Invalid verifier command template")?;

    tracing::debug!(
        store = %config.store.path.display(),
        templates = ?config.templates.dir,
        api_base = %config.webex.api_base,
        "Runtime adapters ready"
    );

    Ok(Application::setup(AppDeps {
        store,
        principal: Principal::new(config.principal.clone()),
        config_templates: Arc::new(BuiltinTemplates),
        renderer,
        backend: Arc::new(backend),
        secrets: SecretResolver::from_env(),
        channel: Arc::new(channel),
        parser: Arc::new(ShowVersionParser),
        verify_timeout: config.verify_timeout(),
    }))
}
