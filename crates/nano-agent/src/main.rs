mod config;
mod runtime;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use config::NanoConfig;
use nano_coordination::notify::ParamValue;
use nano_coordination::store::{with_read, TransactionExt};
use nano_coordination::{ActionInvocation, Application, NodePath, ServiceId};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

/// Provision nano services, sweep SLA deadlines and run actions
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file (falls back to NANO_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the SLA policy and watch trigger
    Setup,
    /// Create or delete a service
    Service {
        #[command(subcommand)]
        action: ServiceCommand,
    },
    /// Advance a service's plan as far as it will go
    Converge { id: String },
    /// Set SLA jeopardy and violation timeouts in minutes
    SetTimeouts {
        #[arg(long)]
        jeopardy: u32,
        #[arg(long)]
        violation: u32,
    },
    /// Store Webex credentials; `%ENV{NAME}` placeholders are resolved at send time
    SetWebex {
        #[arg(long)]
        bot_token: String,
        #[arg(long)]
        room_id: String,
    },
    /// Invoke a bound action by name
    Action {
        name: String,
        /// Keypath the action is invoked on
        #[arg(long)]
        path: String,
        /// Input parameter as key=value, repeatable
        #[arg(long = "input", value_parser = parse_key_val)]
        input: Vec<(String, String)>,
    },
    /// Evaluate SLA triggers and send breach notifications
    Sweep {
        /// Evaluation time, RFC 3339 (defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Print a service record, or all service ids
    Show { id: Option<String> },
}

#[derive(Subcommand)]
enum ServiceCommand {
    Create {
        id: String,
        #[arg(long)]
        device: String,
        #[arg(long)]
        name_server: String,
        /// Only declare the service, skip convergence
        #[arg(long)]
        no_converge: bool,
    },
    Delete {
        id: String,
    },
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(|| std::env::var_os("NANO_CONFIG").map(PathBuf::from));
    let config = NanoConfig::load(config_path.as_deref())?;
    info!(
        store = %config.store.path.display(),
        principal = %config.principal,
        "Nano agent starting"
    );

    let app = runtime::build(&config)?;
    let code = run(&app, cli.command).await;
    app.teardown();
    code
}

async fn run(app: &Application, command: Command) -> Result<ExitCode> {
    match command {
        Command::Setup => {
            let invocation = ActionInvocation::new(
                app.principal().clone(),
                nano_coordination::actions::names::INIT_SLA_POLICY,
                NodePath::Sla,
            );
            return report_action(app.call(&invocation).await);
        }
        Command::Service { action } => match action {
            ServiceCommand::Create {
                id,
                device,
                name_server,
                no_converge,
            } => {
                let id = ServiceId::new(id)?;
                app.create_service(&id, &device, &name_server)?;
                if !no_converge {
                    let report = app.converge(&id).await?;
                    print_json(&report)?;
                    if report.failure.is_some() {
                        return Ok(ExitCode::FAILURE);
                    }
                }
            }
            ServiceCommand::Delete { id } => {
                let id = ServiceId::new(id)?;
                if !app.delete_service(&id)? {
                    bail!("service '{id}' does not exist");
                }
            }
        },
        Command::Converge { id } => {
            let report = app.converge(&ServiceId::new(id)?).await?;
            print_json(&report)?;
            if report.failure.is_some() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::SetTimeouts {
            jeopardy,
            violation,
        } => app.set_timeouts(jeopardy, violation).await?,
        Command::SetWebex { bot_token, room_id } => app.set_webex(&bot_token, &room_id)?,
        Command::Action { name, path, input } => {
            let path: NodePath = path.parse().context("Invalid keypath")?;
            let invocation = input.into_iter().fold(
                ActionInvocation::new(app.principal().clone(), name, path),
                |inv, (k, v)| inv.with_input(k, ParamValue::Text(v)),
            );
            return report_action(app.call(&invocation).await);
        }
        Command::Sweep { at } => {
            let outcomes = app.sweep(at.unwrap_or_else(Utc::now)).await?;
            for (invocation, output) in &outcomes {
                info!(
                    path = %invocation.path,
                    result = output.result,
                    msg = %output.msg,
                    "Breach handled"
                );
            }
            info!(breaches = outcomes.len(), "Sweep complete");
            if outcomes.iter().any(|(_, output)| !output.result) {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Show { id } => match id {
            Some(id) => {
                let id = ServiceId::new(id)?;
                let record = with_read(app.store().as_ref(), app.principal(), |txn| {
                    Ok(txn.service(&id)?)
                })?;
                print_json(&record)?;
            }
            None => {
                let ids = with_read(app.store().as_ref(), app.principal(), |txn| {
                    Ok(txn.service_ids()?)
                })?;
                print_json(&ids)?;
            }
        },
    }
    Ok(ExitCode::SUCCESS)
}

fn report_action(output: nano_coordination::ActionOutput) -> Result<ExitCode> {
    print_json(&output)?;
    Ok(if output.result {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("service=/nano:nano{svc-1}").unwrap(),
            ("service".to_string(), "/nano:nano{svc-1}".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn test_sweep_accepts_rfc3339() {
        let cli =
            Cli::try_parse_from(["nano-agent", "sweep", "--at", "2026-01-02T03:04:05Z"]).unwrap();
        match cli.command {
            Command::Sweep { at: Some(at) } => {
                assert_eq!(at.to_rfc3339(), "2026-01-02T03:04:05+00:00")
            }
            _ => panic!("expected sweep with time"),
        }
    }
}
