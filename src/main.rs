mod config;
mod error;
mod healing;
mod providers;
mod retry;
mod server;
mod services;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::{BackendKind, ConfigManager, HealerSettings};
use healing::planner::parse_plan;
use healing::{
    AiPlanGenerator, ErrorClassifier, ErrorEvent, ErrorReport, GateDecision, HealingOrchestrator,
    SafetyValidator, SafetyVerdict,
};
use server::{AppState, ErrorKind};
use services::{
    Collaborators, EmailGateway, HttpEmailGateway, HttpReplayer, InMemoryBackend, LogEmailGateway,
    RestBackend,
};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "fleetops-healer", version, about = "Self-healing error remediation for FleetOps")]
struct Cli {
    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Use this config file instead of the per-user default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP intake server
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show how an error would be classified and gated
    Classify {
        /// Error-type tag, e.g. DataStoreConnectionError
        error_type: String,
        /// Error message
        message: String,
    },
    /// Parse a remediation plan and run the safety validator over it
    CheckPlan {
        /// Plan JSON file, or `-` for stdin
        path: String,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets masked)
    Show,
    /// Print the config file location
    Path,
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// JSON envelope for non-interactive output
fn json_output(success: bool, data: serde_json::Value, error: Option<&str>) -> String {
    serde_json::json!({
        "success": success,
        "data": data,
        "error": error,
    })
    .to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fleetops_healer=info"));

    if cli.json {
        // stdout carries the JSON envelope
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    } else if std::env::var("FLEETOPS_HEALER_LOG_JSON").is_ok() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }

    let json_mode = cli.json;
    if let Err(e) = run_command(cli).await {
        if json_mode {
            println!("{}", json_output(false, serde_json::Value::Null, Some(&format!("{:#}", e))));
            std::process::exit(1);
        }
        return Err(e);
    }
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<ConfigManager> {
    Ok(match path {
        Some(path) => ConfigManager::from_path(path)?,
        None => ConfigManager::new()?,
    })
}

async fn run_command(cli: Cli) -> Result<()> {
    let json_mode = cli.json;

    match cli.command {
        Commands::Serve { bind, port } => {
            let config_manager = load_config(cli.config)?;
            let settings = config_manager.get();
            let orchestrator = build_orchestrator(settings)?;

            let state = AppState::new(
                orchestrator,
                settings.server.production,
                Duration::from_millis(settings.server.slow_request_ms),
            );
            let bind = bind.unwrap_or_else(|| settings.server.bind.clone());
            let port = port.unwrap_or(settings.server.port);
            server::serve(state, &bind, port).await?;
        }
        Commands::Classify { error_type, message } => {
            let config_manager = load_config(cli.config)?;
            let classifier = ErrorClassifier::new(config_manager.get().healing.min_success_rate);

            let severity = ErrorClassifier::severity(&error_type, &message);
            let event = ErrorEvent::from_report(ErrorReport::new("cli", &error_type, &message), severity);
            let kind = ErrorKind::from_tag(&error_type);
            let category = classifier.match_category(&error_type, &message);
            let gate = classifier.gate(&event, &[]);
            let healable = classifier.is_healable(&event, &[]);

            if json_mode {
                let rejection = match &gate {
                    GateDecision::Proceed(_) => None,
                    GateDecision::Escalate(rejection) => Some(rejection.to_string()),
                };
                println!(
                    "{}",
                    json_output(
                        true,
                        serde_json::json!({
                            "error_type": error_type,
                            "severity": severity,
                            "category": category.map(|c| format!("{:?}", c)),
                            "healable": healable,
                            "rejection": rejection,
                            "http_status": kind.status().as_u16(),
                            "routed_to_healing": kind.routes_to_healing(),
                        }),
                        None
                    )
                );
            } else {
                println!("Error type:   {}", error_type);
                println!("Severity:     {}", severity);
                match category {
                    Some(c) => println!("Category:     {:?}", c),
                    None => println!("Category:     (no known pattern)"),
                }
                match gate {
                    GateDecision::Proceed(_) => println!("Gate:         auto-heal (no history)"),
                    GateDecision::Escalate(rejection) => println!("Gate:         escalate ({})", rejection),
                }
                println!("HTTP status:  {}", kind.status().as_u16());
                println!("Routed:       {}", if kind.routes_to_healing() { "yes" } else { "no" });
            }
        }
        Commands::CheckPlan { path } => {
            let config_manager = load_config(cli.config)?;
            let threshold = config_manager.get().healing.confidence_threshold;

            let content = if path == "-" {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                std::fs::read_to_string(&path)?
            };

            let mut plan = parse_plan(&content)?;
            let proposed = plan.confidence();
            let verdict = SafetyValidator::new().validate(&mut plan);
            let executes = plan.confidence() >= threshold;

            let findings: Vec<String> = match &verdict {
                SafetyVerdict::Unsafe(findings) => findings
                    .iter()
                    .map(|f| format!("{}: {}", f.kind, f.statement))
                    .collect(),
                _ => Vec::new(),
            };

            if json_mode {
                println!(
                    "{}",
                    json_output(
                        true,
                        serde_json::json!({
                            "action": plan.action,
                            "description": plan.description,
                            "proposed_confidence": proposed,
                            "confidence": plan.confidence(),
                            "vetoed": plan.is_vetoed(),
                            "findings": findings,
                            "would_execute": executes,
                        }),
                        None
                    )
                );
            } else {
                println!("Action:       {}", plan.action);
                println!("Description:  {}", plan.description);
                println!("Confidence:   {:.2} (proposed {:.2})", plan.confidence(), proposed);
                for finding in &findings {
                    println!("Destructive:  {}", finding);
                }
                println!(
                    "Decision:     {}",
                    if executes { "execute" } else { "escalate" }
                );
            }
        }
        Commands::Config { action } => run_config(action, cli.config, json_mode)?,
    }

    Ok(())
}

fn run_config(action: ConfigAction, path: Option<PathBuf>, json_mode: bool) -> Result<()> {
    let config_manager = load_config(path)?;

    match action {
        ConfigAction::Show => {
            let view = masked_settings(config_manager.get())?;
            if json_mode {
                println!("{}", json_output(true, view, None));
            } else {
                println!("{}", serde_json::to_string_pretty(&view)?);
            }
        }
        ConfigAction::Path => {
            let path = config_manager.config_path().display().to_string();
            if json_mode {
                println!("{}", json_output(true, serde_json::json!({ "path": path }), None));
            } else {
                println!("{}", path);
            }
        }
        ConfigAction::Init { force } => {
            let path = config_manager.config_path().to_path_buf();
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            config_manager.save()?;
            if json_mode {
                println!(
                    "{}",
                    json_output(true, serde_json::json!({ "path": path.display().to_string() }), None)
                );
            } else {
                println!("Wrote {}", path.display());
            }
        }
    }
    Ok(())
}

fn masked_settings(settings: &HealerSettings) -> Result<serde_json::Value> {
    let mut view = serde_json::to_value(settings)?;
    for pointer in ["/provider/api_key", "/backend/api_token", "/mail/api_token"] {
        if let Some(value) = view.pointer_mut(pointer) {
            if !value.is_null() {
                *value = serde_json::json!("****configured****");
            }
        }
    }
    Ok(view)
}

fn build_orchestrator(settings: &HealerSettings) -> Result<Arc<HealingOrchestrator>> {
    let mailer: Arc<dyn EmailGateway> = match &settings.mail.gateway_url {
        Some(url) => Arc::new(HttpEmailGateway::new(url.clone(), &settings.mail)?),
        None => {
            warn!("mail.gateway_url not set, outgoing mail will only be logged");
            Arc::new(LogEmailGateway)
        }
    };
    let replayer = Arc::new(HttpReplayer::new(Duration::from_secs(settings.backend.timeout_secs))?);

    let services = match settings.backend.kind {
        BackendKind::Memory => {
            warn!("Using the in-memory backend; healing history is lost on restart");
            Collaborators::in_memory(Arc::new(InMemoryBackend::new()), mailer, replayer)
        }
        BackendKind::Rest => {
            Collaborators::rest(Arc::new(RestBackend::new(&settings.backend)?), mailer, replayer)
        }
    };

    let provider = providers::create_provider(&settings.provider)?;
    if !provider.is_authenticated() {
        warn!(
            provider = %provider.info().display_name,
            "No API key configured; every plan will escalate"
        );
    }
    let model = providers::resolve_model(&settings.provider, provider.as_ref());
    info!(provider = %provider.info().name, %model, "Plan generator ready");

    let healing = &settings.healing;
    if healing.replay_allowed_hosts.is_empty() {
        info!("healing.replay_allowed_hosts is empty, API_RETRY will not replay requests");
    }
    let generator = Arc::new(AiPlanGenerator::new(
        provider,
        model,
        Duration::from_secs(healing.plan_timeout_secs),
        healing.plan_max_retries,
    ));

    Ok(Arc::new(HealingOrchestrator::new(healing, generator, &services)))
}
