mod cmd;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "relay",
    about = "Action orchestration for the CRM — trigger entity actions, relay worker outcomes",
    version,
    propagate_version = true
)]
struct Cli {
    /// Relay server base URL
    #[arg(
        long,
        global = true,
        env = "RELAY_SERVER",
        default_value = "http://localhost:3141"
    )]
    server: String,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the orchestration server
    Serve {
        /// Path to a YAML config file (default: built-in defaults + env)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the listen port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Trigger an action against an entity
    Trigger {
        /// Action type (send-message, generate-quote, convert-entity, request-analysis)
        action_type: String,

        /// Entity type (e.g. candidate, prospect)
        entity_type: String,

        /// Entity id
        entity_id: String,

        /// JSON payload forwarded to the worker
        #[arg(long)]
        payload: Option<String>,

        /// Correlation id (default: generated)
        #[arg(long)]
        correlation_id: Option<String>,

        /// Wait for the outcome before exiting
        #[arg(long)]
        wait: bool,

        /// Wait window in seconds (default: the action type's delivery timeout)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Show an action request by correlation id or idempotency key
    Status {
        /// Correlation id (omit to look up by --entity-type/--entity-id/--action-type)
        correlation_id: Option<String>,

        #[arg(long, requires_all = ["entity_id", "action_type"])]
        entity_type: Option<String>,

        #[arg(long)]
        entity_id: Option<String>,

        #[arg(long)]
        action_type: Option<String>,
    },

    /// Wait for the outcome of an in-flight action
    Watch {
        correlation_id: String,

        /// Wait window in seconds
        #[arg(long, default_value = "60")]
        timeout_secs: u64,
    },

    /// List PENDING actions older than a threshold (reads the store directly)
    Stale {
        /// Path to the sqlite store (default: RELAY_DB_PATH or relay.db)
        #[arg(long)]
        db: Option<String>,

        /// Age threshold in seconds
        #[arg(long, default_value = "300")]
        older_than_secs: i64,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Serve { config, port } => cmd::serve::run(config.as_deref(), port),
        Commands::Trigger {
            action_type,
            entity_type,
            entity_id,
            payload,
            correlation_id,
            wait,
            timeout_secs,
        } => cmd::status::parse_action_type(&action_type).and_then(|action_type| {
            cmd::trigger::run(
                &cli.server,
                cmd::trigger::TriggerArgs {
                    action_type,
                    entity_type,
                    entity_id,
                    payload,
                    correlation_id,
                    wait,
                    timeout_secs,
                },
                cli.json,
            )
        }),
        Commands::Status {
            correlation_id,
            entity_type,
            entity_id,
            action_type,
        } => resolve_status_lookup(correlation_id, entity_type, entity_id, action_type)
            .and_then(|lookup| cmd::status::run(&cli.server, lookup, cli.json)),
        Commands::Watch {
            correlation_id,
            timeout_secs,
        } => cmd::watch::run(&cli.server, &correlation_id, timeout_secs, cli.json),
        Commands::Stale {
            db,
            older_than_secs,
        } => cmd::stale::run(db.as_deref(), older_than_secs, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn resolve_status_lookup(
    correlation_id: Option<String>,
    entity_type: Option<String>,
    entity_id: Option<String>,
    action_type: Option<String>,
) -> anyhow::Result<cmd::status::StatusLookup> {
    if let Some(id) = correlation_id {
        return Ok(cmd::status::StatusLookup::ByCorrelation(id));
    }
    match (entity_type, entity_id, action_type) {
        (Some(entity_type), Some(entity_id), Some(raw)) => {
            Ok(cmd::status::StatusLookup::ByKey {
                entity_type,
                entity_id,
                action_type: cmd::status::parse_action_type(&raw)?,
            })
        }
        _ => Err(anyhow::anyhow!(
            "pass a correlation id, or all of --entity-type, --entity-id, and --action-type"
        )),
    }
}
