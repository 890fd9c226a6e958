use clap::{Parser, Subcommand};
use tracing::info;

use rebill_core::{Config, Migrator};

#[derive(Parser)]
#[command(name = "rebill")]
#[command(about = "Multi-tenant recurring billing service")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Set log level")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        #[arg(long, help = "Skip automatic database migration on startup")]
        skip_migrate: bool,
    },

    /// Run pending database migrations and exit
    Migrate,

    /// Webhook operator tooling
    Webhook {
        #[command(subcommand)]
        command: WebhookCommands,
    },
}

#[derive(Subcommand)]
pub enum WebhookCommands {
    /// Re-dispatch a stored webhook event after a handler failure.
    ///
    /// Clears the envelope's failed status and replays the recorded raw
    /// payload through the dispatch pipeline.
    Replay {
        #[arg(help = "Tenant application id")]
        app_id: String,

        #[arg(help = "PSP event id (evt_...)")]
        event_id: String,
    },

    /// List recent webhook envelopes for an application
    List {
        #[arg(help = "Tenant application id")]
        app_id: String,

        #[arg(long, default_value = "50")]
        limit: i64,
    },
}

fn init_tracing(level: Option<&str>) {
    let filter = level
        .map(|l| l.to_string())
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve { skip_migrate } => {
            if !skip_migrate {
                let pool =
                    rebill_core::create_pool(&config.database.url, config.database.pool_size)
                        .await?;
                Migrator::new(pool).migrate().await?;
            }
            rebill_api::run(config).await?;
        }

        Commands::Migrate => {
            let pool = rebill_core::create_pool(&config.database.url, config.database.pool_size)
                .await?;
            Migrator::new(pool).migrate().await?;
            info!("migrations complete");
        }

        Commands::Webhook { command } => {
            let state = rebill_api::create_app_state(config).await?;
            match command {
                WebhookCommands::Replay { app_id, event_id } => {
                    state.app(&app_id)?;
                    let ack = state.webhook_pipeline.replay(&app_id, &event_id).await?;
                    println!("{}", serde_json::to_string_pretty(&ack)?);
                }
                WebhookCommands::List { app_id, limit } => {
                    state.app(&app_id)?;
                    let events = state.webhook_repository.list(&app_id, limit).await?;
                    for event in events {
                        println!(
                            "{}  {:<32} {:<12} attempts={} error={}",
                            event.received_at.format("%Y-%m-%d %H:%M:%S"),
                            event.event_type,
                            format!("{:?}", event.status).to_lowercase(),
                            event.attempts,
                            event.error.as_deref().unwrap_or("-"),
                        );
                    }
                }
            }
        }
    }

    Ok(())
}
