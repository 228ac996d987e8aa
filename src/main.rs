use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use parlance::{ChatFlow, ChatRequest, Persistence, ServiceConfig, StorageBackend, server};

#[derive(Parser)]
#[command(name = "parlance", version)]
#[command(about = "Conversational turn service with durable sessions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a TOML config file (defaults to ./parlance.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Session storage backend (gcs, memory, sqlite)
    #[arg(long, global = true)]
    storage: Option<StorageBackend>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the flow over HTTP
    Serve {
        /// Port to listen on (overrides PORT and the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run a single turn and print the reply
    Ask {
        /// Text to send
        text: String,

        /// Continue an existing session
        #[arg(long)]
        session_id: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive("info".parse().expect("valid log directive"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_flow(config: &ServiceConfig) -> Result<ChatFlow> {
    ChatFlow::builder()
        .from_config(config)
        .context("failed to configure flow")?
        .build()
        .context("failed to build flow")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config =
        ServiceConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(backend) = cli.storage {
        config.storage.backend = backend;
    }

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            let flow = build_flow(&config)?;
            info!(port = config.port, storage = ?config.storage.backend, "starting flow server");
            server::serve(flow, config.port).await?;
        }

        Commands::Ask { text, session_id } => {
            let flow = build_flow(&config)?;
            let mut request = ChatRequest::new(text);
            request.session_id = session_id;

            match flow.run(request).await {
                Ok(outcome) => {
                    println!("{}", outcome.agent_text);
                    println!("\nsession: {}", outcome.session.id);
                    if let Persistence::Failed(e) = &outcome.persistence {
                        warn!(error = %e, "reply was not persisted");
                    }
                }
                Err(e) => {
                    error!(error = %e, "turn failed");
                    anyhow::bail!("turn failed: {}", e);
                }
            }
        }
    }

    Ok(())
}
