//! OpenViking server - HTTP API and MCP bridge for an agent-native context database

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use openviking_server::api::{self, AppState};
use openviking_server::config::ServerConfig;
use openviking_server::mcp::server::{resource_uri, serve_stdio};
use openviking_server::mcp::{build_route_maps, OpenVikingMcp};
use openviking_server::store::ContextStore;

#[derive(Parser)]
#[command(name = "openviking-server")]
#[command(about = "OpenViking HTTP server with an MCP bridge")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (includes MCP at the configured path)
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Disable the MCP endpoint
        #[arg(long)]
        no_mcp: bool,
    },

    /// Start the MCP server on stdio
    Mcp,

    /// Print the MCP route maps and the tools and resources they produce
    Catalog,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdio MCP keeps a clean stdout
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("openviking_server={},tower_http={}", log_level, log_level).into()
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let _ = dotenvy::dotenv();

    let mut config = ServerConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port, no_mcp } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if no_mcp {
                config.enable_mcp = false;
            }

            let store = Arc::new(ContextStore::new());
            api::serve(config, store).await?;
        }

        Commands::Mcp => {
            let store = Arc::new(ContextStore::new());
            let state = AppState::new(config, store);
            let catalog = Arc::new(api::build_catalog()?);
            let server = OpenVikingMcp::new(api::api_router(state), catalog);

            serve_stdio(server).await?;
        }

        Commands::Catalog => {
            println!("Route maps");
            println!("==========");
            for (i, map) in build_route_maps().iter().enumerate() {
                let methods = map
                    .methods
                    .as_ref()
                    .map(|m| m.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(","))
                    .unwrap_or_else(|| "*".into());
                let tags = map
                    .tags
                    .as_ref()
                    .map(|t| t.iter().cloned().collect::<Vec<_>>().join(","))
                    .unwrap_or_else(|| "*".into());
                println!("{:>2}. {:<12} {:<12} {}", i + 1, methods, tags, map.mcp_type);
            }

            let catalog = api::build_catalog()?;

            println!("\nTools ({})", catalog.tools.len());
            for op in &catalog.tools {
                println!("  • {:<16} {} {}", op.operation_id, op.method, op.path);
            }

            println!("\nResources ({})", catalog.resources.len());
            for op in &catalog.resources {
                println!("  • {:<40} {} {}", resource_uri(op), op.method, op.path);
            }

            println!("\nExcluded ({})", catalog.excluded.len());
            for op in &catalog.excluded {
                println!("  • {} {}", op.method, op.path);
            }
        }
    }

    Ok(())
}
