use clap::Parser;
use colored::*;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auditview_server::{create_app, AppState, ServerConfig};

/// AuditView HTTP server
#[derive(Parser, Debug)]
#[command(name = "auditview-server")]
#[command(about = "Audit log search and export API server")]
struct Args {
    /// Server bind address
    #[arg(long, env = "AUDITVIEW_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Server port
    #[arg(short, long, env = "AUDITVIEW_PORT", default_value = "8080")]
    port: u16,

    /// Directory for durable export job records
    #[arg(long, env = "AUDITVIEW_DATA_DIR", default_value = "./data/export-jobs")]
    data_dir: PathBuf,

    /// Directory for completed export artifacts
    #[arg(long, env = "AUDITVIEW_EXPORT_DIR", default_value = "./data/exports")]
    export_dir: PathBuf,

    /// Concurrent export executions
    #[arg(long, env = "AUDITVIEW_EXPORT_WORKERS", default_value = "2")]
    export_workers: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    init_tracing(args.verbose);

    info!("{}", "Starting AuditView HTTP Server".bright_cyan());
    info!("Version: {}", env!("CARGO_PKG_VERSION").bright_white());
    info!(
        "Bind address: {}",
        format!("{}:{}", args.host, args.port).bright_yellow()
    );

    let config = ServerConfig {
        data_dir: args.data_dir,
        export_dir: args.export_dir,
        export_workers: args.export_workers,
    };
    let state = AppState::bootstrap(&config).await?;
    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        "{}",
        format!("AuditView server running on http://{addr}").bright_green()
    );
    info!(
        "{}",
        format!("Health check available at: http://{addr}/health").bright_blue()
    );
    info!(
        "{}",
        format!("Audit log API available at: http://{addr}/api/audit").bright_blue()
    );

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let is_development =
        env::var("AUDITVIEW_ENV").unwrap_or_else(|_| "development".to_string()) == "development";

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("auditview_server={level},audit_engine={level},tower_http=info").into()
    });

    if is_development {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    } else {
        // Structured JSON logging for production
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_ansi(false).json())
            .init();
    }
}
