use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use route_pipeline::config::AppConfig;
use route_pipeline::handlers;

#[derive(Debug, Parser)]
#[command(name = "route-pipeline", version, about = "Reference service for declarative route pipelines")]
struct Args {
    /// Port to listen on (overrides ROUTE_PIPELINE_PORT / PORT)
    #[arg(long, short)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up JWT_SECRET
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = AppConfig::from_env().context("failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let app = handlers::app(&config)?;

    let bind_addr = format!("{}:{}", args.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("route-pipeline listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
