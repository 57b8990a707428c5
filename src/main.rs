use clap::Parser;
use dotenvy::dotenv;
use ncm_convert::config::ServerConfig;
use ncm_convert::infrastructure::{decoder, staging};
use ncm_convert::services::worker::SweepWorker;
use ncm_convert::{AppState, create_app};
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Batch conversion server for encrypted audio containers", long_about = None)]
struct Args {
    /// Port for the API server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,

    /// Use the passthrough decoder and disable rate limiting
    #[arg(long)]
    dev: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initial Environment & Logging Setup
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ncm_convert=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting conversion server...");

    // 2. Configuration
    let config = if args.dev {
        ServerConfig {
            staging_dir: ServerConfig::from_env().staging_dir,
            ..ServerConfig::development()
        }
    } else {
        ServerConfig::from_env()
    };
    info!(
        "🛡️  Config: Max Size={}MB, Rate Limit={}/h (proxy headers trusted: {}), Formats=.{} -> .{}",
        config.max_file_size / 1024 / 1024,
        config.conversions_per_hour,
        config.trust_proxy_headers,
        config.formats.source,
        config.formats.target
    );

    // 3. Conversion pipeline
    let staging_store = staging::setup_staging(&config).await;
    let decoder_service = decoder::setup_decoder(&config);
    let state = AppState::new(config.clone(), staging_store.clone(), decoder_service);

    // 4. Background sweeper with its shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = SweepWorker::new(
        staging_store,
        state.rate_limiter.clone(),
        config.staging_cleanup_age,
        shutdown_rx,
    );
    let worker_handle = tokio::spawn(worker.run());

    // 5. HTTP server
    let app = create_app(state);
    let addr = SocketAddr::from((args.host, args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ API Server listening on: http://{}", addr);
    info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", args.port);

    // Peer addresses key the rate limiter when proxy headers are not trusted
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        error!("❌ Server runtime error: {}", e);
    }

    info!("🛑 Shutting down background sweeper...");
    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;

    info!("👋 Server exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
