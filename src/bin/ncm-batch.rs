use clap::Parser;
use dotenvy::dotenv;
use ncm_convert::client::{
    AddOutcome, ConversionOrchestrator, FileRegistry, HttpConversionClient, SourceFile,
};
use ncm_convert::config::ClientConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Convert a batch of encrypted audio containers through a conversion server", long_about = None)]
struct Args {
    /// Conversion server base URL (overrides CONVERTER_URL)
    #[arg(short, long)]
    server: Option<String>,

    /// Directory the converted files are written to
    #[arg(short, long, default_value = "converted")]
    out_dir: PathBuf,

    /// Per-request timeout in seconds (overrides CLIENT_TIMEOUT_SECS)
    #[arg(long)]
    timeout: Option<u64>,

    /// Container files to convert
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ncm_convert=info,ncm_batch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ClientConfig::from_env();
    if let Some(server) = args.server {
        config.server_url = server;
    }
    if let Some(secs) = args.timeout {
        config.request_timeout = Duration::from_secs(secs);
    }

    info!("🎵 Converting through {}", config.server_url);

    let client = HttpConversionClient::new(&config)?;
    let orchestrator =
        ConversionOrchestrator::new(FileRegistry::new(config.formats.clone()), Arc::new(client));

    for path in &args.files {
        let file = match SourceFile::from_path(path).await {
            Ok(file) => file,
            Err(e) => {
                warn!("⚠️  Cannot read {}: {}", path.display(), e);
                continue;
            }
        };
        match orchestrator.add_file(file).await {
            AddOutcome::Added(_) => {}
            AddOutcome::Duplicate => info!("Skipping duplicate {}", path.display()),
            AddOutcome::Filtered => info!(
                "Skipping {}: not a .{} file",
                path.display(),
                config.formats.source
            ),
        }
    }

    let summary = orchestrator.convert_all().await;

    for view in orchestrator.views().await {
        println!("{}", view);
    }

    let written = orchestrator.download_all(&args.out_dir).await?;
    info!(
        "✅ {} converted, {} failed; {} file(s) written to {}",
        summary.completed,
        summary.failed,
        written.len(),
        args.out_dir.display()
    );

    if summary.failed > 0 {
        error!("❌ {} file(s) could not be converted", summary.failed);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
