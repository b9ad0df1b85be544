//! Mizuchi Publisher - publish release artifacts to S3
//!
//! Uploads every given file to the configured destination. Ctrl-C cancels
//! all uploads in flight; a second Ctrl-C exits immediately.

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use futures::future::join_all;
use mizuchi_publisher::cancel::{cancel_on_interrupt, CancellationToken};
use mizuchi_publisher::progress::{
    IndicatifProgressReporter, NoopProgressReporter, ProgressReporter, TracingProgressReporter,
};
use mizuchi_publisher::{metrics, Config, PublishContext, S3Publisher, S3Store};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Mizuchi Publisher - upload release artifacts to an S3 bucket
#[derive(Parser, Debug)]
#[command(name = "mizuchi-publisher")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bucket to publish to (overrides the configuration)
    #[arg(long)]
    bucket: Option<String>,

    /// Bucket region (overrides the configuration)
    #[arg(long)]
    region: Option<String>,

    /// Key prefix (overrides the configuration)
    #[arg(long)]
    path: Option<String>,

    /// Store the file under this name instead of its basename (single file only)
    #[arg(long)]
    name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Print Prometheus metrics after publishing
    #[arg(long)]
    print_metrics: bool,

    /// Files to publish
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn init_logging(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level '{}'", level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }

    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load configuration from {:?}", path))?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };

    if let Some(bucket) = &args.bucket {
        config.destination.bucket = Some(bucket.clone());
    }
    if let Some(region) = &args.region {
        config.destination.region = Some(region.clone());
    }
    if let Some(path) = &args.path {
        config.destination.path_prefix = Some(path.clone());
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.log_format)?;

    info!("Starting Mizuchi Publisher v{}", mizuchi_publisher::VERSION);

    if args.name.is_some() && args.files.len() > 1 {
        bail!("--name can only be used when publishing a single file");
    }

    let config = load_config(&args)?;

    let token = CancellationToken::new();
    let interrupts = Box::pin(futures::stream::unfold((), |_| async {
        tokio::signal::ctrl_c().await.ok().map(|_| ((), ()))
    }));
    tokio::spawn(cancel_on_interrupt(interrupts, token.clone(), || {
        std::process::exit(130)
    }));

    let interval = Duration::from_millis(config.progress.interval_millis);
    let mut bars = None;
    let mut renderer = None;
    let progress: Arc<dyn ProgressReporter> = if !config.progress.enabled {
        Arc::new(NoopProgressReporter)
    } else if IndicatifProgressReporter::stderr_is_terminal() {
        let reporter = Arc::new(IndicatifProgressReporter::new());
        bars = Some(reporter.clone());
        reporter
    } else {
        let reporter = Arc::new(TracingProgressReporter::spawn(interval));
        renderer = Some(reporter.clone());
        reporter
    };

    let store = Arc::new(S3Store::new(&config.backend).await);
    let context = PublishContext::new(token.clone(), progress);

    let publisher = S3Publisher::new(config.destination, store, context)
        .await?
        .with_chunk_size(config.upload.chunk_size);
    info!("Publishing {} file(s) to {}", args.files.len(), publisher);

    let uploads = args
        .files
        .iter()
        .map(|file| publisher.upload(file, args.name.as_deref()));
    let results = join_all(uploads).await;

    if let Some(bars) = bars {
        bars.finish();
    }
    if let Some(renderer) = renderer {
        renderer.shutdown().await;
    }

    let mut failed = 0;
    let mut cancelled = 0;
    for (file, result) in args.files.iter().zip(results) {
        match result {
            Ok(result) => println!("{}", result.location_url),
            Err(e) if e.is_cancelled() => {
                cancelled += 1;
                warn!(file = %file.display(), "Upload cancelled");
            }
            Err(e) => {
                failed += 1;
                error!(file = %file.display(), error = %e, "Upload failed");
            }
        }
    }

    if args.print_metrics {
        print!("{}", metrics::gather_text());
    }

    if failed > 0 || cancelled > 0 {
        bail!(
            "{} upload(s) failed, {} cancelled, out of {}",
            failed,
            cancelled,
            args.files.len()
        );
    }

    Ok(())
}
