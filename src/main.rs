use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use musicbox_server::background_jobs::jobs::StagingSweepJob;
use musicbox_server::background_jobs::{JobContext, JobScheduler};
use musicbox_server::config;
use musicbox_server::extractor::{ExtractionInvoker, YtDlpExtractor};
use musicbox_server::library::{LibraryStore, SqliteLibraryStore};
use musicbox_server::pipeline::ConversionPipeline;
use musicbox_server::server::{
    metrics, run_metrics_server, run_server, RequestsLoggingLevel, ServerConfig,
};
use musicbox_server::staging::StagingStore;

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Library database location, a file path or a `sqlite://` URL.
    #[clap(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Secret the server refuses to start without.
    #[clap(long, env = "SESSION_SECRET", hide_env_values = true)]
    pub session_secret: Option<String>,

    /// Directory holding converted files until they expire or get promoted.
    #[clap(long, value_parser = parse_path, default_value = "./downloads")]
    pub staging_dir: PathBuf,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 5000)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// The maximum age of library audio in client caches, in seconds.
    #[clap(long, default_value_t = 3600)]
    pub content_cache_age_sec: usize,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Staged files older than this many seconds are deleted.
    #[clap(long, default_value_t = 3600)]
    pub staging_ttl_secs: u64,

    /// Interval in seconds between staging sweeps.
    #[clap(long, default_value_t = 300)]
    pub sweep_interval_secs: u64,

    /// Also sweep expired staged files before every conversion.
    #[clap(long)]
    pub sweep_on_convert: bool,

    /// yt-dlp executable, looked up on PATH unless absolute.
    #[clap(long, default_value = "yt-dlp")]
    pub yt_dlp_path: String,

    /// Maximum time in seconds a single conversion may take.
    #[clap(long, default_value_t = 600)]
    pub extraction_timeout_secs: u64,
}

impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            database_url: args.database_url.clone(),
            session_secret: args.session_secret.clone(),
            staging_dir: args.staging_dir.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            content_cache_age_sec: args.content_cache_age_sec,
            frontend_dir_path: args.frontend_dir_path.clone(),
            staging_ttl_secs: args.staging_ttl_secs,
            sweep_interval_secs: args.sweep_interval_secs,
            sweep_on_convert: args.sweep_on_convert,
            yt_dlp_path: args.yt_dlp_path.clone(),
            extraction_timeout_secs: args.extraction_timeout_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  database: {:?}", app_config.database_path);
    info!("  staging_dir: {:?}", app_config.staging_dir);
    info!("  staging ttl: {:?}", app_config.staging.ttl);
    info!("  port: {}", app_config.port);

    info!("Initializing metrics...");
    metrics::init_metrics();

    info!(
        "Opening SQLite library database at {:?}...",
        app_config.database_path
    );
    let library: Arc<dyn LibraryStore> =
        Arc::new(SqliteLibraryStore::open(&app_config.database_path)?);

    let staging = Arc::new(
        StagingStore::new(&app_config.staging_dir, app_config.staging.ttl)
            .with_context(|| format!("Failed to prepare {:?}", app_config.staging_dir))?,
    );

    let extractor = YtDlpExtractor::new(
        app_config.extractor.yt_dlp_path.clone(),
        app_config.extractor.timeout,
    );
    if !extractor.check_availability().await {
        warn!(
            "{} is not runnable, conversions will fail until it is installed",
            app_config.extractor.yt_dlp_path
        );
    }

    let pipeline = Arc::new(ConversionPipeline::new(
        ExtractionInvoker::new(Arc::new(extractor)),
        staging.clone(),
        library,
        app_config.staging.sweep_on_convert,
    ));
    pipeline.refresh_library_gauge();

    // Set up background job scheduler
    let shutdown_token = CancellationToken::new();
    let job_context = JobContext::new(shutdown_token.child_token(), staging);
    let mut scheduler = JobScheduler::new(shutdown_token.clone(), job_context);
    scheduler.register_job(Arc::new(StagingSweepJob::new(
        app_config.staging.sweep_interval,
    )));
    info!(
        "Job scheduler initialized with {} job(s)",
        scheduler.job_count()
    );
    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    let metrics_shutdown = shutdown_token.clone();
    let metrics_port = app_config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) =
            run_metrics_server(metrics_port, metrics_shutdown.cancelled_owned()).await
        {
            error!("Metrics server failed: {:#}", e);
        }
    });

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating graceful shutdown");
                signal_token.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        port: app_config.port,
        content_cache_age_sec: app_config.content_cache_age_sec,
        frontend_dir_path: app_config.frontend_dir_path.clone(),
    };

    info!("Ready to serve at port {}!", app_config.port);
    info!("Metrics available at port {}!", app_config.metrics_port);

    let result = run_server(
        server_config,
        pipeline,
        shutdown_token.clone().cancelled_owned(),
    )
    .await;
    info!("HTTP server stopped: {:?}", result);

    shutdown_token.cancel();
    if tokio::time::timeout(Duration::from_secs(35), scheduler_task)
        .await
        .is_err()
    {
        warn!("Scheduler did not stop in time");
    }

    result
}
