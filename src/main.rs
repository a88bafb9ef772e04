use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::path::PathBuf;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use noise_catalog_server::config::{
    AppConfig, CliConfig, FileConfig, DEFAULT_METRICS_PORT, DEFAULT_PORT,
};
use noise_catalog_server::host::HostResolver;
use noise_catalog_server::server::{metrics, run_server, RequestsLoggingLevel};
use noise_catalog_server::waveform::{
    SymphoniaDecoder, WaveformPipeline, WaveformService, DEFAULT_POINTS,
};
use noise_catalog_server::waveform_cache::WaveformCache;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Optional TOML config file; its values override the flags below.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the backing JSON documents and audio files.
    #[clap(long, env = "NOISE_DATA_DIR", value_parser = parse_path)]
    pub data_dir: Option<PathBuf>,

    /// Directory of bundled assets served under /assets/.
    #[clap(long, value_parser = parse_path)]
    pub assets_dir: Option<PathBuf>,

    /// Waveform cache document. Defaults to a file inside the data directory.
    #[clap(long, value_parser = parse_path)]
    pub cache_path: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, env = "NOISE_BACKEND_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Host written into served documents in place of the development address.
    #[clap(long, env = "NOISE_LOCAL_IP")]
    pub public_host: Option<String>,

    /// Number of points in every waveform curve.
    #[clap(long, default_value_t = DEFAULT_POINTS)]
    pub waveform_points: usize,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            data_dir: self.data_dir.clone(),
            assets_dir: self.assets_dir.clone(),
            cache_path: self.cache_path.clone(),
            port: self.port,
            metrics_port: self.metrics_port,
            logging_level: self.logging_level.clone(),
            public_host: self.public_host.clone(),
            waveform_points: self.waveform_points,
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
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

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}...", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;
    config.ensure_paths()?;
    info!("Serving documents from {:?}", config.data_dir);

    info!("Initializing metrics...");
    metrics::init_metrics();

    info!("Opening waveform cache at {:?}...", config.cache_path);
    let cache = WaveformCache::open(config.cache_path.clone(), config.waveform.points);
    info!("{} waveform curves cached", cache.persisted_len());

    let pipeline = WaveformPipeline::standard(
        config.waveform.analysis_params(),
        Arc::new(SymphoniaDecoder),
    );
    let waveforms = Arc::new(WaveformService::new(pipeline, cache.clone()));

    let host_resolver = HostResolver::new(
        config.host.public_host.clone(),
        config.host.probe_target.clone(),
        config.port,
    );

    info!("Ready to serve at port {}!", config.port);
    let result = run_server(
        config.server_config(),
        waveforms,
        host_resolver,
        config.metrics_port,
        shutdown_signal(),
    )
    .await;

    info!("Flushing waveform cache...");
    cache.shutdown().await;
    result
}
