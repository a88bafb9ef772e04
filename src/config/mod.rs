mod file_config;

pub use file_config::{FileConfig, HostFileConfig, WaveformFileConfig};

use crate::augment::DEFAULT_AUDIO_EXTENSIONS;
use crate::host::DEFAULT_PROBE_TARGET;
use crate::server::{RequestsLoggingLevel, ServerConfig};
use crate::waveform::{
    AnalysisParams, DEFAULT_FFT_SIZE, DEFAULT_MEL_BANDS, DEFAULT_POINTS, DEFAULT_SAMPLE_RATE,
};
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_METRICS_PORT: u16 = 9091;
pub const DEFAULT_DATA_DIR: &str = "data";
pub const CACHE_FILE_NAME: &str = "waveform_cache.json";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    pub assets_dir: Option<PathBuf>,
    pub cache_path: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub public_host: Option<String>,
    pub waveform_points: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            assets_dir: None,
            cache_path: None,
            port: DEFAULT_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            logging_level: RequestsLoggingLevel::default(),
            public_host: None,
            waveform_points: DEFAULT_POINTS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub data_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub cache_path: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,

    // Feature configs (with defaults)
    pub waveform: WaveformSettings,
    pub host: HostSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaveformSettings {
    pub points: usize,
    pub sample_rate: u32,
    pub fft_size: usize,
    pub mel_bands: usize,
    pub extensions: Vec<String>,
}

impl Default for WaveformSettings {
    fn default() -> Self {
        Self {
            points: DEFAULT_POINTS,
            sample_rate: DEFAULT_SAMPLE_RATE,
            fft_size: DEFAULT_FFT_SIZE,
            mel_bands: DEFAULT_MEL_BANDS,
            extensions: DEFAULT_AUDIO_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl WaveformSettings {
    pub fn analysis_params(&self) -> AnalysisParams {
        AnalysisParams {
            points: self.points,
            sample_rate: self.sample_rate,
            fft_size: self.fft_size,
            mel_bands: self.mel_bands,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostSettings {
    pub public_host: Option<String>,
    pub probe_target: String,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .or_else(|| cli.data_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        if data_dir.exists() && !data_dir.is_dir() {
            bail!("data_dir is not a directory: {:?}", data_dir);
        }

        let assets_dir = file
            .assets_dir
            .map(PathBuf::from)
            .or_else(|| cli.assets_dir.clone())
            .unwrap_or_else(|| data_dir.join("..").join("assets"));

        let cache_path = file
            .cache_path
            .map(PathBuf::from)
            .or_else(|| cli.cache_path.clone())
            .unwrap_or_else(|| data_dir.join(CACHE_FILE_NAME));

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = match file.logging_level {
            Some(level) => parse_logging_level(&level)
                .with_context(|| format!("Invalid logging_level in config file: {:?}", level))?,
            None => cli.logging_level.clone(),
        };

        // Waveform settings - merge file config with defaults
        let wf_file = file.waveform.unwrap_or_default();
        let defaults = WaveformSettings::default();
        let waveform = WaveformSettings {
            points: wf_file.points.unwrap_or(cli.waveform_points),
            sample_rate: wf_file.sample_rate.unwrap_or(defaults.sample_rate),
            fft_size: wf_file.fft_size.unwrap_or(defaults.fft_size),
            mel_bands: wf_file.mel_bands.unwrap_or(defaults.mel_bands),
            extensions: wf_file
                .extensions
                .map(|exts| {
                    exts.iter()
                        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                        .filter(|e| !e.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.extensions),
        };

        if waveform.points == 0 {
            bail!("waveform points must be at least 1");
        }
        if waveform.fft_size < 2 {
            bail!("waveform fft_size must be at least 2");
        }
        if waveform.mel_bands == 0 {
            bail!("waveform mel_bands must be at least 1");
        }
        if waveform.sample_rate == 0 {
            bail!("waveform sample_rate must be positive");
        }
        if waveform.extensions.is_empty() {
            bail!("at least one audio extension must be configured");
        }

        let host_file = file.host.unwrap_or_default();
        let host = HostSettings {
            public_host: host_file
                .public_host
                .or_else(|| cli.public_host.clone())
                .filter(|h| !h.trim().is_empty()),
            probe_target: host_file
                .probe_target
                .unwrap_or_else(|| DEFAULT_PROBE_TARGET.to_string()),
        };

        Ok(Self {
            data_dir,
            assets_dir,
            cache_path,
            port,
            metrics_port,
            logging_level,
            waveform,
            host,
        })
    }

    /// Creates the data directory if needed.
    pub fn ensure_paths(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", self.data_dir))
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            requests_logging_level: self.logging_level.clone(),
            port: self.port,
            data_dir: self.data_dir.clone(),
            assets_dir: self.assets_dir.clone(),
            audio_extensions: self.waveform.extensions.clone(),
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
