use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub data_dir: Option<String>,
    pub assets_dir: Option<String>,
    pub cache_path: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,

    // Feature configs
    pub waveform: Option<WaveformFileConfig>,
    pub host: Option<HostFileConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct WaveformFileConfig {
    pub points: Option<usize>,
    pub sample_rate: Option<u32>,
    pub fft_size: Option<usize>,
    pub mel_bands: Option<usize>,
    /// Audio file extensions, without the leading dot.
    pub extensions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct HostFileConfig {
    /// Host (optionally with port) written into served documents.
    pub public_host: Option<String>,
    /// Address used to discover the outbound interface.
    pub probe_target: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
