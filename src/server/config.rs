use super::RequestsLoggingLevel;
use crate::augment::DEFAULT_AUDIO_EXTENSIONS;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// Backing documents and raw audio served under `/data/`.
    pub data_dir: PathBuf,
    /// Bundled files served under `/assets/`.
    pub assets_dir: PathBuf,
    pub audio_extensions: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 8080,
            data_dir: PathBuf::from("data"),
            assets_dir: PathBuf::from("assets"),
            audio_extensions: DEFAULT_AUDIO_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}
