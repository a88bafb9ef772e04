//! Noise Catalog Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod augment;
pub mod catalog;
pub mod config;
pub mod host;
pub mod server;
pub mod waveform;
pub mod waveform_cache;

// Re-export commonly used types for convenience
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig};
pub use waveform::{WaveformPipeline, WaveformService};
pub use waveform_cache::WaveformCache;
