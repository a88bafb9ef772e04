//! Waveform feature extraction.
//!
//! A "waveform" here is not the literal audio signal: it is a fixed-length
//! intensity curve meant for drawing, derived from the spectral centroid and
//! the mel-band energy of the audio. When the audio cannot be analyzed, a
//! deterministic curve is synthesized from the asset name instead.

mod curve;
mod decoder;
mod pseudo;
mod service;
mod spectral;
mod strategy;

pub use curve::{round3, synthesize_curve};
pub use decoder::{resample_linear, AudioDecoder, DecodeError, SymphoniaDecoder};
pub use pseudo::pseudo_waveform;
pub use service::{cache_key, WaveformService};
pub use spectral::{analyze, hop_length, AnalysisError, SpectralFeatures};
pub use strategy::{
    ComputedCurve, CurveOrigin, PseudoStrategy, SpectralStrategy, WaveformError,
    WaveformPipeline, WaveformRequest, WaveformStrategy,
};

/// Normalized intensity values, each in `[CURVE_FLOOR, CURVE_CEILING]`.
pub type WaveformCurve = Vec<f64>;

pub const DEFAULT_POINTS: usize = 128;
pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;
pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const DEFAULT_MEL_BANDS: usize = 128;

pub const CURVE_FLOOR: f64 = 0.1;
pub const CURVE_CEILING: f64 = 0.9;

/// Parameters shared by decoding, analysis and curve synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisParams {
    /// Length of every produced curve.
    pub points: usize,
    /// Rate the decoder resamples to before analysis.
    pub sample_rate: u32,
    pub fft_size: usize,
    pub mel_bands: usize,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            points: DEFAULT_POINTS,
            sample_rate: DEFAULT_SAMPLE_RATE,
            fft_size: DEFAULT_FFT_SIZE,
            mel_bands: DEFAULT_MEL_BANDS,
        }
    }
}
