//! Ordered waveform producers.
//!
//! A [`WaveformPipeline`] asks each strategy in turn and keeps the first curve
//! produced. The last strategy is always [`PseudoStrategy`], which never
//! declines, so producing a curve is infallible from the caller's side.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, warn};

use super::{
    analyze, pseudo_waveform, synthesize_curve, AnalysisError, AnalysisParams, AudioDecoder,
    DecodeError, WaveformCurve,
};
use crate::server::metrics;

#[derive(Error, Debug)]
pub enum WaveformError {
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),
}

/// How a curve was obtained. Only analyzed curves are worth persisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveOrigin {
    Analyzed,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputedCurve {
    pub curve: WaveformCurve,
    pub origin: CurveOrigin,
}

impl ComputedCurve {
    pub fn analyzed(curve: WaveformCurve) -> Self {
        Self {
            curve,
            origin: CurveOrigin::Analyzed,
        }
    }

    pub fn synthetic(curve: WaveformCurve) -> Self {
        Self {
            curve,
            origin: CurveOrigin::Synthetic,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WaveformRequest {
    /// Local audio file, when the asset could be resolved to one.
    pub path: Option<PathBuf>,
    /// Display name, seeds the synthetic curve.
    pub name: String,
}

pub trait WaveformStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `None` to let the next strategy try.
    fn produce(&self, request: &WaveformRequest, params: &AnalysisParams) -> Option<ComputedCurve>;
}

/// Decodes the file and derives the curve from its spectral features.
pub struct SpectralStrategy {
    decoder: Arc<dyn AudioDecoder>,
}

impl SpectralStrategy {
    pub fn new(decoder: Arc<dyn AudioDecoder>) -> Self {
        Self { decoder }
    }

    fn analyze_file(&self, path: &Path, params: &AnalysisParams) -> Result<WaveformCurve, WaveformError> {
        let samples = self.decoder.decode_mono(path, params.sample_rate)?;
        let features = analyze(&samples, params)?;
        Ok(synthesize_curve(&features, params.points))
    }
}

impl WaveformStrategy for SpectralStrategy {
    fn name(&self) -> &'static str {
        "spectral"
    }

    fn produce(&self, request: &WaveformRequest, params: &AnalysisParams) -> Option<ComputedCurve> {
        let path = request.path.as_deref()?;
        match panic::catch_unwind(AssertUnwindSafe(|| self.analyze_file(path, params))) {
            Ok(Ok(curve)) => Some(ComputedCurve::analyzed(curve)),
            Ok(Err(err)) => {
                warn!("Waveform analysis of {:?} failed: {}", path, err);
                metrics::record_waveform_fallback("analysis_failed");
                None
            }
            Err(_) => {
                error!("Waveform analysis of {:?} panicked", path);
                metrics::record_waveform_fallback("analysis_panicked");
                None
            }
        }
    }
}

/// Name-seeded synthetic curve. Never declines.
#[derive(Debug, Default, Clone, Copy)]
pub struct PseudoStrategy;

impl WaveformStrategy for PseudoStrategy {
    fn name(&self) -> &'static str {
        "pseudo"
    }

    fn produce(&self, request: &WaveformRequest, params: &AnalysisParams) -> Option<ComputedCurve> {
        Some(ComputedCurve::synthetic(pseudo_waveform(
            &request.name,
            params.points,
        )))
    }
}

pub struct WaveformPipeline {
    params: AnalysisParams,
    strategies: Vec<Box<dyn WaveformStrategy>>,
}

impl WaveformPipeline {
    pub fn new(params: AnalysisParams, strategies: Vec<Box<dyn WaveformStrategy>>) -> Self {
        Self { params, strategies }
    }

    /// Spectral analysis first, synthetic curve as fallback.
    pub fn standard(params: AnalysisParams, decoder: Arc<dyn AudioDecoder>) -> Self {
        Self::new(
            params,
            vec![
                Box::new(SpectralStrategy::new(decoder)),
                Box::new(PseudoStrategy),
            ],
        )
    }

    pub fn params(&self) -> &AnalysisParams {
        &self.params
    }

    pub fn produce(&self, request: &WaveformRequest) -> ComputedCurve {
        for strategy in &self.strategies {
            if let Some(computed) = strategy.produce(request, &self.params) {
                debug!(
                    "Waveform for '{}' produced by {} strategy",
                    request.name,
                    strategy.name()
                );
                return computed;
            }
        }
        // Custom chains may not end with PseudoStrategy.
        ComputedCurve::synthetic(pseudo_waveform(&request.name, self.params.points))
    }
}
