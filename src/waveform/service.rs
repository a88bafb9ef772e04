use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use super::{pseudo_waveform, WaveformCurve, WaveformPipeline, WaveformRequest};
use crate::server::metrics;
use crate::waveform_cache::WaveformCache;

/// Cache key for a local file: its canonical path.
///
/// Content changes under the same path are not detected, delete the cache
/// document to force recomputation.
pub async fn cache_key(path: &Path) -> std::io::Result<String> {
    let canonical = tokio::fs::canonicalize(path).await?;
    Ok(canonical.to_string_lossy().into_owned())
}

/// Entry point for everything that needs a curve.
pub struct WaveformService {
    pipeline: Arc<WaveformPipeline>,
    cache: Arc<WaveformCache>,
}

impl WaveformService {
    pub fn new(pipeline: WaveformPipeline, cache: Arc<WaveformCache>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            cache,
        }
    }

    pub fn points(&self) -> usize {
        self.pipeline.params().points
    }

    pub fn cache(&self) -> &Arc<WaveformCache> {
        &self.cache
    }

    /// Curve for a local audio file, memoized by canonical path.
    ///
    /// Never fails: anything that goes wrong degrades to the synthetic curve
    /// for `name`.
    pub async fn waveform_for_file(&self, path: &Path, name: &str) -> WaveformCurve {
        let key = match cache_key(path).await {
            Ok(key) => key,
            Err(err) => {
                debug!("Cannot canonicalize {:?}: {}", path, err);
                metrics::record_waveform_fallback("unresolved");
                return self.synthetic(name);
            }
        };

        let pipeline = self.pipeline.clone();
        let request = WaveformRequest {
            path: Some(PathBuf::from(&key)),
            name: name.to_string(),
        };
        match self
            .cache
            .get_or_compute(&key, move || pipeline.produce(&request))
            .await
        {
            Ok(curve) => curve,
            Err(err) => {
                warn!("{}", err);
                metrics::record_waveform_fallback("cache_error");
                self.synthetic(name)
            }
        }
    }

    /// Synthetic curve, for assets with no local file.
    pub fn synthetic(&self, name: &str) -> WaveformCurve {
        pseudo_waveform(name, self.points())
    }
}
