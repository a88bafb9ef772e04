//! Adds waveform curves to the audio entries of served documents.

mod resolver;
mod visitor;

pub use resolver::{safe_relative_path, ResolutionRule, ResolveError, UrlResolver};
pub use visitor::visit_matching_mut;

use std::sync::Arc;

use futures::future::join_all;
use serde_json::{Map, Value};
use tracing::debug;

use crate::server::metrics;
use crate::waveform::{WaveformCurve, WaveformService};

pub const URL_FIELD: &str = "url";
pub const NAME_FIELD: &str = "name";
pub const WAVEFORM_FIELD: &str = "waveform";

/// Seed used for entries without a name.
pub const DEFAULT_NAME: &str = "audio";

pub const DEFAULT_AUDIO_EXTENSIONS: [&str; 3] = ["mp3", "wav", "ogg"];

/// Owned copy of what an augmentable entry needs, taken in the first pass.
#[derive(Debug, Clone, PartialEq)]
struct AudioReference {
    url: String,
    name: String,
}

impl AudioReference {
    fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            url: map
                .get(URL_FIELD)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            name: map
                .get(NAME_FIELD)
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_NAME)
                .to_string(),
        }
    }
}

pub struct DocumentAugmentor {
    service: Arc<WaveformService>,
    resolver: UrlResolver,
    extensions: Vec<String>,
}

impl DocumentAugmentor {
    pub fn new(service: Arc<WaveformService>, resolver: UrlResolver, extensions: &[String]) -> Self {
        Self {
            service,
            resolver,
            extensions: extensions
                .iter()
                .map(|ext| format!(".{}", ext.trim_start_matches('.').to_lowercase()))
                .collect(),
        }
    }

    /// Whether `url` names an audio file, ignoring case, query and fragment.
    pub fn is_audio_url(&self, url: &str) -> bool {
        let path = url
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        self.extensions.iter().any(|ext| path.ends_with(ext.as_str()))
    }

    pub fn needs_waveform(&self, map: &Map<String, Value>) -> bool {
        !map.contains_key(WAVEFORM_FIELD)
            && map
                .get(URL_FIELD)
                .and_then(Value::as_str)
                .is_some_and(|url| self.is_audio_url(url))
    }

    /// Injects a `waveform` into every audio entry lacking one, returns how
    /// many were added.
    ///
    /// Curves are gathered first and written back in a second walk, which
    /// visits the same entries in the same order.
    pub async fn augment(&self, document: &mut Value) -> usize {
        let needs_waveform = |map: &Map<String, Value>| self.needs_waveform(map);

        let mut references = Vec::new();
        visit_matching_mut(document, &needs_waveform, &mut |map| {
            references.push(AudioReference::from_map(map));
        });
        if references.is_empty() {
            return 0;
        }

        let curves = join_all(references.iter().map(|reference| self.curve_for(reference))).await;
        let mut curves = curves.into_iter();
        let mut injected = 0;
        visit_matching_mut(document, &needs_waveform, &mut |map| {
            if let Some(curve) = curves.next() {
                map.insert(WAVEFORM_FIELD.to_string(), Value::from(curve));
                injected += 1;
            }
        });

        debug!("Injected {} waveforms", injected);
        injected
    }

    async fn curve_for(&self, reference: &AudioReference) -> WaveformCurve {
        let path = match self.resolver.resolve(&reference.url) {
            Ok(path) => path,
            Err(err) => {
                debug!("Using synthetic waveform for {}: {}", reference.url, err);
                metrics::record_waveform_fallback("unresolved");
                return self.service.synthetic(&reference.name);
            }
        };

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => self.service.waveform_for_file(&path, &reference.name).await,
            _ => {
                debug!("No local file for {} at {:?}", reference.url, path);
                metrics::record_waveform_fallback("missing_file");
                self.service.synthetic(&reference.name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waveform::{pseudo_waveform, AnalysisParams, SymphoniaDecoder, WaveformPipeline};
    use crate::waveform_cache::WaveformCache;
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_tone(path: &Path) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..11_025 {
            let v = ((i as f32 * 0.2).sin() * (i as f32 / 11_025.0) * 15_000.0) as i16;
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn augmentor(data_dir: &Path) -> DocumentAugmentor {
        let params = AnalysisParams {
            points: 32,
            ..AnalysisParams::default()
        };
        let cache = WaveformCache::open(data_dir.join("waveform_cache.json"), params.points);
        let service = Arc::new(WaveformService::new(
            WaveformPipeline::standard(params, Arc::new(SymphoniaDecoder)),
            cache,
        ));
        let extensions: Vec<String> = DEFAULT_AUDIO_EXTENSIONS.iter().map(|e| e.to_string()).collect();
        DocumentAugmentor::new(
            service,
            UrlResolver::with_defaults(data_dir, data_dir.join("assets")),
            &extensions,
        )
    }

    #[tokio::test]
    async fn test_unresolvable_urls_get_name_seeded_curves() {
        let dir = TempDir::new().unwrap();
        let augmentor = augmentor(dir.path());
        let mut doc = json!({"scenes": [
            {"name": "Rain", "url": "https://cdn.example.com/rain.mp3"},
            {"url": "https://cdn.example.com/untitled.ogg"}
        ]});

        assert_eq!(augmentor.augment(&mut doc).await, 2);

        assert_eq!(doc["scenes"][0]["waveform"], json!(pseudo_waveform("Rain", 32)));
        assert_eq!(doc["scenes"][1]["waveform"], json!(pseudo_waveform(DEFAULT_NAME, 32)));
    }

    #[tokio::test]
    async fn test_local_files_are_analyzed() {
        let dir = TempDir::new().unwrap();
        write_tone(&dir.path().join("Soft Tone.wav"));
        let augmentor = augmentor(dir.path());
        let mut doc = json!([{"name": "tone", "url": "http://127.0.0.1:8080/data/Soft%20Tone.wav"}]);

        augmentor.augment(&mut doc).await;

        let curve = doc[0]["waveform"].as_array().unwrap();
        assert_eq!(curve.len(), 32);
        assert_ne!(doc[0]["waveform"], json!(pseudo_waveform("tone", 32)));
    }

    #[tokio::test]
    async fn test_existing_waveforms_and_non_audio_urls_are_untouched() {
        let dir = TempDir::new().unwrap();
        let augmentor = augmentor(dir.path());
        let original = json!({
            "cover": {"url": "https://images.example.com/c.jpg"},
            "track": {"url": "/data/a.mp3", "waveform": [1, 2, 3]},
            "count": 3,
            "title": "no urls here"
        });
        let mut doc = original.clone();

        assert_eq!(augmentor.augment(&mut doc).await, 0);
        assert_eq!(doc, original);
    }

    #[tokio::test]
    async fn test_nested_entries_are_all_augmented() {
        let dir = TempDir::new().unwrap();
        let augmentor = augmentor(dir.path());
        let mut doc = json!({
            "url": "http://x/data/outer.MP3",
            "name": "outer",
            "layers": [{"url": "http://x/data/inner.wav?v=1", "name": "inner"}]
        });

        assert_eq!(augmentor.augment(&mut doc).await, 2);
        assert_eq!(doc["waveform"], json!(pseudo_waveform("outer", 32)));
        assert_eq!(doc["layers"][0]["waveform"], json!(pseudo_waveform("inner", 32)));
    }

    #[tokio::test]
    async fn test_second_pass_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let augmentor = augmentor(dir.path());
        let mut doc = json!([{"url": "/assets/a.ogg"}]);

        augmentor.augment(&mut doc).await;
        let once = doc.clone();
        assert_eq!(augmentor.augment(&mut doc).await, 0);
        assert_eq!(doc, once);
    }

    #[test]
    fn test_is_audio_url() {
        let dir = TempDir::new().unwrap();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let augmentor = rt.block_on(async { augmentor(dir.path()) });

        assert!(augmentor.is_audio_url("http://h/a.mp3"));
        assert!(augmentor.is_audio_url("http://h/a.WAV?download=1"));
        assert!(!augmentor.is_audio_url("http://h/a.mp3.jpg"));
        assert!(!augmentor.is_audio_url("http://h/mp3"));
    }
}
