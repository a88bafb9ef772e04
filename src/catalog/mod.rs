//! Listing of the audio files available on disk.
//!
//! Used to serve the `audio` document when no hand-written one exists.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use serde::Serialize;
use tracing::debug;

use crate::waveform::{WaveformCurve, WaveformService};

/// Cover images handed out round-robin to listed assets.
pub const DEFAULT_COVERS: [&str; 2] = [
    "https://images.unsplash.com/photo-1509718443690-d8e2fb3474d1?auto=format&fit=crop&w=900&q=60",
    "https://images.unsplash.com/photo-1507525428034-b723cf961d3e?auto=format&fit=crop&w=900&q=60",
];

/// A directory to scan and the URL path it is served under.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSource {
    pub directory: PathBuf,
    pub url_path: String,
}

impl AssetSource {
    pub fn new(directory: impl Into<PathBuf>, url_path: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            url_path: url_path.into(),
        }
    }
}

/// One playable file found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioAsset {
    pub path: PathBuf,
    pub file_name: String,
    pub extension: String,
    /// URL path of the directory it was found in, e.g. `/data/`.
    pub url_path: String,
}

impl AudioAsset {
    /// File name without its extension.
    pub fn display_name(&self) -> String {
        Path::new(&self.file_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_name.clone())
    }
}

/// Entry of the synthesized `audio` document.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioItem {
    pub id: usize,
    pub filename: String,
    pub name: String,
    pub url: String,
    pub cover_url: String,
    pub waveform: WaveformCurve,
}

pub struct AssetCatalog {
    sources: Vec<AssetSource>,
    extensions: Vec<String>,
}

impl AssetCatalog {
    pub fn new(sources: Vec<AssetSource>, extensions: &[String]) -> Self {
        Self {
            sources,
            extensions: extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Data directory first, bundled assets second.
    pub fn with_defaults(data_dir: &Path, assets_dir: &Path, extensions: &[String]) -> Self {
        Self::new(
            vec![
                AssetSource::new(data_dir, "/data/"),
                AssetSource::new(assets_dir, "/assets/"),
            ],
            extensions,
        )
    }

    fn is_audio_file(&self, file_name: &str) -> Option<String> {
        let extension = Path::new(file_name)
            .extension()?
            .to_string_lossy()
            .to_lowercase();
        self.extensions.contains(&extension).then_some(extension)
    }

    /// Audio files of every source, in source order then by file name.
    ///
    /// A file name already listed from an earlier source is skipped. Missing
    /// directories are skipped too.
    pub async fn discover(&self) -> std::io::Result<Vec<AudioAsset>> {
        let mut seen = HashSet::new();
        let mut assets = Vec::new();

        for source in &self.sources {
            let mut entries = match tokio::fs::read_dir(&source.directory).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!("Asset directory {:?} does not exist", source.directory);
                    continue;
                }
                Err(err) => return Err(err),
            };

            let root = tokio::fs::canonicalize(&source.directory).await?;
            let mut found = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                if !is_listable_file(&root, &entry).await? {
                    continue;
                }
                let file_name = entry.file_name().to_string_lossy().into_owned();
                if let Some(extension) = self.is_audio_file(&file_name) {
                    found.push(AudioAsset {
                        path: entry.path(),
                        file_name,
                        extension,
                        url_path: source.url_path.clone(),
                    });
                }
            }
            found.sort_by(|a, b| a.file_name.cmp(&b.file_name));

            for asset in found {
                if seen.insert(asset.file_name.clone()) {
                    assets.push(asset);
                }
            }
        }

        Ok(assets)
    }

    /// Builds the listing with absolute URLs on `host` and a curve per file.
    pub async fn listing(&self, host: &str, waveforms: &WaveformService) -> std::io::Result<Vec<AudioItem>> {
        let assets = self.discover().await?;
        let curves = join_all(assets.iter().map(|asset| async move {
            let name = asset.display_name();
            waveforms.waveform_for_file(&asset.path, &name).await
        }))
        .await;

        Ok(assets
            .into_iter()
            .zip(curves)
            .enumerate()
            .map(|(index, (asset, waveform))| AudioItem {
                id: index + 1,
                name: asset.display_name(),
                url: format!(
                    "http://{}{}{}",
                    host,
                    asset.url_path,
                    urlencoding::encode(&asset.file_name)
                ),
                cover_url: DEFAULT_COVERS[index % DEFAULT_COVERS.len()].to_string(),
                filename: asset.file_name,
                waveform,
            })
            .collect())
    }
}

/// Regular files, and links to regular files that stay inside `root`.
async fn is_listable_file(root: &Path, entry: &tokio::fs::DirEntry) -> std::io::Result<bool> {
    let file_type = entry.file_type().await?;
    if !file_type.is_symlink() {
        return Ok(file_type.is_file());
    }
    match tokio::fs::canonicalize(entry.path()).await {
        Ok(target) if target.starts_with(root) => {
            Ok(tokio::fs::metadata(&target).await.map(|m| m.is_file()).unwrap_or(false))
        }
        Ok(target) => {
            debug!("Skipping {:?}, it points outside {:?} to {:?}", entry.path(), root, target);
            Ok(false)
        }
        Err(err) => {
            debug!("Skipping broken link {:?}: {}", entry.path(), err);
            Ok(false)
        }
    }
}
