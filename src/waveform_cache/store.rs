//! On-disk form of the waveform cache: one JSON object mapping each key to
//! its curve.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{info, warn};

use crate::waveform::WaveformCurve;

pub type CacheEntries = BTreeMap<String, WaveformCurve>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid cache document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not replace cache document: {0}")]
    Persist(#[from] tempfile::PersistError),
}

pub fn read_store(path: &Path) -> Result<CacheEntries, StoreError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Loads the cache, never failing: anything unreadable starts empty.
///
/// Entries whose length differs from `points` were produced under another
/// configuration and are dropped.
pub fn load_store(path: &Path, points: usize) -> CacheEntries {
    let mut entries = match read_store(path) {
        Ok(entries) => entries,
        Err(StoreError::Io(err)) if err.kind() == ErrorKind::NotFound => {
            info!("No waveform cache at {:?}, starting empty", path);
            return CacheEntries::new();
        }
        Err(err) => {
            warn!("Ignoring unreadable waveform cache {:?}: {}", path, err);
            return CacheEntries::new();
        }
    };

    let before = entries.len();
    entries.retain(|_, curve| curve.len() == points);
    if entries.len() != before {
        warn!(
            "Dropped {} cached waveforms with a length other than {}",
            before - entries.len(),
            points
        );
    }
    entries
}

/// Replaces the document atomically, readers never see a partial file.
pub fn write_store(path: &Path, entries: &CacheEntries) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer(&mut writer, entries)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
