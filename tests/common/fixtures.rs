//! Test fixture creation for the data and assets directories

use super::constants::*;
use anyhow::Result;
use serde_json::json;
use std::f32::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Writes a mono 16-bit WAV tone whose loudness ramps up over time.
pub fn write_tone(path: &Path, frequency: f32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: FIXTURE_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for i in 0..FIXTURE_SAMPLES {
        let t = i as f32 / FIXTURE_SAMPLE_RATE as f32;
        let envelope = i as f32 / FIXTURE_SAMPLES as f32;
        let sample = (2.0 * PI * frequency * t).sin() * envelope * 0.8;
        writer.write_sample((sample * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Creates a temporary root with `data/` and `assets/` directories.
/// Returns (temp_dir, data_dir, assets_dir)
pub fn create_test_data() -> Result<(TempDir, PathBuf, PathBuf)> {
    let dir = TempDir::new()?;
    let data_dir = dir.path().join("data");
    let assets_dir = dir.path().join("assets");
    fs::create_dir_all(&data_dir)?;
    fs::create_dir_all(&assets_dir)?;

    write_tone(&data_dir.join(TONE_FILE), 440.0)?;
    write_tone(&data_dir.join(CHIME_FILE), 880.0)?;
    write_tone(&assets_dir.join(BUNDLED_FILE), 220.0)?;
    fs::write(data_dir.join(BROKEN_FILE), b"definitely not an mp3 stream")?;
    fs::write(dir.path().join("secret.txt"), b"outside the data directory")?;

    let scenes = json!([
        {
            "id": "forest",
            "title": "Forest Rain",
            "coverUrl": "http://127.0.0.1:8080/assets/forest.jpg",
            "layers": [
                { "name": "tone", "url": "http://127.0.0.1:8080/data/tone.wav" },
                { "name": "chime", "url": "http://localhost:8080/data/soft%20chime.wav?v=2" },
                { "name": "broken", "url": "http://127.0.0.1:8080/data/broken.mp3" }
            ]
        },
        {
            "id": "ghost",
            "title": "Missing Layer",
            "layers": [
                { "url": "http://127.0.0.1:8080/data/ghost.ogg" }
            ]
        }
    ]);
    fs::write(
        data_dir.join(format!("{}.json", SCENES_RESOURCE)),
        serde_json::to_vec_pretty(&scenes)?,
    )?;
    fs::write(
        data_dir.join(format!("{}.json", CORRUPT_RESOURCE)),
        b"{ \"unterminated\": [",
    )?;

    Ok((dir, data_dir, assets_dir))
}
