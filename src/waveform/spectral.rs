//! Short-time spectral analysis of a mono signal.
//!
//! Frames are centered on `frame * hop` (the signal is zero-padded by half a
//! window on both sides), windowed with a periodic Hann window and transformed
//! with a real-valued FFT. Two per-frame features come out of it:
//!
//! - the spectral centroid in Hz, from the magnitude spectrum
//! - the mean mel-band energy in dB, from a Slaney-style mel filterbank
//!   applied to the power spectrum

use std::f64::consts::PI;

use rustfft::{num_complex::Complex, FftPlanner};
use thiserror::Error;

use super::AnalysisParams;

/// Power floor before converting to dB.
const AMIN: f64 = 1e-10;

/// Dynamic range kept below the loudest mel cell of the spectrogram.
const TOP_DB: f64 = 80.0;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Cannot analyze an empty signal")]
    EmptySignal,

    #[error("Invalid analysis parameters: {0}")]
    InvalidParams(&'static str),

    #[error("Spectral features contain non-finite values")]
    NonFinite,
}

/// Per-frame features, both vectors have one entry per frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectralFeatures {
    pub centroid: Vec<f64>,
    pub mel_energy: Vec<f64>,
}

impl SpectralFeatures {
    pub fn frame_count(&self) -> usize {
        self.centroid.len()
    }
}

/// Hop size targeting roughly `points` frames over `total_samples`.
pub fn hop_length(total_samples: usize, points: usize) -> usize {
    (total_samples / points.max(1)).max(1)
}

/// Number of centered frames produced for a signal.
fn frame_count(total_samples: usize, hop: usize) -> usize {
    1 + total_samples / hop
}

fn hann_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / size as f64).cos())
        .collect()
}

const MEL_F_SP: f64 = 200.0 / 3.0;
const MEL_MIN_LOG_HZ: f64 = 1000.0;
const MEL_MIN_LOG_MEL: f64 = MEL_MIN_LOG_HZ / MEL_F_SP;

fn mel_log_step() -> f64 {
    6.4f64.ln() / 27.0
}

fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MEL_MIN_LOG_HZ {
        MEL_MIN_LOG_MEL + (hz / MEL_MIN_LOG_HZ).ln() / mel_log_step()
    } else {
        hz / MEL_F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MEL_MIN_LOG_MEL {
        MEL_MIN_LOG_HZ * (mel_log_step() * (mel - MEL_MIN_LOG_MEL)).exp()
    } else {
        MEL_F_SP * mel
    }
}

/// Triangular filters between 0 Hz and Nyquist, area-normalized.
fn mel_filterbank(n_bands: usize, n_fft: usize, sample_rate: f64) -> Vec<Vec<f64>> {
    let n_bins = n_fft / 2 + 1;
    let nyquist = sample_rate / 2.0;

    let bin_freqs: Vec<f64> = (0..n_bins)
        .map(|k| k as f64 * sample_rate / n_fft as f64)
        .collect();

    let mel_max = hz_to_mel(nyquist);
    let edges: Vec<f64> = (0..n_bands + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (n_bands + 1) as f64))
        .collect();

    (0..n_bands)
        .map(|band| {
            let (left, center, right) = (edges[band], edges[band + 1], edges[band + 2]);
            let norm = 2.0 / (right - left);
            bin_freqs
                .iter()
                .map(|&f| {
                    let rising = (f - left) / (center - left);
                    let falling = (right - f) / (right - center);
                    rising.min(falling).max(0.0) * norm
                })
                .collect()
        })
        .collect()
}

/// Computes centroid and mel energy for every frame of `samples`.
///
/// `samples` must already be mono at `params.sample_rate`.
pub fn analyze(samples: &[f32], params: &AnalysisParams) -> Result<SpectralFeatures, AnalysisError> {
    if samples.is_empty() {
        return Err(AnalysisError::EmptySignal);
    }
    if samples.iter().any(|s| !s.is_finite()) {
        return Err(AnalysisError::NonFinite);
    }
    if params.fft_size < 2 {
        return Err(AnalysisError::InvalidParams("fft size must be at least 2"));
    }
    if params.mel_bands == 0 {
        return Err(AnalysisError::InvalidParams("mel band count must be positive"));
    }
    if params.sample_rate == 0 {
        return Err(AnalysisError::InvalidParams("sample rate must be positive"));
    }

    let n_fft = params.fft_size;
    let n_bins = n_fft / 2 + 1;
    let sample_rate = params.sample_rate as f64;
    let hop = hop_length(samples.len(), params.points);
    let frames = frame_count(samples.len(), hop);
    let pad = (n_fft / 2) as isize;

    let window = hann_window(n_fft);
    let filterbank = mel_filterbank(params.mel_bands, n_fft, sample_rate);

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];
    let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
    let mut power = vec![0.0f64; n_bins];

    let mut centroid = Vec::with_capacity(frames);
    let mut mel_db: Vec<Vec<f64>> = Vec::with_capacity(frames);

    for frame in 0..frames {
        let start = (frame * hop) as isize - pad;
        for (i, slot) in buffer.iter_mut().enumerate() {
            let idx = start + i as isize;
            let sample = if idx >= 0 && (idx as usize) < samples.len() {
                samples[idx as usize] as f64
            } else {
                0.0
            };
            *slot = Complex::new(sample * window[i], 0.0);
        }
        fft.process_with_scratch(&mut buffer, &mut scratch);

        let mut weighted = 0.0;
        let mut total = 0.0;
        for (k, bin) in buffer[..n_bins].iter().enumerate() {
            let magnitude = bin.norm();
            weighted += k as f64 * sample_rate / n_fft as f64 * magnitude;
            total += magnitude;
            power[k] = bin.norm_sqr();
        }
        centroid.push(if total > 0.0 { weighted / total } else { 0.0 });

        let bands = filterbank
            .iter()
            .map(|filter| {
                let energy: f64 = filter.iter().zip(power.iter()).map(|(w, p)| w * p).sum();
                10.0 * energy.max(AMIN).log10()
            })
            .collect();
        mel_db.push(bands);
    }

    let peak = mel_db
        .iter()
        .flatten()
        .fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    let floor = peak - TOP_DB;
    let mel_energy: Vec<f64> = mel_db
        .iter()
        .map(|bands| bands.iter().map(|v| v.max(floor)).sum::<f64>() / bands.len() as f64)
        .collect();

    if centroid
        .iter()
        .chain(mel_energy.iter())
        .any(|v| !v.is_finite())
    {
        return Err(AnalysisError::NonFinite);
    }

    Ok(SpectralFeatures {
        centroid,
        mel_energy,
    })
}
