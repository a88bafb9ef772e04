//! Turns per-frame spectral features into a drawable curve.
//!
//! Each feature is first scaled to `[0, 1]` on its own, then the blended
//! (and truncated or padded) result is rescaled as a whole into
//! `[CURVE_FLOOR, CURVE_CEILING]`. Clients compare curves numerically, keep
//! the order of these steps.

use super::{SpectralFeatures, WaveformCurve, CURVE_CEILING, CURVE_FLOOR};

const CENTROID_WEIGHT: f64 = 0.4;
const ENERGY_WEIGHT: f64 = 0.6;

/// Value used for a feature that carries no information (max == min).
const FLAT_FEATURE_LEVEL: f64 = 0.5;

/// Tail padding for analyses that produced fewer frames than points.
const PAD_LEVEL: f64 = 0.1;

/// Value of every point when the whole curve is flat.
const FLAT_CURVE_LEVEL: f64 = 0.5;

/// Rounds to 3 decimal places.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((min, max)) => Some((min.min(v), max.max(v))),
    })
}

fn normalize_unit(values: &[f64]) -> Vec<f64> {
    match min_max(values) {
        Some((min, max)) if max > min => values.iter().map(|v| (v - min) / (max - min)).collect(),
        _ => vec![FLAT_FEATURE_LEVEL; values.len()],
    }
}

fn rescale_into_range(values: &mut [f64]) {
    match min_max(values) {
        Some((min, max)) if max > min => {
            let span = CURVE_CEILING - CURVE_FLOOR;
            for v in values.iter_mut() {
                *v = CURVE_FLOOR + span * (*v - min) / (max - min);
            }
        }
        _ => values.iter_mut().for_each(|v| *v = FLAT_CURVE_LEVEL),
    }
}

/// Blends centroid and energy into a curve of exactly `points` values.
///
/// Longer analyses are truncated to their first `points` frames (not
/// resampled); shorter ones are padded with `0.1` before the final rescale.
pub fn synthesize_curve(features: &SpectralFeatures, points: usize) -> WaveformCurve {
    let centroid = normalize_unit(&features.centroid);
    let energy = normalize_unit(&features.mel_energy);

    let mut curve: Vec<f64> = centroid
        .iter()
        .zip(energy.iter())
        .map(|(c, e)| CENTROID_WEIGHT * c + ENERGY_WEIGHT * e)
        .collect();

    curve.truncate(points);
    curve.resize(points, PAD_LEVEL);
    rescale_into_range(&mut curve);

    curve.into_iter().map(round3).collect()
}
