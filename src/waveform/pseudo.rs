use sha2::{Digest, Sha256};

use super::{round3, WaveformCurve, CURVE_CEILING, CURVE_FLOOR};

/// Remainder of the digest, read as a big-endian unsigned integer, by `modulus`.
fn digest_mod(digest: &[u8], modulus: u64) -> u64 {
    digest
        .iter()
        .fold(0u64, |acc, &byte| (acc * 256 + byte as u64) % modulus)
}

/// Deterministic stand-in curve derived from an asset name.
///
/// Same name and length always give the same curve, across restarts and
/// across machines.
pub fn pseudo_waveform(name: &str, points: usize) -> WaveformCurve {
    let digest = Sha256::digest(name.as_bytes());
    let phase_a = digest_mod(&digest, 10) as f64;
    let phase_b = digest_mod(&digest, 7) as f64;
    let phase_c = digest_mod(&digest, 13) as f64;

    (0..points)
        .map(|i| {
            let x = i as f64;
            let value = 0.3 * (0.1 * x + phase_a).sin()
                + 0.2 * (0.25 * x + phase_b).sin()
                + 0.4 * (0.05 * x + phase_c).sin()
                + 0.5;
            round3(value.clamp(CURVE_FLOOR, CURVE_CEILING))
        })
        .collect()
}
