//! Signal → nonce derivation.
//!
//! A batch is folded into two sums, one plain and one weighted by a slow sine
//! across electrode index. Their scaled product is mixed with the low 32 bits
//! of wall-clock milliseconds and the attempt counter.

use std::time::{SystemTime, UNIX_EPOCH};

/// Low 32 bits of the current wall-clock time in milliseconds.
pub fn wall_time_component() -> u64 {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    (ms as u64) & 0xFFFF_FFFF
}

/// Derive a nonce from `samples` and `seed` using the current wall clock.
///
/// An empty batch yields a uniformly random nonce.
pub fn derive_nonce(samples: &[f64], seed: u64, signal_weight: f64) -> u32 {
    if samples.is_empty() {
        return rand::random::<u64>() as u32;
    }
    derive_nonce_at(samples, seed, signal_weight, wall_time_component())
}

/// Deterministic nonce derivation with an explicit time component.
///
/// Non-finite intermediate values collapse the signal term to 0.
pub fn derive_nonce_at(samples: &[f64], seed: u64, signal_weight: f64, time_comp: u64) -> u32 {
    let signal_sum: f64 = samples.iter().sum();
    let weighted_sum: f64 = samples
        .iter()
        .enumerate()
        .map(|(i, &s)| s * (1.0 + (0.1 * i as f64).sin() * signal_weight))
        .sum();

    // `as` saturates on overflow and maps NaN to 0.
    let base = (signal_sum * weighted_sum * 1e6).abs() as u64;
    ((base ^ (time_comp & 0xFFFF_FFFF) ^ seed) & 0xFFFF_FFFF) as u32
}
