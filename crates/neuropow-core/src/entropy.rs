//! Entropy and structure measures over electrode sample batches.
//!
//! These operate on `f64` batches rather than bytes: the Shannon estimate
//! histograms the batch into 256 equal-width bins spanning `[min, max]`.

use serde::Serialize;

/// Number of histogram bins used by [`shannon_entropy`].
pub const ENTROPY_BINS: usize = 256;

/// Shannon entropy in bits of a batch histogrammed into 256 bins over `[min, max]`.
///
/// Empty and constant batches score 0.
pub fn shannon_entropy(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let (min, max) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        });
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return 0.0;
    }

    let mut counts = [0u64; ENTROPY_BINS];
    for &x in samples {
        let bin = ((x - min) / range * ENTROPY_BINS as f64) as usize;
        counts[bin.min(ENTROPY_BINS - 1)] += 1;
    }

    let n = samples.len() as f64;
    let mut h = 0.0;
    for &c in &counts {
        if c > 0 {
            let p = c as f64 / n;
            h -= p * p.log2();
        }
    }
    h
}

/// Indices of the `k` electrodes with the largest `|sample|`, strongest first.
pub fn best_electrodes(samples: &[f64], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..samples.len()).collect();
    indices.sort_by(|&a, &b| samples[b].abs().total_cmp(&samples[a].abs()));
    indices.truncate(k);
    indices
}

/// Mean of `s[i] * s[j]` over every pair `i < j`. Batches shorter than 2 score 0.
pub fn autocorrelation_score(samples: &[f64]) -> f64 {
    let n = samples.len();
    if n < 2 {
        return 0.0;
    }
    // Σ_{i<j} s_i s_j = ((Σ s)^2 - Σ s^2) / 2
    let sum: f64 = samples.iter().sum();
    let sum_sq: f64 = samples.iter().map(|x| x * x).sum();
    let pairs = (n * (n - 1) / 2) as f64;
    (sum * sum - sum_sq) / 2.0 / pairs
}

/// Summary statistics of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalStatistics {
    pub mean: f64,
    /// Population variance.
    pub variance: f64,
    pub min: f64,
    pub max: f64,
}

/// Mean, population variance and range of a batch. `None` for an empty batch.
pub fn signal_statistics(samples: &[f64]) -> Option<SignalStatistics> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let (min, max) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        });
    Some(SignalStatistics {
        mean,
        variance,
        min,
        max,
    })
}

/// `max(0, 1 - variance)`, clamped to `[0, 1]`. Empty batch ⇒ 0.
pub fn signal_quality(samples: &[f64]) -> f64 {
    match signal_statistics(samples) {
        Some(stats) if stats.variance.is_finite() => (1.0 - stats.variance).clamp(0.0, 1.0),
        _ => 0.0,
    }
}
