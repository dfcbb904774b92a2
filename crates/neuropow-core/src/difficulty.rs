//! Difficulty bounds and the adaptive difficulty controller.
//!
//! Difficulty is a 64-bit threshold on the leading 64 bits of a hash. The
//! controller looks at the recent result history and recommends a scale
//! factor that steers the average solve time and success rate toward their
//! targets.

use crate::mining::MiningResult;

pub const MIN_DIFFICULTY: u64 = 0x0000_00FF_FFFF_FFFF;
pub const MAX_DIFFICULTY: u64 = 0xFFFF_FFFF_FFFF_FFFF;
pub const DEFAULT_DIFFICULTY: u64 = 0x0000_FFFF_FFFF_FFFF;

/// Results required before the controller makes any recommendation.
pub const ADAPTIVE_MIN_SAMPLES: usize = 10;
pub const TARGET_SOLVE_TIME_SECS: f64 = 10.0;
pub const TARGET_SUCCESS_RATE: f64 = 0.10;

/// Factor applied when results come in fast and successful.
pub const RAISE_FACTOR: f64 = 1.1;
/// Factor applied when results are slow or mostly unsuccessful.
pub const LOWER_FACTOR: f64 = 0.9;

/// Clamp into `[MIN_DIFFICULTY, MAX_DIFFICULTY]`.
pub fn clamp_difficulty(difficulty: u64) -> u64 {
    difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

/// `clamp(round(difficulty * factor))`. Non-finite factors leave it unchanged.
pub fn scale_difficulty(difficulty: u64, factor: f64) -> u64 {
    if !factor.is_finite() {
        return clamp_difficulty(difficulty);
    }
    let scaled = (difficulty as f64 * factor).round();
    if scaled >= MAX_DIFFICULTY as f64 {
        MAX_DIFFICULTY
    } else if scaled <= MIN_DIFFICULTY as f64 {
        MIN_DIFFICULTY
    } else {
        scaled as u64
    }
}

/// Averages over a result window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSummary {
    pub samples: usize,
    pub avg_time: f64,
    pub avg_success_rate: f64,
}

impl WindowSummary {
    pub fn from_results<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = &'a MiningResult>,
    {
        let (mut samples, mut time, mut successes) = (0usize, 0.0f64, 0usize);
        for r in results {
            samples += 1;
            time += r.compute_time;
            successes += usize::from(r.success);
        }
        if samples == 0 {
            return Self {
                samples,
                avg_time: 0.0,
                avg_success_rate: 0.0,
            };
        }
        Self {
            samples,
            avg_time: time / samples as f64,
            avg_success_rate: successes as f64 / samples as f64,
        }
    }
}

/// Bounded proportional controller over the recent result window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifficultyController {
    pub target_time: f64,
    pub target_success: f64,
    pub min_samples: usize,
}

impl Default for DifficultyController {
    fn default() -> Self {
        Self {
            target_time: TARGET_SOLVE_TIME_SECS,
            target_success: TARGET_SUCCESS_RATE,
            min_samples: ADAPTIVE_MIN_SAMPLES,
        }
    }
}

impl DifficultyController {
    /// Scale factor to apply, or `None` to leave difficulty alone.
    ///
    /// - fast (< half target time) and successful (> 1.5x target rate): 1.1
    /// - slow (> twice target time) or starved (< half target rate): 0.9
    pub fn recommend(&self, summary: &WindowSummary) -> Option<f64> {
        if summary.samples < self.min_samples {
            return None;
        }
        if summary.avg_time < 0.5 * self.target_time
            && summary.avg_success_rate > 1.5 * self.target_success
        {
            Some(RAISE_FACTOR)
        } else if summary.avg_time > 2.0 * self.target_time
            || summary.avg_success_rate < 0.5 * self.target_success
        {
            Some(LOWER_FACTOR)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(compute_time: f64, success: bool) -> MiningResult {
        MiningResult {
            success,
            compute_time,
            attempts: 1,
            ..MiningResult::idle()
        }
    }

    fn summary(results: &[MiningResult]) -> WindowSummary {
        WindowSummary::from_results(results)
    }

    // -----------------------------------------------------------------------
    // Scaling
    // -----------------------------------------------------------------------

    #[test]
    fn test_scale_difficulty_rounds() {
        assert_eq!(scale_difficulty(MIN_DIFFICULTY * 2, 1.5), MIN_DIFFICULTY * 3);
    }

    #[test]
    fn test_scale_difficulty_clamps() {
        assert_eq!(scale_difficulty(MIN_DIFFICULTY, 0.9), MIN_DIFFICULTY);
        assert_eq!(scale_difficulty(MAX_DIFFICULTY, 1.1), MAX_DIFFICULTY);
        assert_eq!(scale_difficulty(MAX_DIFFICULTY - 5, 1.0), MAX_DIFFICULTY);
        assert_eq!(scale_difficulty(DEFAULT_DIFFICULTY, f64::NAN), DEFAULT_DIFFICULTY);
        assert_eq!(scale_difficulty(0, 1.0), MIN_DIFFICULTY);
    }

    #[test]
    fn test_clamp_difficulty() {
        assert_eq!(clamp_difficulty(0), MIN_DIFFICULTY);
        assert_eq!(clamp_difficulty(DEFAULT_DIFFICULTY), DEFAULT_DIFFICULTY);
    }

    // -----------------------------------------------------------------------
    // Controller
    // -----------------------------------------------------------------------

    #[test]
    fn test_needs_min_samples() {
        let c = DifficultyController::default();
        let nine = vec![result(1.0, true); 9];
        assert_eq!(c.recommend(&summary(&nine)), None);
        let ten = vec![result(1.0, true); 10];
        assert_eq!(c.recommend(&summary(&ten)), Some(RAISE_FACTOR));
    }

    #[test]
    fn test_slow_results_lower() {
        let c = DifficultyController::default();
        let slow = vec![result(25.0, true); 10];
        assert_eq!(c.recommend(&summary(&slow)), Some(LOWER_FACTOR));
    }

    #[test]
    fn test_starved_results_lower() {
        let c = DifficultyController::default();
        let starved = vec![result(8.0, false); 12];
        assert_eq!(c.recommend(&summary(&starved)), Some(LOWER_FACTOR));
    }

    #[test]
    fn test_on_target_holds() {
        let c = DifficultyController::default();
        let mut window = vec![result(10.0, false); 9];
        window.push(result(10.0, true));
        assert_eq!(c.recommend(&summary(&window)), None);
    }

    #[test]
    fn test_fast_but_unsuccessful_lowers() {
        let c = DifficultyController::default();
        let window = vec![result(0.1, false); 10];
        assert_eq!(c.recommend(&summary(&window)), Some(LOWER_FACTOR));
    }

    #[test]
    fn test_window_summary() {
        let s = summary(&[result(1.0, true), result(3.0, false)]);
        assert_eq!(s.samples, 2);
        assert_eq!(s.avg_time, 2.0);
        assert_eq!(s.avg_success_rate, 0.5);
        assert_eq!(summary(&[]).samples, 0);
    }
}
