//! Abstract signal source trait and the simulated electrode array.
//!
//! Every electrode array implements the [`SignalSource`] trait, which provides
//! metadata via [`SourceInfo`], connection handling, raw sample collection and
//! stimulation output. The acquisition core applies calibration and validation
//! on top; sources only produce raw samples.

use std::f64::consts::PI;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::calibration::StimulationParameters;
use crate::error::AcquisitionError;

/// Number of electrodes on the array. Every validated batch has this length.
pub const ELECTRODE_COUNT: usize = 60;

/// What backs a signal source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Synthesized samples.
    Simulated,
    /// A physical multi-electrode array behind a device driver.
    Hardware,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simulated => write!(f, "simulated"),
            Self::Hardware => write!(f, "hardware"),
        }
    }
}

/// Metadata about a signal source.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    /// Unique identifier (e.g. `"simulated_mea"`).
    pub name: &'static str,
    /// One-line human-readable description.
    pub description: &'static str,
    pub kind: SourceKind,
    /// Channels produced per batch.
    pub electrode_count: usize,
}

/// Trait that every electrode array must implement.
pub trait SignalSource: Send + Sync {
    /// Source metadata.
    fn info(&self) -> &SourceInfo;

    /// Open the device. May block briefly.
    fn connect(&self) -> Result<(), AcquisitionError>;

    /// Release the device.
    fn disconnect(&self) {}

    /// Collect one raw, uncalibrated batch of `electrode_count` samples.
    fn sample(&self) -> Vec<f64>;

    /// Drive a stimulation pattern onto the electrodes.
    fn stimulate(
        &self,
        pattern: &[f64],
        params: &StimulationParameters,
    ) -> Result<(), AcquisitionError>;

    /// Convenience: name from info.
    fn name(&self) -> &'static str {
        self.info().name
    }
}

// ---------------------------------------------------------------------------
// Simulated array
// ---------------------------------------------------------------------------

/// Stand-in for a physical array: uniform noise plus a 10 Hz tone and
/// occasional doubled-amplitude artefacts.
pub struct SimulatedArray {
    info: SourceInfo,
    connect_delay: Duration,
}

impl SimulatedArray {
    /// Default simulated connect latency.
    pub const DEFAULT_CONNECT_DELAY: Duration = Duration::from_millis(100);

    pub fn new() -> Self {
        Self::with_connect_delay(Self::DEFAULT_CONNECT_DELAY)
    }

    /// Simulated array with an explicit connect latency (capped at 500 ms).
    pub fn with_connect_delay(delay: Duration) -> Self {
        Self {
            info: SourceInfo {
                name: "simulated_mea",
                description: "Synthetic 60-channel MEA: noise + 10 Hz neural tone + 5% artefacts",
                kind: SourceKind::Simulated,
                electrode_count: ELECTRODE_COUNT,
            },
            connect_delay: delay.min(Duration::from_millis(500)),
        }
    }
}

impl Default for SimulatedArray {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings for the simulated array. Partial JSON documents are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Fixed at [`ELECTRODE_COUNT`]; anything else is rejected by `build`.
    pub electrode_count: usize,
    pub connect_delay_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            electrode_count: ELECTRODE_COUNT,
            connect_delay_ms: SimulatedArray::DEFAULT_CONNECT_DELAY.as_millis() as u64,
        }
    }
}

impl AcquisitionConfig {
    /// Build the simulated array this config describes.
    pub fn build(&self) -> Result<SimulatedArray, AcquisitionError> {
        if self.electrode_count != ELECTRODE_COUNT {
            return Err(AcquisitionError::ConnectInit(format!(
                "array has {ELECTRODE_COUNT} electrodes, config asks for {}",
                self.electrode_count
            )));
        }
        Ok(SimulatedArray::with_connect_delay(Duration::from_millis(
            self.connect_delay_ms,
        )))
    }
}

impl SignalSource for SimulatedArray {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn connect(&self) -> Result<(), AcquisitionError> {
        if !self.connect_delay.is_zero() {
            std::thread::sleep(self.connect_delay);
        }
        Ok(())
    }

    fn sample(&self) -> Vec<f64> {
        let t = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        let mut rng = rand::rng();
        (0..self.info.electrode_count)
            .map(|i| {
                let base = rng.random::<f64>() - 0.5;
                let bio = 0.1 * (2.0 * PI * 10.0 * t + 0.1 * i as f64).sin();
                let spike = if rng.random::<f64>() < 0.05 { 2.0 } else { 1.0 };
                (base + bio) * spike
            })
            .collect()
    }

    fn stimulate(
        &self,
        pattern: &[f64],
        params: &StimulationParameters,
    ) -> Result<(), AcquisitionError> {
        log::debug!(
            "simulated stimulation: {} channels, {:.2} V, {:.1} ms, {:.1} Hz",
            pattern.len(),
            params.amplitude,
            params.duration_ms,
            params.frequency_hz
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_batch_shape() {
        let src = SimulatedArray::with_connect_delay(Duration::ZERO);
        let batch = src.sample();
        assert_eq!(batch.len(), ELECTRODE_COUNT);
        // |base + bio| <= 0.6, doubled by an artefact at most.
        assert!(batch.iter().all(|x| x.is_finite() && x.abs() <= 1.2));
    }

    #[test]
    fn test_simulated_batches_vary() {
        let src = SimulatedArray::with_connect_delay(Duration::ZERO);
        assert_ne!(src.sample(), src.sample());
    }

    #[test]
    fn test_connect_delay_is_capped() {
        let src = SimulatedArray::with_connect_delay(Duration::from_secs(10));
        assert_eq!(src.connect_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_source_info() {
        let src = SimulatedArray::default();
        assert_eq!(src.name(), "simulated_mea");
        assert_eq!(src.info().kind, SourceKind::Simulated);
        assert_eq!(src.info().kind.to_string(), "simulated");
        assert!(src.connect().is_ok());
    }

    #[test]
    fn test_acquisition_config_partial_json() {
        let cfg: AcquisitionConfig = serde_json::from_str(r#"{"connect_delay_ms": 0}"#).unwrap();
        assert_eq!(cfg.electrode_count, ELECTRODE_COUNT);
        assert_eq!(cfg.build().unwrap().connect_delay, Duration::ZERO);
    }

    #[test]
    fn test_acquisition_config_rejects_other_geometry() {
        let cfg = AcquisitionConfig {
            electrode_count: 64,
            ..AcquisitionConfig::default()
        };
        assert!(matches!(cfg.build(), Err(AcquisitionError::ConnectInit(_))));
        assert_eq!(AcquisitionConfig::default().connect_delay_ms, 100);
    }
}
