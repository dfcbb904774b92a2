//! Calibration state and its persisted JSON document.
//!
//! # Storage Format
//!
//! One JSON object with five flat fields:
//!
//! ```text
//! {
//!   "calibration_factor": 1.0,
//!   "stim_amplitude": 1.0,
//!   "stim_duration": 100.0,
//!   "stim_frequency": 50.0,
//!   "timestamp": "2026-02-15T01:30:00Z"
//! }
//! ```
//!
//! The loader tolerates missing fields (the current value is kept) and clamps
//! every loaded value into its bounds. Writes go through a temp file in the
//! target directory and are persisted with an atomic rename.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::clock::now_iso8601;
use crate::error::CalibrationError;

pub const MIN_CALIBRATION: f64 = 0.1;
pub const MAX_CALIBRATION: f64 = 5.0;

pub const MIN_STIM_AMPLITUDE: f64 = 0.1;
pub const MAX_STIM_AMPLITUDE: f64 = 10.0;
pub const MIN_STIM_DURATION_MS: f64 = 1.0;
pub const MAX_STIM_DURATION_MS: f64 = 1000.0;
pub const MIN_STIM_FREQUENCY_HZ: f64 = 1.0;
pub const MAX_STIM_FREQUENCY_HZ: f64 = 1000.0;

/// File name used under the application data directory.
pub const CALIBRATION_FILE_NAME: &str = "calibration.json";

/// Clamp `value` into `[lo, hi]`, falling back to `fallback` when it is not finite.
fn clamp_finite(value: f64, lo: f64, hi: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        fallback
    }
}

// ---------------------------------------------------------------------------
// Stimulation parameters
// ---------------------------------------------------------------------------

/// Stimulation amplitude (V), pulse duration (ms) and pulse frequency (Hz).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StimulationParameters {
    pub amplitude: f64,
    pub duration_ms: f64,
    pub frequency_hz: f64,
}

impl Default for StimulationParameters {
    fn default() -> Self {
        Self {
            amplitude: 1.0,
            duration_ms: 100.0,
            frequency_hz: 50.0,
        }
    }
}

impl StimulationParameters {
    /// Build parameters, silently clamping each into its bounds.
    /// Non-finite inputs fall back to the defaults.
    pub fn clamped(amplitude: f64, duration_ms: f64, frequency_hz: f64) -> Self {
        let d = Self::default();
        Self {
            amplitude: clamp_finite(amplitude, MIN_STIM_AMPLITUDE, MAX_STIM_AMPLITUDE, d.amplitude),
            duration_ms: clamp_finite(
                duration_ms,
                MIN_STIM_DURATION_MS,
                MAX_STIM_DURATION_MS,
                d.duration_ms,
            ),
            frequency_hz: clamp_finite(
                frequency_hz,
                MIN_STIM_FREQUENCY_HZ,
                MAX_STIM_FREQUENCY_HZ,
                d.frequency_hz,
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Calibration state
// ---------------------------------------------------------------------------

/// Gain and stimulation settings of one acquisition core.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationState {
    pub calibration_factor: f64,
    pub stimulation: StimulationParameters,
    /// ISO-8601 time of the last change.
    pub timestamp: String,
}

impl Default for CalibrationState {
    fn default() -> Self {
        Self {
            calibration_factor: 1.0,
            stimulation: StimulationParameters::default(),
            timestamp: now_iso8601(),
        }
    }
}

impl CalibrationState {
    /// Multiply the factor by `factor`, clamped to `[0.1, 5.0]`. Returns the new value.
    pub fn adjust(&mut self, factor: f64) -> f64 {
        self.calibration_factor = clamp_finite(
            self.calibration_factor * factor,
            MIN_CALIBRATION,
            MAX_CALIBRATION,
            self.calibration_factor,
        );
        self.timestamp = now_iso8601();
        self.calibration_factor
    }

    /// Restore the unity gain.
    pub fn reset(&mut self) {
        self.calibration_factor = 1.0;
        self.timestamp = now_iso8601();
    }

    pub fn set_stimulation(&mut self, amplitude: f64, duration_ms: f64, frequency_hz: f64) {
        self.stimulation = StimulationParameters::clamped(amplitude, duration_ms, frequency_hz);
        self.timestamp = now_iso8601();
    }

    /// Snapshot as the persisted document, every field present.
    pub fn to_document(&self) -> CalibrationDocument {
        CalibrationDocument {
            calibration_factor: Some(self.calibration_factor),
            stim_amplitude: Some(self.stimulation.amplitude),
            stim_duration: Some(self.stimulation.duration_ms),
            stim_frequency: Some(self.stimulation.frequency_hz),
            timestamp: Some(self.timestamp.clone()),
        }
    }

    /// Overwrite whichever fields the document carries, clamped into bounds.
    pub fn apply_document(&mut self, doc: &CalibrationDocument) {
        if let Some(f) = doc.calibration_factor {
            self.calibration_factor =
                clamp_finite(f, MIN_CALIBRATION, MAX_CALIBRATION, self.calibration_factor);
        }
        let s = self.stimulation;
        self.stimulation = StimulationParameters::clamped(
            doc.stim_amplitude.unwrap_or(s.amplitude),
            doc.stim_duration.unwrap_or(s.duration_ms),
            doc.stim_frequency.unwrap_or(s.frequency_hz),
        );
        if let Some(ts) = &doc.timestamp {
            self.timestamp = ts.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted document
// ---------------------------------------------------------------------------

/// On-disk calibration document. Every field is optional on read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stim_amplitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stim_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stim_frequency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl CalibrationDocument {
    /// Read and parse a document. I/O failures map to `NotFound`, parse failures to `Corrupt`.
    pub fn read(path: &Path) -> Result<Self, CalibrationError> {
        let text = fs::read_to_string(path).map_err(|source| CalibrationError::NotFound {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| CalibrationError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the document atomically, creating parent directories as needed.
    pub fn write(&self, path: &Path) -> Result<(), CalibrationError> {
        let write_err = |source: std::io::Error| CalibrationError::Write {
            path: path.to_path_buf(),
            source,
        };
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| write_err(std::io::Error::other(e)))?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(write_err)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

/// `<data dir>/neuropow/calibration.json` for the current platform.
pub fn default_calibration_path() -> Result<PathBuf, CalibrationError> {
    dirs::data_dir()
        .map(|d| d.join("neuropow").join(CALIBRATION_FILE_NAME))
        .ok_or(CalibrationError::NoDataDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Clamping
    // -----------------------------------------------------------------------

    #[test]
    fn test_adjust_clamp_sequence() {
        let mut cal = CalibrationState::default();
        let values: Vec<f64> = (0..4).map(|_| cal.adjust(2.0)).collect();
        assert_eq!(values, vec![2.0, 4.0, 5.0, 5.0]);
    }

    #[test]
    fn test_adjust_bounds() {
        let mut cal = CalibrationState::default();
        assert_eq!(cal.adjust(10.0), MAX_CALIBRATION);
        cal.reset();
        assert_eq!(cal.adjust(0.01), MIN_CALIBRATION);
    }

    #[test]
    fn test_adjust_non_finite_keeps_value() {
        let mut cal = CalibrationState::default();
        cal.adjust(2.0);
        assert_eq!(cal.adjust(f64::NAN), 2.0);
        assert_eq!(cal.adjust(f64::INFINITY), 2.0);
    }

    #[test]
    fn test_stimulation_clamped() {
        let p = StimulationParameters::clamped(50.0, 0.0, 5000.0);
        assert_eq!(p.amplitude, MAX_STIM_AMPLITUDE);
        assert_eq!(p.duration_ms, MIN_STIM_DURATION_MS);
        assert_eq!(p.frequency_hz, MAX_STIM_FREQUENCY_HZ);

        let q = StimulationParameters::clamped(f64::NAN, 200.0, 60.0);
        assert_eq!(q.amplitude, 1.0);
        assert_eq!(q.duration_ms, 200.0);
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    #[test]
    fn test_document_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("cal.json");

        let mut cal = CalibrationState::default();
        cal.adjust(2.5);
        cal.set_stimulation(3.0, 200.0, 60.0);
        cal.to_document().write(&path).unwrap();

        let mut restored = CalibrationState::default();
        restored.apply_document(&CalibrationDocument::read(&path).unwrap());
        assert_eq!(restored, cal);
    }

    #[test]
    fn test_document_missing_fields_keep_current() {
        let doc: CalibrationDocument =
            serde_json::from_str(r#"{"stim_frequency": 120.0}"#).unwrap();
        let mut cal = CalibrationState::default();
        cal.adjust(3.0);
        cal.apply_document(&doc);
        assert_eq!(cal.calibration_factor, 3.0);
        assert_eq!(cal.stimulation.frequency_hz, 120.0);
        assert_eq!(cal.stimulation.amplitude, 1.0);
    }

    #[test]
    fn test_document_out_of_range_values_clamped() {
        let doc: CalibrationDocument =
            serde_json::from_str(r#"{"calibration_factor": 99.0, "stim_amplitude": -4}"#).unwrap();
        let mut cal = CalibrationState::default();
        cal.apply_document(&doc);
        assert_eq!(cal.calibration_factor, MAX_CALIBRATION);
        assert_eq!(cal.stimulation.amplitude, MIN_STIM_AMPLITUDE);
    }

    #[test]
    fn test_read_missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = CalibrationDocument::read(&tmp.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, CalibrationError::NotFound { .. }));
    }

    #[test]
    fn test_read_garbage_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        let err = CalibrationDocument::read(&path).unwrap_err();
        assert!(matches!(err, CalibrationError::Corrupt { .. }));
    }

    #[test]
    fn test_written_document_has_five_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cal.json");
        CalibrationState::default().to_document().write(&path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "calibration_factor",
            "stim_amplitude",
            "stim_duration",
            "stim_frequency",
            "timestamp",
        ] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(obj.len(), 5);
    }

    #[test]
    fn test_default_path_file_name() {
        if let Ok(path) = default_calibration_path() {
            assert!(path.ends_with("neuropow/calibration.json"));
        }
    }
}
