//! # neuropow-core
//!
//! **Electrode noise as a proof-of-work seed.**
//!
//! `neuropow-core` pairs two cores. The signal acquisition core drives a
//! 60-electrode multi-electrode array (simulated by default): lifecycle,
//! calibrated and validated reads, stimulation, calibration persistence and a
//! periodic acquisition tick. The mining core turns each sample batch into a
//! nonce stream, searches for a double-SHA-256 hash below a 64-bit difficulty
//! and tunes that difficulty from its own solve history.
//!
//! ## Quick Start
//!
//! ```no_run
//! use neuropow_core::{MiningConfig, SignalAcquisition, SignalMiner};
//!
//! let acquisition = SignalAcquisition::simulated();
//! acquisition.initialize(None).unwrap();
//! let batch = acquisition.read_signals().unwrap();
//!
//! let miner = SignalMiner::new(MiningConfig::default()).unwrap();
//! let result = miner.mine(&batch).unwrap();
//! println!("success={} after {} attempts", result.success, result.attempts);
//! ```
//!
//! ## Architecture
//!
//! Source → Acquisition (gain, validation, events) → Mining (nonce, hash,
//! difficulty check) → Stats → Difficulty controller
//!
//! Every electrode array implements the [`SignalSource`] trait. Both cores
//! broadcast their events on an [`EventBus`]; [`link::follow_acquisition`]
//! connects the acquisition batch stream to continuous mining.

pub mod acquisition;
pub mod calibration;
pub mod clock;
pub mod difficulty;
pub mod entropy;
pub mod error;
pub mod events;
pub mod hash;
pub mod link;
pub mod mining;
pub mod nonce;
pub mod source;
pub mod worker;

pub use acquisition::{
    AcquisitionEvent, AcquisitionStats, ConnectionStatus, MAX_SAMPLE_MAGNITUDE, SignalAcquisition,
    validate_batch,
};
pub use calibration::{
    CalibrationDocument, CalibrationState, MAX_CALIBRATION, MIN_CALIBRATION,
    StimulationParameters, default_calibration_path,
};
pub use difficulty::{DEFAULT_DIFFICULTY, DifficultyController, MAX_DIFFICULTY, MIN_DIFFICULTY};
pub use entropy::{
    SignalStatistics, autocorrelation_score, best_electrodes, shannon_entropy, signal_quality,
    signal_statistics,
};
pub use error::{AcquisitionError, CalibrationError, MiningError};
pub use events::EventBus;
pub use hash::{double_sha256, double_sha256_hex, meets_difficulty};
pub use mining::{
    DEFAULT_MAX_ATTEMPTS, MAX_RESULT_HISTORY, MiningConfig, MiningEvent, MiningResult,
    MiningStats, PROGRESS_INTERVAL, SignalMiner,
};
pub use nonce::{derive_nonce, derive_nonce_at};
pub use source::{
    AcquisitionConfig, ELECTRODE_COUNT, SignalSource, SimulatedArray, SourceInfo, SourceKind,
};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
