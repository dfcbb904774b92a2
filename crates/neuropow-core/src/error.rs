//! Error types for the acquisition, calibration and mining cores.
//!
//! None of these are fatal: the cores record them, broadcast them on their
//! event bus and carry on.

use std::path::PathBuf;

use thiserror::Error;

use crate::acquisition::ConnectionStatus;

/// Errors raised by the signal acquisition core.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("device not connected")]
    NotConnected,

    #[error("cannot initialize while {0}")]
    AlreadyConnected(ConnectionStatus),

    #[error("invalid signal batch: {0}")]
    InvalidSignals(String),

    #[error("invalid stimulation pattern: expected {expected} channels, got {actual}")]
    InvalidPattern { expected: usize, actual: usize },

    #[error("device initialization failed: {0}")]
    ConnectInit(String),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

/// Errors raised while reading or writing the calibration document.
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("calibration file {path} not readable: {source}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("calibration file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write calibration file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no application data directory on this platform")]
    NoDataDir,
}

/// Errors raised by the mining core.
#[derive(Error, Debug)]
pub enum MiningError {
    #[error("a mining job is already in progress")]
    AlreadyMining,

    #[error("mining job cancelled")]
    Cancelled,

    #[error("mining worker is not running")]
    WorkerUnavailable,

    #[error("invalid mining configuration: {0}")]
    Config(String),

    #[error("failed to read mining configuration: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("failed to parse mining configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}
