//! Signal acquisition core: lifecycle, calibrated reads, stimulation and
//! calibration persistence over a [`SignalSource`].
//!
//! Architecture:
//! 1. A single mutex guards all mutable state (status, calibration, last
//!    batch, last error, counters)
//! 2. Every public operation takes that mutex; the periodic tick takes it
//!    around each read
//! 3. Raw source samples are multiplied by the calibration factor, then
//!    validated; invalid batches are dropped and never cached
//! 4. Errors are returned, recorded as `last_error` and broadcast as
//!    [`AcquisitionEvent::ErrorOccurred`]
//!
//! ```text
//! Disconnected ──initialize──▶ Connecting ──ok──▶ Connected ──disconnect──▶ Disconnected
//!                                           ──fail──▶ Error ──initialize──▶ Connecting
//! ```

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::calibration::{
    CalibrationDocument, CalibrationState, StimulationParameters, default_calibration_path,
};
use crate::entropy::signal_quality;
use crate::error::{AcquisitionError, CalibrationError};
use crate::events::EventBus;
use crate::source::{ELECTRODE_COUNT, SignalSource, SimulatedArray, SourceInfo};

/// Largest accepted `|sample|` after calibration.
pub const MAX_SAMPLE_MAGNITUDE: f64 = 100.0;

/// Connection lifecycle of the acquisition core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Events broadcast by the acquisition core.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionEvent {
    StatusChanged(ConnectionStatus),
    SignalsAcquired(Vec<f64>),
    StimulationComplete,
    CalibrationChanged(f64),
    ErrorOccurred(String),
}

/// Running counters for one acquisition core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionStats {
    /// Batches pulled from the source, valid or not.
    pub reads: u64,
    /// Batches discarded by validation.
    pub rejected_batches: u64,
    pub stimulations: u64,
    /// Ticks skipped because a previous tick overran its slot.
    pub ticks_coalesced: u64,
}

/// Check a calibrated batch: exactly 60 finite samples with `|x| <= 100`.
pub fn validate_batch(samples: &[f64]) -> Result<(), String> {
    if samples.len() != ELECTRODE_COUNT {
        return Err(format!(
            "expected {ELECTRODE_COUNT} samples, got {}",
            samples.len()
        ));
    }
    if let Some((i, x)) = samples.iter().enumerate().find(|(_, x)| !x.is_finite()) {
        return Err(format!("electrode {i} is not finite ({x})"));
    }
    if let Some((i, x)) = samples
        .iter()
        .enumerate()
        .find(|(_, x)| x.abs() > MAX_SAMPLE_MAGNITUDE)
    {
        return Err(format!(
            "electrode {i} out of range ({x:.3}, limit {MAX_SAMPLE_MAGNITUDE})"
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct State {
    status: ConnectionStatus,
    calibration: CalibrationState,
    last_batch: Vec<f64>,
    last_error: Option<String>,
    continuous: bool,
    stats: AcquisitionStats,
}

struct Shared {
    state: Mutex<State>,
    source: Box<dyn SignalSource>,
    events: EventBus<AcquisitionEvent>,
}

impl Shared {
    fn set_status(&self, state: &mut State, status: ConnectionStatus) {
        if state.status != status {
            log::info!("{}: {} -> {}", self.source.name(), state.status, status);
            state.status = status;
            self.events.emit(AcquisitionEvent::StatusChanged(status));
        }
    }

    /// Record and broadcast `err`, handing it back for the caller to return.
    fn fail(&self, state: &mut State, err: AcquisitionError) -> AcquisitionError {
        let message = err.to_string();
        log::warn!("{}: {message}", self.source.name());
        state.last_error = Some(message.clone());
        self.events.emit(AcquisitionEvent::ErrorOccurred(message));
        err
    }

    fn read_signals(&self) -> Result<Vec<f64>, AcquisitionError> {
        let mut st = self.state.lock().unwrap();
        if st.status != ConnectionStatus::Connected {
            return Err(self.fail(&mut st, AcquisitionError::NotConnected));
        }

        let factor = st.calibration.calibration_factor;
        let batch: Vec<f64> = self
            .source
            .sample()
            .into_iter()
            .map(|x| x * factor)
            .collect();
        st.stats.reads += 1;

        if let Err(reason) = validate_batch(&batch) {
            st.stats.rejected_batches += 1;
            return Err(self.fail(&mut st, AcquisitionError::InvalidSignals(reason)));
        }

        st.last_batch.clone_from(&batch);
        Ok(batch)
    }

    /// One periodic read. Returns false once continuous mode has been cleared.
    fn tick(&self) -> bool {
        {
            let st = self.state.lock().unwrap();
            if !st.continuous {
                return false;
            }
            if st.status != ConnectionStatus::Connected {
                return true;
            }
        }
        if let Ok(batch) = self.read_signals() {
            if !batch.is_empty() {
                self.events.emit(AcquisitionEvent::SignalsAcquired(batch));
            }
        }
        true
    }

    /// Load the optional calibration document, then open the source.
    /// Returns whether a document was applied.
    fn open(&self, st: &mut State, config_path: Option<&Path>) -> Result<bool, AcquisitionError> {
        let mut loaded = false;
        if let Some(path) = config_path {
            match CalibrationDocument::read(path) {
                Ok(doc) => {
                    st.calibration.apply_document(&doc);
                    loaded = true;
                    log::info!("loaded calibration from {}", path.display());
                }
                Err(CalibrationError::NotFound { source, .. }) => {
                    log::warn!(
                        "calibration file {} not loaded ({source}); using current values",
                        path.display()
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        match self.source.connect() {
            Ok(()) => Ok(loaded),
            Err(e @ AcquisitionError::ConnectInit(_)) => Err(e),
            Err(other) => Err(AcquisitionError::ConnectInit(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Periodic tick
// ---------------------------------------------------------------------------

struct Ticker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Fire `tick` every `interval` until stopped. Overrunning ticks coalesce:
/// missed slots are counted and skipped, never queued.
fn run_ticker(shared: Arc<Shared>, interval: Duration, stop_rx: Receiver<()>) {
    let interval = interval.max(Duration::from_millis(1));
    let mut next = Instant::now() + interval;
    loop {
        let wait = next.saturating_duration_since(Instant::now());
        match stop_rx.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        if !shared.tick() {
            break;
        }

        let now = Instant::now();
        next += interval;
        if next <= now {
            let missed = ((now - next).as_nanos() / interval.as_nanos()) as u64 + 1;
            shared.state.lock().unwrap().stats.ticks_coalesced += missed;
            next = now + interval;
        }
    }
}

// ---------------------------------------------------------------------------
// Acquisition core
// ---------------------------------------------------------------------------

/// Thread-safe, lifecycle-managed interface to an electrode array.
pub struct SignalAcquisition {
    shared: Arc<Shared>,
    ticker: Mutex<Option<Ticker>>,
}

impl SignalAcquisition {
    /// Wrap a signal source. Starts disconnected with unity calibration.
    pub fn new(source: Box<dyn SignalSource>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    status: ConnectionStatus::Disconnected,
                    calibration: CalibrationState::default(),
                    last_batch: Vec::new(),
                    last_error: None,
                    continuous: false,
                    stats: AcquisitionStats::default(),
                }),
                source,
                events: EventBus::new(),
            }),
            ticker: Mutex::new(None),
        }
    }

    /// Acquisition core over the default [`SimulatedArray`].
    pub fn simulated() -> Self {
        Self::new(Box::new(SimulatedArray::new()))
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Connect to the array, optionally loading a calibration document first.
    ///
    /// Allowed from `Disconnected` or `Error`. A missing calibration file is
    /// only a warning; a corrupt one or a source failure moves the core to
    /// `Error`.
    pub fn initialize(&self, config_path: Option<&Path>) -> Result<(), AcquisitionError> {
        let shared = &self.shared;
        let mut st = shared.state.lock().unwrap();
        match st.status {
            ConnectionStatus::Disconnected | ConnectionStatus::Error => {}
            other => return Err(shared.fail(&mut st, AcquisitionError::AlreadyConnected(other))),
        }
        shared.set_status(&mut st, ConnectionStatus::Connecting);

        match shared.open(&mut st, config_path) {
            Ok(loaded) => {
                st.last_batch = Vec::with_capacity(ELECTRODE_COUNT);
                st.last_error = None;
                if loaded {
                    let value = st.calibration.calibration_factor;
                    shared
                        .events
                        .emit(AcquisitionEvent::CalibrationChanged(value));
                }
                shared.set_status(&mut st, ConnectionStatus::Connected);
                Ok(())
            }
            Err(e) => {
                shared.set_status(&mut st, ConnectionStatus::Error);
                Err(shared.fail(&mut st, e))
            }
        }
    }

    /// Stop the periodic tick and disconnect. Idempotent.
    pub fn disconnect(&self) {
        self.stop_ticker();
        let mut st = self.shared.state.lock().unwrap();
        st.continuous = false;
        if st.status == ConnectionStatus::Connected {
            self.shared.source.disconnect();
        }
        self.shared.set_status(&mut st, ConnectionStatus::Disconnected);
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.state.lock().unwrap().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Most recent error message, cleared by a successful `initialize`.
    pub fn last_error(&self) -> Option<String> {
        self.shared.state.lock().unwrap().last_error.clone()
    }

    pub fn source_info(&self) -> SourceInfo {
        self.shared.source.info().clone()
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Read one calibrated, validated batch of 60 samples and cache it.
    pub fn read_signals(&self) -> Result<Vec<f64>, AcquisitionError> {
        self.shared.read_signals()
    }

    /// Same contract as [`read_signals`](Self::read_signals), on a helper thread.
    pub fn read_signals_async(&self) -> JoinHandle<Result<Vec<f64>, AcquisitionError>> {
        let shared = Arc::clone(&self.shared);
        std::thread::spawn(move || shared.read_signals())
    }

    /// Copy of the most recent valid batch (empty before the first read).
    pub fn last_batch(&self) -> Vec<f64> {
        self.shared.state.lock().unwrap().last_batch.clone()
    }

    /// `max(0, 1 - variance(last batch))`; 0 with no cached batch.
    pub fn signal_quality(&self) -> f64 {
        signal_quality(&self.shared.state.lock().unwrap().last_batch)
    }

    pub fn stats(&self) -> AcquisitionStats {
        self.shared.state.lock().unwrap().stats
    }

    // -----------------------------------------------------------------------
    // Continuous acquisition
    // -----------------------------------------------------------------------

    /// Emit a [`AcquisitionEvent::SignalsAcquired`] batch every `interval`.
    /// Restarts the tick if one is already running.
    pub fn start_continuous_acquisition(&self, interval: Duration) -> Result<(), AcquisitionError> {
        {
            let mut st = self.shared.state.lock().unwrap();
            if st.status != ConnectionStatus::Connected {
                return Err(self.shared.fail(&mut st, AcquisitionError::NotConnected));
            }
        }
        self.stop_ticker();

        let mut ticker = self.ticker.lock().unwrap();
        {
            // A disconnect may have landed since the first check.
            let mut st = self.shared.state.lock().unwrap();
            if st.status != ConnectionStatus::Connected {
                return Err(self.shared.fail(&mut st, AcquisitionError::NotConnected));
            }
            st.continuous = true;
        }
        let (stop_tx, stop_rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::spawn(move || run_ticker(shared, interval, stop_rx));
        *ticker = Some(Ticker { stop_tx, handle });
        log::info!(
            "continuous acquisition started every {} ms",
            interval.as_millis()
        );
        Ok(())
    }

    /// Cancel the periodic tick. No `SignalsAcquired` event is emitted after
    /// this returns. Idempotent.
    pub fn stop_continuous_acquisition(&self) {
        self.shared.state.lock().unwrap().continuous = false;
        if self.stop_ticker() {
            log::info!("continuous acquisition stopped");
        }
    }

    pub fn is_continuous(&self) -> bool {
        self.shared.state.lock().unwrap().continuous
    }

    /// Join the tick thread if one is running. Must not hold the state lock.
    fn stop_ticker(&self) -> bool {
        let ticker = self.ticker.lock().unwrap().take();
        match ticker {
            Some(t) => {
                let _ = t.stop_tx.send(());
                let _ = t.handle.join();
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Stimulation
    // -----------------------------------------------------------------------

    /// Drive a 60-channel pattern with the current stimulation parameters.
    pub fn stimulate(&self, pattern: &[f64]) -> Result<(), AcquisitionError> {
        let shared = &self.shared;
        let mut st = shared.state.lock().unwrap();
        if st.status != ConnectionStatus::Connected {
            return Err(shared.fail(&mut st, AcquisitionError::NotConnected));
        }
        if pattern.len() != ELECTRODE_COUNT {
            let err = AcquisitionError::InvalidPattern {
                expected: ELECTRODE_COUNT,
                actual: pattern.len(),
            };
            return Err(shared.fail(&mut st, err));
        }

        let params = st.calibration.stimulation;
        log::info!(
            "stimulating {} electrodes: {:.2} V, {:.1} ms, {:.1} Hz",
            pattern.len(),
            params.amplitude,
            params.duration_ms,
            params.frequency_hz
        );
        if let Err(e) = shared.source.stimulate(pattern, &params) {
            return Err(shared.fail(&mut st, e));
        }
        st.stats.stimulations += 1;
        shared.events.emit(AcquisitionEvent::StimulationComplete);
        Ok(())
    }

    /// Set amplitude (V), duration (ms) and frequency (Hz), clamped silently.
    pub fn set_stimulation_parameters(&self, amplitude: f64, duration_ms: f64, frequency_hz: f64) {
        let mut st = self.shared.state.lock().unwrap();
        st.calibration
            .set_stimulation(amplitude, duration_ms, frequency_hz);
        log::debug!("stimulation parameters now {:?}", st.calibration.stimulation);
    }

    pub fn stimulation_parameters(&self) -> StimulationParameters {
        self.shared.state.lock().unwrap().calibration.stimulation
    }

    // -----------------------------------------------------------------------
    // Calibration
    // -----------------------------------------------------------------------

    /// Multiply the gain by `factor`, clamped to `[0.1, 5.0]`, and broadcast
    /// the new value (even when clamping left it unchanged).
    pub fn adjust_calibration(&self, factor: f64) -> f64 {
        let mut st = self.shared.state.lock().unwrap();
        let value = st.calibration.adjust(factor);
        log::info!("calibration factor x{factor} -> {value}");
        self.shared
            .events
            .emit(AcquisitionEvent::CalibrationChanged(value));
        value
    }

    /// Restore unity gain and broadcast it.
    pub fn reset_calibration(&self) {
        let mut st = self.shared.state.lock().unwrap();
        st.calibration.reset();
        log::info!("calibration factor reset to 1.0");
        self.shared
            .events
            .emit(AcquisitionEvent::CalibrationChanged(1.0));
    }

    pub fn calibration_factor(&self) -> f64 {
        self.shared.state.lock().unwrap().calibration.calibration_factor
    }

    pub fn calibration(&self) -> CalibrationState {
        self.shared.state.lock().unwrap().calibration.clone()
    }

    /// Persist calibration to `path`, or to the platform data directory.
    /// Returns the path written.
    pub fn save_calibration(&self, path: Option<&Path>) -> Result<PathBuf, AcquisitionError> {
        let mut st = self.shared.state.lock().unwrap();
        let result = resolve_path(path).and_then(|p| {
            st.calibration.to_document().write(&p)?;
            Ok(p)
        });
        match result {
            Ok(p) => {
                log::info!("saved calibration to {}", p.display());
                Ok(p)
            }
            Err(e) => Err(self.shared.fail(&mut st, e.into())),
        }
    }

    /// Load calibration from `path`, or from the platform data directory.
    /// Fields missing from the document keep their current values.
    pub fn load_calibration(&self, path: Option<&Path>) -> Result<(), AcquisitionError> {
        let mut st = self.shared.state.lock().unwrap();
        let result = resolve_path(path).and_then(|p| CalibrationDocument::read(&p).map(|d| (p, d)));
        match result {
            Ok((p, doc)) => {
                st.calibration.apply_document(&doc);
                log::info!("loaded calibration from {}", p.display());
                let value = st.calibration.calibration_factor;
                self.shared
                    .events
                    .emit(AcquisitionEvent::CalibrationChanged(value));
                Ok(())
            }
            Err(e) => Err(self.shared.fail(&mut st, e.into())),
        }
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Subscribe to this core's events.
    pub fn subscribe(&self) -> Receiver<AcquisitionEvent> {
        self.shared.events.subscribe()
    }

    /// Register a callback. It runs on the emitting thread, possibly while the
    /// core's state lock is held, so it must not call back into this core.
    pub fn on_event<F>(&self, callback: F)
    where
        F: Fn(&AcquisitionEvent) + Send + Sync + 'static,
    {
        self.shared.events.on_event(callback);
    }
}

impl Drop for SignalAcquisition {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn resolve_path(path: Option<&Path>) -> Result<PathBuf, CalibrationError> {
    match path {
        Some(p) => Ok(p.to_path_buf()),
        None => default_calibration_path(),
    }
}
