//! Signal-seeded mining core: synchronous and background proof-of-work search
//! over a sample batch, running statistics and adaptive difficulty.
//!
//! Architecture:
//! 1. One stats mutex guards configuration, totals, hashrate and the bounded
//!    result history
//! 2. A separate `active` flag plus condvar admits exactly one job at a time,
//!    whether it runs on the caller's thread (`mine`) or the worker
//! 3. Each attempt derives a nonce from the batch, hashes
//!    `header ++ decimal(nonce)` with double SHA-256 and tests the leading
//!    64 bits against the difficulty
//! 4. Cancellation is a flag checked before every attempt; a cancelled job
//!    records nothing and emits no completion
//! 5. After every recorded result the difficulty controller may rescale the
//!    difficulty for later jobs

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize, Serializer};

use crate::clock::now_iso8601;
use crate::difficulty::{
    DEFAULT_DIFFICULTY, DifficultyController, WindowSummary, clamp_difficulty, scale_difficulty,
};
use crate::entropy::shannon_entropy;
use crate::error::MiningError;
use crate::events::EventBus;
use crate::hash::{double_sha256_hex, meets_difficulty};
use crate::nonce::derive_nonce;
use crate::worker::MiningWorker;

pub const DEFAULT_MAX_ATTEMPTS: u64 = 1_000_000;
/// Results kept for the difficulty controller and stats.
pub const MAX_RESULT_HISTORY: usize = 100;
/// Attempts between progress events.
pub const PROGRESS_INTERVAL: u64 = 1000;
/// How long `stop_mining` waits for the current job.
pub const STOP_TIMEOUT: Duration = Duration::from_millis(3000);
/// How long dropping a miner waits for the current job.
pub const DROP_TIMEOUT: Duration = Duration::from_millis(5000);

/// An 80-byte all-zero header, hex encoded.
pub fn default_block_header() -> String {
    "0".repeat(160)
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Mining parameters. Partial JSON documents fill the rest from defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Header text; each attempt hashes it followed by the decimal nonce.
    pub block_header: String,
    /// Accept a hash whose leading 64 bits are strictly below this.
    pub difficulty: u64,
    pub max_attempts: u64,
    /// Weight of the sine term in nonce derivation.
    pub signal_weight: f64,
    /// Reserved.
    pub use_quantum_optimization: bool,
    /// Reserved; the search runs on one thread.
    pub thread_count: usize,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            block_header: default_block_header(),
            difficulty: DEFAULT_DIFFICULTY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            signal_weight: 1.0,
            use_quantum_optimization: false,
            thread_count: 1,
        }
    }
}

impl MiningConfig {
    /// Load a JSON config file and validate it.
    pub fn from_json_file(path: &Path) -> Result<Self, MiningError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validated()
    }

    /// Reject unusable values; clamp the difficulty into bounds.
    pub fn validated(mut self) -> Result<Self, MiningError> {
        if self.max_attempts == 0 {
            return Err(MiningError::Config("max_attempts must be positive".into()));
        }
        if self.thread_count == 0 {
            return Err(MiningError::Config("thread_count must be positive".into()));
        }
        if !self.signal_weight.is_finite() {
            return Err(MiningError::Config(format!(
                "signal_weight must be finite, got {}",
                self.signal_weight
            )));
        }
        self.difficulty = clamp_difficulty(self.difficulty);
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Results, events and stats
// ---------------------------------------------------------------------------

/// Outcome of one search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MiningResult {
    pub success: bool,
    /// Winning nonce, or the last one tried. Serialized as a decimal string.
    #[serde(serialize_with = "nonce_as_decimal")]
    pub nonce: u32,
    /// Hash of the winning attempt, or of the last one tried.
    pub hash: String,
    pub attempts: u64,
    /// Elapsed search time in seconds.
    pub compute_time: f64,
    /// Shannon entropy of the input batch.
    pub signal_contribution: f64,
    /// Difficulty the search ran against.
    pub difficulty: u64,
    pub timestamp: String,
}

impl MiningResult {
    /// The all-zero failed result.
    pub fn idle() -> Self {
        Self {
            success: false,
            nonce: 0,
            hash: String::new(),
            attempts: 0,
            compute_time: 0.0,
            signal_contribution: 0.0,
            difficulty: 0,
            timestamp: String::new(),
        }
    }
}

fn nonce_as_decimal<S: Serializer>(nonce: &u32, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(nonce)
}

/// Events broadcast by the mining core.
#[derive(Debug, Clone, PartialEq)]
pub enum MiningEvent {
    MiningComplete(MiningResult),
    ProgressUpdate { attempt: u64, fraction: f64 },
    /// Hashes per second over the last job.
    HashrateUpdated(f64),
    DifficultyAdjusted(u64),
    Warning(String),
}

/// Snapshot of a miner's counters.
#[derive(Debug, Clone, Serialize)]
pub struct MiningStats {
    pub total_attempts: u64,
    pub success_count: u64,
    pub success_rate: f64,
    pub hashrate: f64,
    pub difficulty: u64,
    pub is_mining: bool,
    pub continuous: bool,
    /// False once the worker thread has died; background jobs are then refused.
    pub worker_running: bool,
    pub started_at: String,
    pub uptime_secs: f64,
    /// Oldest first.
    pub recent_results: Vec<MiningResult>,
}

// ---------------------------------------------------------------------------
// Shared engine
// ---------------------------------------------------------------------------

struct MinerState {
    config: MiningConfig,
    total_attempts: u64,
    success_count: u64,
    hashrate: f64,
    history: VecDeque<MiningResult>,
    controller: DifficultyController,
    started_at: String,
    started: Instant,
}

impl MinerState {
    fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.success_count as f64 / self.total_attempts as f64
        }
    }

    /// Rescale the difficulty; returns the event to emit if it changed.
    fn rescale(&mut self, factor: f64) -> Option<MiningEvent> {
        let old = self.config.difficulty;
        let new = scale_difficulty(old, factor);
        if new == old {
            return None;
        }
        self.config.difficulty = new;
        log::info!("difficulty x{factor}: {old:#018x} -> {new:#018x}");
        Some(MiningEvent::DifficultyAdjusted(new))
    }

    fn controller_step(&mut self) -> Option<MiningEvent> {
        let summary = WindowSummary::from_results(&self.history);
        let factor = self.controller.recommend(&summary)?;
        self.rescale(factor)
    }
}

struct MinerShared {
    state: Mutex<MinerState>,
    events: EventBus<MiningEvent>,
    active: Mutex<bool>,
    idle: Condvar,
    cancel: AtomicBool,
    continuous: AtomicBool,
}

impl MinerShared {
    /// Claim the single job slot. Clears any stale cancellation.
    fn try_begin(&self) -> bool {
        let mut active = self.active.lock().unwrap();
        if *active {
            return false;
        }
        *active = true;
        self.cancel.store(false, Ordering::SeqCst);
        true
    }

    fn finish(&self) {
        *self.active.lock().unwrap() = false;
        self.idle.notify_all();
    }

    fn is_active(&self) -> bool {
        *self.active.lock().unwrap()
    }

    /// Wait until no job holds the slot. Returns false on timeout.
    fn wait_idle(&self, timeout: Duration) -> bool {
        let active = self.active.lock().unwrap();
        let (active, _) = self
            .idle
            .wait_timeout_while(active, timeout, |busy| *busy)
            .unwrap();
        !*active
    }

    /// Run a job whose slot has already been claimed, then release it.
    fn run_job(&self, batch: &[f64]) -> Result<MiningResult, MiningError> {
        let outcome = self.search(batch);
        if let Ok(result) = &outcome {
            self.record(result);
        }
        self.finish();
        if let Ok(result) = &outcome {
            self.events.emit(MiningEvent::MiningComplete(result.clone()));
        }
        outcome
    }

    fn search(&self, batch: &[f64]) -> Result<MiningResult, MiningError> {
        let config = self.state.lock().unwrap().config.clone();
        let started = Instant::now();
        let mut result = MiningResult {
            signal_contribution: shannon_entropy(batch),
            difficulty: config.difficulty,
            ..MiningResult::idle()
        };

        let mut data = String::with_capacity(config.block_header.len() + 10);
        for attempt in 0..config.max_attempts {
            if self.cancel.load(Ordering::Relaxed) {
                log::info!("mining cancelled after {} attempts", result.attempts);
                return Err(MiningError::Cancelled);
            }

            let nonce = derive_nonce(batch, attempt, config.signal_weight);
            data.clear();
            data.push_str(&config.block_header);
            let _ = write!(data, "{nonce}");
            let hash = double_sha256_hex(&data);
            result.attempts += 1;

            let solved = meets_difficulty(&hash, config.difficulty);
            result.nonce = nonce;
            result.hash = hash;
            if solved {
                result.success = true;
                break;
            }

            if result.attempts % PROGRESS_INTERVAL == 0 {
                self.events.emit(MiningEvent::ProgressUpdate {
                    attempt: result.attempts,
                    fraction: result.attempts as f64 / config.max_attempts as f64,
                });
            }
        }

        result.compute_time = started.elapsed().as_secs_f64();
        result.timestamp = now_iso8601();
        if result.success {
            log::info!(
                "solution after {} attempts: nonce {} hash {}",
                result.attempts,
                result.nonce,
                result.hash
            );
        } else {
            log::debug!("no solution in {} attempts", result.attempts);
        }
        Ok(result)
    }

    /// Fold a result into the stats and run the difficulty controller.
    fn record(&self, result: &MiningResult) {
        let mut pending = Vec::with_capacity(2);
        {
            let mut st = self.state.lock().unwrap();
            st.total_attempts += result.attempts;
            if result.success && result.attempts > 0 {
                st.success_count += 1;
            }
            st.hashrate = if result.compute_time > 0.0 {
                result.attempts as f64 / result.compute_time
            } else {
                0.0
            };
            st.history.push_back(result.clone());
            while st.history.len() > MAX_RESULT_HISTORY {
                st.history.pop_front();
            }
            pending.push(MiningEvent::HashrateUpdated(st.hashrate));
            pending.extend(st.controller_step());
        }
        for event in pending {
            self.events.emit(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Mining core
// ---------------------------------------------------------------------------

/// Proof-of-work engine seeded by electrode sample batches.
pub struct SignalMiner {
    shared: Arc<MinerShared>,
    worker: MiningWorker,
}

impl SignalMiner {
    /// Miner with a validated configuration and its own worker thread.
    pub fn new(config: MiningConfig) -> Result<Self, MiningError> {
        Ok(Self::with_valid_config(config.validated()?))
    }

    fn with_valid_config(config: MiningConfig) -> Self {
        let shared = Arc::new(MinerShared {
            state: Mutex::new(MinerState {
                config,
                total_attempts: 0,
                success_count: 0,
                hashrate: 0.0,
                history: VecDeque::with_capacity(MAX_RESULT_HISTORY),
                controller: DifficultyController::default(),
                started_at: now_iso8601(),
                started: Instant::now(),
            }),
            events: EventBus::new(),
            active: Mutex::new(false),
            idle: Condvar::new(),
            cancel: AtomicBool::new(false),
            continuous: AtomicBool::new(false),
        });
        let job_shared = Arc::clone(&shared);
        let worker = MiningWorker::spawn("neuropow-miner", move |batch| {
            if let Err(e) = job_shared.run_job(&batch) {
                log::debug!("background job ended: {e}");
            }
        });
        Self { shared, worker }
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Replace the configuration. Takes effect from the next job.
    pub fn set_config(&self, config: MiningConfig) -> Result<(), MiningError> {
        let config = config.validated()?;
        log::debug!("mining config now {config:?}");
        self.shared.state.lock().unwrap().config = config;
        Ok(())
    }

    pub fn config(&self) -> MiningConfig {
        self.shared.state.lock().unwrap().config.clone()
    }

    pub fn difficulty(&self) -> u64 {
        self.shared.state.lock().unwrap().config.difficulty
    }

    /// Scale the difficulty by `factor`, clamped to bounds. Emits
    /// [`MiningEvent::DifficultyAdjusted`] and returns true only if it changed.
    pub fn update_difficulty(&self, factor: f64) -> bool {
        let event = self.shared.state.lock().unwrap().rescale(factor);
        match event {
            Some(e) => {
                self.shared.events.emit(e);
                true
            }
            None => false,
        }
    }

    /// Run the difficulty controller over the current history.
    pub fn adjust_difficulty(&self) -> bool {
        let event = self.shared.state.lock().unwrap().controller_step();
        match event {
            Some(e) => {
                self.shared.events.emit(e);
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    /// Search `batch` on the calling thread.
    ///
    /// Fails with [`MiningError::AlreadyMining`] while another job runs and
    /// with [`MiningError::Cancelled`] if `stop_mining` interrupts it.
    pub fn mine(&self, batch: &[f64]) -> Result<MiningResult, MiningError> {
        if !self.shared.try_begin() {
            log::warn!("mine requested while a job is running");
            return Err(MiningError::AlreadyMining);
        }
        self.shared.run_job(batch)
    }

    /// Hand `batch` to the worker and return immediately.
    pub fn start_mining_async(&self, batch: Vec<f64>) -> Result<(), MiningError> {
        let submitted = self.submit(batch);
        if let Err(MiningError::AlreadyMining) = &submitted {
            log::warn!("async mining requested while a job is running");
            self.shared.events.emit(MiningEvent::Warning(
                "mining already in progress".to_string(),
            ));
        }
        submitted
    }

    fn submit(&self, batch: Vec<f64>) -> Result<(), MiningError> {
        if !self.shared.try_begin() {
            return Err(MiningError::AlreadyMining);
        }
        if let Err(e) = self.worker.submit(batch) {
            self.shared.finish();
            return Err(e);
        }
        Ok(())
    }

    /// Cancel the running job and wait up to 3 s for it to quit. Returns
    /// true once no job is running.
    pub fn stop_mining(&self) -> bool {
        if !self.shared.is_active() {
            return true;
        }
        self.shared.cancel.store(true, Ordering::SeqCst);
        let stopped = self.shared.wait_idle(STOP_TIMEOUT);
        if !stopped {
            log::warn!(
                "mining job still running after {} ms",
                STOP_TIMEOUT.as_millis()
            );
        }
        stopped
    }

    pub fn is_mining(&self) -> bool {
        self.shared.is_active()
    }

    // -----------------------------------------------------------------------
    // Continuous mining
    // -----------------------------------------------------------------------

    pub fn start_continuous_mining(&self) {
        self.shared.continuous.store(true, Ordering::SeqCst);
        log::info!("continuous mining enabled");
    }

    pub fn stop_continuous_mining(&self) {
        self.shared.continuous.store(false, Ordering::SeqCst);
        log::info!("continuous mining disabled");
    }

    pub fn is_continuous_mining(&self) -> bool {
        self.shared.continuous.load(Ordering::SeqCst)
    }

    /// Feed a freshly acquired batch. Starts a background job iff continuous
    /// mining is on and no job is active. Returns whether a job started.
    pub fn handle_signals(&self, batch: &[f64]) -> bool {
        if !self.is_continuous_mining() {
            return false;
        }
        self.submit(batch.to_vec()).is_ok()
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    /// Fold an externally produced result into the stats, as a finished job
    /// would.
    pub fn record_result(&self, result: &MiningResult) {
        self.shared.record(result);
    }

    /// Hashes per second over the last recorded job.
    pub fn hashrate(&self) -> f64 {
        self.shared.state.lock().unwrap().hashrate
    }

    pub fn total_attempts(&self) -> u64 {
        self.shared.state.lock().unwrap().total_attempts
    }

    pub fn success_count(&self) -> u64 {
        self.shared.state.lock().unwrap().success_count
    }

    /// `success_count / total_attempts`, 0 before any attempt.
    pub fn success_rate(&self) -> f64 {
        self.shared.state.lock().unwrap().success_rate()
    }

    pub fn stats(&self) -> MiningStats {
        let is_mining = self.is_mining();
        let continuous = self.is_continuous_mining();
        let st = self.shared.state.lock().unwrap();
        MiningStats {
            total_attempts: st.total_attempts,
            success_count: st.success_count,
            success_rate: st.success_rate(),
            hashrate: st.hashrate,
            difficulty: st.config.difficulty,
            is_mining,
            continuous,
            worker_running: self.worker.is_running(),
            started_at: st.started_at.clone(),
            uptime_secs: st.started.elapsed().as_secs_f64(),
            recent_results: st.history.iter().cloned().collect(),
        }
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub fn subscribe(&self) -> Receiver<MiningEvent> {
        self.shared.events.subscribe()
    }

    /// Register a callback, run on whichever thread emits. Progress events
    /// come from the mining thread.
    pub fn on_event<F>(&self, callback: F)
    where
        F: Fn(&MiningEvent) + Send + Sync + 'static,
    {
        self.shared.events.on_event(callback);
    }
}

impl Default for SignalMiner {
    fn default() -> Self {
        Self::with_valid_config(MiningConfig::default())
    }
}

impl Drop for SignalMiner {
    fn drop(&mut self) {
        self.shared.cancel.store(true, Ordering::SeqCst);
        if self.shared.wait_idle(DROP_TIMEOUT) {
            self.worker.shutdown(DROP_TIMEOUT);
        } else {
            log::warn!(
                "mining job did not stop within {} ms; detaching worker",
                DROP_TIMEOUT.as_millis()
            );
            self.worker.shutdown(Duration::ZERO);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::difficulty::{MAX_DIFFICULTY, MIN_DIFFICULTY};

    fn batch() -> Vec<f64> {
        (0..60).map(|i| ((i as f64) * 0.37).sin() * 0.4).collect()
    }

    fn miner(difficulty: u64, max_attempts: u64) -> SignalMiner {
        SignalMiner::new(MiningConfig {
            difficulty,
            max_attempts,
            ..MiningConfig::default()
        })
        .unwrap()
    }

    fn drain(rx: &Receiver<MiningEvent>) -> Vec<MiningEvent> {
        rx.try_iter().collect()
    }

    fn synthetic(compute_time: f64, success: bool) -> MiningResult {
        MiningResult {
            success,
            compute_time,
            attempts: 100,
            ..MiningResult::idle()
        }
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    #[test]
    fn test_default_config() {
        let cfg = MiningConfig::default();
        assert_eq!(cfg.block_header.len(), 160);
        assert_eq!(cfg.difficulty, 0x0000_FFFF_FFFF_FFFF);
        assert_eq!(cfg.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(cfg.thread_count, 1);
        assert!(!cfg.use_quantum_optimization);
    }

    #[test]
    fn test_set_config_validates() {
        let m = SignalMiner::default();
        let bad = MiningConfig {
            max_attempts: 0,
            ..MiningConfig::default()
        };
        assert!(matches!(m.set_config(bad), Err(MiningError::Config(_))));

        let low = MiningConfig {
            difficulty: 1,
            ..MiningConfig::default()
        };
        m.set_config(low).unwrap();
        assert_eq!(m.difficulty(), MIN_DIFFICULTY);
    }

    #[test]
    fn test_config_from_partial_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mining.json");
        std::fs::write(&path, r#"{"max_attempts": 5, "signal_weight": 0.5}"#).unwrap();
        let cfg = MiningConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.signal_weight, 0.5);
        assert_eq!(cfg.difficulty, DEFAULT_DIFFICULTY);

        std::fs::write(&path, "{").unwrap();
        assert!(matches!(
            MiningConfig::from_json_file(&path),
            Err(MiningError::ConfigParse(_))
        ));
        assert!(matches!(
            MiningConfig::from_json_file(&tmp.path().join("none.json")),
            Err(MiningError::ConfigIo(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    #[test]
    fn test_easy_difficulty_solves_and_verifies() {
        let m = miner(MAX_DIFFICULTY, 10);
        let r = m.mine(&batch()).unwrap();
        assert!(r.success);
        assert_eq!(r.hash.len(), 64);
        assert!(meets_difficulty(&r.hash, MAX_DIFFICULTY));
        let data = format!("{}{}", default_block_header(), r.nonce);
        assert_eq!(double_sha256_hex(&data), r.hash);
        assert_eq!(r.signal_contribution, shannon_entropy(&batch()));
        assert!(!m.is_mining());
    }

    #[test]
    fn test_success_rate() {
        let m = miner(MAX_DIFFICULTY, 10);
        assert_eq!(m.success_rate(), 0.0);
        let r = m.mine(&batch()).unwrap();
        assert_eq!(m.total_attempts(), r.attempts);
        assert_eq!(m.success_count(), 1);
        assert_eq!(m.success_rate(), 1.0 / r.attempts as f64);

        m.set_config(MiningConfig {
            difficulty: MIN_DIFFICULTY,
            max_attempts: 100,
            ..MiningConfig::default()
        })
        .unwrap();
        let miss = m.mine(&batch()).unwrap();
        let total = r.attempts + miss.attempts;
        assert_eq!(m.total_attempts(), total);
        let rate = m.success_rate();
        assert!((0.0..=1.0).contains(&rate));
        assert_eq!(rate, m.success_count() as f64 / total as f64);
    }

    #[test]
    fn test_progress_events_every_thousand() {
        let m = miner(MIN_DIFFICULTY, 2500);
        let rx = m.subscribe();
        let r = m.mine(&batch()).unwrap();

        let progress: Vec<(u64, f64)> = drain(&rx)
            .into_iter()
            .filter_map(|e| match e {
                MiningEvent::ProgressUpdate { attempt, fraction } => Some((attempt, fraction)),
                _ => None,
            })
            .collect();
        assert_eq!(progress.len() as u64, r.attempts / PROGRESS_INTERVAL);
        if let Some(&(attempt, fraction)) = progress.first() {
            assert_eq!(attempt, 1000);
            assert_eq!(fraction, 0.4);
        }
    }

    #[test]
    fn test_completion_events() {
        let m = miner(MAX_DIFFICULTY, 10);
        let rx = m.subscribe();
        let r = m.mine(&batch()).unwrap();
        let events = drain(&rx);
        assert!(matches!(events.first(), Some(MiningEvent::HashrateUpdated(_))));
        assert_eq!(events.last(), Some(&MiningEvent::MiningComplete(r)));
    }

    #[test]
    fn test_empty_batch_still_mines() {
        let m = miner(MAX_DIFFICULTY, 10);
        let r = m.mine(&[]).unwrap();
        assert!(r.success);
        assert_eq!(r.signal_contribution, 0.0);
    }

    #[test]
    fn test_result_serializes_nonce_as_string() {
        let r = MiningResult {
            nonce: 42,
            ..MiningResult::idle()
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["nonce"], "42");
        assert_eq!(json["success"], false);
    }

    // -----------------------------------------------------------------------
    // Concurrency and cancellation
    // -----------------------------------------------------------------------

    #[test]
    fn test_async_job_completes() {
        let m = miner(MAX_DIFFICULTY, 10);
        let rx = m.subscribe();
        m.start_mining_async(batch()).unwrap();
        let done = loop {
            match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                MiningEvent::MiningComplete(r) => break r,
                _ => continue,
            }
        };
        assert!(done.success);
        assert!(!m.is_mining());
        assert_eq!(m.success_count(), 1);
    }

    #[test]
    fn test_already_mining() {
        let m = miner(MIN_DIFFICULTY, u64::MAX);
        let rx = m.subscribe();
        m.start_mining_async(batch()).unwrap();
        assert!(m.is_mining());

        assert!(matches!(m.mine(&batch()), Err(MiningError::AlreadyMining)));
        assert!(matches!(
            m.start_mining_async(batch()),
            Err(MiningError::AlreadyMining)
        ));
        assert!(m.stop_mining());
        assert!(
            drain(&rx)
                .iter()
                .any(|e| matches!(e, MiningEvent::Warning(_)))
        );
        assert_eq!(m.total_attempts(), 0);
    }

    #[test]
    fn test_cancelled_job_emits_no_completion() {
        let m = miner(MIN_DIFFICULTY, u64::MAX);
        let rx = m.subscribe();
        m.start_mining_async(batch()).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(m.stop_mining());
        assert!(!m.is_mining());

        std::thread::sleep(Duration::from_millis(50));
        assert!(
            !drain(&rx)
                .iter()
                .any(|e| matches!(e, MiningEvent::MiningComplete(_)))
        );
        assert!(m.stats().recent_results.is_empty());
    }

    #[test]
    fn test_stats_report_live_worker() {
        let m = SignalMiner::default();
        let stats = m.stats();
        assert!(stats.worker_running);
        assert!(!stats.is_mining);
        assert_eq!(stats.total_attempts, 0);
    }

    #[test]
    fn test_stop_when_idle() {
        let m = SignalMiner::default();
        assert!(m.stop_mining());
        // A stale stop must not cancel the next job.
        let m = miner(MAX_DIFFICULTY, 10);
        m.stop_mining();
        assert!(m.mine(&batch()).is_ok());
    }

    #[test]
    fn test_stop_times_out_on_stuck_job() {
        let m = miner(MIN_DIFFICULTY, u64::MAX);
        let stalled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stalled);
        // Progress listeners run on the worker thread while the job holds the slot.
        m.on_event(move |event| {
            if matches!(event, MiningEvent::ProgressUpdate { .. })
                && !flag.swap(true, Ordering::SeqCst)
            {
                std::thread::sleep(STOP_TIMEOUT + Duration::from_millis(500));
            }
        });
        m.start_mining_async(batch()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !stalled.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(stalled.load(Ordering::SeqCst));

        let started = Instant::now();
        assert!(!m.stop_mining());
        assert!(started.elapsed() >= STOP_TIMEOUT);
        assert!(m.is_mining());

        // Cancellation lands once the listener returns.
        assert!(m.stop_mining());
        assert!(!m.is_mining());
    }

    #[test]
    fn test_handle_signals_respects_continuous_flag() {
        let m = miner(MAX_DIFFICULTY, 10);
        let rx = m.subscribe();
        assert!(!m.handle_signals(&batch()));
        m.start_continuous_mining();
        assert!(m.is_continuous_mining());
        assert!(m.handle_signals(&batch()));
        loop {
            if let MiningEvent::MiningComplete(_) = rx.recv_timeout(Duration::from_secs(10)).unwrap()
            {
                break;
            }
        }
        m.stop_continuous_mining();
        assert!(!m.handle_signals(&batch()));
    }

    #[test]
    fn test_drop_cancels_running_job() {
        let m = miner(MIN_DIFFICULTY, u64::MAX);
        m.start_mining_async(batch()).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        drop(m);
        assert!(started.elapsed() < DROP_TIMEOUT);
    }

    // -----------------------------------------------------------------------
    // Difficulty
    // -----------------------------------------------------------------------

    #[test]
    fn test_fast_successful_history_raises_difficulty() {
        let m = SignalMiner::default();
        let rx = m.subscribe();
        for _ in 0..9 {
            m.record_result(&synthetic(1.0, true));
        }
        assert_eq!(m.difficulty(), DEFAULT_DIFFICULTY);
        assert!(
            !drain(&rx)
                .iter()
                .any(|e| matches!(e, MiningEvent::DifficultyAdjusted(_)))
        );

        m.record_result(&synthetic(1.0, true));
        let expected = scale_difficulty(DEFAULT_DIFFICULTY, 1.1);
        assert_eq!(m.difficulty(), expected);
        assert!(drain(&rx).contains(&MiningEvent::DifficultyAdjusted(expected)));
    }

    #[test]
    fn test_update_difficulty_clamped_is_silent() {
        let m = miner(MIN_DIFFICULTY, 10);
        let rx = m.subscribe();
        assert!(!m.update_difficulty(0.5));
        assert_eq!(m.difficulty(), MIN_DIFFICULTY);
        assert!(drain(&rx).is_empty());

        assert!(m.update_difficulty(2.0));
        assert_eq!(
            drain(&rx),
            vec![MiningEvent::DifficultyAdjusted(scale_difficulty(
                MIN_DIFFICULTY,
                2.0
            ))]
        );
    }

    #[test]
    fn test_history_is_bounded() {
        let m = SignalMiner::default();
        for _ in 0..(MAX_RESULT_HISTORY + 50) {
            m.record_result(&synthetic(30.0, false));
        }
        let stats = m.stats();
        assert_eq!(stats.recent_results.len(), MAX_RESULT_HISTORY);
        assert_eq!(stats.difficulty, MIN_DIFFICULTY);
        assert!(stats.total_attempts >= stats.success_count);
    }

    #[test]
    fn test_adjust_difficulty_without_history() {
        let m = SignalMiner::default();
        assert!(!m.adjust_difficulty());
    }
}
