pub mod acquire;
pub mod calibrate;
pub mod mine;
pub mod server;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use neuropow_core::{AcquisitionConfig, MiningConfig, SignalAcquisition, SignalMiner};

/// Parse a duration string like "5m", "30s", "1h", "100ms". Bare numbers are seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    let (numeric, multiplier) = if let Some(rest) = s.strip_suffix("ms") {
        (rest, 1u64)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest, 1000)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60_000)
    } else if let Some(rest) = s.strip_suffix('h') {
        (rest, 3_600_000)
    } else {
        (s, 1000)
    };

    let value: u64 = numeric
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {s}"))?;
    value
        .checked_mul(multiplier)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration too large: {s}"))
}

/// Parse a difficulty threshold: `0x`-prefixed hex or decimal.
pub fn parse_difficulty(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid difficulty '{s}': {e}"))
}

/// Connect a simulated array, loading `calibration` if given. Exits on failure.
pub fn connect_acquisition(calibration: Option<&Path>, connect_delay_ms: u64) -> Arc<SignalAcquisition> {
    let config = AcquisitionConfig {
        connect_delay_ms,
        ..AcquisitionConfig::default()
    };
    let source = config.build().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });
    let acquisition = Arc::new(SignalAcquisition::new(Box::new(source)));
    if let Err(e) = acquisition.initialize(calibration) {
        eprintln!("Error: failed to connect electrode array: {e}");
        std::process::exit(1);
    }
    acquisition
}

/// Load the mining config (or defaults) and apply CLI overrides. Exits on failure.
pub fn load_mining_config(
    path: Option<&Path>,
    difficulty: Option<u64>,
    max_attempts: Option<u64>,
) -> MiningConfig {
    let mut config = match path {
        Some(p) => MiningConfig::from_json_file(p).unwrap_or_else(|e| {
            eprintln!("Error: {}: {e}", p.display());
            std::process::exit(1);
        }),
        None => MiningConfig::default(),
    };
    if let Some(d) = difficulty {
        config.difficulty = d;
    }
    if let Some(n) = max_attempts {
        config.max_attempts = n;
    }
    config.validated().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    })
}

// ---------------------------------------------------------------------------
// Ctrl-C shutdown registry
// ---------------------------------------------------------------------------

struct ShutdownTargets {
    acquisition: Weak<SignalAcquisition>,
    miner: Option<Weak<SignalMiner>>,
    running: Arc<AtomicBool>,
}

static SHUTDOWN: OnceLock<ShutdownTargets> = OnceLock::new();

/// Register the process's cores and install the Ctrl-C handler. The handler
/// stops mining, then disconnects the array, then clears the returned flag.
/// Only the first call registers anything.
pub fn install_shutdown(
    acquisition: &Arc<SignalAcquisition>,
    miner: Option<&Arc<SignalMiner>>,
) -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let targets = ShutdownTargets {
        acquisition: Arc::downgrade(acquisition),
        miner: miner.map(Arc::downgrade),
        running: Arc::clone(&running),
    };
    if SHUTDOWN.set(targets).is_err() {
        log::warn!("shutdown handler already installed");
        return running;
    }
    if let Err(e) = ctrlc::set_handler(shutdown) {
        eprintln!("Warning: could not install Ctrl+C handler: {e}");
    }
    running
}

fn shutdown() {
    let Some(targets) = SHUTDOWN.get() else {
        return;
    };
    if let Some(miner) = targets.miner.as_ref().and_then(Weak::upgrade) {
        miner.stop_mining();
    }
    if let Some(acquisition) = targets.acquisition.upgrade() {
        acquisition.disconnect();
    }
    targets.running.store(false, Ordering::SeqCst);
}

/// Keep the link thread handle, or warn that acquired batches will go unmined.
pub fn link_or_warn(link: std::io::Result<JoinHandle<()>>) -> Option<JoinHandle<()>> {
    match link {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Warning: acquisition link not started, batches will not be mined: {e}");
            None
        }
    }
}

/// Sleep for `duration` in short steps, returning early once `running` clears.
pub fn run_for(duration: Duration, running: &AtomicBool) {
    let step = Duration::from_millis(50);
    let mut left = duration;
    while running.load(Ordering::SeqCst) && !left.is_zero() {
        let nap = left.min(step);
        std::thread::sleep(nap);
        left -= nap;
    }
}
