use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use neuropow_core::{SignalMiner, link};

pub fn run(
    host: &str,
    port: u16,
    config_path: Option<&Path>,
    calibration: Option<&Path>,
    continuous: bool,
) {
    let config = super::load_mining_config(config_path, None, None);
    let acquisition = super::connect_acquisition(calibration, 100);
    let miner = Arc::new(SignalMiner::new(config.clone()).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }));
    let running = super::install_shutdown(&acquisition, Some(&miner));

    let base = format!("http://{host}:{port}");
    println!("NeuroPoW Server v{}", neuropow_core::VERSION);
    println!("   {base}");
    println!("   difficulty {:#018x}, {} attempts per job", config.difficulty, config.max_attempts);
    println!();
    println!("   Endpoints:");
    println!("     GET  /              API index (try: curl {base})");
    println!("     GET  /health        Health check");
    println!("     GET  /status        Acquisition and mining status");
    println!("     GET  /calibration   Current calibration");
    println!("     POST /mine          Read a batch and mine it");
    println!("     POST /mine/async    Mine a batch in the background");
    println!("     POST /mine/stop     Cancel the running job");
    println!();

    let _forwarder = if continuous {
        miner.start_continuous_mining();
        let handle = super::link_or_warn(link::follow_acquisition(&miner, &acquisition));
        if let Err(e) = acquisition.start_continuous_acquisition(Duration::from_millis(250)) {
            eprintln!("Warning: continuous acquisition not started: {e}");
        }
        handle
    } else {
        None
    };

    let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Error: failed to start async runtime: {e}");
        std::process::exit(1);
    });
    let serve = neuropow_server::run_server(Arc::clone(&acquisition), Arc::clone(&miner), host, port);
    let result = rt.block_on(async {
        tokio::select! {
            r = serve => r,
            _ = wait_for_shutdown(running) => Ok(()),
        }
    });
    if let Err(e) = result {
        eprintln!("Error: server failed on {host}:{port}: {e}");
        std::process::exit(1);
    }
    println!("Shut down.");
}

async fn wait_for_shutdown(running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
