use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use neuropow_core::{MiningError, MiningEvent, MiningResult, SignalMiner, link};

pub struct MineCommandConfig<'a> {
    pub config_path: Option<&'a Path>,
    pub difficulty: Option<u64>,
    pub max_attempts: Option<u64>,
    pub rounds: usize,
    pub continuous: bool,
    pub duration: Duration,
    pub calibration: Option<&'a Path>,
    pub output_path: Option<&'a Path>,
}

/// Interval between acquired batches in continuous mode.
const CONTINUOUS_TICK: Duration = Duration::from_millis(250);

pub fn run(cfg: MineCommandConfig<'_>) {
    let config = super::load_mining_config(cfg.config_path, cfg.difficulty, cfg.max_attempts);
    let acquisition = super::connect_acquisition(cfg.calibration, 100);
    let miner = Arc::new(SignalMiner::new(config.clone()).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }));
    let running = super::install_shutdown(&acquisition, Some(&miner));

    println!("Mining on electrode batches");
    println!("  Difficulty:   {:#018x}", config.difficulty);
    println!("  Max attempts: {}", config.max_attempts);
    println!();

    if cfg.continuous {
        miner.on_event(|event| match event {
            MiningEvent::MiningComplete(r) => print_result(r),
            MiningEvent::DifficultyAdjusted(d) => println!("  difficulty -> {d:#018x}"),
            _ => {}
        });
        miner.start_continuous_mining();
        let forwarder = link::follow_acquisition(&miner, &acquisition).unwrap_or_else(|e| {
            eprintln!("Error: failed to start acquisition link: {e}");
            std::process::exit(1);
        });
        if let Err(e) = acquisition.start_continuous_acquisition(CONTINUOUS_TICK) {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        super::run_for(cfg.duration, &running);
        miner.stop_continuous_mining();
        miner.stop_mining();
        acquisition.disconnect();
        drop(acquisition);
        let _ = forwarder.join();
    } else {
        for round in 1..=cfg.rounds {
            if !running.load(Ordering::SeqCst) {
                break;
            }
            let batch = match acquisition.read_signals() {
                Ok(b) => b,
                Err(e) => {
                    eprintln!("  round {round}: no batch ({e})");
                    continue;
                }
            };
            print!("  round {round}: ");
            match miner.mine(&batch) {
                Ok(r) => print_result(&r),
                Err(MiningError::Cancelled) => {
                    println!("cancelled");
                    break;
                }
                Err(e) => println!("{e}"),
            }
        }
        acquisition.disconnect();
    }

    let stats = miner.stats();
    println!();
    println!("Summary");
    println!("  Total attempts: {}", stats.total_attempts);
    println!("  Solutions:      {}", stats.success_count);
    println!("  Success rate:   {:.6}", stats.success_rate);
    println!("  Hashrate:       {:.0} H/s", stats.hashrate);
    println!("  Difficulty:     {:#018x}", stats.difficulty);

    if let Some(path) = cfg.output_path {
        match serde_json::to_string_pretty(&stats) {
            Ok(json) => match std::fs::write(path, json) {
                Ok(()) => println!("\nStats written to {}", path.display()),
                Err(e) => eprintln!("Error writing {}: {e}", path.display()),
            },
            Err(e) => eprintln!("Error serializing stats: {e}"),
        }
    }
}

fn print_result(r: &MiningResult) {
    if r.success {
        println!(
            "solved in {} attempts ({:.3}s)  nonce {}  hash {}",
            r.attempts, r.compute_time, r.nonce, r.hash
        );
    } else {
        println!(
            "no solution in {} attempts ({:.3}s)  entropy {:.3}",
            r.attempts, r.compute_time, r.signal_contribution
        );
    }
}
