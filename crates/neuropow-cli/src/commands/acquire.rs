use std::path::Path;
use std::time::Duration;

use neuropow_core::{AcquisitionEvent, best_electrodes, shannon_entropy, signal_statistics};

pub struct AcquireCommandConfig<'a> {
    pub duration: Duration,
    pub interval: Duration,
    pub calibration: Option<&'a Path>,
    pub connect_delay_ms: u64,
    pub json: bool,
}

pub fn run(cfg: AcquireCommandConfig<'_>) {
    let acquisition = super::connect_acquisition(cfg.calibration, cfg.connect_delay_ms);
    let running = super::install_shutdown(&acquisition, None);
    let info = acquisition.source_info();

    println!("Acquiring from {} ({})", info.name, info.description);
    println!("  Calibration: x{:.3}", acquisition.calibration_factor());
    println!(
        "  Interval:    {} ms for {:.1}s",
        cfg.interval.as_millis(),
        cfg.duration.as_secs_f64()
    );
    println!();

    let json = cfg.json;
    acquisition.on_event(move |event| {
        if let AcquisitionEvent::SignalsAcquired(batch) = event {
            if json {
                println!("{}", serde_json::json!({ "batch": batch }));
            } else {
                println!(
                    "  batch  entropy {:.3} bits  top electrodes {:?}",
                    shannon_entropy(batch),
                    best_electrodes(batch, 3)
                );
            }
        }
    });

    if let Err(e) = acquisition.start_continuous_acquisition(cfg.interval) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    super::run_for(cfg.duration, &running);
    acquisition.stop_continuous_acquisition();

    let stats = acquisition.stats();
    println!();
    println!("Summary");
    println!("  Batches read:     {}", stats.reads);
    println!("  Rejected batches: {}", stats.rejected_batches);
    println!("  Ticks coalesced:  {}", stats.ticks_coalesced);
    println!("  Signal quality:   {:.3}", acquisition.signal_quality());
    if let Some(s) = signal_statistics(&acquisition.last_batch()) {
        println!(
            "  Last batch:       mean {:.4}  var {:.4}  range [{:.3}, {:.3}]",
            s.mean, s.variance, s.min, s.max
        );
    }
    if let Some(err) = acquisition.last_error() {
        println!("  Last error:       {err}");
    }
    acquisition.disconnect();
}
