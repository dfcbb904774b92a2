use std::path::{Path, PathBuf};

use neuropow_core::{AcquisitionError, CalibrationError, SignalAcquisition, default_calibration_path};

pub fn run(
    path: Option<&Path>,
    factor: Option<f64>,
    reset: bool,
    amplitude: Option<f64>,
    pulse_ms: Option<f64>,
    frequency: Option<f64>,
) {
    let path: PathBuf = match path {
        Some(p) => p.to_path_buf(),
        None => default_calibration_path().unwrap_or_else(|e| {
            eprintln!("Error: {e}; pass --path");
            std::process::exit(1);
        }),
    };

    // Calibration is edited offline; the array is never connected here.
    let acquisition = SignalAcquisition::simulated();
    match acquisition.load_calibration(Some(&path)) {
        Ok(()) => {}
        Err(AcquisitionError::Calibration(CalibrationError::NotFound { .. })) => {
            println!("No calibration at {}; starting from defaults", path.display());
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }

    let changed = reset
        || factor.is_some()
        || amplitude.is_some()
        || pulse_ms.is_some()
        || frequency.is_some();

    if reset {
        acquisition.reset_calibration();
    }
    if let Some(f) = factor {
        acquisition.adjust_calibration(f);
    }
    if amplitude.is_some() || pulse_ms.is_some() || frequency.is_some() {
        let current = acquisition.stimulation_parameters();
        acquisition.set_stimulation_parameters(
            amplitude.unwrap_or(current.amplitude),
            pulse_ms.unwrap_or(current.duration_ms),
            frequency.unwrap_or(current.frequency_hz),
        );
    }

    if changed {
        match acquisition.save_calibration(Some(&path)) {
            Ok(p) => println!("Saved calibration to {}", p.display()),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }

    let cal = acquisition.calibration();
    println!();
    println!("Calibration ({})", path.display());
    println!("  Gain:           x{:.3}", cal.calibration_factor);
    println!("  Amplitude:      {:.2} V", cal.stimulation.amplitude);
    println!("  Pulse duration: {:.1} ms", cal.stimulation.duration_ms);
    println!("  Frequency:      {:.1} Hz", cal.stimulation.frequency_hz);
    println!("  Updated:        {}", cal.timestamp);
}
