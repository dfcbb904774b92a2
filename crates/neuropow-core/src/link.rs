//! Wiring from the acquisition core's batch stream into the mining core.

use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use crate::acquisition::{AcquisitionEvent, SignalAcquisition};
use crate::mining::SignalMiner;

/// Forward every acquired batch to `miner`, which starts a background job if
/// continuous mining is on and it is idle.
///
/// The forwarding thread holds only a weak reference to the miner. It exits
/// when the miner is dropped or the acquisition core goes away.
pub fn follow_acquisition(
    miner: &Arc<SignalMiner>,
    acquisition: &SignalAcquisition,
) -> std::io::Result<JoinHandle<()>> {
    let events = acquisition.subscribe();
    let miner: Weak<SignalMiner> = Arc::downgrade(miner);
    std::thread::Builder::new()
        .name("neuropow-link".into())
        .spawn(move || {
            for event in events {
                let AcquisitionEvent::SignalsAcquired(batch) = event else {
                    continue;
                };
                let Some(miner) = miner.upgrade() else {
                    break;
                };
                if miner.handle_signals(&batch) {
                    log::debug!("started mining job from acquired batch");
                }
            }
            log::debug!("acquisition link closed");
        })
}
