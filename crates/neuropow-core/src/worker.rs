//! Single-thread executor for background mining jobs.
//!
//! One named thread per miner drains a job channel. Jobs run one at a time in
//! submission order. Dropping the sender ends the thread once its current job
//! returns.

use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::MiningError;

/// Owned background executor that runs `handler` on every submitted batch.
pub struct MiningWorker {
    jobs: Option<Sender<Vec<f64>>>,
    handle: Option<JoinHandle<()>>,
}

impl MiningWorker {
    /// Spawn the worker thread. Falls back to a worker that rejects every
    /// job if the OS refuses the thread.
    pub fn spawn<F>(name: &str, handler: F) -> Self
    where
        F: Fn(Vec<f64>) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Vec<f64>>();
        let spawned = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for batch in rx {
                    handler(batch);
                }
            });
        match spawned {
            Ok(handle) => Self {
                jobs: Some(tx),
                handle: Some(handle),
            },
            Err(e) => {
                log::error!("failed to spawn mining worker {name}: {e}");
                Self {
                    jobs: None,
                    handle: None,
                }
            }
        }
    }

    /// Queue a batch for the worker.
    pub fn submit(&self, batch: Vec<f64>) -> Result<(), MiningError> {
        match &self.jobs {
            Some(tx) => tx.send(batch).map_err(|_| MiningError::WorkerUnavailable),
            None => Err(MiningError::WorkerUnavailable),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Close the job queue and wait up to `timeout` for the thread to exit.
    /// Returns false if the thread was left running.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        self.jobs = None;
        let Some(handle) = self.handle.take() else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                log::warn!(
                    "mining worker still busy after {} ms; detaching",
                    timeout.as_millis()
                );
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let _ = handle.join();
        true
    }
}

impl Drop for MiningWorker {
    fn drop(&mut self) {
        self.shutdown(Duration::ZERO);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_jobs_run_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut worker = MiningWorker::spawn("test-worker", move |batch| {
            sink.lock().unwrap().push(batch.len());
        });
        assert!(worker.is_running());
        for n in 1..=3 {
            worker.submit(vec![0.0; n]).unwrap();
        }
        assert!(worker.shutdown(Duration::from_secs(5)));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert!(!worker.is_running());
    }

    #[test]
    fn test_submit_after_shutdown() {
        let mut worker = MiningWorker::spawn("test-worker", |_| {});
        worker.shutdown(Duration::from_secs(5));
        assert!(matches!(
            worker.submit(vec![1.0]),
            Err(MiningError::WorkerUnavailable)
        ));
    }

    #[test]
    fn test_shutdown_times_out_on_busy_job() {
        let mut worker = MiningWorker::spawn("test-worker", |_| {
            std::thread::sleep(Duration::from_millis(300));
        });
        worker.submit(Vec::new()).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(!worker.shutdown(Duration::from_millis(10)));
    }
}
