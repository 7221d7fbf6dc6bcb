//! Background thread that periodically removes abandoned pending bookings
use crate::service::BookingService;
use crate::types::TimeStamp;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info};

pub struct Sweeper;

pub struct SweeperHandle {
    stop: Sender<()>,
    join: JoinHandle<()>,
}

impl Sweeper {
    /// Sweep once now and then every `interval` until the handle is stopped.
    /// A failed sweep is logged and retried on the next tick.
    pub fn spawn(service: Arc<BookingService>, interval: Duration) -> std::io::Result<SweeperHandle> {
        let (stop, stopped) = channel::bounded::<()>(1);

        let join = thread::Builder::new()
            .name("booking-sweeper".into())
            .spawn(move || {
                info!(interval_secs = interval.as_secs(), "sweeper started");
                loop {
                    if let Err(err) = service.sweep_stale_pending(&TimeStamp::new()) {
                        error!(error = %err, transient = err.is_transient(), "sweep failed");
                    }
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("sweeper stopped");
            })?;

        Ok(SweeperHandle { stop, join })
    }
}

impl SweeperHandle {
    /// Signal the thread and wait for it to finish its current sweep.
    pub fn stop(self) {
        let _ = self.stop.send(());
        if self.join.join().is_err() {
            error!("sweeper thread panicked");
        }
    }

    /// Block until the thread exits without asking it to stop.
    pub fn wait(self) {
        let SweeperHandle { stop, join } = self;
        if join.join().is_err() {
            error!("sweeper thread panicked");
        }
        drop(stop);
    }
}
