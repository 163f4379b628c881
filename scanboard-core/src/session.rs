//! Background scan session with a cosmetic progress ticker
//!
//! Each `start` bumps the session epoch. A finished scan is applied to the
//! session state only while its epoch is still current, so a slow scan that
//! was superseded by a newer one can never overwrite the newer result.

use crate::error::ScanError;
use crate::random::{RandomSource, StdRandom};
use crate::scanner::{ScanEngine, ScanOutcome, Scanner};
use crate::subject::ScanSubject;
use crossbeam_channel::{bounded, select, tick, Receiver, RecvTimeoutError};
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(300);
/// The ticker never pushes progress past this; only resolution sets 100.
pub const TICKER_CAP: u8 = 90;
const TICK_STEP_MAX: u32 = 5;

/// Snapshot of what the session currently shows
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub epoch: u64,
    pub scanning: bool,
    /// 0..=100
    pub progress: u8,
    pub outcome: Option<Result<ScanOutcome, ScanError>>,
}

/// How a started scan ended
#[derive(Debug, Clone)]
pub struct ScanResolution {
    pub epoch: u64,
    /// False when a newer scan had already started
    pub applied: bool,
    pub outcome: Result<ScanOutcome, ScanError>,
}

#[derive(Debug)]
pub enum TicketStatus {
    Resolved(ScanResolution),
    Pending,
    /// The worker exited without reporting
    Abandoned,
}

/// Handle to one started scan
pub struct ScanTicket {
    epoch: u64,
    done: Receiver<ScanResolution>,
}

impl ScanTicket {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Block until the scan resolves. `None` if the worker died without reporting.
    pub fn wait(self) -> Option<ScanResolution> {
        self.done.recv().ok()
    }

    /// Wait up to `timeout` for the scan to resolve.
    pub fn poll(&self, timeout: Duration) -> TicketStatus {
        match self.done.recv_timeout(timeout) {
            Ok(resolution) => TicketStatus::Resolved(resolution),
            Err(RecvTimeoutError::Timeout) => TicketStatus::Pending,
            Err(RecvTimeoutError::Disconnected) => TicketStatus::Abandoned,
        }
    }
}

pub struct ScanSession {
    scanner: Arc<Scanner>,
    epoch: Arc<AtomicU64>,
    state: Arc<Mutex<SessionState>>,
    tick_interval: Duration,
}

fn lock_state(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|poisoned| {
        log::error!("Mutex poisoned, recovering");
        poisoned.into_inner()
    })
}

impl ScanSession {
    pub fn new(scanner: Arc<Scanner>) -> Self {
        Self {
            scanner,
            epoch: Arc::new(AtomicU64::new(0)),
            state: Arc::new(Mutex::new(SessionState::default())),
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        lock_state(&self.state).clone()
    }

    pub fn progress(&self) -> u8 {
        lock_state(&self.state).progress
    }

    pub fn is_scanning(&self) -> bool {
        lock_state(&self.state).scanning
    }

    /// Start a scan in the background, superseding any scan in flight.
    pub fn start(&self, subject: ScanSubject, engine: ScanEngine) -> ScanTicket {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = lock_state(&self.state);
            *state = SessionState {
                epoch,
                scanning: true,
                progress: 0,
                outcome: None,
            };
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let ticker = spawn_ticker(
            Arc::clone(&self.state),
            epoch,
            self.tick_interval,
            stop_rx,
        );

        let (done_tx, done_rx) = bounded::<ScanResolution>(1);
        let scanner = Arc::clone(&self.scanner);
        let state = Arc::clone(&self.state);
        let current = Arc::clone(&self.epoch);

        let spawned = thread::Builder::new()
            .name(format!("scan-{}", epoch))
            .spawn(move || {
                let outcome = scanner.scan(&subject, engine);

                // stop and join the ticker before touching progress
                drop(stop_tx);
                if let Some(handle) = ticker {
                    let _ = handle.join();
                }

                let applied = {
                    let mut state = lock_state(&state);
                    if current.load(Ordering::SeqCst) == epoch && state.epoch == epoch {
                        state.progress = 100;
                        state.scanning = false;
                        state.outcome = Some(outcome.clone());
                        true
                    } else {
                        false
                    }
                };
                if !applied {
                    debug!("Scan {} superseded, result dropped", epoch);
                }
                let _ = done_tx.send(ScanResolution {
                    epoch,
                    applied,
                    outcome,
                });
            });
        if let Err(e) = spawned {
            log::error!("Failed to spawn scan worker: {}", e);
            let mut state = lock_state(&self.state);
            if state.epoch == epoch {
                state.scanning = false;
            }
        }

        ScanTicket {
            epoch,
            done: done_rx,
        }
    }
}

fn spawn_ticker(
    state: Arc<Mutex<SessionState>>,
    epoch: u64,
    interval: Duration,
    stop: Receiver<()>,
) -> Option<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("scan-progress-{}", epoch))
        .spawn(move || {
            let mut rng = StdRandom::from_entropy();
            let ticks = tick(interval);
            loop {
                select! {
                    recv(stop) -> _ => break,
                    recv(ticks) -> _ => {
                        let mut state = lock_state(&state);
                        if state.epoch != epoch {
                            break;
                        }
                        state.progress = next_progress(state.progress, &mut rng);
                    }
                }
            }
        })
        .ok()
}

/// One ticker step: +1..=5, never beyond [`TICKER_CAP`].
pub fn next_progress(progress: u8, rng: &mut dyn RandomSource) -> u8 {
    if progress >= TICKER_CAP {
        return progress;
    }
    let step = rng.below(TICK_STEP_MAX) + 1;
    (u32::from(progress) + step).min(u32::from(TICKER_CAP)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::FixedRandom;

    #[test]
    fn ticker_step_is_bounded() {
        assert_eq!(next_progress(0, &mut FixedRandom(0.0)), 1);
        assert_eq!(next_progress(0, &mut FixedRandom(0.99)), 5);
        assert_eq!(next_progress(88, &mut FixedRandom(0.99)), TICKER_CAP);
        assert_eq!(next_progress(TICKER_CAP, &mut FixedRandom(0.5)), TICKER_CAP);
    }
}
