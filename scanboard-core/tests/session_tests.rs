//! Scan session tests: progress ticker, resolution and epoch guarding

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};

use scanboard_core::history::HistoryStore;
use scanboard_core::random::FixedRandom;
use scanboard_core::reputation::{ReputationProvider, ScanResult, ScanStats};
use scanboard_core::session::{ScanSession, TicketStatus, TICKER_CAP};
use scanboard_core::storage::MemoryStorage;
use scanboard_core::{ScanEngine, ScanError, ScanSubject, Scanner};

/// First call blocks until released; later calls answer immediately.
struct GatedProvider {
    gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
    fail: bool,
}

impl GatedProvider {
    /// Returns the provider, an "entered" receiver and the release sender.
    fn new(fail: bool) -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = bounded(1);
        let (release_tx, release_rx) = bounded(1);
        let provider = Arc::new(Self {
            gate: Mutex::new(Some((entered_tx, release_rx))),
            fail,
        });
        (provider, entered_rx, release_tx)
    }
}

impl ReputationProvider for GatedProvider {
    fn name(&self) -> &'static str {
        "Gated"
    }

    fn scan(&self, _subject: &ScanSubject) -> Result<ScanResult, ScanError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.recv_timeout(Duration::from_secs(10));
        }
        if self.fail {
            return Err(ScanError::RemoteUnavailable {
                status: Some(503),
                message: "service unavailable".to_string(),
            });
        }
        Ok(ScanResult::from_stats(
            ScanStats {
                malicious: 1,
                suspicious: 0,
                undetected: 9,
                harmless: Some(0),
                timeout: Some(0),
            },
            Vec::new(),
            None,
        ))
    }
}

fn session_with(provider: Arc<GatedProvider>) -> ScanSession {
    let history = Arc::new(HistoryStore::new(Arc::new(MemoryStorage::new())));
    let scanner = Scanner::new(provider, Box::new(FixedRandom(0.0)), history);
    ScanSession::new(Arc::new(scanner)).with_tick_interval(Duration::from_millis(2))
}

#[test]
fn resolved_scan_sets_progress_to_100() {
    let (provider, entered, release) = GatedProvider::new(false);
    let session = session_with(provider);

    let ticket = session.start(ScanSubject::file("a.bin", vec![1]), ScanEngine::VirusTotal);
    assert_eq!(ticket.epoch(), 1);
    entered.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(session.is_scanning());

    release.send(()).unwrap();
    let resolution = ticket.wait().expect("worker reports");
    assert!(resolution.applied);
    assert!(resolution.outcome.is_ok());

    let state = session.state();
    assert_eq!(state.progress, 100);
    assert!(!state.scanning);
    let outcome = state.outcome.unwrap().unwrap();
    assert_eq!(outcome.record.file_name, "a.bin");
}

#[test]
fn ticker_advances_but_never_passes_cap() {
    let (provider, entered, release) = GatedProvider::new(false);
    let session = session_with(provider);

    let ticket = session.start(ScanSubject::file("a.bin", vec![1]), ScanEngine::VirusTotal);
    entered.recv_timeout(Duration::from_secs(5)).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while session.progress() < TICKER_CAP && Instant::now() < deadline {
        assert!(matches!(
            ticket.poll(Duration::from_millis(5)),
            TicketStatus::Pending
        ));
    }
    assert_eq!(session.progress(), TICKER_CAP);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(session.progress(), TICKER_CAP);

    release.send(()).unwrap();
    ticket.wait().unwrap();
    assert_eq!(session.progress(), 100);
}

#[test]
fn superseded_scan_does_not_overwrite_newer_result() {
    let (provider, entered, release) = GatedProvider::new(false);
    let session = session_with(provider);

    let slow = session.start(ScanSubject::file("slow.bin", vec![1]), ScanEngine::VirusTotal);
    entered.recv_timeout(Duration::from_secs(5)).unwrap();

    let fast = session.start(ScanSubject::file("fast.bin", vec![2]), ScanEngine::VirusTotal);
    assert_eq!(session.current_epoch(), 2);
    let fast_resolution = fast.wait().unwrap();
    assert!(fast_resolution.applied);

    release.send(()).unwrap();
    let slow_resolution = slow.wait().unwrap();
    assert_eq!(slow_resolution.epoch, 1);
    assert!(!slow_resolution.applied);
    // the superseded scan still completed and was recorded
    assert_eq!(
        slow_resolution.outcome.unwrap().record.file_name,
        "slow.bin"
    );

    let state = session.state();
    assert_eq!(state.epoch, 2);
    assert_eq!(state.progress, 100);
    let shown = state.outcome.unwrap().unwrap();
    assert_eq!(shown.record.file_name, "fast.bin");
}

#[test]
fn failed_scan_is_applied_as_error() {
    let (provider, entered, release) = GatedProvider::new(true);
    let session = session_with(provider);

    let ticket = session.start(ScanSubject::file("a.bin", vec![1]), ScanEngine::VirusTotal);
    entered.recv_timeout(Duration::from_secs(5)).unwrap();
    release.send(()).unwrap();

    let resolution = ticket.wait().unwrap();
    assert!(resolution.applied);
    assert!(matches!(
        resolution.outcome,
        Err(ScanError::RemoteUnavailable {
            status: Some(503),
            ..
        })
    ));
    let state = session.state();
    assert!(!state.scanning);
    assert!(matches!(state.outcome, Some(Err(_))));
}
