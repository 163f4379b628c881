//! scanboard core library
//! Scan pipeline, reputation providers, scan history and dashboard statistics

pub mod config;
pub mod dashboard;
pub mod error;
pub mod hashing;
pub mod heuristics;
pub mod history;
pub mod providers;
pub mod random;
pub mod reputation;
pub mod scanner;
pub mod session;
pub mod storage;
pub mod subject;

pub use config::{Config, ProviderKind};
pub use error::ScanError;
pub use history::{HistoryStore, RecordOutcome, ScanRecord};
pub use reputation::{ReputationProvider, ScanResult, ScanStats, ThreatLevel};
pub use scanner::{ScanEngine, ScanOutcome, Scanner};
pub use subject::ScanSubject;

/// Crate version, as reported by the CLI
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
