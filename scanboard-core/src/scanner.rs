//! Scan pipeline: validate, run the selected engine(s), record

use crate::config::Config;
use crate::error::ScanError;
use crate::heuristics::{classify_file, classify_url, Classification, SIMULATED_ENGINE_COUNT};
use crate::history::{EngineResults, HistoryStore, MlVerdict, ReputationSummary, ScanRecord};
use crate::providers::{build_provider, random_source};
use crate::random::RandomSource;
use crate::reputation::{ReputationProvider, ScanResult, ScanStats};
use crate::storage::FileStorage;
use crate::subject::{ScanSubject, DEFAULT_MAX_FILE_SIZE};
use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Which engine(s) a scan runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanEngine {
    /// Reputation provider
    VirusTotal,
    /// Heuristic classifier
    Ml,
    #[default]
    Both,
}

impl ScanEngine {
    pub const ALL: [ScanEngine; 3] = [ScanEngine::VirusTotal, ScanEngine::Ml, ScanEngine::Both];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanEngine::VirusTotal => "virustotal",
            ScanEngine::Ml => "ml",
            ScanEngine::Both => "both",
        }
    }

    pub fn uses_provider(&self) -> bool {
        matches!(self, ScanEngine::VirusTotal | ScanEngine::Both)
    }

    pub fn uses_classifier(&self) -> bool {
        matches!(self, ScanEngine::Ml | ScanEngine::Both)
    }
}

impl fmt::Display for ScanEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ScanEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "virustotal" | "vt" => Ok(ScanEngine::VirusTotal),
            "ml" => Ok(ScanEngine::Ml),
            "both" => Ok(ScanEngine::Both),
            other => Err(format!("unknown scan engine '{}'", other)),
        }
    }
}

/// Everything a completed scan produced
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Headline result (higher detection rate when both engines ran)
    pub result: ScanResult,
    pub record: ScanRecord,
    /// Set when the record could not be persisted; the scan still succeeded
    pub persist_error: Option<ScanError>,
}

impl ScanOutcome {
    pub fn ml(&self) -> Option<&MlVerdict> {
        self.record.engine_results.ml.as_ref()
    }
}

/// Present a classification in the same shape as a provider result.
///
/// Rate and level are derived from the engine counts, like any provider result.
fn classification_result(c: &Classification) -> ScanResult {
    let positives = c.positives.min(SIMULATED_ENGINE_COUNT);
    let stats = ScanStats {
        malicious: positives,
        suspicious: 0,
        undetected: SIMULATED_ENGINE_COUNT - positives,
        harmless: Some(0),
        timeout: Some(0),
    };
    ScanResult::from_stats(stats, c.detected_by.clone(), None)
}

fn ml_verdict(c: &Classification) -> MlVerdict {
    MlVerdict {
        confidence: c.confidence(),
        malware_type: c.malware_type().map(str::to_string),
        is_infected: c.is_infected(),
    }
}

/// Runs scans and records them to history
pub struct Scanner {
    provider: Arc<dyn ReputationProvider>,
    rng: Mutex<Box<dyn RandomSource>>,
    history: Arc<HistoryStore>,
    max_file_size: u64,
}

impl Scanner {
    pub fn new(
        provider: Arc<dyn ReputationProvider>,
        rng: Box<dyn RandomSource>,
        history: Arc<HistoryStore>,
    ) -> Self {
        Self {
            provider,
            rng: Mutex::new(rng),
            history,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Provider, random source and file-backed history from configuration.
    pub fn from_config(config: &Config) -> Result<Self, ScanError> {
        let provider = build_provider(config)?;
        let history = Arc::new(HistoryStore::new(Arc::new(FileStorage::new(
            config.history_dir.clone(),
        ))));
        Ok(Self::new(provider, random_source(config), history)
            .with_max_file_size(config.max_file_size))
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    fn classify(&self, subject: &ScanSubject) -> Result<Classification, ScanError> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| {
            log::error!("Mutex poisoned, recovering");
            poisoned.into_inner()
        });
        match subject {
            ScanSubject::File { name, .. } => Ok(classify_file(name, &mut **rng)),
            ScanSubject::Url(url) => classify_url(url, &mut **rng),
        }
    }

    /// Validate, scan and record. Lookup errors propagate and nothing is recorded.
    pub fn scan(&self, subject: &ScanSubject, engine: ScanEngine) -> Result<ScanOutcome, ScanError> {
        subject.validate(self.max_file_size)?;
        let start = Instant::now();
        info!(
            "Scanning '{}' with engine '{}'",
            subject.display_name(),
            engine
        );

        let reputation = if engine.uses_provider() {
            Some(self.provider.scan(subject)?)
        } else {
            None
        };
        let classification = if engine.uses_classifier() {
            Some(self.classify(subject)?)
        } else {
            None
        };

        let ml_result = classification.as_ref().map(classification_result);
        let headline = match (reputation.clone(), ml_result) {
            (Some(rep), Some(ml)) if ml.detection_rate > rep.detection_rate => ml,
            (Some(rep), _) => rep,
            (None, Some(ml)) => ml,
            (None, None) => {
                return Err(ScanError::InputInvalid(format!("engine '{}' ran nothing", engine)))
            }
        };

        let engine_results = EngineResults {
            virustotal: reputation.as_ref().map(ReputationSummary::from),
            ml: classification.as_ref().map(ml_verdict),
        };
        let record = ScanRecord::new(&headline, subject, engine, engine_results, Utc::now());
        let recorded = self.history.append(record);

        info!(
            "Scan of '{}' finished: {:.2}% ({}) in {} ms",
            subject.display_name(),
            headline.detection_rate,
            headline.threat_level,
            start.elapsed().as_millis()
        );
        Ok(ScanOutcome {
            result: headline,
            record: recorded.record,
            persist_error: recorded.persist_error,
        })
    }
}
