//! Bounded, newest-first scan history

use crate::error::ScanError;
use crate::reputation::{is_infected, ScanMetadata, ScanResult, ThreatLevel};
use crate::scanner::ScanEngine;
use crate::storage::StoragePort;
use crate::subject::{file_type_label, ScanSubject};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Storage key of the persisted history list
pub const HISTORY_KEY: &str = "scanHistory";
/// Most records kept; older ones fall off the end.
pub const MAX_HISTORY: usize = 50;

/// Reputation-provider part of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationSummary {
    pub positives: u32,
    pub total: u32,
    pub detected_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ScanMetadata>,
}

impl From<&ScanResult> for ReputationSummary {
    fn from(result: &ScanResult) -> Self {
        Self {
            positives: result.stats.positives(),
            total: result.stats.total(),
            detected_by: result.detected_by.clone(),
            metadata: result.metadata.clone(),
        }
    }
}

/// Classifier verdict, presented as an ML engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MlVerdict {
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub malware_type: Option<String>,
    pub is_infected: bool,
}

impl From<&ScanResult> for MlVerdict {
    fn from(result: &ScanResult) -> Self {
        let infected = result.is_infected();
        Self {
            confidence: if infected {
                result.detection_rate
            } else {
                100.0 - result.detection_rate
            },
            malware_type: None,
            is_infected: infected,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virustotal: Option<ReputationSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml: Option<MlVerdict>,
}

/// One persisted scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub scan_engine: ScanEngine,
    pub is_infected: bool,
    pub detection_rate: f64,
    pub threat_level: ThreatLevel,
    #[serde(default)]
    pub engine_results: EngineResults,
    pub scan_date: DateTime<Utc>,
}

impl ScanRecord {
    /// Normalize a headline result for persistence.
    pub fn new(
        result: &ScanResult,
        subject: &ScanSubject,
        engine: ScanEngine,
        engine_results: EngineResults,
        scan_date: DateTime<Utc>,
    ) -> Self {
        let (file_name, file_size, file_type) = match subject {
            ScanSubject::File { name, size, .. } => {
                (name.clone(), *size, file_type_label(name).to_string())
            }
            ScanSubject::Url(url) => (
                url.clone(),
                result
                    .metadata
                    .as_ref()
                    .and_then(|m| m.body_length)
                    .unwrap_or(0),
                "URL".to_string(),
            ),
        };
        Self {
            file_name,
            file_size,
            file_type,
            scan_engine: engine,
            is_infected: is_infected(result.detection_rate),
            detection_rate: result.detection_rate,
            threat_level: result.threat_level,
            engine_results,
            scan_date,
        }
    }
}

/// Result of [`HistoryStore::record`]. The record is always returned.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub record: ScanRecord,
    /// Set when the record could not be written
    pub persist_error: Option<ScanError>,
}

/// Scan history on top of a [`StoragePort`]
pub struct HistoryStore {
    storage: Arc<dyn StoragePort>,
    // serializes read-modify-write
    write_lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(storage: Arc<dyn StoragePort>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    /// Record a single result under the engine slot(s) `engine` selects.
    pub fn record(
        &self,
        result: &ScanResult,
        subject: &ScanSubject,
        engine: ScanEngine,
    ) -> RecordOutcome {
        let engine_results = EngineResults {
            virustotal: engine
                .uses_provider()
                .then(|| ReputationSummary::from(result)),
            ml: engine.uses_classifier().then(|| MlVerdict::from(result)),
        };
        self.append(ScanRecord::new(
            result,
            subject,
            engine,
            engine_results,
            Utc::now(),
        ))
    }

    /// Prepend a record, keeping at most [`MAX_HISTORY`].
    pub fn append(&self, record: ScanRecord) -> RecordOutcome {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| {
            log::error!("Mutex poisoned, recovering");
            poisoned.into_inner()
        });

        let existing = match self.read_records() {
            Ok(records) => records,
            Err(e) => {
                // leave unreadable history untouched
                warn!("Scan history not updated: {}", e);
                return RecordOutcome {
                    record,
                    persist_error: Some(e),
                };
            }
        };

        let mut records = Vec::with_capacity(MAX_HISTORY);
        records.push(record.clone());
        records.extend(existing);
        records.truncate(MAX_HISTORY);

        let persist_error = match self.write_records(&records) {
            Ok(()) => {
                info!(
                    "Recorded scan of '{}' ({} entries in history)",
                    record.file_name,
                    records.len()
                );
                None
            }
            Err(e) => {
                warn!("Failed to save scan history: {}", e);
                Some(e)
            }
        };
        RecordOutcome {
            record,
            persist_error,
        }
    }

    /// All records, newest first. Unreadable history reads as empty.
    pub fn load(&self) -> Vec<ScanRecord> {
        self.read_records().unwrap_or_else(|e| {
            warn!("Cannot read scan history: {}", e);
            Vec::new()
        })
    }

    pub fn clear(&self) -> Result<(), ScanError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| {
            log::error!("Mutex poisoned, recovering");
            poisoned.into_inner()
        });
        self.storage.remove(HISTORY_KEY)?;
        info!("Scan history cleared");
        Ok(())
    }

    /// Storage errors propagate; corrupt JSON reads as empty.
    fn read_records(&self) -> Result<Vec<ScanRecord>, ScanError> {
        let Some(data) = self.storage.read(HISTORY_KEY)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<ScanRecord>>(&data) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!("Corrupt scan history discarded: {}", e);
                Ok(Vec::new())
            }
        }
    }

    fn write_records(&self, records: &[ScanRecord]) -> Result<(), ScanError> {
        let data = serde_json::to_string(records)
            .map_err(|e| ScanError::PersistenceFailure(format!("serialize: {}", e)))?;
        self.storage.write(HISTORY_KEY, &data)
    }
}
