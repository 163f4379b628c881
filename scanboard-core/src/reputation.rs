//! Scan result data model, threat classification and the provider interface

use crate::error::ScanError;
use crate::subject::ScanSubject;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Detection rate above which a subject is rated `High`.
pub const HIGH_THRESHOLD: f64 = 60.0;
/// Detection rate above which a subject is rated `Medium`.
pub const MEDIUM_THRESHOLD: f64 = 30.0;
/// Detection rate above which a subject is rated `Low`.
pub const LOW_THRESHOLD: f64 = 5.0;
/// Detection rate above which a subject counts as infected.
///
/// Kept equal to [`LOW_THRESHOLD`] so `is_infected` and `ThreatLevel::Safe`
/// never disagree.
pub const INFECTED_THRESHOLD: f64 = LOW_THRESHOLD;

/// Four-tier severity derived from a detection rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Safe,
    Low,
    Medium,
    High,
}

impl ThreatLevel {
    /// Map a detection rate (percent) onto the severity ladder.
    ///
    /// Rates outside `[0, 100]` are clamped first; NaN is treated as 0.
    pub fn from_detection_rate(rate: f64) -> Self {
        let rate = clamp_rate(rate);
        if rate > HIGH_THRESHOLD {
            ThreatLevel::High
        } else if rate > MEDIUM_THRESHOLD {
            ThreatLevel::Medium
        } else if rate > LOW_THRESHOLD {
            ThreatLevel::Low
        } else {
            ThreatLevel::Safe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Safe => "safe",
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Clamp a percentage into `[0, 100]`, mapping NaN to 0.
pub fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        0.0
    } else {
        rate.clamp(0.0, 100.0)
    }
}

/// True when a detection rate crosses the infection threshold.
pub fn is_infected(rate: f64) -> bool {
    clamp_rate(rate) > INFECTED_THRESHOLD
}

/// Per-category engine counts for one analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub malicious: u32,
    pub suspicious: u32,
    pub undetected: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub harmless: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
}

impl ScanStats {
    /// Engines that flagged the subject (malicious + suspicious).
    pub fn positives(&self) -> u32 {
        self.malicious.saturating_add(self.suspicious)
    }

    /// Engines that returned a verdict. Timeouts are not part of the population.
    pub fn total(&self) -> u32 {
        self.positives()
            .saturating_add(self.harmless.unwrap_or(0))
            .saturating_add(self.undetected)
    }

    /// Percentage of the population that flagged the subject.
    pub fn detection_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        clamp_rate(f64::from(self.positives()) * 100.0 / f64::from(total))
    }
}

/// Provenance details attached to a result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanMetadata {
    pub status_code: u16,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_submission: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_submission: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
}

/// Normalized outcome of one provider scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub detection_rate: f64,
    pub threat_level: ThreatLevel,
    pub stats: ScanStats,
    pub detected_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ScanMetadata>,
}

impl ScanResult {
    /// Build a result from engine counts, deriving rate and level.
    ///
    /// `detected_by` is truncated to the population size.
    pub fn from_stats(
        stats: ScanStats,
        mut detected_by: Vec<String>,
        metadata: Option<ScanMetadata>,
    ) -> Self {
        let detection_rate = stats.detection_rate();
        detected_by.truncate(stats.total() as usize);
        Self {
            detection_rate,
            threat_level: ThreatLevel::from_detection_rate(detection_rate),
            stats,
            detected_by,
            metadata,
        }
    }

    pub fn is_infected(&self) -> bool {
        is_infected(self.detection_rate)
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} detections ({:.2}%, {})",
            self.stats.positives(),
            self.stats.total(),
            self.detection_rate,
            self.threat_level
        )
    }
}

/// Trait for reputation providers (simulated, VirusTotal)
///
/// Implementations are `Send + Sync` because scans run on a session
/// worker thread while the front end reads state concurrently.
pub trait ReputationProvider: Send + Sync {
    /// Provider name for display
    fn name(&self) -> &'static str;

    /// Scan a validated subject
    fn scan(&self, subject: &ScanSubject) -> Result<ScanResult, ScanError>;
}
