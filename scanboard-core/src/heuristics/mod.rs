//! Heuristic classifier: synthetic detection statistics from names and URLs
//!
//! Nothing here inspects content. File subjects are scored from their
//! extension and name, URL subjects from their host and path. The score is
//! treated as a detection rate and run through the same threat ladder as
//! real provider results, so simulated and live scans are interchangeable.

mod file;
mod url;

pub use file::{classify_file, FileRisk, HIGH_RISK_EXTENSIONS, MEDIUM_RISK_EXTENSIONS, SAFE_EXTENSIONS};
pub use url::{classify_url, POPULAR_BRANDS, SUSPICIOUS_TLDS};

use crate::random::{sample_distinct, RandomSource};
use crate::reputation::{clamp_rate, ThreatLevel, LOW_THRESHOLD};

/// Size of the simulated engine population behind a heuristic score
pub const SIMULATED_ENGINE_COUNT: u32 = 70;

/// Upper bound (exclusive) of the jitter added to non-zero scores
pub const JITTER_MAX: f64 = 10.0;

/// Engines a simulated scan may attribute detections to
pub const VENDOR_ROSTER: [&str; 15] = [
    "McAfee",
    "Symantec",
    "Kaspersky",
    "BitDefender",
    "Avast",
    "ESET-NOD32",
    "F-Secure",
    "Sophos",
    "TrendMicro",
    "ClamAV",
    "Microsoft",
    "Avira",
    "Fortinet",
    "Malwarebytes",
    "Panda",
];

/// Output of the heuristic classifier
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Category base before name/keyword bonuses and jitter
    pub base_score: f64,
    /// Final score, used as the detection rate
    pub detection_rate: f64,
    pub threat_level: ThreatLevel,
    /// Flagging engines out of [`SIMULATED_ENGINE_COUNT`]
    pub positives: u32,
    pub detected_by: Vec<String>,
    /// Human-readable reasons that contributed to the score
    pub signals: Vec<String>,
    /// Family label reported when the subject is flagged
    pub family: &'static str,
}

impl Classification {
    pub fn is_infected(&self) -> bool {
        self.threat_level != ThreatLevel::Safe
    }

    /// Family label when flagged, `None` for clean subjects
    pub fn malware_type(&self) -> Option<&'static str> {
        self.is_infected().then_some(self.family)
    }

    /// Classifier confidence in its own verdict (percent)
    pub fn confidence(&self) -> f64 {
        if self.is_infected() {
            self.detection_rate
        } else {
            100.0 - self.detection_rate
        }
    }
}

/// Shared tail of both classifiers: jitter, clamp, tiering and vendor sampling.
fn finish(
    base_score: f64,
    raw_score: f64,
    signals: Vec<String>,
    family: &'static str,
    rng: &mut dyn RandomSource,
) -> Classification {
    let mut score = raw_score;
    if raw_score > 0.0 {
        score += rng.range_f64(0.0, JITTER_MAX);
    }
    let detection_rate = clamp_rate(score);
    let threat_level = ThreatLevel::from_detection_rate(detection_rate);
    let positives =
        (detection_rate * f64::from(SIMULATED_ENGINE_COUNT) / 100.0).round() as u32;

    let detected_by = if detection_rate > LOW_THRESHOLD {
        let roster = VENDOR_ROSTER.len();
        let wanted = ((detection_rate / 100.0) * roster as f64).round() as usize;
        let count = wanted.clamp(1, roster).min(positives as usize);
        sample_distinct(rng, &VENDOR_ROSTER, count)
            .into_iter()
            .map(str::to_string)
            .collect()
    } else {
        Vec::new()
    };

    Classification {
        base_score,
        detection_rate,
        threat_level,
        positives,
        detected_by,
        signals,
        family,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::FixedRandom;

    #[test]
    fn zero_score_skips_jitter_and_vendors() {
        let c = finish(0.0, 0.0, Vec::new(), "Clean", &mut FixedRandom(0.9));
        assert_eq!(c.detection_rate, 0.0);
        assert_eq!(c.positives, 0);
        assert!(c.detected_by.is_empty());
        assert_eq!(c.malware_type(), None);
        assert_eq!(c.confidence(), 100.0);
    }

    #[test]
    fn vendor_count_never_exceeds_positives() {
        for raw in [5.5, 6.0, 12.0, 45.0, 80.0, 150.0] {
            let c = finish(raw, raw, Vec::new(), "Trojan", &mut FixedRandom(0.0));
            assert!(c.detected_by.len() as u32 <= c.positives, "raw {}", raw);
            assert!(c.detected_by.len() <= VENDOR_ROSTER.len());
        }
    }

    #[test]
    fn score_is_clamped() {
        let c = finish(60.0, 140.0, Vec::new(), "Trojan", &mut FixedRandom(0.5));
        assert_eq!(c.detection_rate, 100.0);
        assert_eq!(c.positives, SIMULATED_ENGINE_COUNT);
        assert_eq!(c.detected_by.len(), VENDOR_ROSTER.len());
    }
}
