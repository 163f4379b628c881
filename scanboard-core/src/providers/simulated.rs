//! Simulated reputation provider backed by the heuristic classifier

use crate::error::ScanError;
use crate::heuristics::{classify_file, classify_url, Classification, SIMULATED_ENGINE_COUNT};
use crate::random::RandomSource;
use crate::reputation::{ReputationProvider, ScanMetadata, ScanResult, ScanStats};
use crate::subject::{parse_scan_url, ScanSubject};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Mutex;

const URL_CATEGORIES: [&str; 3] = ["phishing", "malware", "suspicious"];

/// Fabricates plausible engine statistics from a heuristic classification
pub struct SimulatedProvider {
    rng: Mutex<Box<dyn RandomSource>>,
}

impl SimulatedProvider {
    pub fn new(rng: Box<dyn RandomSource>) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut dyn RandomSource) -> T) -> T {
        let mut guard = self.rng.lock().unwrap_or_else(|poisoned| {
            log::error!("Mutex poisoned, recovering");
            poisoned.into_inner()
        });
        f(&mut **guard)
    }
}

/// Spread a classification over the simulated engine population.
fn simulated_stats(c: &Classification, rng: &mut dyn RandomSource) -> ScanStats {
    let positives = c.positives.min(SIMULATED_ENGINE_COUNT);
    let suspicious = rng.below(positives / 4 + 1).min(positives);
    let remaining = SIMULATED_ENGINE_COUNT - positives;
    let undetected = rng.below(remaining / 3 + 1).min(remaining);
    ScanStats {
        malicious: positives - suspicious,
        suspicious,
        undetected,
        harmless: Some(remaining - undetected),
        timeout: Some(0),
    }
}

impl ReputationProvider for SimulatedProvider {
    fn name(&self) -> &'static str {
        "Simulated"
    }

    fn scan(&self, subject: &ScanSubject) -> Result<ScanResult, ScanError> {
        let now = Utc::now();
        self.with_rng(|rng| match subject {
            ScanSubject::File {
                name,
                size,
                content_type,
                ..
            } => {
                let c = classify_file(name, rng);
                let stats = simulated_stats(&c, rng);
                let metadata = ScanMetadata {
                    status_code: 200,
                    content_type: content_type
                        .clone()
                        .unwrap_or_else(|| "application/octet-stream".to_string()),
                    first_submission: Some((now - ChronoDuration::days(30)).to_rfc3339()),
                    last_submission: Some(now.to_rfc3339()),
                    last_analysis: Some(now.to_rfc3339()),
                    body_length: Some(*size),
                    body_sha256: subject.sha256(),
                    ..ScanMetadata::default()
                };
                log::debug!("simulated file scan '{}': {:?}", name, c.signals);
                Ok(ScanResult::from_stats(stats, c.detected_by, Some(metadata)))
            }
            ScanSubject::Url(raw) => {
                let c = classify_url(raw, rng)?;
                let stats = simulated_stats(&c, rng);
                let final_url = parse_scan_url(raw)?.to_string();
                let categories = if !c.is_infected() {
                    vec!["safe".to_string()]
                } else if c.family == "Phishing" {
                    vec!["phishing".to_string()]
                } else {
                    let pick = rng.below(URL_CATEGORIES.len() as u32) as usize;
                    vec![URL_CATEGORIES[pick].to_string()]
                };
                let metadata = ScanMetadata {
                    status_code: 200,
                    content_type: "text/html".to_string(),
                    first_submission: Some((now - ChronoDuration::days(15)).to_rfc3339()),
                    last_submission: Some(now.to_rfc3339()),
                    last_analysis: Some(now.to_rfc3339()),
                    server_ip: Some(format!(
                        "192.168.{}.{}",
                        rng.below(255),
                        rng.below(255)
                    )),
                    body_length: Some(raw.len() as u64),
                    categories: Some(categories),
                    final_url: Some(final_url),
                    ..ScanMetadata::default()
                };
                log::debug!("simulated URL scan '{}': {:?}", raw, c.signals);
                Ok(ScanResult::from_stats(stats, c.detected_by, Some(metadata)))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::{FixedRandom, StdRandom};
    use crate::reputation::ThreatLevel;

    #[test]
    fn safe_file_has_clean_stats() {
        let provider = SimulatedProvider::new(Box::new(FixedRandom(0.5)));
        let result = provider
            .scan(&ScanSubject::file("invoice.pdf", b"%PDF-1.7".to_vec()))
            .unwrap();
        assert_eq!(result.detection_rate, 0.0);
        assert_eq!(result.threat_level, ThreatLevel::Safe);
        assert!(result.detected_by.is_empty());
        assert_eq!(result.stats.total(), SIMULATED_ENGINE_COUNT);
        let meta = result.metadata.unwrap();
        assert_eq!(meta.body_length, Some(8));
        assert_eq!(meta.content_type, "application/octet-stream");
    }

    #[test]
    fn stats_always_sum_to_population() {
        let provider = SimulatedProvider::new(Box::new(StdRandom::seeded(3)));
        for name in ["a.exe", "b.zip", "c.txt", "d.unknown", "patch-crack.exe", "noext"] {
            let result = provider.scan(&ScanSubject::file(name, vec![0; 4])).unwrap();
            assert_eq!(result.stats.total(), SIMULATED_ENGINE_COUNT, "{}", name);
            assert!(result.detected_by.len() as u32 <= result.stats.positives());
            assert_eq!(
                result.threat_level,
                ThreatLevel::from_detection_rate(result.detection_rate)
            );
        }
    }

    #[test]
    fn phishing_url_is_categorized() {
        let provider = SimulatedProvider::new(Box::new(FixedRandom(0.5)));
        let result = provider
            .scan(&ScanSubject::url("http://paypal-login-verify.tk/account"))
            .unwrap();
        assert_eq!(result.threat_level, ThreatLevel::High);
        let meta = result.metadata.unwrap();
        assert_eq!(meta.categories, Some(vec!["phishing".to_string()]));
        assert_eq!(
            meta.final_url.as_deref(),
            Some("http://paypal-login-verify.tk/account")
        );
    }

    #[test]
    fn malformed_url_is_input_error() {
        let provider = SimulatedProvider::new(Box::new(FixedRandom(0.5)));
        let err = provider.scan(&ScanSubject::url("::nope::")).unwrap_err();
        assert!(matches!(err, ScanError::InputInvalid(_)));
    }
}
