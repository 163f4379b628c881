use proptest::prelude::*;

use scanboard_core::heuristics::{
    classify_file, classify_url, FileRisk, HIGH_RISK_EXTENSIONS, SAFE_EXTENSIONS,
    SIMULATED_ENGINE_COUNT, VENDOR_ROSTER,
};
use scanboard_core::random::{FixedRandom, StdRandom};
use scanboard_core::reputation::ThreatLevel;
use scanboard_core::ScanError;

#[test]
fn safe_invoice_pdf_is_clean() {
    let c = classify_file("invoice.pdf", &mut StdRandom::seeded(1));
    assert_eq!(c.detection_rate, 0.0);
    assert_eq!(c.threat_level, ThreatLevel::Safe);
    assert!(c.detected_by.is_empty());
    assert_eq!(c.positives, 0);
}

#[test]
fn cracked_executable_is_high_with_bounded_vendors() {
    for seed in 0..20 {
        let c = classify_file("patch-crack.exe", &mut StdRandom::seeded(seed));
        assert_eq!(c.base_score, 60.0);
        assert!(c.detection_rate >= 80.0 && c.detection_rate < 90.0);
        assert_eq!(c.threat_level, ThreatLevel::High);
        assert!(!c.detected_by.is_empty());
        assert!(c.detected_by.len() as u32 <= c.positives);
        assert!(c.positives <= SIMULATED_ENGINE_COUNT);
        for vendor in &c.detected_by {
            assert!(VENDOR_ROSTER.contains(&vendor.as_str()));
        }
        let mut unique = c.detected_by.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), c.detected_by.len(), "vendors drawn without replacement");
        assert_eq!(c.malware_type(), Some("Trojan"));
    }
}

#[test]
fn safe_extensions_ignore_name_content() {
    for ext in SAFE_EXTENSIONS {
        let name = format!("free-download-keygen-crack.{}", ext);
        let c = classify_file(&name, &mut FixedRandom(0.99));
        assert_eq!(c.detection_rate, 0.0, "{}", name);
        assert_eq!(c.threat_level, ThreatLevel::Safe, "{}", name);
    }
}

#[test]
fn high_risk_base_without_markers() {
    for ext in HIGH_RISK_EXTENSIONS {
        let name = format!("setup.{}", ext);
        assert_eq!(FileRisk::of_name(&name), FileRisk::High);
        let c = classify_file(&name, &mut FixedRandom(0.0));
        assert_eq!(c.base_score, 60.0, "{}", name);
        let c = classify_file(&name, &mut FixedRandom(0.99));
        assert!(c.detection_rate >= 60.0 && c.detection_rate < 70.0, "{}", name);
    }
}

#[test]
fn typosquat_phishing_url_is_high() {
    let c = classify_url("http://paypal-login-verify.tk/account", &mut FixedRandom(0.0)).unwrap();
    // tld 25 + typosquat 30 + keywords 24 + http 5
    assert_eq!(c.detection_rate, 84.0);
    assert_eq!(c.threat_level, ThreatLevel::High);
    assert_eq!(c.malware_type(), Some("Phishing"));
}

#[test]
fn plain_https_url_is_safe() {
    let c = classify_url("https://www.rust-lang.org/learn", &mut FixedRandom(0.9)).unwrap();
    assert_eq!(c.detection_rate, 0.0);
    assert_eq!(c.threat_level, ThreatLevel::Safe);
}

#[test]
fn ip_host_url_scores_ip_signal() {
    let c = classify_url("http://192.168.10.20/download", &mut FixedRandom(0.0)).unwrap();
    // ip 20 + http 5; the digit-run signal does not apply to IP hosts
    assert_eq!(c.detection_rate, 25.0);
    assert_eq!(c.threat_level, ThreatLevel::Low);
}

#[test]
fn brand_owned_domain_is_not_typosquat() {
    let c = classify_url("https://www.paypal.com/", &mut FixedRandom(0.0)).unwrap();
    assert_eq!(c.detection_rate, 0.0);
}

#[test]
fn malformed_urls_are_rejected() {
    for raw in ["not a url", "ftp://example.com/file", "", "http://"] {
        let err = classify_url(raw, &mut FixedRandom(0.0)).unwrap_err();
        assert!(matches!(err, ScanError::InputInvalid(_)), "{}", raw);
    }
}

proptest! {
    #[test]
    fn threat_level_is_monotonic(a in 0.0f64..=100.0, b in 0.0f64..=100.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(ThreatLevel::from_detection_rate(lo) <= ThreatLevel::from_detection_rate(hi));
    }

    #[test]
    fn classifier_output_is_consistent(name in "[a-z\\-]{1,12}\\.(exe|zip|pdf|xyz|js|doc)", seed in any::<u64>()) {
        let c = classify_file(&name, &mut StdRandom::seeded(seed));
        prop_assert!((0.0..=100.0).contains(&c.detection_rate));
        prop_assert_eq!(c.threat_level, ThreatLevel::from_detection_rate(c.detection_rate));
        prop_assert!(c.detected_by.len() as u32 <= c.positives);
        prop_assert!(c.detected_by.len() <= VENDOR_ROSTER.len());
    }
}
