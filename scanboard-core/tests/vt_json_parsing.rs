use scanboard_core::providers::{
    parse_analysis_json, parse_report_json, parse_submission_json, AnalysisState,
};
use scanboard_core::reputation::ThreatLevel;
use scanboard_core::ScanError;

#[test]
fn vt_file_report_with_few_detections_is_low() {
    let result = parse_report_json(include_str!("data/vt_file_report_low.json"))
        .expect("fixture should parse")
        .expect("fixture has an analysis");

    assert_eq!(result.stats.malicious, 5);
    assert_eq!(result.stats.suspicious, 0);
    assert_eq!(result.stats.harmless, Some(60));
    assert_eq!(result.stats.undetected, 3);
    // timeouts are reported but not part of the population
    assert_eq!(result.stats.timeout, Some(2));
    assert_eq!(result.stats.total(), 68);

    assert!((result.detection_rate - 7.35).abs() < 0.01);
    assert_eq!(result.threat_level, ThreatLevel::Low);
    assert!(result.is_infected());
    assert_eq!(
        result.detected_by,
        vec!["Avast", "BitDefender", "ClamAV", "Kaspersky", "Sophos"]
    );

    let meta = result.metadata.expect("metadata");
    assert_eq!(meta.content_type, "application/octet-stream");
    assert_eq!(meta.body_length, Some(68));
    assert_eq!(
        meta.first_submission.as_deref(),
        Some("2023-11-14T22:13:20+00:00")
    );
    assert!(meta.final_url.is_none());
}

#[test]
fn vt_url_report_maps_http_fields() {
    let result = parse_report_json(include_str!("data/vt_url_report.json"))
        .unwrap()
        .unwrap();

    assert_eq!(result.stats.positives(), 44);
    assert_eq!(result.stats.total(), 64);
    assert_eq!(result.threat_level, ThreatLevel::High);
    assert_eq!(result.detected_by, vec!["Fortinet", "Kaspersky", "Sophos"]);

    let meta = result.metadata.unwrap();
    assert_eq!(meta.status_code, 200);
    assert_eq!(meta.content_type, "text/html; charset=utf-8");
    assert_eq!(meta.server_ip.as_deref(), Some("203.0.113.7"));
    assert_eq!(meta.body_length, Some(5120));
    assert_eq!(
        meta.final_url.as_deref(),
        Some("http://paypal-login-verify.tk/account/signin")
    );
    assert_eq!(
        meta.categories,
        Some(vec!["phishing".to_string(), "phishing and fraud".to_string()])
    );
}

#[test]
fn vt_report_without_engines_is_not_terminal() {
    let result = parse_report_json(include_str!("data/vt_file_object_pending.json")).unwrap();
    assert!(result.is_none());
}

#[test]
fn vt_error_body_is_malformed() {
    let err = parse_report_json(include_str!("data/vt_error_not_found.json"))
        .expect_err("error response is not a report");
    assert!(matches!(err, ScanError::MalformedResponse(_)));
    assert!(err.is_lookup_failure());
}

#[test]
fn vt_submission_yields_analysis_id() {
    let id = parse_submission_json(include_str!("data/vt_submission.json")).unwrap();
    assert_eq!(
        id,
        "NjY0MjRlOTFjMDIyYTkyNWM0NjU2NWQzYWNlMzFmZmI6MTcwMDAwMDAwMA=="
    );
}

#[test]
fn vt_submission_without_id_is_malformed() {
    let err = parse_submission_json(r#"{"data":{"type":"analysis"}}"#).unwrap_err();
    assert!(matches!(err, ScanError::MalformedResponse(_)));

    let err = parse_submission_json(r#"{"data":{"type":"analysis","id":""}}"#).unwrap_err();
    assert!(matches!(err, ScanError::MalformedResponse(_)));
}

#[test]
fn vt_queued_analysis_is_pending() {
    let state = parse_analysis_json(include_str!("data/vt_analysis_queued.json")).unwrap();
    assert_eq!(state, AnalysisState::Pending("queued".to_string()));
}

#[test]
fn vt_completed_analysis_aggregates_results() {
    let state = parse_analysis_json(include_str!("data/vt_analysis_completed.json")).unwrap();
    let AnalysisState::Completed(result) = state else {
        panic!("expected completed analysis, got {:?}", state);
    };

    assert_eq!(result.stats.positives(), 48);
    assert_eq!(result.stats.total(), 68);
    assert_eq!(result.threat_level, ThreatLevel::High);
    assert_eq!(result.detected_by, vec!["Avast", "Kaspersky", "Microsoft"]);
    let meta = result.metadata.unwrap();
    assert_eq!(
        meta.body_sha256.as_deref(),
        Some("a3f5c1e0b2d4e6f8a1b3c5d7e9f0a2b4c6d8e0f1a3b5c7d9e1f3a5b7c9d1e3f5")
    );
}

#[test]
fn vt_analysis_without_status_is_malformed() {
    let err = parse_analysis_json(r#"{"data":{"id":"x","attributes":{}}}"#).unwrap_err();
    assert!(matches!(err, ScanError::MalformedResponse(_)));
}
