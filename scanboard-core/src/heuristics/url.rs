use super::{finish, Classification};
use crate::error::ScanError;
use crate::random::RandomSource;
use crate::subject::parse_scan_url;
use reqwest::Url;
use std::net::Ipv4Addr;

/// Top-level domains over-represented in abuse feeds
pub const SUSPICIOUS_TLDS: &[&str] = &[
    "tk", "ml", "ga", "cf", "gq", "xyz", "top", "zip", "click", "work", "loan", "country", "kim",
    "men",
];

/// Brands commonly impersonated by look-alike domains
pub const POPULAR_BRANDS: &[&str] = &[
    "paypal",
    "google",
    "apple",
    "microsoft",
    "amazon",
    "facebook",
    "netflix",
    "instagram",
    "whatsapp",
    "linkedin",
    "dropbox",
    "chase",
    "wellsfargo",
    "bankofamerica",
];

const SUSPICIOUS_KEYWORDS: &[&str] = &[
    "login", "verify", "secure", "account", "update", "confirm", "password", "free", "bonus",
    "hack", "malware", "virus", "crack",
];

const SUSPICIOUS_TLD_SCORE: f64 = 25.0;
const IP_HOST_SCORE: f64 = 20.0;
const NUMERIC_RUN_SCORE: f64 = 10.0;
const NUMERIC_RUN_LEN: usize = 4;
const LONG_HOST_SCORE: f64 = 10.0;
const LONG_HOST_LEN: usize = 30;
const TYPOSQUAT_SCORE: f64 = 30.0;
const KEYWORD_SCORE: f64 = 8.0;
const KEYWORD_CAP: f64 = 24.0;
const PLAIN_HTTP_SCORE: f64 = 5.0;

/// Second-level labels that sit under a ccTLD (`co.uk`, `com.au`, ...)
const SECOND_LEVEL_SUFFIXES: &[&str] = &["co", "com", "org", "net", "gov", "ac", "edu"];

/// Score a URL subject from its scheme, host and path.
pub fn classify_url(raw: &str, rng: &mut dyn RandomSource) -> Result<Classification, ScanError> {
    let url = parse_scan_url(raw)?;
    let host = url
        .host_str()
        .map(|h| h.trim_end_matches('.').to_ascii_lowercase())
        .unwrap_or_default();

    let mut raw_score = 0.0;
    let mut signals = Vec::new();
    let mut family = "Malicious URL";

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();

    if is_ipv4_host(&url) {
        raw_score += IP_HOST_SCORE;
        signals.push("bare IP address host".to_string());
    } else {
        if let Some(tld) = labels.last() {
            if SUSPICIOUS_TLDS.contains(tld) {
                raw_score += SUSPICIOUS_TLD_SCORE;
                signals.push(format!("suspicious TLD '.{}'", tld));
            }
        }
        if longest_digit_run(&host) >= NUMERIC_RUN_LEN {
            raw_score += NUMERIC_RUN_SCORE;
            signals.push("long numeric run in host".to_string());
        }
    }

    if host.len() > LONG_HOST_LEN {
        raw_score += LONG_HOST_SCORE;
        signals.push(format!("long host name ({} chars)", host.len()));
    }

    if let Some(brand) = impersonated_brand(&labels) {
        raw_score += TYPOSQUAT_SCORE;
        signals.push(format!("look-alike of '{}'", brand));
        family = "Phishing";
    }

    let full = url.as_str().to_lowercase();
    let keyword_hits: Vec<&str> = SUSPICIOUS_KEYWORDS
        .iter()
        .copied()
        .filter(|k| full.contains(k))
        .collect();
    if !keyword_hits.is_empty() {
        raw_score += (KEYWORD_SCORE * keyword_hits.len() as f64).min(KEYWORD_CAP);
        signals.push(format!("suspicious keywords: {}", keyword_hits.join(", ")));
    }

    if url.scheme() == "http" {
        raw_score += PLAIN_HTTP_SCORE;
        signals.push("unencrypted http".to_string());
    }

    log::debug!("heuristic URL score for '{}': raw={}", host, raw_score);
    Ok(finish(raw_score, raw_score, signals, family, rng))
}

fn is_ipv4_host(url: &Url) -> bool {
    url.host_str()
        .map(|h| h.parse::<Ipv4Addr>().is_ok())
        .unwrap_or(false)
}

fn longest_digit_run(s: &str) -> usize {
    let mut best = 0;
    let mut current = 0;
    for c in s.chars() {
        if c.is_ascii_digit() {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}

/// Label that identifies the registered domain (`paypal` in `www.paypal.co.uk`).
fn registrable_label<'a>(labels: &[&'a str]) -> Option<&'a str> {
    match labels.len() {
        0 | 1 => labels.first().copied(),
        n => {
            let second = labels[n - 2];
            let tld = labels[n - 1];
            if n >= 3 && tld.len() == 2 && SECOND_LEVEL_SUFFIXES.contains(&second) {
                Some(labels[n - 3])
            } else {
                Some(second)
            }
        }
    }
}

/// Brand whose name appears in the host without being the registered domain.
fn impersonated_brand(labels: &[&str]) -> Option<&'static str> {
    let registered = registrable_label(labels)?;
    let host = labels.join(".");
    POPULAR_BRANDS
        .iter()
        .copied()
        .find(|brand| host.contains(brand) && registered != *brand)
}
