//! VirusTotal v3 reputation provider (report lookup, submission and analysis polling)

use crate::config::Config;
use crate::error::ScanError;
use crate::hashing::{is_valid_sha256, sha256_hex};
use crate::reputation::{ReputationProvider, ScanMetadata, ScanResult, ScanStats};
use crate::subject::{parse_scan_url, ScanSubject};
use chrono::{TimeZone, Utc};
use log::{debug, info, warn};
use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const RATE_LIMIT_COOLDOWN_SECS: u64 = 60;
/// Files above this size must go through `/files/upload_url`.
const DIRECT_UPLOAD_LIMIT: u64 = 32 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct VtResponse {
    data: VtObject,
    #[serde(default)]
    meta: Option<VtMeta>,
}

#[derive(Debug, Deserialize)]
struct VtObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    attributes: VtAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct VtAttributes {
    // file / url objects
    last_analysis_stats: Option<VtAnalysisStats>,
    #[serde(default)]
    last_analysis_results: BTreeMap<String, VtEngineVerdict>,
    last_analysis_date: Option<i64>,
    first_submission_date: Option<i64>,
    last_submission_date: Option<i64>,
    sha256: Option<String>,
    size: Option<u64>,
    // url objects
    last_final_url: Option<String>,
    last_http_response_code: Option<u16>,
    last_http_response_content_length: Option<u64>,
    last_http_response_content_sha256: Option<String>,
    #[serde(default)]
    last_http_response_headers: BTreeMap<String, String>,
    #[serde(default)]
    categories: BTreeMap<String, String>,
    last_serving_ip_address: Option<String>,
    // analysis objects
    status: Option<String>,
    stats: Option<VtAnalysisStats>,
    #[serde(default)]
    results: BTreeMap<String, VtEngineVerdict>,
    date: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct VtAnalysisStats {
    #[serde(default)]
    malicious: u32,
    #[serde(default)]
    suspicious: u32,
    #[serde(default)]
    undetected: u32,
    #[serde(default)]
    harmless: u32,
    #[serde(default)]
    timeout: u32,
}

impl From<VtAnalysisStats> for ScanStats {
    fn from(s: VtAnalysisStats) -> Self {
        ScanStats {
            malicious: s.malicious,
            suspicious: s.suspicious,
            undetected: s.undetected,
            harmless: Some(s.harmless),
            timeout: Some(s.timeout),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct VtEngineVerdict {
    category: String,
    #[serde(default)]
    #[allow(dead_code)]
    result: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VtMeta {
    file_info: Option<VtFileInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct VtFileInfo {
    sha256: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VtUploadUrl {
    data: String,
}

/// State of a polled analysis
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisState {
    /// Still queued or running (raw VirusTotal status)
    Pending(String),
    Completed(ScanResult),
}

fn unix_to_rfc3339(ts: Option<i64>) -> Option<String> {
    ts.and_then(|t| Utc.timestamp_opt(t, 0).single())
        .map(|dt| dt.to_rfc3339())
}

/// Engines whose category is malicious or suspicious, in name order.
fn flagged_vendors(results: &BTreeMap<String, VtEngineVerdict>) -> Vec<String> {
    results
        .iter()
        .filter(|(_, v)| v.category == "malicious" || v.category == "suspicious")
        .map(|(name, _)| name.clone())
        .collect()
}

fn parse_json<T: DeserializeOwned>(json: &str) -> Result<T, ScanError> {
    serde_json::from_str(json).map_err(|e| ScanError::MalformedResponse(format!("{}", e)))
}

fn object_metadata(attrs: &VtAttributes, content_type: Option<&str>) -> ScanMetadata {
    let is_url_object = attrs.last_final_url.is_some() || attrs.last_http_response_code.is_some();
    let header_content_type = attrs
        .last_http_response_headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| v.clone());

    let mut categories: Vec<String> = attrs.categories.values().cloned().collect();
    categories.sort();
    categories.dedup();

    ScanMetadata {
        status_code: attrs.last_http_response_code.unwrap_or(200),
        content_type: header_content_type
            .or_else(|| content_type.map(str::to_string))
            .unwrap_or_else(|| {
                if is_url_object {
                    "text/html".to_string()
                } else {
                    "application/octet-stream".to_string()
                }
            }),
        first_submission: unix_to_rfc3339(attrs.first_submission_date),
        last_submission: unix_to_rfc3339(attrs.last_submission_date),
        last_analysis: unix_to_rfc3339(attrs.last_analysis_date),
        server_ip: attrs.last_serving_ip_address.clone(),
        body_length: attrs.last_http_response_content_length.or(attrs.size),
        body_sha256: attrs
            .last_http_response_content_sha256
            .clone()
            .or_else(|| attrs.sha256.clone()),
        categories: (!categories.is_empty()).then_some(categories),
        final_url: attrs.last_final_url.clone(),
    }
}

/// Map a `/files/{id}` or `/urls/{id}` report onto a result.
///
/// Returns `Ok(None)` when the object exists but has no analysis yet.
#[doc(hidden)]
pub fn parse_report_json(json: &str) -> Result<Option<ScanResult>, ScanError> {
    let resp: VtResponse = parse_json(json)?;
    let attrs = &resp.data.attributes;
    let Some(stats) = attrs.last_analysis_stats else {
        return Ok(None);
    };
    let stats = ScanStats::from(stats);
    if stats.total() == 0 {
        return Ok(None);
    }
    let vendors = flagged_vendors(&attrs.last_analysis_results);
    let metadata = object_metadata(attrs, None);
    Ok(Some(ScanResult::from_stats(stats, vendors, Some(metadata))))
}

/// Map an `/analyses/{id}` response onto a pending or completed state.
#[doc(hidden)]
pub fn parse_analysis_json(json: &str) -> Result<AnalysisState, ScanError> {
    let resp: VtResponse = parse_json(json)?;
    let attrs = &resp.data.attributes;
    let status = attrs
        .status
        .clone()
        .ok_or_else(|| ScanError::MalformedResponse("analysis has no status".to_string()))?;
    if status != "completed" {
        return Ok(AnalysisState::Pending(status));
    }

    let stats = ScanStats::from(attrs.stats.unwrap_or_default());
    let vendors = flagged_vendors(&attrs.results);
    let date = unix_to_rfc3339(attrs.date);
    let metadata = ScanMetadata {
        status_code: 200,
        content_type: "application/octet-stream".to_string(),
        first_submission: date.clone(),
        last_submission: date.clone(),
        last_analysis: date,
        body_sha256: resp
            .meta
            .and_then(|m| m.file_info)
            .and_then(|f| f.sha256),
        ..ScanMetadata::default()
    };
    Ok(AnalysisState::Completed(ScanResult::from_stats(
        stats,
        vendors,
        Some(metadata),
    )))
}

/// Extract the analysis id from a submission response.
#[doc(hidden)]
pub fn parse_submission_json(json: &str) -> Result<String, ScanError> {
    let resp: VtResponse = parse_json(json)?;
    resp.data
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ScanError::MalformedResponse("submission returned no analysis id".into()))
}

/// VirusTotal provider with rate limiting and bounded analysis polling
pub struct VirusTotalProvider {
    api_key: Arc<Mutex<Option<String>>>,
    base_url: String,
    client: Client,
    poll_interval: Duration,
    max_attempts: u32,
    rate_limit_until: Arc<Mutex<Option<Instant>>>,
}

impl VirusTotalProvider {
    /// Create a provider against `base_url` (e.g. `https://www.virustotal.com/api/v3`).
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ScanError> {
        Self::with_timeout(
            base_url,
            api_key,
            Duration::from_secs(crate::config::DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    fn with_timeout(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ScanError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScanError::remote(None, format!("http build error: {}", e)))?;
        let provider = Self {
            api_key: Arc::new(Mutex::new(None)),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            poll_interval: Duration::from_millis(crate::config::DEFAULT_POLL_INTERVAL_MS),
            max_attempts: crate::config::DEFAULT_MAX_ATTEMPTS,
            rate_limit_until: Arc::new(Mutex::new(None)),
        };
        if let Some(key) = api_key {
            provider.set_api_key(key);
        }
        Ok(provider)
    }

    pub fn from_config(config: &Config) -> Result<Self, ScanError> {
        let provider = Self::with_timeout(
            config.base_url.clone(),
            config.api_key().map(str::to_string),
            config.request_timeout(),
        )?;
        Ok(provider.with_polling(config.poll_interval(), config.max_attempts))
    }

    /// Override the polling cadence; at least one poll is always made.
    pub fn with_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Update the API key at runtime
    pub fn set_api_key(&self, key: String) {
        if let Ok(mut api_key) = self.api_key.lock() {
            let key = key.trim().to_string();
            if key.is_empty() {
                *api_key = None;
            } else {
                *api_key = Some(key);
            }
        }
    }

    /// Get the current API key
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key.lock().ok().and_then(|ak| ak.clone())
    }

    fn require_key(&self) -> Result<String, ScanError> {
        self.get_api_key()
            .ok_or(ScanError::NotConfigured("VirusTotal"))
    }

    fn is_rate_limited(&self) -> bool {
        if let Ok(rate_limit) = self.rate_limit_until.lock() {
            if let Some(until) = *rate_limit {
                if Instant::now() < until {
                    return true;
                }
            }
        }
        false
    }

    fn set_rate_limited(&self) {
        if let Ok(mut rate_limit) = self.rate_limit_until.lock() {
            *rate_limit = Some(Instant::now() + Duration::from_secs(RATE_LIMIT_COOLDOWN_SECS));
        }
    }

    /// Send a request, mapping transport failures to `RemoteUnavailable`.
    fn send(&self, req: RequestBuilder, what: &str) -> Result<Response, ScanError> {
        if self.is_rate_limited() {
            return Err(ScanError::remote(Some(429), "rate limited (cooling down)"));
        }
        let start = Instant::now();
        let resp = req.send().map_err(|e| {
            let kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connection error"
            } else {
                "request error"
            };
            warn!("VirusTotal {} {}: {}", what, kind, e);
            ScanError::remote(None, format!("{}: {}", kind, e))
        })?;
        debug!(
            "VirusTotal {} HTTP {} ({} ms)",
            what,
            resp.status().as_u16(),
            start.elapsed().as_millis()
        );
        Ok(resp)
    }

    /// Read a successful body, or turn a non-success status into an error.
    fn read_body(&self, resp: Response, what: &str) -> Result<String, ScanError> {
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = resp.text().unwrap_or_default();
            warn!(
                "VirusTotal {} rate limited (429). body: {}",
                what,
                body.chars().take(512).collect::<String>()
            );
            self.set_rate_limited();
            return Err(ScanError::remote(Some(429), "rate limited"));
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            warn!(
                "VirusTotal {} HTTP {}. body: {}",
                what,
                status.as_u16(),
                body.chars().take(512).collect::<String>()
            );
            return Err(ScanError::remote(
                Some(status.as_u16()),
                format!("{} failed: HTTP {}", what, status),
            ));
        }
        resp.text()
            .map_err(|e| ScanError::remote(Some(status.as_u16()), format!("read error: {}", e)))
    }

    /// GET a report object; `Ok(None)` on 404.
    fn get_report(&self, path: &str, key: &str) -> Result<Option<String>, ScanError> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self.send(self.client.get(&url).header("x-apikey", key), "report lookup")?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        self.read_body(resp, "report lookup").map(Some)
    }

    /// Look up an existing file report by SHA-256.
    pub fn lookup_file_report(&self, sha256: &str) -> Result<Option<ScanResult>, ScanError> {
        if !is_valid_sha256(sha256) {
            return Err(ScanError::InputInvalid("Invalid SHA256 hash".to_string()));
        }
        let key = self.require_key()?;
        match self.get_report(&format!("files/{}", sha256.to_ascii_lowercase()), &key)? {
            Some(body) => parse_report_json(&body),
            None => Ok(None),
        }
    }

    fn submit_file(&self, name: &str, bytes: &[u8], key: &str) -> Result<String, ScanError> {
        let target = if bytes.len() as u64 > DIRECT_UPLOAD_LIMIT {
            let url = format!("{}/files/upload_url", self.base_url);
            let resp = self.send(self.client.get(&url).header("x-apikey", key), "upload url")?;
            let body = self.read_body(resp, "upload url")?;
            let upload: VtUploadUrl = parse_json(&body)?;
            upload.data
        } else {
            format!("{}/files", self.base_url)
        };

        let part = multipart::Part::bytes(bytes.to_vec()).file_name(name.to_string());
        let form = multipart::Form::new().part("file", part);
        let resp = self.send(
            self.client
                .post(&target)
                .header("x-apikey", key)
                .multipart(form),
            "file upload",
        )?;
        let body = self.read_body(resp, "file upload")?;
        parse_submission_json(&body)
    }

    fn submit_url(&self, url: &str, key: &str) -> Result<String, ScanError> {
        let endpoint = format!("{}/urls", self.base_url);
        let resp = self.send(
            self.client
                .post(&endpoint)
                .header("x-apikey", key)
                .form(&[("url", url)]),
            "url submit",
        )?;
        let body = self.read_body(resp, "url submit")?;
        parse_submission_json(&body)
    }

    /// Poll `/analyses/{id}` until completed or the attempt budget is spent.
    pub fn poll_analysis(&self, analysis_id: &str) -> Result<ScanResult, ScanError> {
        let key = self.require_key()?;
        let url = format!("{}/analyses/{}", self.base_url, analysis_id);
        for attempt in 1..=self.max_attempts {
            let resp = self.send(self.client.get(&url).header("x-apikey", &key), "analysis poll")?;
            let body = self.read_body(resp, "analysis poll")?;
            match parse_analysis_json(&body)? {
                AnalysisState::Completed(result) => {
                    info!(
                        "VirusTotal analysis {} completed after {} attempt(s)",
                        analysis_id, attempt
                    );
                    return Ok(result);
                }
                AnalysisState::Pending(status) => {
                    debug!(
                        "VirusTotal analysis {} status '{}' (attempt {}/{})",
                        analysis_id, status, attempt, self.max_attempts
                    );
                }
            }
            if attempt < self.max_attempts {
                thread::sleep(self.poll_interval);
            }
        }
        warn!(
            "VirusTotal analysis {} still pending after {} attempts",
            analysis_id, self.max_attempts
        );
        Err(ScanError::AnalysisTimeout {
            analysis_id: analysis_id.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Existing report first, otherwise upload and poll.
    pub fn scan_file(
        &self,
        name: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<ScanResult, ScanError> {
        let key = self.require_key()?;
        debug!("VirusTotal API key present (len={})", key.len());
        let sha256 = sha256_hex(bytes);

        let mut result = match self.lookup_file_report(&sha256)? {
            Some(result) => {
                debug!("VirusTotal report hit for {}", sha256);
                result
            }
            None => {
                info!("VirusTotal has no report for {}, submitting '{}'", sha256, name);
                let analysis_id = self.submit_file(name, bytes, &key)?;
                self.poll_analysis(&analysis_id)?
            }
        };

        let metadata = result.metadata.get_or_insert_with(ScanMetadata::default);
        if let Some(ct) = content_type {
            metadata.content_type = ct.to_string();
        }
        metadata.body_length = Some(bytes.len() as u64);
        metadata.body_sha256 = Some(sha256);
        Ok(result)
    }

    /// Existing URL report first, otherwise submit and poll.
    pub fn scan_url(&self, raw: &str) -> Result<ScanResult, ScanError> {
        let key = self.require_key()?;
        let url = parse_scan_url(raw)?.to_string();
        // VirusTotal accepts the SHA-256 of the URL as its identifier.
        let url_id = sha256_hex(url.as_bytes());

        let mut result = match self.get_report(&format!("urls/{}", url_id), &key)? {
            Some(body) => match parse_report_json(&body)? {
                Some(result) => result,
                None => {
                    let analysis_id = self.submit_url(&url, &key)?;
                    self.poll_analysis(&analysis_id)?
                }
            },
            None => {
                info!("VirusTotal has no report for URL {}, submitting", url);
                let analysis_id = self.submit_url(&url, &key)?;
                self.poll_analysis(&analysis_id)?
            }
        };

        let metadata = result.metadata.get_or_insert_with(ScanMetadata::default);
        if metadata.final_url.is_none() {
            metadata.final_url = Some(url);
        }
        if metadata.content_type == "application/octet-stream" {
            metadata.content_type = "text/html".to_string();
        }
        Ok(result)
    }
}

impl ReputationProvider for VirusTotalProvider {
    fn name(&self) -> &'static str {
        "VirusTotal"
    }

    fn scan(&self, subject: &ScanSubject) -> Result<ScanResult, ScanError> {
        match subject {
            ScanSubject::File {
                name,
                bytes,
                content_type,
                ..
            } => self.scan_file(name, bytes, content_type.as_deref()),
            ScanSubject::Url(url) => self.scan_url(url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_update_and_clear() {
        let provider = VirusTotalProvider::new("http://127.0.0.1:9", Some("k1".into())).unwrap();
        assert_eq!(provider.get_api_key(), Some("k1".to_string()));
        provider.set_api_key("k2".to_string());
        assert_eq!(provider.get_api_key(), Some("k2".to_string()));
        provider.set_api_key("   ".to_string());
        assert!(provider.get_api_key().is_none());
    }

    #[test]
    fn missing_key_is_not_configured() {
        let provider = VirusTotalProvider::new("http://127.0.0.1:9", None).unwrap();
        let err = provider
            .scan(&ScanSubject::file("a.exe", vec![1, 2, 3]))
            .unwrap_err();
        assert_eq!(err, ScanError::NotConfigured("VirusTotal"));
    }

    #[test]
    fn invalid_hash_is_rejected_before_network() {
        let provider = VirusTotalProvider::new("http://127.0.0.1:9", Some("k".into())).unwrap();
        let err = provider.lookup_file_report("deadbeef").unwrap_err();
        assert!(matches!(err, ScanError::InputInvalid(_)));
    }

    #[test]
    fn zero_attempts_still_polls_once() {
        let provider = VirusTotalProvider::new("http://127.0.0.1:9", None)
            .unwrap()
            .with_polling(Duration::ZERO, 0);
        assert_eq!(provider.max_attempts, 1);
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let provider = VirusTotalProvider::new("http://127.0.0.1:9/api/v3/", None).unwrap();
        assert_eq!(provider.base_url, "http://127.0.0.1:9/api/v3");
    }

    #[test]
    fn unix_timestamps_render_as_rfc3339() {
        assert_eq!(
            unix_to_rfc3339(Some(1_700_000_000)).as_deref(),
            Some("2023-11-14T22:13:20+00:00")
        );
        assert_eq!(unix_to_rfc3339(None), None);
    }
}
