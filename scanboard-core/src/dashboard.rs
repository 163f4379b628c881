//! Dashboard statistics derived from scan history

use crate::history::ScanRecord;
use crate::scanner::ScanEngine;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;

/// Months covered by the detection series, current month included
pub const TRAILING_MONTHS: u32 = 6;

/// Headline counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_scans: usize,
    pub malicious_files: usize,
    pub clean_files: usize,
    pub last_scan_date: Option<DateTime<Utc>>,
}

impl DashboardStats {
    /// Share of infected scans, rounded to a whole percent
    pub fn malicious_percent(&self) -> Option<u32> {
        if self.total_scans == 0 {
            return None;
        }
        Some(((self.malicious_files as f64 / self.total_scans as f64) * 100.0).round() as u32)
    }
}

/// Scans per engine selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineUsage {
    pub virus_total_scans: usize,
    pub ml_scans: usize,
    pub both_scans: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyBucket {
    /// Abbreviated month name ("Jan")
    pub month_label: String,
    pub year: i32,
    pub month: u32,
    pub clean: usize,
    pub infected: usize,
}

/// Everything the dashboard view shows
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub stats: DashboardStats,
    pub engines: EngineUsage,
    pub monthly: Vec<MonthlyBucket>,
}

impl Dashboard {
    pub fn compute(records: &[ScanRecord], now: DateTime<Utc>) -> Self {
        Self {
            stats: dashboard_stats(records),
            engines: engine_usage(records),
            monthly: monthly_series(records, now),
        }
    }
}

pub fn dashboard_stats(records: &[ScanRecord]) -> DashboardStats {
    let malicious_files = records.iter().filter(|r| r.is_infected).count();
    DashboardStats {
        total_scans: records.len(),
        malicious_files,
        clean_files: records.len() - malicious_files,
        last_scan_date: records.iter().map(|r| r.scan_date).max(),
    }
}

pub fn engine_usage(records: &[ScanRecord]) -> EngineUsage {
    records
        .iter()
        .fold(EngineUsage::default(), |mut usage, r| {
            match r.scan_engine {
                ScanEngine::VirusTotal => usage.virus_total_scans += 1,
                ScanEngine::Ml => usage.ml_scans += 1,
                ScanEngine::Both => usage.both_scans += 1,
            }
            usage
        })
}

/// (year, month) stepped back `back` months from the given month.
fn months_back(year: i32, month: u32, back: u32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 - back as i32;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// Clean/infected counts for the trailing months, oldest first.
pub fn monthly_series(records: &[ScanRecord], now: DateTime<Utc>) -> Vec<MonthlyBucket> {
    let mut buckets: Vec<MonthlyBucket> = (0..TRAILING_MONTHS)
        .rev()
        .map(|back| {
            let (year, month) = months_back(now.year(), now.month(), back);
            let month_label = NaiveDate::from_ymd_opt(year, month, 1)
                .map(|d| d.format("%b").to_string())
                .unwrap_or_default();
            MonthlyBucket {
                month_label,
                year,
                month,
                clean: 0,
                infected: 0,
            }
        })
        .collect();

    for record in records {
        let (year, month) = (record.scan_date.year(), record.scan_date.month());
        if let Some(bucket) = buckets
            .iter_mut()
            .find(|b| b.year == year && b.month == month)
        {
            if record.is_infected {
                bucket.infected += 1;
            } else {
                bucket.clean += 1;
            }
        }
    }
    buckets
}

/// Newest-first slice of at most `n` records.
pub fn recent(records: &[ScanRecord], n: usize) -> Vec<&ScanRecord> {
    let mut sorted: Vec<&ScanRecord> = records.iter().collect();
    sorted.sort_by(|a, b| b.scan_date.cmp(&a.scan_date));
    sorted.truncate(n);
    sorted
}

/// Human-readable size: `512 B`, `1.50 KB`, `2.00 MB`, ...
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}
