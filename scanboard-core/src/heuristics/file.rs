use super::{finish, Classification};
use crate::random::RandomSource;
use crate::subject::extension_of;

/// Executables and scripts
pub const HIGH_RISK_EXTENSIONS: &[&str] = &[
    "exe", "dll", "scr", "bat", "cmd", "com", "msi", "ps1", "vbs", "js", "jar", "hta", "pif",
    "wsf", "lnk", "reg", "cpl",
];

/// Archives, disk images and macro-capable documents
pub const MEDIUM_RISK_EXTENSIONS: &[&str] = &[
    "zip", "rar", "7z", "tar", "gz", "iso", "docm", "xlsm", "pptm", "doc", "xls", "apk", "dmg",
];

/// Media and plain-text types. Always scored 0.
pub const SAFE_EXTENSIONS: &[&str] = &[
    "txt", "pdf", "png", "jpg", "jpeg", "gif", "bmp", "svg", "mp3", "wav", "mp4", "avi", "mov",
    "csv", "md", "json",
];

const HIGH_RISK_BASE: f64 = 60.0;
const MEDIUM_RISK_BASE: f64 = 30.0;
const UNLISTED_BASE: f64 = 5.0;
const SUSPICIOUS_NAME_BONUS: f64 = 20.0;

const SUSPICIOUS_NAME_MARKERS: &[&str] = &[
    "crack",
    "keygen",
    "hack",
    "patch",
    "cheat",
    "trojan",
    "virus",
    "malware",
    "exploit",
    "payload",
    "free-download",
];

/// Risk bucket of a file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRisk {
    High,
    Medium,
    Safe,
    Unlisted,
}

impl FileRisk {
    pub fn of_name(name: &str) -> Self {
        match extension_of(name) {
            Some(ext) => Self::of_extension(&ext),
            None => FileRisk::Unlisted,
        }
    }

    pub fn of_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        if SAFE_EXTENSIONS.contains(&ext.as_str()) {
            FileRisk::Safe
        } else if HIGH_RISK_EXTENSIONS.contains(&ext.as_str()) {
            FileRisk::High
        } else if MEDIUM_RISK_EXTENSIONS.contains(&ext.as_str()) {
            FileRisk::Medium
        } else {
            FileRisk::Unlisted
        }
    }

    pub fn base_score(&self) -> f64 {
        match self {
            FileRisk::High => HIGH_RISK_BASE,
            FileRisk::Medium => MEDIUM_RISK_BASE,
            FileRisk::Safe => 0.0,
            FileRisk::Unlisted => UNLISTED_BASE,
        }
    }

    fn family(&self) -> &'static str {
        match self {
            FileRisk::High => "Trojan",
            FileRisk::Medium => "Potentially Unwanted Program",
            FileRisk::Safe => "Clean",
            FileRisk::Unlisted => "Suspicious File",
        }
    }
}

/// Score a file subject from its name alone.
pub fn classify_file(name: &str, rng: &mut dyn RandomSource) -> Classification {
    let risk = FileRisk::of_name(name);
    let base = risk.base_score();
    let mut signals = Vec::new();

    if risk == FileRisk::Safe {
        signals.push("safe file type".to_string());
        return finish(0.0, 0.0, signals, risk.family(), rng);
    }

    match risk {
        FileRisk::High => signals.push("executable or script file type".to_string()),
        FileRisk::Medium => signals.push("archive or macro-capable document".to_string()),
        _ => {}
    }

    let mut raw = base;
    let lower = name.to_lowercase();
    if let Some(marker) = SUSPICIOUS_NAME_MARKERS.iter().find(|m| lower.contains(*m)) {
        signals.push(format!("suspicious name marker '{}'", marker));
        raw += SUSPICIOUS_NAME_BONUS;
    }

    log::debug!("heuristic file score for '{}': base={} raw={}", name, base, raw);
    finish(base, raw, signals, risk.family(), rng)
}
