//! Scan subjects (uploaded files or URLs) and their validation

use crate::error::ScanError;
use crate::hashing::sha256_hex;
use reqwest::Url;
use std::fs;
use std::path::Path;

/// Default upper bound for uploaded files (50 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Something the user asked to scan
#[derive(Debug, Clone, PartialEq)]
pub enum ScanSubject {
    File {
        name: String,
        size: u64,
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
    Url(String),
}

impl ScanSubject {
    /// Wrap in-memory file content.
    pub fn file(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        ScanSubject::File {
            name: name.into(),
            size: bytes.len() as u64,
            content_type: None,
            bytes,
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        ScanSubject::Url(url.into())
    }

    /// Read a file from disk, refusing anything over `max_size` before loading it.
    pub fn from_path(path: &Path, max_size: u64) -> Result<Self, ScanError> {
        let meta = fs::metadata(path).map_err(|e| {
            ScanError::InputInvalid(format!(
                "Cannot read file metadata for '{}': {}",
                path.display(),
                e
            ))
        })?;
        if meta.len() > max_size {
            return Err(oversized(meta.len(), max_size));
        }
        let bytes = fs::read(path).map_err(|e| {
            ScanError::InputInvalid(format!("Cannot open file '{}': {}", path.display(), e))
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::file(name, bytes))
    }

    /// File name or URL string
    pub fn display_name(&self) -> &str {
        match self {
            ScanSubject::File { name, .. } => name,
            ScanSubject::Url(url) => url,
        }
    }

    pub fn is_url(&self) -> bool {
        matches!(self, ScanSubject::Url(_))
    }

    /// SHA-256 of the file content (files only)
    pub fn sha256(&self) -> Option<String> {
        match self {
            ScanSubject::File { bytes, .. } => Some(sha256_hex(bytes)),
            ScanSubject::Url(_) => None,
        }
    }

    /// Reject subjects that must never reach an engine.
    pub fn validate(&self, max_file_size: u64) -> Result<(), ScanError> {
        match self {
            ScanSubject::File { name, size, .. } => {
                if name.trim().is_empty() {
                    return Err(ScanError::InputInvalid("file name is empty".to_string()));
                }
                if *size > max_file_size {
                    return Err(oversized(*size, max_file_size));
                }
                Ok(())
            }
            ScanSubject::Url(url) => parse_scan_url(url).map(|_| ()),
        }
    }
}

fn oversized(size: u64, max: u64) -> ScanError {
    ScanError::InputInvalid(format!(
        "file size {} exceeds maximum limit of {}MB",
        size,
        max / 1024 / 1024
    ))
}

/// Parse an http(s) URL that carries a host.
pub fn parse_scan_url(raw: &str) -> Result<Url, ScanError> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed)
        .map_err(|e| ScanError::InputInvalid(format!("invalid URL '{}': {}", trimmed, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ScanError::InputInvalid(format!(
            "unsupported URL scheme '{}'",
            url.scheme()
        )));
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(ScanError::InputInvalid(format!(
            "URL '{}' has no host",
            trimmed
        ))),
    }
}

/// Lowercased extension after the last dot, if any
pub fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Human-readable type label for a file name.
pub fn file_type_label(name: &str) -> &'static str {
    let ext = extension_of(name).unwrap_or_default();
    match ext.as_str() {
        "pdf" => "PDF Document",
        "doc" | "docx" => "Word Document",
        "xls" | "xlsx" => "Excel Spreadsheet",
        "ppt" | "pptx" => "PowerPoint Presentation",
        "jpg" => "JPG Image",
        "jpeg" => "JPEG Image",
        "png" => "PNG Image",
        "gif" => "GIF Image",
        "mp3" | "wav" => "Audio File",
        "mp4" | "avi" | "mov" => "Video File",
        "zip" | "rar" | "7z" => "Archive",
        "exe" => "Windows Executable",
        "dll" => "Dynamic Link Library",
        "js" => "JavaScript File",
        "html" | "htm" => "HTML File",
        _ => "Unknown File",
    }
}
