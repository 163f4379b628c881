use thiserror::Error;

/// Errors produced while validating, scanning or recording a subject
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    /// Rejected before any scan starts (malformed URL, oversized file, ...)
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// Transport failure or non-success HTTP status from the remote service
    #[error("remote service unavailable: {message}")]
    RemoteUnavailable {
        status: Option<u16>,
        message: String,
    },

    /// The remote answered but a required field was missing or unparsable
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The polling budget ran out before the analysis completed
    #[error("analysis {analysis_id} did not complete after {attempts} attempts")]
    AnalysisTimeout { analysis_id: String, attempts: u32 },

    /// History could not be read or written
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// A live provider was selected without a credential
    #[error("{0} is not configured (missing API key)")]
    NotConfigured(&'static str),
}

impl ScanError {
    pub(crate) fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        ScanError::RemoteUnavailable {
            status,
            message: message.into(),
        }
    }

    /// True for failures that happened while talking to a remote provider.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self,
            ScanError::RemoteUnavailable { .. }
                | ScanError::MalformedResponse(_)
                | ScanError::AnalysisTimeout { .. }
        )
    }
}
