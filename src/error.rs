//! Error taxonomy for the analysis pipeline.
//!
//! Every failure a run can produce maps to one [`DigestError`] variant so
//! callers can branch on the condition (offer the offline fallback on a
//! missing credential, a friendly message on a missing log directory, and
//! so on) instead of string-matching messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used by the library modules.
pub type DigestResult<T> = Result<T, DigestError>;

/// Every condition a run (or one of its stages) can terminate with.
#[derive(Debug, Error)]
pub enum DigestError {
    /// A required argument was blank or out of range. No I/O was performed.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// No log text exists for the requested date under the logs root.
    #[error("no log files found for {date} under {}", .root.display())]
    NotFound { date: String, root: PathBuf },

    /// No provider credential in config or environment.
    #[error("provider credential is not configured (set provider.api_key or OPENAI_API_KEY)")]
    CredentialMissing,

    /// The provider could not be reached or answered with a non-success status.
    #[error("provider request failed{}: {message}", .status.map(|s| format!(" with status {}", s)).unwrap_or_default())]
    ProviderTransport {
        status: Option<u16>,
        message: String,
    },

    /// The provider answered, but the payload does not match the expected shape.
    #[error("provider returned an unusable {stage} response: {message}")]
    ProviderResponse {
        stage: &'static str,
        message: String,
    },

    /// Merge was invoked with an empty partial-summary buffer.
    #[error("cannot merge: no partial summaries were produced")]
    MergePrecondition,

    /// Reading or writing a persisted report failed.
    #[error("persistence failure at {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading the log source failed for a reason other than absence.
    #[error("failed to read logs at {}: {source}", .path.display())]
    LogRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The offline fallback found no persisted report for the date.
    #[error("no cached report available for {date}")]
    NoCachedReport { date: String },

    /// The run was cancelled by its caller. Not an error to surface to users.
    #[error("analysis cancelled")]
    Cancelled,
}

impl DigestError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        DigestError::Validation(msg.into())
    }

    pub(crate) fn chunk_response(msg: impl ToString) -> Self {
        DigestError::ProviderResponse {
            stage: "chunk",
            message: msg.to_string(),
        }
    }

    pub(crate) fn merge_response(msg: impl ToString) -> Self {
        DigestError::ProviderResponse {
            stage: "merge",
            message: msg.to_string(),
        }
    }

    /// True when the run ended because the caller cancelled it.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DigestError::Cancelled)
    }

    /// Conditions a user may reasonably retry without changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DigestError::ProviderTransport { .. })
    }
}

/// Reject blank required text arguments.
pub(crate) fn require_non_blank(name: &str, value: &str) -> DigestResult<()> {
    if value.trim().is_empty() {
        return Err(DigestError::validation(format!("{} must not be blank", name)));
    }
    Ok(())
}

/// Validate an ISO `YYYY-MM-DD` date used as a storage key.
pub(crate) fn require_date(value: &str) -> DigestResult<chrono::NaiveDate> {
    require_non_blank("date", value)?;
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        // Only the zero-padded form names a directory on disk.
        .filter(|date| date.format("%Y-%m-%d").to_string() == value)
        .ok_or_else(|| {
            DigestError::validation(format!("date must be YYYY-MM-DD, got '{}'", value))
        })
}
