use thiserror::Error;

/// Errors surfaced by the selection model and the analysis collaborator.
///
/// `Display` is the bare message so the presentation layer can show it as-is.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MixError {
    /// A region whose end does not lie after its start once clamped.
    /// Rejected locally; the previous selection stays in place.
    #[error("invalid range: {start:.2}s..{end:.2}s of {duration:.2}s")]
    InvalidRange { start: f64, end: f64, duration: f64 },

    /// The collaborator could not process the given source or range.
    #[error("{0}")]
    SourceUnavailable(String),

    /// Any other failed external call, including an unknown or expired session.
    #[error("{0}")]
    RequestFailed(String),
}

impl MixError {
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable(message.into())
    }

    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::RequestFailed(message.into())
    }
}

pub type MixResult<T> = Result<T, MixError>;
