//! Error types for the airlift agent

use thiserror::Error;

/// Main error type for agent mutation operations
///
/// Every variant here is fatal at the admission boundary: the HTTP layer
/// translates it into a denied admission response, which blocks the
/// offending resource. The one place a failure is recovered instead of
/// surfaced is inside the bulk text rewriter, which keeps the original
/// matched text and logs a warning (see [`crate::git::rewrite_git_urls_in_text`]).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Mirror state file could not be read or parsed
    #[error("unable to load the mirror state: {0}")]
    ConfigLoad(String),

    /// Admission request body did not match the expected shape
    #[error("unable to decode the admission request: {0}")]
    RequestDecode(String),

    /// A git URL or image reference did not match the structural pattern
    #[error("unable to parse the reference: {0}")]
    ReferenceParse(String),

    /// A URL handed to the idempotency guard could not be compared
    #[error("unable to compare hostnames: {0}")]
    HostnameCompare(String),
}

impl Error {
    /// Create a config load error with the given message
    pub fn config_load(msg: impl Into<String>) -> Self {
        Self::ConfigLoad(msg.into())
    }

    /// Create a request decode error with the given message
    pub fn request_decode(msg: impl Into<String>) -> Self {
        Self::RequestDecode(msg.into())
    }

    /// Create a reference parse error with the given message
    pub fn reference_parse(msg: impl Into<String>) -> Self {
        Self::ReferenceParse(msg.into())
    }

    /// Create a hostname comparison error with the given message
    pub fn hostname_compare(msg: impl Into<String>) -> Self {
        Self::HostnameCompare(msg.into())
    }
}
