/// Why a state token was rejected.
///
/// Every malformed input (bad base64, truncated payload, bad signature)
/// collapses into `Invalid`; callers get no oracle for which check failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// Token is malformed or its signature does not verify.
    #[error("invalid state token")]
    Invalid,

    /// Token is authentic but older than the freshness window.
    #[error("state token expired")]
    Expired,

    /// Token was minted for a different platform than the callback claims.
    #[error("state platform mismatch: expected {expected}, got {actual}")]
    PlatformMismatch { expected: String, actual: String },
}
