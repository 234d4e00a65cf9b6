/// Crate-wide result type for connector operations.
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Typed connector errors shared across all platform implementations.
///
/// The split matters to callers: `InvalidToken`/`RefreshFailed` move an
/// account to `expired` (user must re-authenticate), `FetchFailed` moves it
/// to `error` (retried on the next scheduled pass), and `NotConfigured` is
/// user-actionable rather than transient.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Platform credentials (client id/secret/redirect) are absent.
    #[error("oauth is not configured for {platform}")]
    NotConfigured { platform: String },

    /// The platform does not offer this capability at all.
    #[error("not supported on this platform: {operation}")]
    NotSupported { operation: String },

    /// The provider rejected the authorization code exchange.
    /// Never retried: authorization codes are single-use.
    #[error("code exchange rejected by provider: {detail}")]
    OAuthExchangeFailed { detail: String },

    /// The access token is no longer accepted (401-class response).
    #[error("access token rejected by provider")]
    InvalidToken,

    /// The provider rejected the refresh token; re-authentication required.
    #[error("token refresh rejected by provider: {detail}")]
    RefreshFailed { detail: String },

    /// Transient network/API failure; eligible for retry on a later pass.
    #[error("platform request failed: {context}")]
    FetchFailed { context: String },

    /// A webhook payload did not decode into the platform's envelope.
    #[error("malformed webhook payload: {message}")]
    MalformedPayload { message: String },
}

impl ConnectorError {
    #[must_use]
    pub fn not_configured(platform: impl std::fmt::Display) -> Self {
        Self::NotConfigured {
            platform: platform.to_string(),
        }
    }

    #[must_use]
    pub fn not_supported(operation: impl std::fmt::Display) -> Self {
        Self::NotSupported {
            operation: operation.to_string(),
        }
    }

    #[must_use]
    pub fn exchange_failed(detail: impl std::fmt::Display) -> Self {
        Self::OAuthExchangeFailed {
            detail: detail.to_string(),
        }
    }

    #[must_use]
    pub fn refresh_failed(detail: impl std::fmt::Display) -> Self {
        Self::RefreshFailed {
            detail: detail.to_string(),
        }
    }

    #[must_use]
    pub fn fetch_failed(context: impl std::fmt::Display) -> Self {
        Self::FetchFailed {
            context: context.to_string(),
        }
    }

    #[must_use]
    pub fn malformed_payload(message: impl std::fmt::Display) -> Self {
        Self::MalformedPayload {
            message: message.to_string(),
        }
    }

    /// Whether this failure means the stored credentials are dead
    /// (drives the `connected -> expired` status transition).
    #[must_use]
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, Self::InvalidToken | Self::RefreshFailed { .. })
    }
}
