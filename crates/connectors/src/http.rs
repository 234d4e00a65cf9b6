//! Thin provider-HTTP helpers shared by the platform connectors.
//!
//! Callers map `HttpFailure` into the taxonomy that fits the operation:
//! a failed code exchange is `OAuthExchangeFailed`, a failed refresh is
//! `RefreshFailed`, and a 401 on a read is `InvalidToken`.

use serde::de::DeserializeOwned;

use crate::{connector::REQUEST_TIMEOUT, error::ConnectorError};

/// Why a provider request failed, before taxonomy mapping.
#[derive(Debug)]
pub(crate) enum HttpFailure {
    /// Non-2xx response; the body is preserved for diagnostics.
    Status { status: u16, body: String },
    /// Transport-level failure (DNS, TLS, timeout, ...).
    Transport(String),
}

impl HttpFailure {
    pub(crate) fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status == 401 || *status == 403)
    }

    /// Refresh-path mapping: a provider rejection kills the credential
    /// (`RefreshFailed` → account `expired`); a transport failure is
    /// transient (`FetchFailed` → account `error`, retried later).
    pub(crate) fn into_refresh_error(self) -> ConnectorError {
        match self {
            Self::Status { .. } => ConnectorError::refresh_failed(self),
            Self::Transport(_) => ConnectorError::fetch_failed(self),
        }
    }
}

impl std::fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status { status, body } => write!(f, "{status}: {body}"),
            Self::Transport(err) => write!(f, "{err}"),
        }
    }
}

pub(crate) async fn post_form<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    form: &[(&str, &str)],
) -> Result<T, HttpFailure> {
    let response = client
        .post(url)
        .timeout(REQUEST_TIMEOUT)
        .form(form)
        .send()
        .await
        .map_err(|e| HttpFailure::Transport(e.to_string()))?;
    decode(response).await
}

pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
) -> Result<T, HttpFailure> {
    let mut request = client.get(url).timeout(REQUEST_TIMEOUT);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }
    let response = request
        .send()
        .await
        .map_err(|e| HttpFailure::Transport(e.to_string()))?;
    decode(response).await
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, HttpFailure> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(HttpFailure::Status {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| HttpFailure::Transport(format!("response decode: {e}")))
}
