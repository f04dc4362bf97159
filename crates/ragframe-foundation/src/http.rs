//! Shared reqwest plumbing for HTTP collaborators.

use ragframe_kernel::{RagError, RagResult};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Build a client with a request timeout.
///
/// Falls back to a default client if the builder rejects the settings, which
/// only happens when the TLS backend fails to initialize.
pub(crate) fn client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}

/// Map a transport failure to the collaborator taxonomy.
pub(crate) fn map_error(backend: &str, err: reqwest::Error) -> RagError {
    if err.is_decode() {
        RagError::decode(err.to_string())
    } else if err.is_timeout() || err.is_connect() || err.is_request() {
        RagError::Connection(format!("{backend}: {err}"))
    } else if let Some(status) = err.status() {
        RagError::backend(backend, Some(status.as_u16()), err.to_string())
    } else {
        RagError::Connection(format!("{backend}: {err}"))
    }
}

/// Fail with `Backend` on a non-success status, carrying the body as detail.
pub(crate) async fn check_status(backend: &str, response: reqwest::Response) -> RagResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RagError::backend(backend, Some(status.as_u16()), body))
}

/// Read a successful response body as JSON.
pub(crate) async fn read_json<T: DeserializeOwned>(backend: &str, response: reqwest::Response) -> RagResult<T> {
    let response = check_status(backend, response).await?;
    let text = response.text().await.map_err(|e| map_error(backend, e))?;
    serde_json::from_str(&text).map_err(|e| RagError::decode(format!("{backend}: {e}")))
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
