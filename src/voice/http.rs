//! Request plumbing shared by the hosted speech services

use std::time::Duration;

use crate::{Error, Result};

pub(super) fn client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Send a prepared request and return the body of a successful response
///
/// Transport failures surface as [`Error::Http`]; a non-2xx status is
/// turned into a service error by `rejected`, with the status and body.
pub(super) async fn fetch(
    request: reqwest::RequestBuilder,
    service: &'static str,
    rejected: fn(String) -> Error,
) -> Result<Vec<u8>> {
    let response = request
        .send()
        .await
        .inspect_err(|e| tracing::warn!(service, error = %e, "request failed"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(service, %status, %body, "service rejected request");
        return Err(rejected(format!("{service} returned {status}: {body}")));
    }

    let body = response.bytes().await?;
    tracing::debug!(service, bytes = body.len(), "response received");
    Ok(body.to_vec())
}
