//! HTTP plumbing for fetch workers

use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

use super::config::CONNECT_TIMEOUT;
use super::task::FetchSource;
use super::FetchError;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Build the client shared by all workers of a run.
///
/// Only the connect phase has a client-wide timeout: product archives are
/// several gigabytes, so the engine times out each send and each chunk read
/// instead of the whole transfer.
pub fn build_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
}

/// Issue the request for `source`, returning once headers arrive.
pub async fn send(
    client: &Client,
    source: &FetchSource,
    bearer: Option<&str>,
    timeout: Duration,
) -> Result<Response, FetchError> {
    let request = match source {
        FetchSource::Url { url } => client.get(url),
        FetchSource::Query { url, body } => client.post(url).json(body),
    };
    let request = match bearer {
        Some(token) => request.header(AUTHORIZATION, bearer_header(token)?),
        None => request,
    }
    .header(ACCEPT, HeaderValue::from_static("*/*"));

    debug!(url = source.url(), method = method_name(source), "Sending request");

    tokio::time::timeout(timeout, request.send())
        .await
        .map_err(|_| FetchError::Timeout(timeout))?
        .map_err(FetchError::from)
}

/// HTTP method label of a source
pub fn method_name(source: &FetchSource) -> &'static str {
    match source {
        FetchSource::Url { .. } => "GET",
        FetchSource::Query { .. } => "POST",
    }
}

fn bearer_header(token: &str) -> Result<HeaderValue, FetchError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
        FetchError::Auth(crate::auth::AuthError::Parse(format!(
            "access token is not a valid header value: {e}"
        )))
    })?;
    value.set_sensitive(true);
    Ok(value)
}
