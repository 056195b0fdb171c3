//! Executing `HttpRequest` values against the network.
//!
//! # Design
//! The client never performs I/O itself. A `Transport` receives a fully
//! built request and returns the response as data, whatever its status; only
//! a failure to obtain any response at all is an error. `UreqTransport` is the
//! network implementation; tests substitute in-memory transports.

use std::future::Future;

use tracing::trace;

use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Performs the HTTP round-trip for a request.
pub trait Transport: Send + Sync + 'static {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

/// Blocking `ureq` agent driven on tokio's blocking thread pool.
///
/// Non-2xx statuses are returned as responses, not errors. No timeout and no
/// body size limit are configured: a request either completes or fails at
/// the transport level.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || execute_blocking(&agent, &request))
            .await
            .map_err(|err| TransportError::Other(format!("transport task failed: {err}")))?
    }
}

fn execute_blocking(
    agent: &ureq::Agent,
    request: &HttpRequest,
) -> Result<HttpResponse, TransportError> {
    let url = request.url.as_str();
    trace!(method = request.method.as_str(), url, "executing request");

    let result = match (request.method, request.body.as_deref()) {
        (HttpMethod::Get, _) => with_headers(agent.get(url), &request.headers).call(),
        (HttpMethod::Post, Some(body)) => {
            with_headers(agent.post(url), &request.headers).send(body.as_bytes())
        }
        (HttpMethod::Post, None) => with_headers(agent.post(url), &request.headers).send_empty(),
    };
    let mut response = result.map_err(classify_ureq_error)?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = response
        .body_mut()
        .with_config()
        .limit(u64::MAX)
        .read_to_string()
        .map_err(|err| TransportError::Other(format!("could not read response body: {err}")))?;

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

/// Reachability failures become `Unreachable`; everything else is `Other`.
fn classify_ureq_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Io(_)
        | ureq::Error::HostNotFound
        | ureq::Error::ConnectionFailed
        | ureq::Error::Timeout(_) => TransportError::Unreachable(err.to_string()),
        other => TransportError::Other(other.to_string()),
    }
}
