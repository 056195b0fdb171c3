//! Request building, response resolution and the remote call composing them.
//!
//! # Design
//! `RemoteClient` holds the backend origin and a `Transport`. Each call is
//! split into `build` (parameters to `HttpRequest`), the transport round-trip
//! and `parse_json`/`parse_text` (`HttpResponse` to a decoded value or a
//! `RemoteError`). The building and parsing halves are pure and are tested
//! without any transport.
//!
//! Body shaping: a single body parameter is sent as its bare JSON value,
//! several are sent as one object keyed by parameter name. Endpoints are
//! written against this shape, so a lone body parameter is never wrapped.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{CallError, ConfigError, RemoteError, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, JSON_CONTENT_TYPE};
use crate::param::{classify, Classified, Params};
use crate::transport::Transport;

/// Client for the `/api/*` backend.
#[derive(Debug, Clone)]
pub struct RemoteClient<T> {
    config: ClientConfig,
    transport: T,
}

impl<T: Transport> RemoteClient<T> {
    pub fn new(origin: &str, transport: T) -> Result<Self, ConfigError> {
        Ok(Self::with_config(ClientConfig::new(origin)?, transport))
    }

    pub fn with_config(config: ClientConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Issue a call to `path` and decode the JSON response with `transform`.
    ///
    /// Transport and HTTP failures are converted into `E`; an error returned
    /// by `transform` is passed through as is.
    pub async fn call<R, E, F>(&self, path: &str, params: &Params, transform: F) -> Result<R, E>
    where
        F: FnOnce(Value) -> Result<R, E>,
        E: From<RemoteError>,
    {
        let json = self.call_json(path, params).await?;
        transform(json)
    }

    /// Issue a call to `path` and return the decoded JSON as is.
    pub async fn call_json(&self, path: &str, params: &Params) -> Result<Value, RemoteError> {
        let request = self.build(path, params);
        self.resolve_json(request).await
    }

    /// Issue a call to `path` and return the response body as text.
    pub async fn call_text(&self, path: &str, params: &Params) -> Result<String, RemoteError> {
        let request = self.build(path, params);
        self.resolve_text(request).await
    }

    /// Issue a call to `path` and deserialize the response into `R`.
    pub async fn call_as<R: DeserializeOwned>(
        &self,
        path: &str,
        params: &Params,
    ) -> Result<R, CallError> {
        self.call(path, params, decode_as::<R>).await
    }

    /// Build the request for `path` from `params`.
    pub fn build(&self, path: &str, params: &Params) -> HttpRequest {
        let mut query = Vec::new();
        let mut body = Vec::new();
        for (name, value) in params.iter() {
            match classify(value) {
                Classified::Query(p) => query.push((name, p.to_string())),
                Classified::Body(v) => body.push((name, v)),
            }
        }

        let url = self.endpoint_url(path, &query);
        let body = match body.len() {
            0 => None,
            1 => body.pop().map(|(_, v)| v.to_string()),
            _ => {
                let object: Map<String, Value> = body
                    .into_iter()
                    .map(|(name, v)| (name.to_string(), v))
                    .collect();
                Some(Value::Object(object).to_string())
            }
        };

        let request = match body {
            Some(body) => HttpRequest {
                method: HttpMethod::Post,
                url,
                headers: vec![("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string())],
                body: Some(body),
            },
            None => HttpRequest {
                method: HttpMethod::Get,
                url,
                headers: Vec::new(),
                body: None,
            },
        };
        debug!(method = request.method.as_str(), url = %request.url, "built request");
        request
    }

    /// Execute `request` and decode the JSON body of a success response.
    pub async fn resolve_json(&self, request: HttpRequest) -> Result<Value, RemoteError> {
        let url = request.url.clone();
        let response = self.execute(request).await?;
        parse_json(&url, response).inspect_err(|err| warn!(%err, "remote call failed"))
    }

    /// Execute `request` and return the body of a success response as text.
    pub async fn resolve_text(&self, request: HttpRequest) -> Result<String, RemoteError> {
        let url = request.url.clone();
        let response = self.execute(request).await?;
        parse_text(&url, response).inspect_err(|err| warn!(%err, "remote call failed"))
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, RemoteError> {
        let url = request.url.clone();
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|err| transport_failure(&url, err))
            .inspect_err(|err| warn!(%err, "remote call failed"))?;
        debug!(%url, status = response.status, "received response");
        Ok(response)
    }

    fn endpoint_url(&self, path: &str, query: &[(&str, String)]) -> Url {
        let mut url = self.config.origin.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.set_path(&format!("/{}/{}", self.config.api_prefix, path));
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter().map(|(n, v)| (*n, v.as_str())));
        }
        url
    }
}

/// Deserializing transform for `call`, for response types implementing
/// `Deserialize`.
pub fn decode_as<R: DeserializeOwned>(json: Value) -> Result<R, CallError> {
    serde_json::from_value(json).map_err(CallError::transform)
}

/// Decode a JSON success response.
pub fn parse_json(url: &Url, response: HttpResponse) -> Result<Value, RemoteError> {
    check_status(url, &response)?;
    serde_json::from_str(&response.body).map_err(|cause| RemoteError::MalformedBody {
        url: url.clone(),
        cause,
    })
}

/// Return the body of a success response as text.
pub fn parse_text(url: &Url, response: HttpResponse) -> Result<String, RemoteError> {
    check_status(url, &response)?;
    Ok(response.body)
}

/// Map non-success status codes to `RemoteError::Http`.
fn check_status(url: &Url, response: &HttpResponse) -> Result<(), RemoteError> {
    if response.is_success() {
        return Ok(());
    }
    Err(RemoteError::Http {
        url: url.clone(),
        status: response.status,
        headers: response.headers.clone(),
    })
}

fn transport_failure(url: &Url, err: TransportError) -> RemoteError {
    match err {
        TransportError::Unreachable(cause) => RemoteError::Network {
            url: url.clone(),
            cause,
        },
        other => RemoteError::Transport(other),
    }
}
