//! Blocking HTTP implementation of the engine transport.

use crate::config::Config;
use crate::error::Result;
use mbaas_engine::{Method, Request, Transport, TransportError};
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

pub const APPLICATION_KEY_HEADER: &str = "X-NCMB-Application-Key";
pub const SESSION_TOKEN_HEADER: &str = "X-NCMB-Apps-Session-Token";

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("mbaas-rs/", env!("CARGO_PKG_VERSION"));

/// Extra headers computed per request, e.g. a request signature.
pub trait RequestSigner: Send + Sync {
    fn sign(&self, request: &Request, url: &str) -> Vec<(String, String)>;
}

/// Sends engine requests over HTTP.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    api_url: String,
    application_key: String,
    signer: Option<Box<dyn RequestSigner>>,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            application_key: config.application_key.clone(),
            signer: None,
        })
    }

    pub fn with_signer(mut self, signer: impl RequestSigner + 'static) -> Self {
        self.signer = Some(Box::new(signer));
        self
    }

    /// Absolute URL of a request, without its query string.
    pub fn url_for(&self, request: &Request) -> String {
        build_url(&self.api_url, &request.path)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("api_url", &self.api_url)
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &Request) -> std::result::Result<serde_json::Value, TransportError> {
        let url = self.url_for(request);
        debug!(method = %request.method, url = %url, "sending request");

        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &url)
            .query(&request.query);
        for (name, value) in request_headers(request, &self.application_key) {
            builder = builder.header(name, value);
        }
        if let Some(signer) = &self.signer {
            for (name, value) in signer.sign(request, &url) {
                builder = builder.header(name, value);
            }
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().map_err(|e| {
            warn!(url = %url, error = %e, "request failed");
            TransportError::new(e.status().map(|s| s.as_u16()), e.to_string())
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .map_err(|e| TransportError::new(Some(status), e.to_string()))?;

        interpret_response(request.method, status, content_type.as_deref(), &body).inspect_err(
            |e| warn!(url = %url, status, error = %e, "request rejected"),
        )
    }
}

/// Join the service root and a request path with exactly one slash.
pub fn build_url(api_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        api_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Fixed headers for a request.
pub fn request_headers(request: &Request, application_key: &str) -> Vec<(&'static str, String)> {
    let mut headers = vec![(APPLICATION_KEY_HEADER, application_key.to_string())];
    if let Some(token) = &request.session_token {
        headers.push((SESSION_TOKEN_HEADER, token.clone()));
    }
    headers
}

/// Turn a raw HTTP response into a JSON document or a transport error.
///
/// Error bodies of the form `{"code": ..., "error": ...}` are flattened into
/// the error message. An empty body is only accepted for `DELETE`.
pub fn interpret_response(
    method: Method,
    status: u16,
    content_type: Option<&str>,
    body: &str,
) -> std::result::Result<serde_json::Value, TransportError> {
    if !(200..300).contains(&status) {
        return Err(TransportError::new(Some(status), error_message(body)));
    }

    if body.trim().is_empty() {
        return match method {
            Method::Delete => Ok(serde_json::Value::Object(serde_json::Map::new())),
            _ => Err(TransportError::new(Some(status), "empty response body")),
        };
    }

    if let Some(content_type) = content_type {
        if !content_type.contains("json") {
            return Err(TransportError::new(
                Some(status),
                format!("unexpected content type '{}'", content_type),
            ));
        }
    }

    serde_json::from_str(body)
        .map_err(|e| TransportError::new(Some(status), format!("invalid JSON response: {}", e)))
}

fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|doc| doc.get(name))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    match (field("code"), field("error")) {
        (Some(code), Some(error)) => format!("{}: {}", code, error),
        (None, Some(error)) => error,
        _ if body.trim().is_empty() => "empty error response".to_string(),
        _ => body.trim().to_string(),
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}
