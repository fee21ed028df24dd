//! Transport boundary.
//!
//! The engine never performs IO. Every network round trip goes through the
//! [`Transport`] trait, which receives a fully encoded [`Request`] and hands
//! back a decoded JSON document. Failures are opaque to the engine and are
//! propagated unchanged.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request handed to the transport.
///
/// The body is already codec-encoded; the transport only serializes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub method: Method,
    /// API path relative to the service root, e.g. `classes/Post/abc`
    pub path: String,
    /// Query string parameters, in order
    pub query: Vec<(String, String)>,
    /// JSON body, if any
    pub body: Option<serde_json::Value>,
    /// Session token of the authenticated user, if any
    pub session_token: Option<String>,
}

impl Request {
    /// Create a request without query or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            session_token: None,
        }
    }

    /// Builder-style method to attach a body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Builder-style method to attach query parameters.
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    /// Builder-style method to attach a session token.
    pub fn with_session_token(mut self, token: Option<String>) -> Self {
        self.session_token = token;
        self
    }
}

/// Failure reported by a transport implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport error{}: {message}", status_suffix(.status))]
pub struct TransportError {
    /// HTTP status code, when the failure came from a response
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|status| format!(" (status {})", status))
        .unwrap_or_default()
}

/// Sends requests to the remote document store.
///
/// Implementations own retries, timeouts, signing and status handling. The
/// engine treats any error as fatal for the call in progress.
pub trait Transport {
    /// Send a request and return the decoded response document.
    fn send(&self, request: &Request) -> Result<serde_json::Value, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &Request) -> Result<serde_json::Value, TransportError> {
        (**self).send(request)
    }
}

/// A scripted transport for tests.
///
/// Responses are replayed in the order they were queued; every request is
/// recorded for later inspection.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<serde_json::Value, TransportError>>>,
    requests: Mutex<Vec<Request>>,
}

impl MockTransport {
    /// Create a mock transport with no queued responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn push_response(&self, response: serde_json::Value) -> &Self {
        self.lock_responses().push_back(Ok(response));
        self
    }

    /// Queue a failure.
    pub fn push_error(&self, error: TransportError) -> &Self {
        self.lock_responses().push_back(Err(error));
        self
    }

    /// All requests sent so far.
    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<Request> {
        self.requests().pop()
    }

    fn lock_responses(
        &self,
    ) -> std::sync::MutexGuard<'_, VecDeque<Result<serde_json::Value, TransportError>>> {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for MockTransport {
    fn send(&self, request: &Request) -> Result<serde_json::Value, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());
        self.lock_responses()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::new(None, "no mock response queued")))
    }
}
