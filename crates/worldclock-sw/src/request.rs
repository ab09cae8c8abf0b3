//! Request and response types seen by the worker.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, DATE};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use url::Url;

/// Declared destination of a request (`Request.destination`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Destination {
    Document,
    Style,
    Script,
    Image,
    Font,
    Manifest,
    /// Plain `fetch()` / XHR.
    #[default]
    Empty,
    Other(String),
}

impl Destination {
    /// Parse the DOM string form (`"document"`, `"style"`, ...).
    pub fn parse(s: &str) -> Self {
        match s {
            "document" => Self::Document,
            "style" => Self::Style,
            "script" => Self::Script,
            "image" => Self::Image,
            "font" => Self::Font,
            "manifest" => Self::Manifest,
            "" => Self::Empty,
            other => Self::Other(other.to_string()),
        }
    }
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub destination: Destination,
    pub headers: HeaderMap,
}

impl Request {
    /// Create a GET request with no declared destination.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            destination: Destination::Empty,
            headers: HeaderMap::new(),
        }
    }

    /// Create a top-level navigation request.
    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_destination(Destination::Document)
    }

    /// Set the destination.
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Set the method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// Synthesized by the worker (offline page).
    Worker,
}

/// A response body with headers. Cloning is cheap: the body is shared.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl Response {
    /// Create a network response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            source: ResponseSource::Network,
        }
    }

    /// A 200 response with the given content type.
    pub fn ok_with(content_type: &'static str, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self::new(StatusCode::OK, headers, body)
    }

    /// Check if the status is 2xx.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Content type header, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Raw `Date` header, if any.
    pub fn date(&self) -> Option<&str> {
        self.headers.get(DATE).and_then(|v| v.to_str().ok())
    }

    /// Body as text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Same response marked with a different source.
    pub fn with_source(mut self, source: ResponseSource) -> Self {
        self.source = source;
        self
    }
}
