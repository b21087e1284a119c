//! HTTP exchange types shared by the request builder and the transports.
//!
//! # Design
//! Requests and buffered responses are plain data. `ApiRequests` builds
//! `HttpRequest` values and the envelope parser consumes `HttpResponse`
//! values without touching the network; a `Transport` executes the actual
//! round-trip. Streamed responses keep their body as a reader so large PDF
//! or template downloads are pulled chunk by chunk.

use std::fmt;
use std::io::Read;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
            HttpMethod::Put => f.write_str("PUT"),
        }
    }
}

/// An HTTP request described as plain data.
///
/// `query` is appended to the URL; `form`, when present, is sent as an
/// `application/x-www-form-urlencoded` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub form: Option<Vec<(String, String)>>,
}

impl HttpRequest {
    /// Value of the first query parameter named `key`.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        lookup(&self.query, key)
    }

    /// Value of the first form field named `key`.
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form.as_deref().and_then(|form| lookup(form, key))
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// A response whose body has not been read yet.
pub struct StreamResponse {
    pub status: u16,
    pub body: Box<dyn Read>,
}

impl StreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
