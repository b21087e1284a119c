//! Value types passed to and returned from the client.
//!
//! # Design
//! Documents stay opaque JSON objects: the server owns their schema and the
//! client only reads `doctype` and `name` to build resource URLs. Optional
//! query arguments get small structs with `Default` so call sites only spell
//! out what they set.

use std::io::Cursor;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FrappeError, Result};

/// A Frappe document: field name to value, always carrying `doctype`.
pub type Document = Map<String, Value>;

/// Parameters for an RPC method call.
pub type Params = Map<String, Value>;

/// Read a required string field from a document.
pub(crate) fn required_str<'a>(doc: &'a Document, field: &'static str) -> Result<&'a str> {
    doc.get(field)
        .and_then(Value::as_str)
        .ok_or(FrappeError::MissingField { field })
}

/// Optional arguments for `get_doc`. Unset or empty fields are left out of
/// the request entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetDocOptions {
    /// Document name; empty lists documents of the doctype.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub filters: Value,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub limit_start: u64,
    #[serde(default)]
    pub limit_page_length: u64,
    #[serde(default)]
    pub order_by: String,
}

impl GetDocOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Print settings for `get_pdf` and `get_html`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintOptions {
    pub print_format: String,
    pub letterhead: bool,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            print_format: "Standard".to_string(),
            letterhead: true,
        }
    }
}

/// Result of a streaming download.
#[derive(Debug)]
pub enum Download {
    /// The server answered 2xx; the body, positioned at the start.
    Content(Cursor<Vec<u8>>),
    /// The server answered with an error status but no `exc`; the unwrapped
    /// envelope value.
    Envelope(Value),
}

impl Download {
    /// The downloaded bytes, if the request succeeded.
    pub fn into_content(self) -> Option<Cursor<Vec<u8>>> {
        match self {
            Download::Content(cursor) => Some(cursor),
            Download::Envelope(_) => None,
        }
    }
}
