//! Blocking client for the Frappe REST and RPC API.
//!
//! # Overview
//! `FrappeClient` logs in to a Frappe site, keeps the session cookie, and
//! maps each operation (document CRUD, `frappe.client` RPC methods,
//! whitelisted `/api/method` calls, PDF/HTML/template downloads) to one HTTP
//! request whose JSON envelope is unwrapped into a `serde_json::Value` or a
//! typed `FrappeError`.
//!
//! # Design
//! - `ApiRequests` builds every request as plain data, so wire shapes are
//!   testable without a server.
//! - `Transport` executes requests; `UreqTransport` is the default, backed by
//!   a cookie-keeping `ureq::Agent`.
//! - `envelope` and `download` turn responses into values.
//! - Dropping a `FrappeClient` logs the session out.
//!
//! ```no_run
//! use frappe_client::{ClientConfig, FrappeClient, GetDocOptions};
//!
//! # fn main() -> frappe_client::Result<()> {
//! let config = ClientConfig::new("https://erp.example.com", "Administrator", "secret");
//! let client = FrappeClient::connect(&config)?;
//! let todo = client.get_doc("ToDo", &GetDocOptions::named("TODO-0001"))?;
//! println!("{}", todo["description"]);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod download;
pub mod envelope;
pub mod error;
pub mod http;
pub mod request;
pub mod transport;
pub mod types;

pub use client::FrappeClient;
pub use config::{ClientConfig, PoolConfig};
pub use error::{FrappeError, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse, StreamResponse};
pub use request::{preprocess, ApiRequests};
pub use transport::{Transport, UreqTransport};
pub use types::{Document, Download, GetDocOptions, Params, PrintOptions};
