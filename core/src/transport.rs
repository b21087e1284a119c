//! Execution of `HttpRequest` values against the network.
//!
//! # Design
//! `Transport` is the single seam between the client and I/O. The default
//! `UreqTransport` wraps a blocking `ureq::Agent`, whose cookie jar carries
//! the session cookie set by login into every later call. Status codes are
//! returned as data, never as errors, because Frappe reports failures inside
//! a JSON envelope that the client still has to read.

use ureq::http::Response;
use ureq::tls::TlsConfig;
use ureq::typestate::WithBody;
use ureq::{Agent, Body, Proxy, RequestBuilder};

use crate::config::ClientConfig;
use crate::error::{FrappeError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, StreamResponse};

/// Executes HTTP requests for a `FrappeClient`.
pub trait Transport {
    /// Execute `request` and buffer the whole response body.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;

    /// Execute `request` and hand back the body unread.
    fn open(&self, request: &HttpRequest) -> Result<StreamResponse>;
}

/// Blocking transport backed by `ureq`.
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl UreqTransport {
    /// Build an agent honouring the timeout, proxy and pool settings.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut builder = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(config.timeout()?);

        if let Some(url) = &config.proxy {
            let proxy = Proxy::new(url)
                .map_err(|e| FrappeError::Config(format!("invalid proxy {url}: {e}")))?;
            builder = builder.proxy(Some(proxy));
        }

        if let Some(pool) = &config.pool {
            if let Some(max) = pool.max_idle_connections {
                builder = builder.max_idle_connections(max);
            }
            if let Some(max) = pool.max_idle_connections_per_host {
                builder = builder.max_idle_connections_per_host(max);
            }
            if pool.danger_accept_invalid_certs {
                log::warn!("TLS certificate verification is disabled for {}", config.url);
                builder = builder.tls_config(TlsConfig::builder().disable_verification(true).build());
            }
        }

        Ok(Self {
            agent: builder.build().new_agent(),
        })
    }

    fn dispatch(&self, request: &HttpRequest) -> Result<Response<Body>> {
        log::debug!("{} {}", request.method, request.url);
        let response = match request.method {
            HttpMethod::Get => {
                let mut builder = self.agent.get(request.url.as_str());
                for (key, value) in &request.query {
                    builder = builder.query(key, value);
                }
                builder.call()?
            }
            HttpMethod::Post => send_with_body(self.agent.post(request.url.as_str()), request)?,
            HttpMethod::Put => send_with_body(self.agent.put(request.url.as_str()), request)?,
        };
        log::debug!("{} {} -> {}", request.method, request.url, response.status());
        Ok(response)
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut response = self.dispatch(request)?;
        let status = response.status().as_u16();
        let body = response.body_mut().with_config().limit(u64::MAX).read_to_vec()?;
        Ok(HttpResponse { status, body })
    }

    fn open(&self, request: &HttpRequest) -> Result<StreamResponse> {
        let response = self.dispatch(request)?;
        let status = response.status().as_u16();
        let body = response.into_body().into_reader();
        Ok(StreamResponse {
            status,
            body: Box::new(body),
        })
    }
}

fn send_with_body(
    mut builder: RequestBuilder<WithBody>,
    request: &HttpRequest,
) -> std::result::Result<Response<Body>, ureq::Error> {
    for (key, value) in &request.query {
        builder = builder.query(key, value);
    }
    match &request.form {
        Some(form) => builder.send_form(form.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
        None => builder.send_empty(),
    }
}
