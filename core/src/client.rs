//! Authenticated session against a Frappe site.
//!
//! # Design
//! `FrappeClient` owns one server session: it logs in on construction and
//! logs out when dropped, so a client value doubles as a scoped guard.
//! Requests are built by `ApiRequests`, executed by a `Transport` and
//! unwrapped by the envelope parser; the client itself only adds session
//! bookkeeping. The set of doctypes with an upload template is cached per
//! session and cleared whenever the session changes.

use std::collections::HashSet;

use serde_json::Value;

use crate::config::ClientConfig;
use crate::download;
use crate::envelope;
use crate::error::{FrappeError, Result};
use crate::http::HttpRequest;
use crate::request::ApiRequests;
use crate::transport::{Transport, UreqTransport};
use crate::types::{Document, Download, GetDocOptions, Params, PrintOptions};

/// Login answers with this exact `message` on success.
pub const LOGGED_IN: &str = "Logged In";

/// Blocking client for one Frappe server session.
#[derive(Debug)]
pub struct FrappeClient<T: Transport = UreqTransport> {
    requests: ApiRequests,
    transport: T,
    downloadable: HashSet<String>,
    logged_in: bool,
}

impl FrappeClient<UreqTransport> {
    /// Build a `ureq` transport from `config` and log in.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = UreqTransport::from_config(config)?;
        Self::with_transport(&config.url, transport, &config.username, &config.password)
    }
}

impl<T: Transport> FrappeClient<T> {
    /// Log in over an existing transport.
    pub fn with_transport(url: &str, transport: T, username: &str, password: &str) -> Result<Self> {
        let mut client = Self {
            requests: ApiRequests::new(url),
            transport,
            downloadable: HashSet::new(),
            logged_in: false,
        };
        client.login(username, password)?;
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        self.requests.base_url()
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Start a new session, returning the server's login envelope.
    pub fn login(&mut self, username: &str, password: &str) -> Result<Value> {
        let response = self.transport.send(&self.requests.login(username, password))?;
        let json: Value = serde_json::from_slice(&response.body).map_err(|source| FrappeError::Json {
            source,
            body: String::from_utf8_lossy(&response.body).into_owned(),
        })?;

        if json.get("message").and_then(Value::as_str) == Some(LOGGED_IN) {
            log::info!("logged in to {} as {username}", self.base_url());
            self.downloadable.clear();
            self.logged_in = true;
            return Ok(json);
        }

        let message = match json.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(value) => value.to_string(),
            None => format!("HTTP {} without a message", response.status),
        };
        Err(FrappeError::Auth { message })
    }

    /// End the session. The doctype cache is cleared even when the request
    /// fails.
    pub fn logout(&mut self) -> Result<()> {
        let result = self.transport.send(&self.requests.logout());
        self.downloadable.clear();
        self.logged_in = false;
        result?;
        log::info!("logged out of {}", self.base_url());
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    /// Create a document; `doc` must carry `doctype`.
    pub fn insert(&self, doc: &Document) -> Result<Value> {
        self.call(&self.requests.insert(doc)?)
    }

    /// Save a document; `doc` must carry `doctype` and `name`.
    pub fn update(&self, doc: &Document) -> Result<Value> {
        self.call(&self.requests.update(doc)?)
    }

    pub fn bulk_update(&self, docs: &[Document]) -> Result<Value> {
        self.call(&self.requests.bulk_update(docs))
    }

    pub fn delete(&self, doctype: &str, name: &str) -> Result<Value> {
        self.call(&self.requests.delete(doctype, name))
    }

    pub fn submit(&self, doclist: &Value) -> Result<Value> {
        self.call(&self.requests.submit(doclist))
    }

    pub fn cancel(&self, doctype: &str, name: &str) -> Result<Value> {
        self.call(&self.requests.cancel(doctype, name))
    }

    pub fn rename_doc(&self, doctype: &str, old_name: &str, new_name: &str) -> Result<Value> {
        self.call(&self.requests.rename_doc(doctype, old_name, new_name))
    }

    /// Fetch one document, or a list when `options.name` is empty.
    pub fn get_doc(&self, doctype: &str, options: &GetDocOptions) -> Result<Value> {
        self.call(&self.requests.get_doc(doctype, options))
    }

    pub fn get_value(
        &self,
        doctype: &str,
        fieldname: Option<&str>,
        filters: Option<&Value>,
    ) -> Result<Value> {
        self.call(&self.requests.get_value(doctype, fieldname, filters))
    }

    pub fn set_value(&self, doctype: &str, name: &str, fieldname: &str, value: Value) -> Result<Value> {
        self.call(&self.requests.set_value(doctype, name, fieldname, value))
    }

    // -----------------------------------------------------------------------
    // Generic calls
    // -----------------------------------------------------------------------

    /// GET a whitelisted method under `/api/method/`.
    pub fn get_api(&self, method: &str, params: Option<&Params>) -> Result<Value> {
        self.call(&self.requests.get_api(method, params))
    }

    /// POST a whitelisted method under `/api/method/`.
    pub fn post_api(&self, method: &str, params: Option<&Params>) -> Result<Value> {
        self.call(&self.requests.post_api(method, params))
    }

    /// GET an RPC command; `params` should include `cmd`.
    pub fn get_request(&self, params: &Params) -> Result<Value> {
        self.call(&self.requests.get_request(params))
    }

    /// POST an RPC command; `params` should include `cmd`.
    pub fn post_request(&self, params: &Params) -> Result<Value> {
        self.call(&self.requests.post_request(params))
    }

    // -----------------------------------------------------------------------
    // Downloads
    // -----------------------------------------------------------------------

    pub fn get_pdf(&self, doctype: &str, name: &str, print: &PrintOptions) -> Result<Download> {
        self.download(&self.requests.get_pdf(doctype, name, print))
    }

    pub fn get_html(&self, doctype: &str, name: &str, print: &PrintOptions) -> Result<Download> {
        self.download(&self.requests.get_html(doctype, name, print))
    }

    /// Download the data import template for `doctype`.
    ///
    /// Fails with `NotUploadable` before any template request when the
    /// server does not list `doctype` as importable.
    pub fn get_upload_template(&mut self, doctype: &str, with_data: bool) -> Result<Download> {
        if self.downloadable.is_empty() {
            self.load_downloadable_doctypes()?;
        }
        if !self.downloadable.contains(doctype) {
            return Err(FrappeError::NotUploadable {
                doctype: doctype.to_string(),
            });
        }
        self.download(&self.requests.get_upload_template(doctype, with_data))
    }

    /// Doctypes known to have an upload template, as currently cached.
    pub fn downloadable_doctypes(&self) -> &HashSet<String> {
        &self.downloadable
    }

    fn load_downloadable_doctypes(&mut self) -> Result<()> {
        let listed = self.call(&self.requests.get_doctypes())?;
        self.downloadable = doctype_names(&listed);
        log::debug!("{} doctypes accept uploads", self.downloadable.len());
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    fn call(&self, request: &HttpRequest) -> Result<Value> {
        let response = self.transport.send(request)?;
        envelope::unwrap_body(&response.body)
    }

    fn download(&self, request: &HttpRequest) -> Result<Download> {
        download::collect(self.transport.open(request)?)
    }
}

impl<T: Transport> Drop for FrappeClient<T> {
    fn drop(&mut self) {
        if !self.logged_in {
            return;
        }
        if let Err(e) = self.logout() {
            log::warn!("logout from {} failed: {e}", self.base_url());
        }
    }
}

/// Doctype names from the server's importable-doctype listing: plain names
/// or objects carrying `name`.
fn doctype_names(listed: &Value) -> HashSet<String> {
    let Some(items) = listed.as_array() else {
        return HashSet::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(name) => Some(name.clone()),
            Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, HttpResponse, StreamResponse};
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::io::Read;
    use std::rc::Rc;

    /// Replays canned responses and records every request it sees.
    #[derive(Debug, Default, Clone)]
    struct Recording {
        replies: Rc<RefCell<VecDeque<(u16, Vec<u8>)>>>,
        sent: Rc<RefCell<Vec<HttpRequest>>>,
        offline: Rc<Cell<bool>>,
    }

    impl Recording {
        fn reply(&self, status: u16, body: Value) -> &Self {
            self.replies
                .borrow_mut()
                .push_back((status, body.to_string().into_bytes()));
            self
        }

        fn reply_raw(&self, status: u16, body: &[u8]) -> &Self {
            self.replies.borrow_mut().push_back((status, body.to_vec()));
            self
        }

        fn next(&self, request: &HttpRequest) -> (u16, Vec<u8>) {
            self.sent.borrow_mut().push(request.clone());
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| (200, b"{}".to_vec()))
        }

        fn sent(&self) -> Vec<HttpRequest> {
            self.sent.borrow().clone()
        }
    }

    impl Transport for Recording {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
            if self.offline.get() {
                self.sent.borrow_mut().push(request.clone());
                return Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "net down").into());
            }
            let (status, body) = self.next(request);
            Ok(HttpResponse { status, body })
        }

        fn open(&self, request: &HttpRequest) -> Result<StreamResponse> {
            let (status, body) = self.next(request);
            Ok(StreamResponse {
                status,
                body: Box::new(std::io::Cursor::new(body)),
            })
        }
    }

    fn logged_in() -> (FrappeClient<Recording>, Recording) {
        let transport = Recording::default();
        transport.reply(200, json!({"message": "Logged In", "full_name": "Administrator"}));
        let client = FrappeClient::with_transport("http://erp.local", transport.clone(), "Administrator", "admin")
            .unwrap();
        (client, transport)
    }

    #[test]
    fn construction_logs_in() {
        let (client, transport) = logged_in();
        assert!(client.is_logged_in());
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].form_value("cmd"), Some("login"));
    }

    #[test]
    fn login_returns_envelope() {
        let (mut client, transport) = logged_in();
        transport.reply(200, json!({"message": "Logged In", "home_page": "/app"}));
        let envelope = client.login("Administrator", "admin").unwrap();
        assert_eq!(envelope["home_page"], "/app");
    }

    #[test]
    fn wrong_message_is_auth_error() {
        let transport = Recording::default();
        transport.reply(401, json!({"message": "Invalid credentials"}));
        let err = FrappeClient::with_transport("http://erp.local", transport, "u", "bad").unwrap_err();
        assert!(matches!(err, FrappeError::Auth { message } if message == "Invalid credentials"));
    }

    #[test]
    fn missing_message_is_auth_error() {
        let transport = Recording::default();
        transport.reply(200, json!({"data": "Logged In"}));
        let err = FrappeClient::with_transport("http://erp.local", transport, "u", "p").unwrap_err();
        assert!(matches!(err, FrappeError::Auth { .. }));
    }

    #[test]
    fn failed_construction_does_not_log_out() {
        let transport = Recording::default();
        transport.reply(401, json!({"message": "Invalid credentials"}));
        let _ = FrappeClient::with_transport("http://erp.local", transport.clone(), "u", "bad");
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn failed_relogin_keeps_cache() {
        let (mut client, transport) = logged_in();
        client.downloadable.insert("Item".to_string());
        transport.reply(200, json!({"message": "Nope"}));
        assert!(client.login("u", "p").is_err());
        assert!(client.downloadable_doctypes().contains("Item"));
    }

    #[test]
    fn successful_login_clears_cache() {
        let (mut client, transport) = logged_in();
        client.downloadable.insert("Item".to_string());
        transport.reply(200, json!({"message": "Logged In"}));
        client.login("u", "p").unwrap();
        assert!(client.downloadable_doctypes().is_empty());
    }

    #[test]
    fn drop_logs_out() {
        let (client, transport) = logged_in();
        drop(client);
        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].method, HttpMethod::Get);
        assert_eq!(sent[1].query_value("cmd"), Some("logout"));
    }

    #[test]
    fn explicit_logout_is_not_repeated_on_drop() {
        let (mut client, transport) = logged_in();
        client.downloadable.insert("Item".to_string());
        client.logout().unwrap();
        assert!(!client.is_logged_in());
        assert!(client.downloadable_doctypes().is_empty());
        drop(client);
        assert_eq!(transport.sent().len(), 2);
    }

    #[test]
    fn failed_logout_still_ends_session() {
        let (mut client, transport) = logged_in();
        client.downloadable.insert("Item".to_string());
        transport.offline.set(true);
        let err = client.logout().unwrap_err();
        assert!(matches!(err, FrappeError::Io(_)), "got {err:?}");
        assert!(client.downloadable_doctypes().is_empty());
        assert!(!client.is_logged_in());
        drop(client);
        assert_eq!(transport.sent().len(), 2, "no second logout on drop");
    }

    #[test]
    fn operations_unwrap_the_envelope() {
        let (client, transport) = logged_in();
        transport.reply(200, json!({"message": "Administrator", "data": "ignored"}));
        let value = client.get_value("User", Some("name"), None).unwrap();
        assert_eq!(value, "Administrator");

        transport.reply(200, json!({"data": {"name": "TODO-1"}}));
        let doc = client.get_doc("ToDo", &GetDocOptions::named("TODO-1")).unwrap();
        assert_eq!(doc["name"], "TODO-1");
    }

    #[test]
    fn server_exception_surfaces_as_error() {
        let (client, transport) = logged_in();
        transport.reply(417, json!({"exc": "Traceback...", "message": "ignored"}));
        let err = client.delete("ToDo", "TODO-1").unwrap_err();
        assert!(matches!(err, FrappeError::Server { detail } if detail == "Traceback..."));
    }

    #[test]
    fn non_json_body_is_an_error() {
        let (client, transport) = logged_in();
        transport.reply_raw(502, b"<html>Bad Gateway</html>");
        let err = client.get_api("ping", None).unwrap_err();
        assert!(matches!(err, FrappeError::Json { .. }));
    }

    #[test]
    fn template_guard_rejects_unknown_doctype_without_template_request() {
        let (mut client, transport) = logged_in();
        client.downloadable.extend(["A".to_string(), "B".to_string()]);
        let err = client.get_upload_template("C", false).unwrap_err();
        assert!(matches!(err, FrappeError::NotUploadable { doctype } if doctype == "C"));
        assert_eq!(transport.sent().len(), 1, "only the login request");
    }

    #[test]
    fn template_guard_loads_doctypes_once() {
        let (mut client, transport) = logged_in();
        transport.reply(200, json!({"message": ["Item", {"name": "Customer"}]}));
        transport.reply_raw(200, b"Column Labels:,Name");
        let mut template = client
            .get_upload_template("Customer", true)
            .unwrap()
            .into_content()
            .unwrap();
        let mut text = String::new();
        template.read_to_string(&mut text).unwrap();
        assert_eq!(text, "Column Labels:,Name");

        transport.reply_raw(200, b"second");
        client.get_upload_template("Item", false).unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 4);
        assert!(sent[1].url.ends_with("data_import_tool.get_doctypes/"));
        assert_eq!(sent[2].query_value("with_data"), Some("Yes"));
        assert_eq!(sent[3].query_value("with_data"), Some("No"));
    }

    #[test]
    fn pdf_error_status_unwraps_envelope() {
        let (client, transport) = logged_in();
        transport.reply(404, json!({"message": "Not found"}));
        match client.get_pdf("Sales Invoice", "SINV-1", &PrintOptions::default()).unwrap() {
            Download::Envelope(value) => assert_eq!(value, "Not found"),
            other => panic!("expected envelope, got {other:?}"),
        }
    }

    #[test]
    fn doctype_names_accepts_strings_and_objects() {
        let names = doctype_names(&json!(["Item", {"name": "Customer"}, 3, {"label": "x"}]));
        assert_eq!(names.len(), 2);
        assert!(names.contains("Item") && names.contains("Customer"));
        assert!(doctype_names(&Value::Null).is_empty());
    }
}
