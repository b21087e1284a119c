//! Stateless request builder for the Frappe REST and RPC surface.
//!
//! # Design
//! `ApiRequests` holds only the base URL and carries no state between calls.
//! Every client operation has a method here producing the `HttpRequest` it
//! sends, so the exact wire shape of each call can be tested without a
//! server. `FrappeClient` pairs these with a `Transport` and the envelope
//! parser.
//!
//! RPC calls go to the base URL with the method name in the `cmd` field:
//! as query parameters for reads, as a form body for writes.

use serde_json::{json, Value};

use crate::envelope::is_truthy;
use crate::error::Result;
use crate::http::{HttpMethod, HttpRequest};
use crate::types::{required_str, Document, GetDocOptions, Params, PrintOptions};

/// RPC method listing the doctypes that have an upload template.
pub const GET_DOCTYPES_METHOD: &str = "frappe.core.page.data_import_tool.data_import_tool.get_doctypes";

const DOWNLOAD_PDF_METHOD: &str = "frappe.templates.pages.print.download_pdf";
const GET_TEMPLATE_METHOD: &str = "frappe.core.page.data_import_tool.exporter.get_template";

/// Builds `HttpRequest` values for every client operation.
#[derive(Debug, Clone)]
pub struct ApiRequests {
    base_url: String,
}

impl ApiRequests {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    pub fn login(&self, username: &str, password: &str) -> HttpRequest {
        self.rpc(
            HttpMethod::Post,
            params([
                ("cmd", json!("login")),
                ("usr", json!(username)),
                ("pwd", json!(password)),
            ]),
        )
    }

    pub fn logout(&self) -> HttpRequest {
        self.rpc(HttpMethod::Get, params([("cmd", json!("logout"))]))
    }

    // -----------------------------------------------------------------------
    // Resources
    // -----------------------------------------------------------------------

    pub fn insert(&self, doc: &Document) -> Result<HttpRequest> {
        let doctype = required_str(doc, "doctype")?;
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: format!("{}/api/resource/{}", self.base_url, segment(doctype)),
            query: Vec::new(),
            form: Some(vec![("data".to_string(), Value::Object(doc.clone()).to_string())]),
        })
    }

    pub fn update(&self, doc: &Document) -> Result<HttpRequest> {
        let doctype = required_str(doc, "doctype")?;
        let name = required_str(doc, "name")?;
        Ok(HttpRequest {
            method: HttpMethod::Put,
            url: self.resource_url(doctype, name),
            query: Vec::new(),
            form: Some(vec![("data".to_string(), Value::Object(doc.clone()).to_string())]),
        })
    }

    /// Fetch a document, or list documents when `options.name` is empty.
    pub fn get_doc(&self, doctype: &str, options: &GetDocOptions) -> HttpRequest {
        let mut query = Vec::new();
        if is_truthy(&options.filters) {
            query.push(("filters".to_string(), options.filters.to_string()));
        }
        if !options.fields.is_empty() {
            query.push(("fields".to_string(), json!(options.fields).to_string()));
        }
        if options.limit_start > 0 {
            query.push(("limit_start".to_string(), options.limit_start.to_string()));
        }
        if options.limit_page_length > 0 {
            query.push((
                "limit_page_length".to_string(),
                options.limit_page_length.to_string(),
            ));
        }
        if !options.order_by.is_empty() {
            query.push(("order_by".to_string(), options.order_by.clone()));
        }
        HttpRequest {
            method: HttpMethod::Get,
            url: self.resource_url(doctype, &options.name),
            query,
            form: None,
        }
    }

    // -----------------------------------------------------------------------
    // frappe.client RPC methods
    // -----------------------------------------------------------------------

    pub fn bulk_update(&self, docs: &[Document]) -> HttpRequest {
        let docs = docs.iter().cloned().map(Value::Object).collect::<Vec<_>>();
        self.rpc(
            HttpMethod::Post,
            params([
                ("cmd", json!("frappe.client.bulk_update")),
                ("docs", Value::Array(docs)),
            ]),
        )
    }

    pub fn delete(&self, doctype: &str, name: &str) -> HttpRequest {
        self.rpc(
            HttpMethod::Post,
            params([
                ("cmd", json!("frappe.client.delete")),
                ("doctype", json!(doctype)),
                ("name", json!(name)),
            ]),
        )
    }

    pub fn submit(&self, doclist: &Value) -> HttpRequest {
        self.rpc(
            HttpMethod::Post,
            params([
                ("cmd", json!("frappe.client.submit")),
                ("doclist", json!(doclist.to_string())),
            ]),
        )
    }

    /// `fieldname` defaults to `name`; absent filters are sent as `null`.
    pub fn get_value(
        &self,
        doctype: &str,
        fieldname: Option<&str>,
        filters: Option<&Value>,
    ) -> HttpRequest {
        let filters = filters.cloned().unwrap_or(Value::Null);
        self.rpc(
            HttpMethod::Get,
            params([
                ("cmd", json!("frappe.client.get_value")),
                ("doctype", json!(doctype)),
                ("fieldname", json!(fieldname.unwrap_or("name"))),
                ("filters", json!(filters.to_string())),
            ]),
        )
    }

    pub fn set_value(&self, doctype: &str, name: &str, fieldname: &str, value: Value) -> HttpRequest {
        self.rpc(
            HttpMethod::Post,
            params([
                ("cmd", json!("frappe.client.set_value")),
                ("doctype", json!(doctype)),
                ("name", json!(name)),
                ("fieldname", json!(fieldname)),
                ("value", value),
            ]),
        )
    }

    pub fn cancel(&self, doctype: &str, name: &str) -> HttpRequest {
        self.rpc(
            HttpMethod::Post,
            params([
                ("cmd", json!("frappe.client.cancel")),
                ("doctype", json!(doctype)),
                ("name", json!(name)),
            ]),
        )
    }

    pub fn rename_doc(&self, doctype: &str, old_name: &str, new_name: &str) -> HttpRequest {
        self.rpc(
            HttpMethod::Post,
            params([
                ("cmd", json!("frappe.client.rename_doc")),
                ("doctype", json!(doctype)),
                ("old_name", json!(old_name)),
                ("new_name", json!(new_name)),
            ]),
        )
    }

    // -----------------------------------------------------------------------
    // Whitelisted methods
    // -----------------------------------------------------------------------

    pub fn get_api(&self, method: &str, params: Option<&Params>) -> HttpRequest {
        self.method_call(HttpMethod::Get, method, params)
    }

    /// Parameters travel in the query string, as the server's method
    /// endpoint reads them from there for POST too.
    pub fn post_api(&self, method: &str, params: Option<&Params>) -> HttpRequest {
        self.method_call(HttpMethod::Post, method, params)
    }

    pub fn get_request(&self, params: &Params) -> HttpRequest {
        self.rpc(HttpMethod::Get, params.clone())
    }

    pub fn post_request(&self, params: &Params) -> HttpRequest {
        self.rpc(HttpMethod::Post, params.clone())
    }

    // -----------------------------------------------------------------------
    // Downloads
    // -----------------------------------------------------------------------

    pub fn get_pdf(&self, doctype: &str, name: &str, print: &PrintOptions) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: format!("{}/api/method/{DOWNLOAD_PDF_METHOD}", self.base_url),
            query: print_query(doctype, name, print),
            form: None,
        }
    }

    pub fn get_html(&self, doctype: &str, name: &str, print: &PrintOptions) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: format!("{}/print", self.base_url),
            query: print_query(doctype, name, print),
            form: None,
        }
    }

    pub fn get_doctypes(&self) -> HttpRequest {
        self.get_api(GET_DOCTYPES_METHOD, None)
    }

    pub fn get_upload_template(&self, doctype: &str, with_data: bool) -> HttpRequest {
        let yes_no = |flag: bool| if flag { "Yes" } else { "No" };
        HttpRequest {
            method: HttpMethod::Get,
            url: format!("{}/api/method/{GET_TEMPLATE_METHOD}", self.base_url),
            query: pairs([
                ("doctype", doctype),
                ("parent_doctype", doctype),
                ("with_data", yes_no(with_data)),
                ("all_doctypes", "Yes"),
            ]),
            form: None,
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn resource_url(&self, doctype: &str, name: &str) -> String {
        format!(
            "{}/api/resource/{}/{}",
            self.base_url,
            segment(doctype),
            segment(name)
        )
    }

    fn rpc(&self, method: HttpMethod, params: Params) -> HttpRequest {
        let encoded = preprocess(&params);
        let (query, form) = match method {
            HttpMethod::Get => (encoded, None),
            HttpMethod::Post | HttpMethod::Put => (Vec::new(), Some(encoded)),
        };
        HttpRequest {
            method,
            url: self.base_url.clone(),
            query,
            form,
        }
    }

    fn method_call(&self, method: HttpMethod, name: &str, params: Option<&Params>) -> HttpRequest {
        HttpRequest {
            method,
            url: format!("{}/api/method/{}/", self.base_url, segment(name)),
            query: params.map(preprocess).unwrap_or_default(),
            form: None,
        }
    }
}

/// Flatten RPC parameters into request fields.
///
/// Objects and arrays are sent as their JSON text, strings verbatim, numbers
/// and booleans as JSON literals. `null` values are dropped.
///
/// Booleans go on the wire as lowercase `true`/`false`.
pub fn preprocess(params: &Params) -> Vec<(String, String)> {
    params
        .iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((key.clone(), text))
        })
        .collect()
}

fn params<const N: usize>(entries: [(&str, Value); N]) -> Params {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn pairs<const N: usize>(entries: [(&str, &str); N]) -> Vec<(String, String)> {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn print_query(doctype: &str, name: &str, print: &PrintOptions) -> Vec<(String, String)> {
    let no_letterhead = if print.letterhead { "0" } else { "1" };
    pairs([
        ("doctype", doctype),
        ("name", name),
        ("format", print.print_format.as_str()),
        ("no_letterhead", no_letterhead),
    ])
}

fn segment(raw: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(raw)
}
