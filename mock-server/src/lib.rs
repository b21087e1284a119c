//! In-memory imitation of the Frappe endpoints the client talks to.
//!
//! Sessions are tracked by a `sid` cookie handed out on login. Documents live
//! in a map keyed by doctype and name. Error responses use Frappe's envelope
//! shape (`exc_type` plus a traceback-like `exc`).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const ADMIN_USER: &str = "Administrator";
pub const ADMIN_PASSWORD: &str = "admin";

/// Doctypes the mock reports as importable.
pub const IMPORTABLE_DOCTYPES: [&str; 2] = ["ToDo", "Note"];

pub type Document = Map<String, Value>;
type Fields = HashMap<String, String>;

#[derive(Debug, Default)]
pub struct Site {
    users: HashMap<String, String>,
    sessions: HashMap<String, String>,
    docs: HashMap<String, BTreeMap<String, Document>>,
}

impl Site {
    pub fn new() -> Self {
        let mut site = Self::default();
        site.users
            .insert(ADMIN_USER.to_string(), ADMIN_PASSWORD.to_string());
        site
    }

    fn doc_mut(&mut self, doctype: &str, name: &str) -> Result<&mut Document, Response> {
        self.docs
            .get_mut(doctype)
            .and_then(|docs| docs.get_mut(name))
            .ok_or_else(|| not_found(doctype, name))
    }
}

pub type Db = Arc<RwLock<Site>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Site::new()));
    Router::new()
        .route("/", get(rpc_get).post(rpc_post))
        .route("/api/resource/{doctype}", axum::routing::post(insert_doc))
        .route("/api/resource/{doctype}/", get(list_docs))
        .route("/api/resource/{doctype}/{name}", get(get_doc).put(update_doc))
        .route("/api/method/{method}", get(method_get).post(method_post))
        .route("/api/method/{method}/", get(method_get).post(method_post))
        .route("/print", get(print_html))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

fn exception(status: StatusCode, exc_type: &str, message: &str) -> Response {
    let exc = format!(
        "Traceback (most recent call last):\n  File \"frappe/app.py\"\nfrappe.exceptions.{exc_type}: {message}"
    );
    (status, Json(json!({"exc_type": exc_type, "exc": exc}))).into_response()
}

fn not_found(doctype: &str, name: &str) -> Response {
    exception(
        StatusCode::NOT_FOUND,
        "DoesNotExistError",
        &format!("{doctype} {name} not found"),
    )
}

fn message(value: Value) -> Response {
    Json(json!({ "message": value })).into_response()
}

fn data(value: Value) -> Response {
    Json(json!({ "data": value })).into_response()
}

fn parse_json(fields: &Fields, key: &str) -> Result<Value, Response> {
    let raw = fields.get(key).map(String::as_str).unwrap_or("null");
    serde_json::from_str(raw).map_err(|e| {
        exception(
            StatusCode::BAD_REQUEST,
            "ValidationError",
            &format!("{key} is not valid JSON: {e}"),
        )
    })
}

fn field<'a>(fields: &'a Fields, key: &str) -> Result<&'a str, Response> {
    fields.get(key).map(String::as_str).ok_or_else(|| {
        exception(
            StatusCode::BAD_REQUEST,
            "MandatoryError",
            &format!("missing argument {key}"),
        )
    })
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix("sid="))
}

async fn current_user(db: &Db, headers: &HeaderMap) -> Result<String, Response> {
    let site = db.read().await;
    session_id(headers)
        .and_then(|sid| site.sessions.get(sid).cloned())
        .ok_or_else(|| exception(StatusCode::FORBIDDEN, "PermissionError", "not logged in"))
}

async fn login(db: &Db, fields: &Fields) -> Response {
    let user = fields.get("usr").cloned().unwrap_or_default();
    let password = fields.get("pwd").cloned().unwrap_or_default();
    let mut site = db.write().await;
    if site.users.get(&user) != Some(&password) {
        log::info!("rejected login for {user}");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Invalid Login. Try again.", "exc_type": "AuthenticationError"})),
        )
            .into_response();
    }
    let sid = Uuid::new_v4().simple().to_string();
    site.sessions.insert(sid.clone(), user.clone());
    log::info!("{user} logged in");
    (
        [(header::SET_COOKIE, format!("sid={sid}; Path=/; HttpOnly"))],
        Json(json!({"message": "Logged In", "home_page": "/app", "full_name": user})),
    )
        .into_response()
}

async fn logout(db: &Db, headers: &HeaderMap) -> Response {
    if let Some(sid) = session_id(headers) {
        db.write().await.sessions.remove(sid);
    }
    (
        [(header::SET_COOKIE, "sid=Guest; Path=/".to_string())],
        Json(json!({})),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// RPC on the site root
// ---------------------------------------------------------------------------

async fn rpc_get(State(db): State<Db>, headers: HeaderMap, Query(fields): Query<Fields>) -> Response {
    rpc(db, headers, fields).await
}

async fn rpc_post(State(db): State<Db>, headers: HeaderMap, Form(fields): Form<Fields>) -> Response {
    rpc(db, headers, fields).await
}

async fn rpc(db: Db, headers: HeaderMap, fields: Fields) -> Response {
    let cmd = fields.get("cmd").cloned().unwrap_or_default();
    match cmd.as_str() {
        "login" => return login(&db, &fields).await,
        "logout" => return logout(&db, &headers).await,
        _ => {}
    }
    if let Err(denied) = current_user(&db, &headers).await {
        return denied;
    }
    let result = match cmd.as_str() {
        "frappe.client.get_value" => get_value(&db, &fields).await,
        "frappe.client.set_value" => set_value(&db, &fields).await,
        "frappe.client.delete" => delete(&db, &fields).await,
        "frappe.client.submit" => set_docstatus(&db, &fields, 1).await,
        "frappe.client.cancel" => set_docstatus(&db, &fields, 2).await,
        "frappe.client.rename_doc" => rename_doc(&db, &fields).await,
        "frappe.client.bulk_update" => bulk_update(&db, &fields).await,
        other => Err(exception(
            StatusCode::NOT_FOUND,
            "ValidationError",
            &format!("method {other} not found"),
        )),
    };
    result.unwrap_or_else(|e| e)
}

fn matches_filters(doc: &Document, filters: &Value) -> bool {
    match filters {
        Value::Object(wanted) => wanted.iter().all(|(k, v)| doc.get(k) == Some(v)),
        _ => true,
    }
}

async fn get_value(db: &Db, fields: &Fields) -> Result<Response, Response> {
    let doctype = field(fields, "doctype")?;
    let fieldname = field(fields, "fieldname")?;
    let filters = parse_json(fields, "filters")?;
    let site = db.read().await;
    let found = site
        .docs
        .get(doctype)
        .and_then(|docs| docs.values().find(|doc| matches_filters(doc, &filters)));
    Ok(match found {
        Some(doc) => message(json!({ fieldname: doc.get(fieldname).cloned().unwrap_or(Value::Null) })),
        None => message(Value::Null),
    })
}

async fn set_value(db: &Db, fields: &Fields) -> Result<Response, Response> {
    let doctype = field(fields, "doctype")?;
    let name = field(fields, "name")?;
    let fieldname = field(fields, "fieldname")?;
    let raw = field(fields, "value")?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    let mut site = db.write().await;
    let doc = site.doc_mut(doctype, name)?;
    doc.insert(fieldname.to_string(), value);
    Ok(message(Value::Object(doc.clone())))
}

async fn delete(db: &Db, fields: &Fields) -> Result<Response, Response> {
    let doctype = field(fields, "doctype")?;
    let name = field(fields, "name")?;
    let mut site = db.write().await;
    site.docs
        .get_mut(doctype)
        .and_then(|docs| docs.remove(name))
        .ok_or_else(|| not_found(doctype, name))?;
    Ok(Json(json!({})).into_response())
}

async fn set_docstatus(db: &Db, fields: &Fields, status: u64) -> Result<Response, Response> {
    let (doctype, name) = if status == 1 {
        let doclist = parse_json(fields, "doclist")?;
        let text = |key: &str| doclist.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
        (text("doctype"), text("name"))
    } else {
        (field(fields, "doctype")?.to_string(), field(fields, "name")?.to_string())
    };
    let mut site = db.write().await;
    let doc = site.doc_mut(&doctype, &name)?;
    let current = doc.get("docstatus").and_then(Value::as_u64).unwrap_or(0);
    if current + 1 != status {
        return Err(exception(
            StatusCode::EXPECTATION_FAILED,
            "DocstatusTransitionError",
            &format!("cannot change docstatus from {current} to {status}"),
        ));
    }
    doc.insert("docstatus".to_string(), json!(status));
    Ok(message(Value::Object(doc.clone())))
}

async fn rename_doc(db: &Db, fields: &Fields) -> Result<Response, Response> {
    let doctype = field(fields, "doctype")?;
    let old_name = field(fields, "old_name")?;
    let new_name = field(fields, "new_name")?;
    let mut site = db.write().await;
    let docs = site
        .docs
        .get_mut(doctype)
        .ok_or_else(|| not_found(doctype, old_name))?;
    let mut doc = docs.remove(old_name).ok_or_else(|| not_found(doctype, old_name))?;
    doc.insert("name".to_string(), json!(new_name));
    docs.insert(new_name.to_string(), doc);
    Ok(message(json!(new_name)))
}

async fn bulk_update(db: &Db, fields: &Fields) -> Result<Response, Response> {
    let docs = parse_json(fields, "docs")?;
    let mut failed = Vec::new();
    let mut site = db.write().await;
    for update in docs.as_array().into_iter().flatten() {
        let Some(update) = update.as_object() else {
            continue;
        };
        let doctype = update.get("doctype").and_then(Value::as_str).unwrap_or_default();
        let name = update.get("name").and_then(Value::as_str).unwrap_or_default();
        match site.doc_mut(doctype, name) {
            Ok(doc) => doc.extend(update.clone()),
            Err(_) => failed.push(json!(name)),
        }
    }
    Ok(message(json!({ "failed_docs": failed })))
}

// ---------------------------------------------------------------------------
// REST resources
// ---------------------------------------------------------------------------

async fn insert_doc(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(doctype): Path<String>,
    Form(fields): Form<Fields>,
) -> Response {
    if let Err(denied) = current_user(&db, &headers).await {
        return denied;
    }
    let mut doc = match parse_json(&fields, "data") {
        Ok(Value::Object(doc)) => doc,
        Ok(_) => return exception(StatusCode::BAD_REQUEST, "ValidationError", "data must be an object"),
        Err(e) => return e,
    };
    let name = doc
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string()[..10].to_string());
    doc.insert("name".to_string(), json!(name));
    doc.insert("doctype".to_string(), json!(doctype));
    doc.entry("docstatus").or_insert(json!(0));

    let mut site = db.write().await;
    let docs = site.docs.entry(doctype.clone()).or_default();
    if docs.contains_key(&name) {
        return exception(
            StatusCode::CONFLICT,
            "DuplicateEntryError",
            &format!("{doctype} {name} already exists"),
        );
    }
    docs.insert(name, doc.clone());
    data(Value::Object(doc))
}

async fn get_doc(
    State(db): State<Db>,
    headers: HeaderMap,
    Path((doctype, name)): Path<(String, String)>,
) -> Response {
    if let Err(denied) = current_user(&db, &headers).await {
        return denied;
    }
    let site = db.read().await;
    match site.docs.get(&doctype).and_then(|docs| docs.get(&name)) {
        Some(doc) => data(Value::Object(doc.clone())),
        None => not_found(&doctype, &name),
    }
}

async fn update_doc(
    State(db): State<Db>,
    headers: HeaderMap,
    Path((doctype, name)): Path<(String, String)>,
    Form(fields): Form<Fields>,
) -> Response {
    if let Err(denied) = current_user(&db, &headers).await {
        return denied;
    }
    let changes = match parse_json(&fields, "data") {
        Ok(Value::Object(changes)) => changes,
        Ok(_) => return exception(StatusCode::BAD_REQUEST, "ValidationError", "data must be an object"),
        Err(e) => return e,
    };
    let mut site = db.write().await;
    match site.doc_mut(&doctype, &name) {
        Ok(doc) => {
            doc.extend(changes);
            doc.insert("name".to_string(), json!(name));
            data(Value::Object(doc.clone()))
        }
        Err(e) => e,
    }
}

async fn list_docs(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(doctype): Path<String>,
    Query(fields): Query<Fields>,
) -> Response {
    if let Err(denied) = current_user(&db, &headers).await {
        return denied;
    }
    list(&db, &doctype, &fields).await.unwrap_or_else(|e| e)
}

async fn list(db: &Db, doctype: &str, fields: &Fields) -> Result<Response, Response> {
    let filters = parse_json(fields, "filters")?;
    let start = parse_json(fields, "limit_start")?.as_u64().unwrap_or(0) as usize;
    let length = parse_json(fields, "limit_page_length")?.as_u64().unwrap_or(20) as usize;
    let wanted: Vec<String> = match parse_json(fields, "fields")? {
        Value::Array(names) => names.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => vec!["name".to_string()],
    };

    let site = db.read().await;
    let rows: Vec<Value> = site
        .docs
        .get(doctype)
        .into_iter()
        .flat_map(|docs| docs.values())
        .filter(|doc| matches_filters(doc, &filters))
        .skip(start)
        .take(length)
        .map(|doc| {
            let row: Document = if wanted.iter().any(|f| f == "*") {
                doc.clone()
            } else {
                wanted
                    .iter()
                    .map(|f| (f.clone(), doc.get(f).cloned().unwrap_or(Value::Null)))
                    .collect()
            };
            Value::Object(row)
        })
        .collect();
    Ok(data(Value::Array(rows)))
}

// ---------------------------------------------------------------------------
// Whitelisted methods and downloads
// ---------------------------------------------------------------------------

async fn method_get(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(method): Path<String>,
    Query(fields): Query<Fields>,
) -> Response {
    method_call(db, headers, method, fields).await
}

async fn method_post(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(method): Path<String>,
    Query(fields): Query<Fields>,
) -> Response {
    method_call(db, headers, method, fields).await
}

async fn method_call(db: Db, headers: HeaderMap, method: String, fields: Fields) -> Response {
    if method == "ping" {
        return message(json!("pong"));
    }
    let user = match current_user(&db, &headers).await {
        Ok(user) => user,
        Err(denied) => return denied,
    };
    match method.as_str() {
        "frappe.auth.get_logged_user" => message(json!(user)),
        "frappe.core.page.data_import_tool.data_import_tool.get_doctypes" => {
            message(json!(IMPORTABLE_DOCTYPES))
        }
        "frappe.core.page.data_import_tool.exporter.get_template" => {
            let doctype = fields.get("doctype").cloned().unwrap_or_default();
            let with_data = fields.get("with_data").map(String::as_str) == Some("Yes");
            let mut csv = format!("Data Import Template\nTable:,{doctype}\nColumn Labels:,name\n");
            if with_data {
                let site = db.read().await;
                for name in site.docs.get(&doctype).into_iter().flat_map(|docs| docs.keys()) {
                    csv.push_str(&format!(",{name}\n"));
                }
            }
            ([(header::CONTENT_TYPE, "text/csv")], csv).into_response()
        }
        "frappe.templates.pages.print.download_pdf" => {
            let doctype = fields.get("doctype").cloned().unwrap_or_default();
            let name = fields.get("name").cloned().unwrap_or_default();
            let site = db.read().await;
            if site.docs.get(&doctype).and_then(|docs| docs.get(&name)).is_none() {
                return not_found(&doctype, &name);
            }
            let body = format!("%PDF-1.4\n% {doctype} {name}\n{}\n%%EOF\n", "0".repeat(4096));
            ([(header::CONTENT_TYPE, "application/pdf")], body).into_response()
        }
        other => exception(
            StatusCode::NOT_FOUND,
            "ValidationError",
            &format!("method {other} not found"),
        ),
    }
}

async fn print_html(State(db): State<Db>, headers: HeaderMap, Query(fields): Query<Fields>) -> Response {
    if let Err(denied) = current_user(&db, &headers).await {
        return denied;
    }
    let doctype = fields.get("doctype").cloned().unwrap_or_default();
    let name = fields.get("name").cloned().unwrap_or_default();
    let format = fields.get("format").cloned().unwrap_or_default();
    let letterhead = fields.get("no_letterhead").map(String::as_str) != Some("1");
    let site = db.read().await;
    if site.docs.get(&doctype).and_then(|docs| docs.get(&name)).is_none() {
        return not_found(&doctype, &name);
    }
    let header_html = if letterhead { "<div class=\"letter-head\"></div>" } else { "" };
    let html = format!("<html><body data-format=\"{format}\">{header_html}<h1>{doctype} {name}</h1></body></html>");
    ([(header::CONTENT_TYPE, "text/html")], html).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, cookie.parse().unwrap());
        headers
    }

    #[test]
    fn session_id_found_among_cookies() {
        let headers = headers_with("system_user=yes; sid=abc123; full_name=Admin");
        assert_eq!(session_id(&headers), Some("abc123"));
    }

    #[test]
    fn session_id_absent_without_cookie() {
        assert_eq!(session_id(&HeaderMap::new()), None);
        assert_eq!(session_id(&headers_with("user_id=Guest")), None);
    }

    #[test]
    fn filters_match_on_equal_fields() {
        let doc = json!({"status": "Open", "priority": "High"}).as_object().cloned().unwrap();
        assert!(matches_filters(&doc, &json!({"status": "Open"})));
        assert!(!matches_filters(&doc, &json!({"status": "Closed"})));
        assert!(matches_filters(&doc, &Value::Null));
    }

    #[test]
    fn site_starts_with_admin_only() {
        let site = Site::new();
        assert_eq!(site.users.get(ADMIN_USER).map(String::as_str), Some(ADMIN_PASSWORD));
        assert!(site.sessions.is_empty());
        assert!(site.docs.is_empty());
    }
}
