//! Handler module.
//!
//! The browsing surface is query-string driven: one GET and one POST
//! endpoint at the root dispatch on the `action` parameter. Mutations
//! answer with a 303 redirect carrying a `msg` token; dump downloads
//! answer with an attachment; everything else answers JSON in the
//! standard envelope.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use common::errors::{AppError, AppResult};
use common::models::{ColumnDescriptor, PageRequest, TableDescriptor, PAGE_SIZE};
use common::response::{ApiResponse, Pagination};

use crate::browser::{Browser, MutationOutcome};
use crate::driver::JsonRow;
use crate::export::{export_filename, SqlDumper};
use crate::state::AppState;

const SERVICE_NAME: &str = "viewer-service";

/// Query-string parameters accepted by the browsing surface.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BrowseQuery {
    /// Table to browse or operate on.
    pub table: Option<String>,
    /// 1-based page number.
    pub page: Option<u32>,
    /// Database to activate before the operation.
    pub db: Option<String>,
    /// Operation selector (browse when absent).
    pub action: Option<String>,
    /// Primary-key value for record operations.
    pub id: Option<String>,
    /// Status token echoed back after a redirect.
    pub msg: Option<String>,
}

/// Everything the browse view needs for one render.
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct BrowsePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_info: Option<String>,
    /// Set when handle resolution failed; the rest of the payload is
    /// empty and the view shows this as a banner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Selectable databases, populated only when none is configured.
    pub databases: Vec<String>,
    pub tables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<TableView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One table's metadata plus the requested page of records.
#[derive(Debug, Serialize, ToSchema)]
pub struct TableView {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    #[schema(value_type = Vec<Object>)]
    pub rows: Vec<JsonRow>,
    pub pagination: Pagination,
}

/// One record plus the key column the edit form should treat as
/// read-only.
#[derive(Debug, Serialize, ToSchema)]
pub struct RecordPayload {
    #[schema(value_type = Object)]
    pub record: JsonRow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
}

/// Browse and record operations, dispatched on `action`.
#[utoipa::path(
    get,
    path = "/",
    tag = "viewer",
    params(BrowseQuery),
    responses(
        (status = 200, description = "Browse payload or JSON endpoint data", body = ApiResponse<BrowsePayload>),
        (status = 303, description = "Mutation applied, redirect with msg token"),
        (status = 400, description = "Unknown action or missing parameter"),
        (status = 404, description = "Table or record not found"),
        (status = 503, description = "Connection resolution failed")
    )
)]
pub async fn dispatch_get(
    State(state): State<AppState>,
    Query(query): Query<BrowseQuery>,
) -> Result<Response, AppError> {
    match query.action.as_deref() {
        None => browse(&state, &query).await,
        Some("get_columns") => get_columns(&state, &query).await,
        Some("get_record") => get_record(&state, &query).await,
        Some("delete") => delete_record(&state, &query).await,
        Some("export") => export_table(&state, &query).await,
        Some("export_db") => export_database(&state, &query).await,
        Some(other) => Err(AppError::Validation(format!("unknown action {other}"))),
    }
}

/// Insert and update submissions. Form fields carry a `field_` prefix
/// in front of the column name.
#[utoipa::path(
    post,
    path = "/",
    tag = "viewer",
    params(BrowseQuery),
    responses(
        (status = 303, description = "Mutation applied, redirect with msg token"),
        (status = 400, description = "Unknown action, missing parameter, or rejected statement"),
        (status = 422, description = "Table has no usable primary key"),
        (status = 503, description = "Connection resolution failed")
    )
)]
pub async fn dispatch_post(
    State(state): State<AppState>,
    Query(query): Query<BrowseQuery>,
    Form(form): Form<BTreeMap<String, String>>,
) -> Result<Response, AppError> {
    let table = require(query.table.as_deref(), "table")?;
    let fields = field_values(&form);
    let browser = open_browser(&state, &query).await?;

    match query.action.as_deref() {
        Some("insert") => {
            let outcome = browser.insert(table, &fields).await?;
            Ok(redirect(table, 1, mutation_msg(&outcome, "inserted")))
        }
        Some("edit") | Some("update") => {
            let id = require(query.id.as_deref(), "id")?;
            let outcome = browser.update(table, id, &fields).await?;
            Ok(redirect(
                table,
                query.page.unwrap_or(1),
                mutation_msg(&outcome, "updated"),
            ))
        }
        _ => Err(AppError::Validation("unknown form action".to_string())),
    }
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

async fn browse(state: &AppState, query: &BrowseQuery) -> Result<Response, AppError> {
    let browser = match open_browser(state, query).await {
        Ok(browser) => browser,
        // resolution failure renders as a banner, not a failed page
        Err(AppError::ConnectionResolution(message)) => {
            let payload = BrowsePayload {
                connection_error: Some(message),
                message: query.msg.clone(),
                ..Default::default()
            };
            return Ok(envelope(payload));
        }
        Err(e) => return Err(e),
    };

    let mut payload = BrowsePayload {
        server_info: Some(browser.handle().server_info()),
        message: query.msg.clone(),
        ..Default::default()
    };

    let mut database = browser.current_database().await?;
    if database.is_none() {
        payload.databases = browser.list_databases().await?;
        if let Some(first) = payload.databases.first().cloned() {
            browser.use_database(&first).await?;
            database = Some(first);
        }
    }
    payload.database = database;

    if payload.database.is_some() {
        payload.tables = browser.list_tables().await?;
    }

    if let Some(table) = query.table.as_deref().filter(|t| !t.is_empty()) {
        let descriptor = browser.describe(table).await?;
        let request = PageRequest::new(table, query.page.unwrap_or(1));
        let page = browser.page(&request).await?;
        payload.table = Some(TableView {
            name: descriptor.name,
            columns: descriptor.columns,
            primary_key: descriptor.primary_key,
            rows: page.rows,
            pagination: Pagination::new(request.page, PAGE_SIZE, page.total),
        });
    }

    Ok(envelope(payload))
}

async fn get_columns(state: &AppState, query: &BrowseQuery) -> Result<Response, AppError> {
    let table = require(query.table.as_deref(), "table")?;
    let browser = open_browser(state, query).await?;
    let descriptor: TableDescriptor = browser.describe(table).await?;
    Ok(envelope(descriptor))
}

async fn get_record(state: &AppState, query: &BrowseQuery) -> Result<Response, AppError> {
    let table = require(query.table.as_deref(), "table")?;
    let id = require(query.id.as_deref(), "id")?;
    let browser = open_browser(state, query).await?;
    let primary_key = browser.primary_key_of(table).await?;
    let record = browser.get_record(table, id).await?;
    Ok(envelope(RecordPayload {
        record,
        primary_key,
    }))
}

async fn delete_record(state: &AppState, query: &BrowseQuery) -> Result<Response, AppError> {
    let table = require(query.table.as_deref(), "table")?;
    let id = require(query.id.as_deref(), "id")?;
    let browser = open_browser(state, query).await?;
    browser.delete(table, id).await?;
    Ok(redirect(table, query.page.unwrap_or(1), "deleted"))
}

async fn export_table(state: &AppState, query: &BrowseQuery) -> Result<Response, AppError> {
    let table = require(query.table.as_deref(), "table")?;
    let browser = open_browser(state, query).await?;
    let dump = SqlDumper::new(browser.handle().clone())
        .export_table(table)
        .await?;
    Ok(sql_attachment(&export_filename(table), dump))
}

async fn export_database(state: &AppState, query: &BrowseQuery) -> Result<Response, AppError> {
    let browser = open_browser(state, query).await?;
    let stem = browser
        .current_database()
        .await?
        .unwrap_or_else(|| "database".to_string());
    let dump = SqlDumper::new(browser.handle().clone())
        .export_database()
        .await?;
    Ok(sql_attachment(&export_filename(&stem), dump))
}

/// Resolves a handle for this request and activates the requested
/// database, if any.
async fn open_browser(state: &AppState, query: &BrowseQuery) -> AppResult<Browser> {
    let resolution = state.resolver.resolve().await?;
    let browser = Browser::new(resolution.handle);
    if let Some(db) = query.db.as_deref().filter(|d| !d.is_empty()) {
        browser.use_database(db).await?;
    }
    Ok(browser)
}

fn envelope<T: Serialize>(data: T) -> Response {
    Json(ApiResponse::ok_with_service(data, SERVICE_NAME)).into_response()
}

fn require<'a>(value: Option<&'a str>, name: &str) -> AppResult<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("missing {name} parameter")))
}

/// Collects submitted column values, dropping anything without the
/// `field_` prefix.
fn field_values(form: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    form.iter()
        .filter_map(|(key, value)| {
            key.strip_prefix("field_")
                .map(|column| (column.to_string(), value.clone()))
        })
        .collect()
}

fn mutation_msg(outcome: &MutationOutcome, applied: &'static str) -> &'static str {
    match outcome {
        MutationOutcome::Applied(_) => applied,
        MutationOutcome::NothingChanged => "nochange",
    }
}

fn redirect(table: &str, page: u32, msg: &str) -> Response {
    Redirect::to(&format!("/?table={table}&page={page}&msg={msg}")).into_response()
}

fn sql_attachment(filename: &str, dump: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/sql".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        dump,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_prefix_selects_column_values() {
        let mut form = BTreeMap::new();
        form.insert("field_name".to_string(), "gear".to_string());
        form.insert("field_note".to_string(), String::new());
        form.insert("csrf_token".to_string(), "x".to_string());

        let fields = field_values(&form);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("name").map(String::as_str), Some("gear"));
        assert_eq!(fields.get("note").map(String::as_str), Some(""));
        assert!(!fields.contains_key("csrf_token"));
    }

    #[test]
    fn missing_parameters_are_validation_errors() {
        assert_eq!(require(Some("widgets"), "table").unwrap(), "widgets");
        assert!(require(None, "table").is_err());
        assert!(require(Some(""), "id").is_err());
    }

    #[test]
    fn nothing_changed_reports_nochange() {
        assert_eq!(mutation_msg(&MutationOutcome::Applied(1), "updated"), "updated");
        assert_eq!(
            mutation_msg(&MutationOutcome::NothingChanged, "inserted"),
            "nochange"
        );
    }
}
