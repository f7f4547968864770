//! Table browsing and single-table editing over a resolved handle.
//!
//! Statements are built from introspected column metadata: mutations
//! only ever touch columns the table actually declares, with values
//! bound as parameters. Identifiers are backtick-quoted.

use std::collections::BTreeMap;

use common::errors::{AppError, AppResult};
use common::models::{PageRequest, TableDescriptor, PAGE_SIZE};
use common::utils::quote_ident;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::driver::{JsonRow, ResolvedHandle};

/// Schemas never shown in the database picker.
const SYSTEM_SCHEMAS: [&str; 4] = ["information_schema", "performance_schema", "mysql", "sys"];

/// One page of records with the unpaged total.
#[derive(Debug, Serialize, ToSchema)]
pub struct TablePage {
    #[schema(value_type = Vec<Object>)]
    pub rows: Vec<JsonRow>,
    pub total: u64,
}

/// What a mutation actually did.
#[derive(Debug, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Statement ran; count of affected rows.
    Applied(u64),
    /// No recognized fields, nothing was sent to the database.
    NothingChanged,
}

/// Browsing and editing operations bound to one request's handle.
pub struct Browser {
    handle: ResolvedHandle,
}

impl Browser {
    pub fn new(handle: ResolvedHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &ResolvedHandle {
        &self.handle
    }

    /// All database names minus the system schemas. Used when no
    /// database is statically configured.
    pub async fn list_databases(&self) -> AppResult<Vec<String>> {
        let rows = self
            .handle
            .query("SHOW DATABASES")
            .await
            .map_err(|e| AppError::SchemaIntrospection(e.to_string()))?;
        Ok(rows
            .iter()
            .filter_map(first_string_cell)
            .filter(|name| !SYSTEM_SCHEMAS.contains(&name.as_str()))
            .collect())
    }

    /// Switches the active database for this handle.
    pub async fn use_database(&self, database: &str) -> AppResult<()> {
        self.handle
            .exec_raw(&format!("USE {}", quote_ident(database)))
            .await
    }

    /// Name of the active database, if one is selected.
    pub async fn current_database(&self) -> AppResult<Option<String>> {
        let rows = self.handle.query("SELECT DATABASE() AS db").await?;
        Ok(rows.first().and_then(|row| {
            row.get("db")
                .and_then(Value::as_str)
                .map(str::to_string)
        }))
    }

    pub async fn list_tables(&self) -> AppResult<Vec<String>> {
        self.handle.list_tables().await
    }

    /// Full metadata for one table.
    pub async fn describe(&self, table: &str) -> AppResult<TableDescriptor> {
        let columns = self.handle.describe_columns(table).await?;
        if columns.is_empty() {
            return Err(AppError::SchemaIntrospection(format!(
                "table {table} has no columns"
            )));
        }
        let primary_key = self.primary_key_of(table).await?;
        Ok(TableDescriptor {
            name: table.to_string(),
            columns,
            primary_key,
        })
    }

    /// The single PRIMARY column, or `None` for tables with a
    /// composite or absent primary key. Such tables cannot be edited
    /// or deleted.
    pub async fn primary_key_of(&self, table: &str) -> AppResult<Option<String>> {
        let sql = format!(
            "SHOW KEYS FROM {} WHERE Key_name = 'PRIMARY'",
            quote_ident(table)
        );
        let rows = self.handle.query(&sql).await?;
        let mut names = rows.iter().filter_map(|row| {
            row.get("Column_name")
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        match (names.next(), names.next()) {
            (Some(name), None) => Ok(Some(name)),
            _ => Ok(None),
        }
    }

    /// One fixed-size page of records plus the unpaged row count.
    pub async fn page(&self, request: &PageRequest) -> AppResult<TablePage> {
        let table = quote_ident(&request.table);

        let count_rows = self
            .handle
            .query(&format!("SELECT COUNT(*) AS total FROM {table}"))
            .await?;
        let total = count_rows
            .first()
            .and_then(|row| row.get("total"))
            .and_then(count_cell)
            .unwrap_or(0);

        let rows = self
            .handle
            .query(&format!(
                "SELECT * FROM {table} LIMIT {PAGE_SIZE} OFFSET {}",
                request.offset()
            ))
            .await?;

        Ok(TablePage { rows, total })
    }

    /// Fetches one record by primary key.
    pub async fn get_record(&self, table: &str, id: &str) -> AppResult<JsonRow> {
        let pk = self.require_primary_key(table).await?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ? LIMIT 1",
            quote_ident(table),
            quote_ident(&pk)
        );
        let mut rows = self
            .handle
            .query_params(&sql, vec![Some(id.to_string())])
            .await?;
        if rows.is_empty() {
            return Err(AppError::NotFound(format!("record {id} in {table}")));
        }
        Ok(rows.remove(0))
    }

    /// Parameterized INSERT over the submitted columns the table
    /// declares, skipping auto-increment columns. Empty strings are
    /// stored as NULL.
    pub async fn insert(
        &self,
        table: &str,
        fields: &BTreeMap<String, String>,
    ) -> AppResult<MutationOutcome> {
        let columns = self.handle.describe_columns(table).await?;

        let mut names = Vec::new();
        let mut params = Vec::new();
        for column in &columns {
            if column.is_auto_increment() {
                continue;
            }
            if let Some(value) = fields.get(&column.name) {
                names.push(quote_ident(&column.name));
                params.push(if value.is_empty() {
                    None
                } else {
                    Some(value.clone())
                });
            }
        }
        if names.is_empty() {
            return Ok(MutationOutcome::NothingChanged);
        }

        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            names.join(", "),
            placeholders
        );
        let affected = self.handle.execute(&sql, params).await?;
        Ok(MutationOutcome::Applied(affected))
    }

    /// Parameterized UPDATE over the submitted columns except the
    /// primary key, keyed by `id`.
    pub async fn update(
        &self,
        table: &str,
        id: &str,
        fields: &BTreeMap<String, String>,
    ) -> AppResult<MutationOutcome> {
        let pk = self.require_primary_key(table).await?;
        let columns = self.handle.describe_columns(table).await?;

        let mut assignments = Vec::new();
        let mut params = Vec::new();
        for column in &columns {
            if column.name == pk {
                continue;
            }
            if let Some(value) = fields.get(&column.name) {
                assignments.push(format!("{} = ?", quote_ident(&column.name)));
                params.push(Some(value.clone()));
            }
        }
        if assignments.is_empty() {
            return Ok(MutationOutcome::NothingChanged);
        }
        params.push(Some(id.to_string()));

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            quote_ident(table),
            assignments.join(", "),
            quote_ident(&pk)
        );
        let affected = self.handle.execute(&sql, params).await?;
        Ok(MutationOutcome::Applied(affected))
    }

    /// Parameterized DELETE keyed by `id`.
    pub async fn delete(&self, table: &str, id: &str) -> AppResult<MutationOutcome> {
        let pk = self.require_primary_key(table).await?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_ident(table),
            quote_ident(&pk)
        );
        let affected = self
            .handle
            .execute(&sql, vec![Some(id.to_string())])
            .await?;
        Ok(MutationOutcome::Applied(affected))
    }

    async fn require_primary_key(&self, table: &str) -> AppResult<String> {
        self.primary_key_of(table).await?.ok_or_else(|| {
            AppError::SchemaIntrospection(format!("no primary key found for table {table}"))
        })
    }
}

/// First string cell of a single-column row (SHOW DATABASES output).
fn first_string_cell(row: &JsonRow) -> Option<String> {
    row.values()
        .next()
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn count_cell(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
