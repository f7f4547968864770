//! SQL dump generation.
//!
//! A dump is the schema-definition statement for each table followed
//! by one INSERT-VALUES statement per row. String values are escaped
//! with the active handle's escaping rule and NULL is emitted as the
//! bare literal. Column order follows the table definition, not the
//! decoded row mapping.

use chrono::Utc;
use common::errors::{AppError, AppResult};
use common::utils::quote_ident;
use serde_json::Value;

use crate::driver::ResolvedHandle;

/// Renders tables into SQL dump text.
pub struct SqlDumper {
    handle: ResolvedHandle,
}

impl SqlDumper {
    pub fn new(handle: ResolvedHandle) -> Self {
        Self { handle }
    }

    /// Schema statement plus one INSERT per row for a single table.
    pub async fn export_table(&self, table: &str) -> AppResult<String> {
        let mut out = String::new();
        out.push_str(&format!("-- Table {}\n", table));
        out.push_str(&self.schema_statement(table).await?);
        out.push_str(";\n\n");

        let columns = self.handle.describe_columns(table).await?;
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let column_list = names
            .iter()
            .map(|n| quote_ident(n))
            .collect::<Vec<_>>()
            .join(", ");

        let rows = self
            .handle
            .query(&format!("SELECT * FROM {}", quote_ident(table)))
            .await?;
        for row in &rows {
            let values = names
                .iter()
                .map(|name| self.render_value(row.get(name)))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!(
                "INSERT INTO {} ({}) VALUES ({});\n",
                quote_ident(table),
                column_list,
                values
            ));
        }
        out.push('\n');
        Ok(out)
    }

    /// Dump of every table in the active database.
    pub async fn export_database(&self) -> AppResult<String> {
        let tables = self.handle.list_tables().await?;
        let mut out = String::new();
        for table in &tables {
            out.push_str(&self.export_table(table).await?);
        }
        Ok(out)
    }

    async fn schema_statement(&self, table: &str) -> AppResult<String> {
        let rows = self
            .handle
            .query(&format!("SHOW CREATE TABLE {}", quote_ident(table)))
            .await?;
        rows.first()
            .and_then(|row| row.get("Create Table"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::SchemaIntrospection(format!("no schema statement for table {table}"))
            })
    }

    fn render_value(&self, value: Option<&Value>) -> String {
        match value {
            None | Some(Value::Null) => "NULL".to_string(),
            Some(Value::Bool(b)) => (if *b { "1" } else { "0" }).to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => format!("'{}'", self.handle.escape(s)),
            // arrays/objects never come out of row decoding
            Some(other) => format!("'{}'", self.handle.escape(&other.to_string())),
        }
    }
}

/// Attachment filename with a second-resolution timestamp.
pub fn export_filename(stem: &str) -> String {
    format!("{stem}_{}.sql", Utc::now().format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::models::{ColumnDescriptor, DriverKind};
    use serde_json::json;
    use std::sync::Arc;

    use crate::driver::JsonRow;

    struct DumpSource;

    #[async_trait]
    impl crate::driver::Database for DumpSource {
        fn kind(&self) -> DriverKind {
            DriverKind::Buffered
        }
        fn server_info(&self) -> String {
            "dump".to_string()
        }
        fn escape(&self, raw: &str) -> String {
            raw.replace('\'', "\\'")
        }
        async fn query(&self, sql: &str) -> AppResult<Vec<JsonRow>> {
            if sql.starts_with("SHOW CREATE TABLE") {
                let mut row = JsonRow::new();
                row.insert("Table".to_string(), json!("widgets"));
                row.insert(
                    "Create Table".to_string(),
                    json!("CREATE TABLE `widgets` (`id` int)"),
                );
                return Ok(vec![row]);
            }
            // keys sort alphabetically in the decoded mapping; the
            // declared order below is zz_id first
            let mut row = JsonRow::new();
            row.insert("label".to_string(), json!("it's"));
            row.insert("note".to_string(), Value::Null);
            row.insert("zz_id".to_string(), json!(7));
            Ok(vec![row])
        }
        async fn query_params(
            &self,
            _sql: &str,
            _params: Vec<Option<String>>,
        ) -> AppResult<Vec<JsonRow>> {
            Ok(vec![])
        }
        async fn execute(&self, _sql: &str, _params: Vec<Option<String>>) -> AppResult<u64> {
            Ok(0)
        }
        async fn exec_raw(&self, _sql: &str) -> AppResult<()> {
            Ok(())
        }
        async fn list_tables(&self) -> AppResult<Vec<String>> {
            Ok(vec!["widgets".to_string()])
        }
        async fn describe_columns(&self, _table: &str) -> AppResult<Vec<ColumnDescriptor>> {
            Ok(["zz_id", "label", "note"]
                .iter()
                .map(|name| ColumnDescriptor {
                    name: name.to_string(),
                    data_type: "text".to_string(),
                    nullable: true,
                    key: String::new(),
                    default: None,
                    extra: String::new(),
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn table_dump_has_schema_then_escaped_inserts() {
        let dumper = SqlDumper::new(Arc::new(DumpSource));
        let dump = dumper.export_table("widgets").await.unwrap();
        assert!(dump.contains("CREATE TABLE `widgets` (`id` int);"));
        assert!(dump.contains(
            "INSERT INTO `widgets` (`zz_id`, `label`, `note`) VALUES (7, 'it\\'s', NULL);"
        ));
    }

    #[tokio::test]
    async fn database_dump_covers_every_table() {
        let dumper = SqlDumper::new(Arc::new(DumpSource));
        let dump = dumper.export_database().await.unwrap();
        assert!(dump.contains("-- Table widgets"));
        assert!(dump.contains("INSERT INTO `widgets`"));
    }

    #[test]
    fn filename_carries_a_timestamp_and_extension() {
        let name = export_filename("widgets");
        assert!(name.starts_with("widgets_"));
        assert!(name.ends_with(".sql"));
        assert_eq!(name.len(), "widgets_".len() + 15 + 4);
    }
}
