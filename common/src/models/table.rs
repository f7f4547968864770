//! Table and column metadata models.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Fixed page size for record listings.
pub const PAGE_SIZE: u32 = 50;

/// Ordered column metadata as reported by `SHOW COLUMNS`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,
    /// Declared type string (e.g. `varchar(255)`, `int unsigned`).
    pub data_type: String,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Key designation (`PRI`, `UNI`, `MUL` or empty).
    pub key: String,
    /// Default value, if declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Extra flags (e.g. `auto_increment`).
    pub extra: String,
}

impl ColumnDescriptor {
    /// Whether the column value is generated by the database.
    pub fn is_auto_increment(&self) -> bool {
        self.extra.to_lowercase().contains("auto_increment")
    }
}

/// A table with its ordered columns and optional primary key.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TableDescriptor {
    /// Table name.
    pub name: String,
    /// Ordered column metadata.
    pub columns: Vec<ColumnDescriptor>,
    /// Single-column primary key, when exactly one exists.
    /// Tables without one cannot be edited or deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
}

/// A request for one page of records.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PageRequest {
    /// Table name.
    pub table: String,
    /// 1-based page number.
    pub page: u32,
}

impl PageRequest {
    /// Creates a page request, clamping the page to at least 1.
    pub fn new(table: impl Into<String>, page: u32) -> Self {
        Self {
            table: table.into(),
            page: page.max(1),
        }
    }

    /// Row offset for the SQL LIMIT clause.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_zero_based_from_one_based_pages() {
        assert_eq!(PageRequest::new("t", 1).offset(), 0);
        assert_eq!(PageRequest::new("t", 3).offset(), 100);
    }

    #[test]
    fn page_zero_clamps_to_first_page() {
        let req = PageRequest::new("t", 0);
        assert_eq!(req.page, 1);
        assert_eq!(req.offset(), 0);
    }

    #[test]
    fn auto_increment_flag_is_case_insensitive() {
        let col = ColumnDescriptor {
            name: "id".into(),
            data_type: "int".into(),
            nullable: false,
            key: "PRI".into(),
            default: None,
            extra: "AUTO_INCREMENT".into(),
        };
        assert!(col.is_auto_increment());
    }
}
