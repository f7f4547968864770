//! Shared data models.

pub mod connection;
pub mod table;

// Re-export commonly used types
pub use connection::{ConnectionSettings, DriverKind};
pub use table::{ColumnDescriptor, PageRequest, TableDescriptor, PAGE_SIZE};
