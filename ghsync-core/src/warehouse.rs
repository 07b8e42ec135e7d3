//! Destination capability
//!
//! Anything that can introspect tables, answer a bounded max query and
//! append rows can act as the sync destination. Implementations must be
//! safe for concurrent use by many sync tasks.

use crate::error::Result;
use crate::normalize::NormalizedRow;
use async_trait::async_trait;

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Whether `table` exists. Fails with `SchemaIntrospection`.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Column names of `table` in definition order. Fails with `SchemaIntrospection`.
    async fn columns(&self, table: &str) -> Result<Vec<String>>;

    /// Largest value of `column` among rows matching every `(column, value)`
    /// filter, rendered as text. Fails with `WatermarkLookup`.
    async fn max_value(
        &self,
        table: &str,
        column: &str,
        filters: &[(&str, &str)],
    ) -> Result<Option<String>>;

    /// Drop `table` if it exists. Fails with `DestinationWrite`.
    async fn drop_table(&self, table: &str) -> Result<()>;

    /// Append `rows`, creating the table from their columns when missing.
    /// Returns the number of rows written. Fails with `DestinationWrite`.
    async fn append(&self, table: &str, rows: &[NormalizedRow]) -> Result<usize>;
}
