//! Projection of normalized rows onto an existing destination schema

use crate::normalize::NormalizedRow;
use crate::warehouse::Warehouse;
use std::collections::BTreeSet;
use tracing::warn;

/// Keeps rows writable against a table whose column set is fixed
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnProjector {
    /// Table missing (or unreadable): everything goes through
    PassThrough,
    /// Upper-cased names of the columns the table already has
    Restrict(BTreeSet<String>),
}

/// Rows after projection plus the column names that were removed
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub rows: Vec<NormalizedRow>,
    pub dropped: BTreeSet<String>,
}

impl ColumnProjector {
    pub fn from_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let columns: BTreeSet<String> = columns
            .into_iter()
            .map(|c| c.as_ref().to_uppercase())
            .collect();
        if columns.is_empty() {
            ColumnProjector::PassThrough
        } else {
            ColumnProjector::Restrict(columns)
        }
    }

    pub fn is_pass_through(&self) -> bool {
        matches!(self, ColumnProjector::PassThrough)
    }

    pub fn project(&self, mut rows: Vec<NormalizedRow>) -> Projection {
        let mut dropped = BTreeSet::new();
        if let ColumnProjector::Restrict(columns) = self {
            for row in rows.iter_mut() {
                let removed = row.retain_columns(|c| columns.contains(&c.to_uppercase()));
                dropped.extend(removed);
            }
        }
        Projection { rows, dropped }
    }
}

pub struct SchemaReconciler<'a, W: Warehouse + ?Sized> {
    warehouse: &'a W,
}

impl<'a, W: Warehouse + ?Sized> SchemaReconciler<'a, W> {
    pub fn new(warehouse: &'a W) -> Self {
        Self { warehouse }
    }

    /// Build the projector for `table`. Introspection failures fall back to
    /// pass-through so the append itself reports any real mismatch.
    pub async fn reconcile(&self, table: &str) -> ColumnProjector {
        match self.warehouse.table_exists(table).await {
            Ok(false) => return ColumnProjector::PassThrough,
            Ok(true) => {}
            Err(err) => {
                warn!("Could not align schema for {}: {}", table, err);
                return ColumnProjector::PassThrough;
            }
        }

        match self.warehouse.columns(table).await {
            Ok(columns) => ColumnProjector::from_columns(columns),
            Err(err) => {
                warn!("Could not align schema for {}: {}", table, err);
                ColumnProjector::PassThrough
            }
        }
    }
}
