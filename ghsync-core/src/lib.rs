//! ghsync Core Library
//!
//! Incremental replication of GitHub issues and issue comments into a SQL
//! warehouse. Each (repository, resource) task reads its high-water mark from
//! the destination, pages through the API from there, flattens the records,
//! projects them onto the destination's existing columns and appends them.

pub mod client;
pub mod constants;
pub mod context;
pub mod cursor;
pub mod error;
pub mod normalize;
pub mod postgres;
pub mod reconcile;
pub mod resource;
pub mod sync;
pub mod warehouse;
pub mod watermark;

// Re-export commonly used items
pub use client::{ApiResponse, GitHubClient};
pub use context::Context;
pub use cursor::PageCursor;
pub use error::{Result, SyncError};
pub use normalize::{normalize, Cell, NormalizedRow};
pub use postgres::PgWarehouse;
pub use reconcile::{ColumnProjector, Projection, SchemaReconciler};
pub use resource::{ResourceSpec, SourceEntity};
pub use sync::{LoadMode, RunReport, SyncOrchestrator, TaskOutcome, TaskStats};
pub use warehouse::Warehouse;
pub use watermark::WatermarkStore;
