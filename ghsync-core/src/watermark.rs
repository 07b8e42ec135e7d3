//! High-water-mark lookup for incremental loads

use crate::constants::{SOURCE_OWNER_COL, SOURCE_REPO_COL, UPDATED_AT_COL};
use crate::error::{Result, SyncError};
use crate::resource::SourceEntity;
use crate::warehouse::Warehouse;
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, warn};

/// Reads the newest `UPDATED_AT` already stored for an entity.
///
/// Lookups never fail: a missing table means no watermark, and any query or
/// parse problem is logged and also treated as no watermark, which turns the
/// task into a full load.
pub struct WatermarkStore<'a, W: Warehouse + ?Sized> {
    warehouse: &'a W,
}

impl<'a, W: Warehouse + ?Sized> WatermarkStore<'a, W> {
    pub fn new(warehouse: &'a W) -> Self {
        Self { warehouse }
    }

    pub async fn lookup(&self, table: &str, entity: &SourceEntity) -> Option<DateTime<Utc>> {
        match self.try_lookup(table, entity).await {
            Ok(watermark) => watermark,
            Err(err) => {
                warn!("[{}] Could not fetch max date for {}: {}", entity, table, err);
                None
            }
        }
    }

    async fn try_lookup(&self, table: &str, entity: &SourceEntity) -> Result<Option<DateTime<Utc>>> {
        if !self.warehouse.table_exists(table).await? {
            debug!("[{}] {} does not exist yet, no watermark", entity, table);
            return Ok(None);
        }

        let filters = [
            (SOURCE_OWNER_COL, entity.owner.as_str()),
            (SOURCE_REPO_COL, entity.repo.as_str()),
        ];
        let raw = self
            .warehouse
            .max_value(table, UPDATED_AT_COL, &filters)
            .await?;

        raw.as_deref().map(parse_timestamp).transpose()
    }
}

/// Parse a stored timestamp. Accepts RFC 3339 and the common database
/// renderings without an offset, which are taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(ts.and_utc());
        }
    }
    Err(SyncError::WatermarkLookup(format!(
        "unrecognised timestamp '{}'",
        value
    )))
}
