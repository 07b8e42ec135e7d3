//! Sync orchestration
//!
//! One task per (repository, resource): resolve the watermark, page through
//! the API, normalize, reconcile and append each page. Tasks run
//! concurrently on a bounded pool and report independently; repository
//! metadata is a separate one-shot replace.

use crate::client::GitHubClient;
use crate::constants::{PARAM_PER_PAGE, PARAM_SINCE, PARAM_STATE, REPOSITORIES_TABLE, STATE_ALL};
use crate::context::Context;
use crate::cursor::PageCursor;
use crate::error::{Result, SyncError};
use crate::normalize::{normalize, pad_to_union, NormalizedRow};
use crate::reconcile::{ColumnProjector, SchemaReconciler};
use crate::resource::{ResourceSpec, SourceEntity};
use crate::warehouse::Warehouse;
use crate::watermark::WatermarkStore;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, warn};

/// Whether a task fetches everything or only records updated since a watermark
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMode {
    Full,
    Incremental { since: DateTime<Utc> },
}

impl LoadMode {
    pub fn from_watermark(watermark: Option<DateTime<Utc>>) -> Self {
        match watermark {
            Some(since) => LoadMode::Incremental { since },
            None => LoadMode::Full,
        }
    }

    /// Query parameters for the first page request
    pub fn request_params(&self, per_page: u32) -> Vec<(&'static str, String)> {
        let mut params = vec![
            (PARAM_PER_PAGE, per_page.to_string()),
            (PARAM_STATE, STATE_ALL.to_string()),
        ];
        if let LoadMode::Incremental { since } = self {
            params.push((PARAM_SINCE, format_since(since)));
        }
        params
    }
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadMode::Full => write!(f, "Full Load"),
            LoadMode::Incremental { since } => {
                write!(f, "Incremental Load (since {})", format_since(since))
            }
        }
    }
}

fn format_since(since: &DateTime<Utc>) -> String {
    since.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Counters for one finished task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStats {
    pub mode: LoadMode,
    pub rows_ingested: usize,
    pub batches: usize,
    pub dropped_columns: BTreeSet<String>,
}

/// Result of one (entity, resource) task
#[derive(Debug)]
pub struct TaskOutcome {
    pub entity: SourceEntity,
    pub resource: ResourceSpec,
    pub result: Result<TaskStats>,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Everything a run did
#[derive(Debug, Default)]
pub struct RunReport {
    pub metadata_rows: usize,
    pub outcomes: Vec<TaskOutcome>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(TaskOutcome::is_success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn total_rows(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|s| s.rows_ingested)
            .sum()
    }
}

pub struct SyncOrchestrator<W: Warehouse + 'static> {
    ctx: Arc<Context>,
    client: GitHubClient,
    warehouse: Arc<W>,
    // Held across reconcile + append while a table may not exist yet, so
    // tasks sharing a table never write through a stale pass-through
    first_write: Arc<HashMap<&'static str, Arc<Mutex<()>>>>,
}

impl<W: Warehouse + 'static> Clone for SyncOrchestrator<W> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
            client: self.client.clone(),
            warehouse: Arc::clone(&self.warehouse),
            first_write: Arc::clone(&self.first_write),
        }
    }
}

impl<W: Warehouse + 'static> SyncOrchestrator<W> {
    pub fn new(ctx: Arc<Context>, client: GitHubClient, warehouse: Arc<W>) -> Self {
        let first_write = ResourceSpec::ALL
            .iter()
            .map(|resource| (resource.table(), Arc::new(Mutex::new(()))))
            .collect();
        Self {
            ctx,
            client,
            warehouse,
            first_write: Arc::new(first_write),
        }
    }

    fn first_write_lock(&self, table: &str) -> Arc<Mutex<()>> {
        self.first_write
            .get(table)
            .cloned()
            .unwrap_or_else(|| Arc::new(Mutex::new(())))
    }

    /// Metadata replace followed by all resource tasks. Only a failed
    /// metadata write aborts the run early; task failures are in the report.
    pub async fn run(&self) -> Result<RunReport> {
        let metadata_rows = self.sync_repository_metadata().await?;
        let outcomes = self.run_all().await;
        Ok(RunReport {
            metadata_rows,
            outcomes,
        })
    }

    /// Run one task per (entity, resource) with at most `max_workers` at once
    pub async fn run_all(&self) -> Vec<TaskOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.ctx.max_workers));
        let mut handles = Vec::new();

        for entity in &self.ctx.repos {
            for resource in ResourceSpec::ALL {
                let semaphore = Arc::clone(&semaphore);
                let this = self.clone();
                let task_entity = entity.clone();

                let handle = tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|err| SyncError::Generic(err.to_string()))?;
                    this.sync_resource(&task_entity, resource).await
                });
                handles.push((entity.clone(), resource, handle));
            }
        }

        // Collect results
        let mut outcomes = Vec::with_capacity(handles.len());
        for (entity, resource, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => Err(SyncError::Generic(format!("task crashed: {}", err))),
            };
            if let Err(err) = &result {
                error!("[{}] {} failed: {}", entity, resource, err);
            }
            outcomes.push(TaskOutcome {
                entity,
                resource,
                result,
            });
        }
        outcomes
    }

    /// Incrementally sync one resource of one entity
    pub async fn sync_resource(
        &self,
        entity: &SourceEntity,
        resource: ResourceSpec,
    ) -> Result<TaskStats> {
        let table = resource.table();

        let watermark = WatermarkStore::new(self.warehouse.as_ref())
            .lookup(table, entity)
            .await;
        let mode = LoadMode::from_watermark(watermark);
        info!("[{}] Starting {}... Mode: {}", entity, resource, mode);

        let url = self.client.url(&resource.endpoint(entity));
        let params = mode.request_params(self.ctx.per_page);
        let mut cursor = PageCursor::new(&self.client, &url, &params)?;

        let reconciler = SchemaReconciler::new(self.warehouse.as_ref());
        let mut projector: Option<ColumnProjector> = None;
        let mut stats = TaskStats {
            mode,
            rows_ingested: 0,
            batches: 0,
            dropped_columns: BTreeSet::new(),
        };

        while let Some(batch) = cursor.next_batch().await? {
            let rows = normalize(&batch, entity, Utc::now());

            // Re-inspect until the table exists, then keep the projector
            let (current, _first_write) = match projector.take() {
                Some(p) if !p.is_pass_through() => (p, None),
                _ => {
                    let guard = self.first_write_lock(table).lock_owned().await;
                    (reconciler.reconcile(table).await, Some(guard))
                }
            };
            let projection = current.project(rows);
            projector = Some(current);

            if !projection.dropped.is_empty() {
                warn!(
                    "[{}] Dropping new API columns to match existing {} schema: {:?}",
                    entity, table, projection.dropped
                );
                stats.dropped_columns.extend(projection.dropped);
            }

            let columns = projection.rows.first().map_or(0, NormalizedRow::len);
            let appended = self
                .warehouse
                .append(table, &projection.rows)
                .await
                .map_err(|err| {
                    error!("[{}] Error inserting batch into {}: {}", entity, table, err);
                    err
                })?;

            stats.rows_ingested += appended;
            stats.batches += 1;
            info!("[{}] {}: Ingested batch of {} records...", entity, resource, appended);
            if self.ctx.debug > 0 {
                info!(
                    "[{}] {}: page {} written with {} columns",
                    entity,
                    resource,
                    cursor.pages_fetched(),
                    columns
                );
            }
        }

        info!(
            "[{}] Finished {}. Total: {} rows in {} batches",
            entity, resource, stats.rows_ingested, stats.batches
        );
        Ok(stats)
    }

    /// Fetch one metadata record per entity and replace the metadata table.
    /// Entities that fail to fetch are skipped; write failures are returned.
    pub async fn sync_repository_metadata(&self) -> Result<usize> {
        let captured_at = Utc::now();
        let mut rows: Vec<NormalizedRow> = Vec::new();

        for entity in &self.ctx.repos {
            let url = self.client.url(&entity.repo_path());
            match self.client.get_json(&url).await {
                Ok(record) => rows.extend(normalize(std::slice::from_ref(&record), entity, captured_at)),
                Err(err) => error!("Error fetching repo metadata {}: {}", entity, err),
            }
        }

        if rows.is_empty() {
            warn!("No repository metadata fetched, leaving {} untouched", REPOSITORIES_TABLE);
            return Ok(0);
        }

        pad_to_union(&mut rows);
        self.warehouse.drop_table(REPOSITORIES_TABLE).await?;
        let written = self.warehouse.append(REPOSITORIES_TABLE, &rows).await?;
        info!("Repository metadata updated: {} rows", written);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_full_load_has_no_lower_bound() {
        let mode = LoadMode::from_watermark(None);
        assert_eq!(mode, LoadMode::Full);
        let params = mode.request_params(100);
        assert_eq!(
            params,
            vec![("per_page", "100".to_string()), ("state", "all".to_string())]
        );
        assert_eq!(mode.to_string(), "Full Load");
    }

    #[test]
    fn test_incremental_adds_since_only() {
        let since = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let mode = LoadMode::from_watermark(Some(since));
        let params = mode.request_params(100);
        assert_eq!(
            params,
            vec![
                ("per_page", "100".to_string()),
                ("state", "all".to_string()),
                ("since", "2024-01-02T03:04:05Z".to_string()),
            ]
        );
        assert_eq!(mode.to_string(), "Incremental Load (since 2024-01-02T03:04:05Z)");
    }

    #[test]
    fn test_run_report_success_and_totals() {
        let stats = TaskStats {
            mode: LoadMode::Full,
            rows_ingested: 3,
            batches: 2,
            dropped_columns: BTreeSet::new(),
        };
        let mut report = RunReport {
            metadata_rows: 2,
            outcomes: vec![TaskOutcome {
                entity: SourceEntity::new("a", "b"),
                resource: ResourceSpec::Issues,
                result: Ok(stats),
            }],
        };
        assert!(report.is_success());
        assert_eq!(report.total_rows(), 3);

        report.outcomes.push(TaskOutcome {
            entity: SourceEntity::new("a", "b"),
            resource: ResourceSpec::IssueComments,
            result: Err(SyncError::DestinationWrite("disk full".into())),
        });
        assert!(!report.is_success());
        assert_eq!(report.failed().count(), 1);
        assert_eq!(report.total_rows(), 3);
    }
}
