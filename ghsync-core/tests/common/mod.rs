//! Shared fixtures: an in-memory warehouse and a context pointing at a mock API

#![allow(dead_code)]

use async_trait::async_trait;
use ghsync_core::normalize::column_union;
use ghsync_core::{Cell, Context, NormalizedRow, Result, SourceEntity, SyncError, Warehouse};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::MockServer;

#[derive(Debug, Clone, Default)]
pub struct MemTable {
    pub columns: Vec<String>,
    pub rows: Vec<NormalizedRow>,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, MemTable>,
    failing_appends: HashSet<String>,
    fail_table_exists: bool,
    fail_columns: bool,
    drops: usize,
}

/// Behaves like a strict SQL destination: unknown columns on append fail
#[derive(Default)]
pub struct MemoryWarehouse {
    state: Mutex<State>,
    append_delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, table: &str, columns: &[&str]) -> Self {
        self.state.lock().unwrap().tables.insert(
            table.to_string(),
            MemTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
            },
        );
        self
    }

    pub fn fail_appends_to(self, table: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_appends
            .insert(table.to_string());
        self
    }

    /// `table_exists` fails for every table
    pub fn fail_table_exists(self) -> Self {
        self.state.lock().unwrap().fail_table_exists = true;
        self
    }

    /// `columns` fails for every table
    pub fn fail_columns(self) -> Self {
        self.state.lock().unwrap().fail_columns = true;
        self
    }

    /// Every append yields for `delay` before it touches any table
    pub fn slow_appends(mut self, delay: Duration) -> Self {
        self.append_delay = Some(delay);
        self
    }

    /// Highest number of appends seen running at the same time
    pub fn peak_appends(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Insert rows directly, bypassing column checks
    pub fn seed(&self, table: &str, rows: Vec<NormalizedRow>) {
        let mut state = self.state.lock().unwrap();
        let entry = state.tables.entry(table.to_string()).or_default();
        for column in column_union(&rows) {
            if !entry.columns.contains(&column) {
                entry.columns.push(column);
            }
        }
        entry.rows.extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<NormalizedRow> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn table(&self, table: &str) -> Option<MemTable> {
        self.state.lock().unwrap().tables.get(table).cloned()
    }

    pub fn drops(&self) -> usize {
        self.state.lock().unwrap().drops
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        if state.fail_table_exists {
            return Err(SyncError::SchemaIntrospection(format!(
                "permission denied for schema of {}",
                table
            )));
        }
        Ok(state.tables.contains_key(table))
    }

    async fn columns(&self, table: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        if state.fail_columns {
            return Err(SyncError::SchemaIntrospection(format!(
                "information_schema unavailable for {}",
                table
            )));
        }
        state
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| SyncError::SchemaIntrospection(format!("no such table {}", table)))
    }

    async fn max_value(
        &self,
        table: &str,
        column: &str,
        filters: &[(&str, &str)],
    ) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        let t = state
            .tables
            .get(table)
            .ok_or_else(|| SyncError::WatermarkLookup(format!("no such table {}", table)))?;
        if !t.columns.iter().any(|c| c == column) {
            return Err(SyncError::WatermarkLookup(format!(
                "column {} does not exist in {}",
                column, table
            )));
        }

        Ok(t.rows
            .iter()
            .filter(|row| {
                filters.iter().all(|(col, value)| {
                    matches!(row.get(col), Some(Cell::Text(text)) if text.as_str() == *value)
                })
            })
            .filter_map(|row| row.get(column).and_then(Cell::to_sql_text))
            .max())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing_appends.contains(table) {
            return Err(SyncError::DestinationWrite(format!("drop {} refused", table)));
        }
        state.tables.remove(table);
        state.drops += 1;
        Ok(())
    }

    async fn append(&self, table: &str, rows: &[NormalizedRow]) -> Result<usize> {
        if let Some(delay) = self.append_delay {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        let mut state = self.state.lock().unwrap();
        if state.failing_appends.contains(table) {
            return Err(SyncError::DestinationWrite(format!(
                "append to {}: connection reset",
                table
            )));
        }

        let columns: Vec<String> = column_union(rows).into_iter().collect();
        let entry = state.tables.entry(table.to_string()).or_insert_with(|| MemTable {
            columns: columns.clone(),
            rows: Vec::new(),
        });

        if let Some(unknown) = columns.iter().find(|c| !entry.columns.contains(c)) {
            return Err(SyncError::DestinationWrite(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                unknown, table
            )));
        }

        entry.rows.extend(rows.iter().cloned());
        Ok(rows.len())
    }
}

pub fn test_context(server: &MockServer, repos: &[&str]) -> Arc<Context> {
    Arc::new(Context {
        github_token: "test-token".to_string(),
        api_url: server.uri(),
        repos: repos
            .iter()
            .map(|r| SourceEntity::parse(r).expect("valid repo"))
            .collect(),
        max_retries: 3,
        retry_base_ms: 1,
        ..Context::default()
    })
}

pub fn text_row(pairs: &[(&str, &str)]) -> NormalizedRow {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Cell::Text(v.to_string())))
        .collect()
}
