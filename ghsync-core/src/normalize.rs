//! Flattening of raw API records into warehouse rows
//!
//! Nested objects become `PARENT_CHILD` columns, arrays and leftover objects
//! are stored as JSON text, and every row is stamped with the entity it came
//! from plus the capture time. Everything here is pure.

use crate::constants::{INGESTED_AT_COL, SOURCE_OWNER_COL, SOURCE_REPO_COL, VALUE_COL};
use crate::resource::SourceEntity;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// A single scalar cell. `Null` is the only absent marker.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// Text rendering used when binding to the destination, `None` for NULL
    pub fn to_sql_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Bool(b) => Some(b.to_string()),
            Cell::Int(i) => Some(i.to_string()),
            Cell::Float(f) => Some(f.to_string()),
            Cell::Text(s) => Some(s.clone()),
        }
    }
}

impl From<&Value> for Cell {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Cell::Int(i)
                } else if n.is_u64() {
                    // beyond i64, keep it exact
                    Cell::Text(n.to_string())
                } else {
                    n.as_f64().map(Cell::Float).unwrap_or(Cell::Null)
                }
            }
            Value::String(s) => Cell::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => Cell::Text(canonical(value).to_string()),
        }
    }
}

/// Flat row keyed by upper-case column name
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedRow {
    cells: BTreeMap<String, Cell>,
}

impl NormalizedRow {
    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells.get(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, cell: Cell) {
        self.cells.insert(column.into(), cell);
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Keep only the columns accepted by `keep`, returning the removed names
    pub fn retain_columns<F>(&mut self, mut keep: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        let removed: Vec<String> = self
            .cells
            .keys()
            .filter(|c| !keep(c.as_str()))
            .cloned()
            .collect();
        for column in &removed {
            self.cells.remove(column);
        }
        removed
    }
}

impl FromIterator<(String, Cell)> for NormalizedRow {
    fn from_iter<I: IntoIterator<Item = (String, Cell)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

/// Copy of `value` with object keys in sorted order at every level, so the
/// text encoding does not depend on the order the API sent them in
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonical(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

/// Destination column name for a dotted path: `user.login` -> `USER_LOGIN`
pub fn column_name(path: &str) -> String {
    path.replace('.', "_").to_uppercase()
}

/// Normalize one page of records for `entity`, stamping `captured_at`
pub fn normalize(
    batch: &[Value],
    entity: &SourceEntity,
    captured_at: DateTime<Utc>,
) -> Vec<NormalizedRow> {
    let ingested_at = captured_at.to_rfc3339_opts(SecondsFormat::Micros, true);

    let mut rows: Vec<NormalizedRow> = batch
        .iter()
        .map(|record| {
            let mut row = NormalizedRow::default();
            match record {
                Value::Object(map) => flatten_into(&mut row, None, map),
                other => row.insert(VALUE_COL, Cell::from(other)),
            }
            row.insert(SOURCE_OWNER_COL, Cell::Text(entity.owner.clone()));
            row.insert(SOURCE_REPO_COL, Cell::Text(entity.repo.clone()));
            row.insert(INGESTED_AT_COL, Cell::Text(ingested_at.clone()));
            row
        })
        .collect();

    pad_to_union(&mut rows);
    rows
}

/// Give every row the same column set, filling gaps with `Cell::Null`
pub fn pad_to_union(rows: &mut [NormalizedRow]) {
    let columns = column_union(rows);
    for row in rows.iter_mut() {
        for column in &columns {
            if row.get(column).is_none() {
                row.insert(column.clone(), Cell::Null);
            }
        }
    }
}

/// Sorted union of all column names across `rows`
pub fn column_union(rows: &[NormalizedRow]) -> BTreeSet<String> {
    rows.iter()
        .flat_map(|row| row.columns().map(str::to_string))
        .collect()
}

fn flatten_into(row: &mut NormalizedRow, prefix: Option<&str>, map: &Map<String, Value>) {
    for (key, value) in map {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(row, Some(&path), inner),
            _ => row.insert(column_name(&path), Cell::from(value)),
        }
    }
}
