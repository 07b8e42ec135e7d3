//! PostgreSQL destination backed by a `sqlx` connection pool

use crate::constants::MAX_BIND_PARAMS;
use crate::context::Context;
use crate::error::{Result, SyncError};
use crate::normalize::{column_union, NormalizedRow};
use crate::warehouse::Warehouse;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info, warn};

/// Tables live in one schema; every identifier is quoted so the upper-case
/// column names survive as written.
pub struct PgWarehouse {
    pool: PgPool,
    schema: String,
    chunk_size: usize,
    q_out: bool,
}

impl PgWarehouse {
    pub fn new(pool: PgPool, ctx: &Context) -> Self {
        Self {
            pool,
            schema: ctx.schema.clone(),
            chunk_size: ctx.chunk_size,
            q_out: ctx.q_out,
        }
    }

    /// Open a pool of `ctx.pool_size` connections and make sure the schema exists
    pub async fn connect(ctx: &Context) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(ctx.pool_size)
            .connect(&ctx.pg_url())
            .await?;
        info!("Connected to PostgreSQL database, pool size {}", ctx.pool_size);

        let warehouse = Self::new(pool, ctx);
        warehouse.ensure_schema().await?;
        Ok(warehouse)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(&self.schema));
        self.log_sql(&sql);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|err| SyncError::DestinationWrite(format!("create schema: {}", err)))?;
        Ok(())
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(table))
    }

    fn log_sql(&self, sql: &str) {
        if self.q_out {
            info!("Executing SQL: {}", sql);
        }
    }

    async fn create_table(&self, table: &str, columns: &[String]) -> Result<()> {
        let defs: Vec<String> = columns
            .iter()
            .map(|c| format!("{} TEXT", quote_ident(c)))
            .collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.qualified(table),
            defs.join(", ")
        );
        self.log_sql(&sql);

        if let Err(err) = sqlx::query(&sql).execute(&self.pool).await {
            // Another task may have created it concurrently
            if self.table_exists(table).await.unwrap_or(false) {
                warn!("Concurrent creation of {}: {}", table, err);
                return Ok(());
            }
            return Err(SyncError::DestinationWrite(format!(
                "create table {}: {}",
                table, err
            )));
        }

        info!("Created table {} with {} columns", self.qualified(table), columns.len());
        Ok(())
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let query = "SELECT COUNT(*) AS count FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2";
        let row = sqlx::query(query)
            .bind(&self.schema)
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| SyncError::SchemaIntrospection(format!("{}: {}", table, err)))?;

        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    async fn columns(&self, table: &str) -> Result<Vec<String>> {
        let query = "SELECT column_name::text AS column_name FROM information_schema.columns \
                     WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position";
        let rows = sqlx::query(query)
            .bind(&self.schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| SyncError::SchemaIntrospection(format!("{}: {}", table, err)))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("column_name")
                    .map_err(|err| SyncError::SchemaIntrospection(format!("{}: {}", table, err)))
            })
            .collect()
    }

    async fn max_value(
        &self,
        table: &str,
        column: &str,
        filters: &[(&str, &str)],
    ) -> Result<Option<String>> {
        let mut sql = format!(
            "SELECT MAX({})::text AS value FROM {}",
            quote_ident(column),
            self.qualified(table)
        );
        for (i, (filter_column, _)) in filters.iter().enumerate() {
            let keyword = if i == 0 { "WHERE" } else { "AND" };
            sql.push_str(&format!(" {} {} = ${}", keyword, quote_ident(filter_column), i + 1));
        }
        self.log_sql(&sql);

        let mut query = sqlx::query(&sql);
        for (_, value) in filters {
            query = query.bind(*value);
        }

        let row = query
            .fetch_one(&self.pool)
            .await
            .map_err(|err| SyncError::WatermarkLookup(format!("{}: {}", table, err)))?;

        row.try_get::<Option<String>, _>("value")
            .map_err(|err| SyncError::WatermarkLookup(format!("{}: {}", table, err)))
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.qualified(table));
        self.log_sql(&sql);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|err| SyncError::DestinationWrite(format!("drop {}: {}", table, err)))?;
        Ok(())
    }

    async fn append(&self, table: &str, rows: &[NormalizedRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let columns: Vec<String> = column_union(rows).into_iter().collect();
        if columns.is_empty() {
            return Err(SyncError::DestinationWrite(format!(
                "no columns to write into {}",
                table
            )));
        }

        if !self.table_exists(table).await.map_err(into_write_error)? {
            self.create_table(table, &columns).await?;
        }

        let column_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let insert_head = format!(
            "INSERT INTO {} ({}) ",
            self.qualified(table),
            column_list.join(", ")
        );
        self.log_sql(&insert_head);

        let per_statement = rows_per_statement(self.chunk_size, columns.len());

        // One transaction per append call: a batch lands completely or not at all
        let mut tx = self.pool.begin().await.map_err(write_error(table))?;
        for chunk in rows.chunks(per_statement) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(&insert_head);
            builder.push_values(chunk, |mut b, row| {
                for column in &columns {
                    b.push_bind(row.get(column).and_then(|cell| cell.to_sql_text()));
                }
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(write_error(table))?;
            debug!("Inserted chunk of {} rows into {}", chunk.len(), table);
        }
        tx.commit().await.map_err(write_error(table))?;

        Ok(rows.len())
    }
}

fn write_error(table: &str) -> impl Fn(sqlx::Error) -> SyncError + '_ {
    move |err| SyncError::DestinationWrite(format!("append to {}: {}", table, err))
}

fn into_write_error(err: SyncError) -> SyncError {
    match err {
        SyncError::DestinationWrite(_) => err,
        other => SyncError::DestinationWrite(other.to_string()),
    }
}

/// Quote an SQL identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Rows per INSERT, bounded by the chunk size and the bind parameter limit
pub fn rows_per_statement(chunk_size: usize, columns: usize) -> usize {
    let by_params = MAX_BIND_PARAMS / columns.max(1);
    chunk_size.min(by_params).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("GITHUB_ISSUES"), "\"GITHUB_ISSUES\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_rows_per_statement_respects_bind_limit() {
        assert_eq!(rows_per_statement(5000, 10), 5000);
        assert_eq!(rows_per_statement(5000, 100), 655);
        assert_eq!(rows_per_statement(5000, 100_000), 1);
        assert_eq!(rows_per_statement(0, 3), 1);
    }
}
