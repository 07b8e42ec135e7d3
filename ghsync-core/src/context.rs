use crate::constants::*;
use crate::error::{Result, SyncError};
use crate::resource::SourceEntity;
use std::fmt;
use std::time::Duration;

/// Environment context packed in structure.
/// Built once at process start and passed by reference into every component.
#[derive(Clone)]
pub struct Context {
    // From GITHUB_TOKEN, required by the ghsync binary
    pub github_token: String,

    // From GHSYNC_API_URL, default "https://api.github.com"
    pub api_url: String,

    // From GHSYNC_REPOS, comma separated owner/repo list
    pub repos: Vec<SourceEntity>,

    // From WAREHOUSE_CONN_STRING, overrides the PG_* parts when set
    pub warehouse_url: Option<String>,

    // PostgreSQL connection parameters
    pub pg_host: String, // From PG_HOST, default "localhost"
    pub pg_port: String, // From PG_PORT, default "5432"
    pub pg_db: String,   // From PG_DB, default "warehouse"
    pub pg_user: String, // From PG_USER, default "ghsync"
    pub pg_pass: String, // From PG_PASS, default "password"
    pub pg_ssl: String,  // From PG_SSL, default "disable"

    // From GHSYNC_SCHEMA, destination schema, default "RAW"
    pub schema: String,

    // From GHSYNC_POOL_SIZE, max pooled destination connections, default 10
    pub pool_size: u32,

    // From GHSYNC_MAX_WORKERS, concurrently running sync tasks, default 5
    pub max_workers: usize,

    // From GHSYNC_PER_PAGE, default 100
    pub per_page: u32,

    // From GHSYNC_CHUNK_SIZE, rows per INSERT chunk, default 5000
    pub chunk_size: usize,

    // From GHSYNC_MAX_RETRIES, retries for 429/5xx and connection errors, default 5
    pub max_retries: u32,

    // From GHSYNC_RETRY_BASE_MS, exponential backoff base, default 1000
    pub retry_base_ms: u64,

    // From GHSYNC_TIMEOUT_SECS, per request timeout, default 30
    pub timeout_secs: u64,

    // From GHSYNC_DEBUG Debug level: 0-no, 1-info, 2-verbose, default 0
    pub debug: i32,

    // From GHSYNC_QOUT output all SQL queries?, default false
    pub q_out: bool,

    // From GHSYNC_CTXOUT output all context data (this struct), default false
    pub ctx_out: bool,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            github_token: String::new(),
            api_url: DEFAULT_API_URL.to_string(),
            repos: parse_repos(DEFAULT_REPOS).unwrap_or_default(),
            warehouse_url: None,
            pg_host: "localhost".to_string(),
            pg_port: "5432".to_string(),
            pg_db: "warehouse".to_string(),
            pg_user: "ghsync".to_string(),
            pg_pass: "password".to_string(),
            pg_ssl: "disable".to_string(),
            schema: DEFAULT_SCHEMA.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            max_workers: DEFAULT_MAX_WORKERS,
            per_page: DEFAULT_PER_PAGE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_ms: DEFAULT_RETRY_BASE_MS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            debug: 0,
            q_out: false,
            ctx_out: false,
        }
    }
}

// Token and password never end up in logs
impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("github_token", &redact(&self.github_token))
            .field("api_url", &self.api_url)
            .field("repos", &self.repos)
            .field("warehouse_url", &self.warehouse_url.as_ref().map(|_| "<redacted>"))
            .field("pg_host", &self.pg_host)
            .field("pg_port", &self.pg_port)
            .field("pg_db", &self.pg_db)
            .field("pg_user", &self.pg_user)
            .field("pg_pass", &redact(&self.pg_pass))
            .field("pg_ssl", &self.pg_ssl)
            .field("schema", &self.schema)
            .field("pool_size", &self.pool_size)
            .field("max_workers", &self.max_workers)
            .field("per_page", &self.per_page)
            .field("chunk_size", &self.chunk_size)
            .field("max_retries", &self.max_retries)
            .field("retry_base_ms", &self.retry_base_ms)
            .field("timeout_secs", &self.timeout_secs)
            .field("debug", &self.debug)
            .field("q_out", &self.q_out)
            .field("ctx_out", &self.ctx_out)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

impl Context {
    /// Load context from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load context from an arbitrary key lookup, used by `from_env`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut ctx = Self::default();

        if let Some(token) = lookup("GITHUB_TOKEN") {
            ctx.github_token = token.trim().to_string();
        }

        if let Some(api_url) = lookup("GHSYNC_API_URL") {
            ctx.api_url = api_url.trim_end_matches('/').to_string();
        }

        if let Some(repos) = lookup("GHSYNC_REPOS") {
            ctx.repos = parse_repos(&repos)?;
        }

        ctx.warehouse_url = lookup("WAREHOUSE_CONN_STRING").filter(|s| !s.is_empty());

        // PostgreSQL configuration
        if let Some(pg_host) = lookup("PG_HOST") {
            ctx.pg_host = pg_host;
        }

        if let Some(pg_port) = lookup("PG_PORT") {
            ctx.pg_port = pg_port;
        }

        if let Some(pg_db) = lookup("PG_DB") {
            ctx.pg_db = pg_db;
        }

        if let Some(pg_user) = lookup("PG_USER") {
            ctx.pg_user = pg_user;
        }

        if let Some(pg_pass) = lookup("PG_PASS") {
            ctx.pg_pass = pg_pass;
        }

        if let Some(pg_ssl) = lookup("PG_SSL") {
            ctx.pg_ssl = pg_ssl;
        }

        if let Some(schema) = lookup("GHSYNC_SCHEMA") {
            ctx.schema = schema;
        }

        // Numeric tuning, invalid values are configuration errors
        if let Some(v) = lookup("GHSYNC_POOL_SIZE") {
            ctx.pool_size = parse_positive("GHSYNC_POOL_SIZE", &v)?;
        }

        if let Some(v) = lookup("GHSYNC_MAX_WORKERS") {
            ctx.max_workers = parse_positive("GHSYNC_MAX_WORKERS", &v)?;
        }

        if let Some(v) = lookup("GHSYNC_PER_PAGE") {
            ctx.per_page = parse_positive("GHSYNC_PER_PAGE", &v)?;
        }

        if let Some(v) = lookup("GHSYNC_CHUNK_SIZE") {
            ctx.chunk_size = parse_positive("GHSYNC_CHUNK_SIZE", &v)?;
        }

        if let Some(v) = lookup("GHSYNC_MAX_RETRIES") {
            ctx.max_retries = v.trim().parse()?;
        }

        if let Some(v) = lookup("GHSYNC_RETRY_BASE_MS") {
            ctx.retry_base_ms = v.trim().parse()?;
        }

        if let Some(v) = lookup("GHSYNC_TIMEOUT_SECS") {
            ctx.timeout_secs = parse_positive("GHSYNC_TIMEOUT_SECS", &v)?;
        }

        if let Some(debug) = lookup("GHSYNC_DEBUG") {
            ctx.debug = debug.parse().unwrap_or(0);
        }

        // Boolean flags from environment
        ctx.q_out = lookup("GHSYNC_QOUT").is_some();
        ctx.ctx_out = lookup("GHSYNC_CTXOUT").is_some();

        Ok(ctx)
    }

    /// Fail unless a usable API credential is present
    pub fn require_token(&self) -> Result<()> {
        if self.github_token.is_empty() || self.github_token == "-" {
            return Err(SyncError::Config(
                "Missing GITHUB_TOKEN, a bearer credential is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Get PostgreSQL connection URL
    pub fn pg_url(&self) -> String {
        match &self.warehouse_url {
            Some(url) => url.clone(),
            None => format!(
                "postgresql://{}:{}@{}:{}/{}?sslmode={}",
                self.pg_user, self.pg_pass, self.pg_host, self.pg_port, self.pg_db, self.pg_ssl
            ),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Parse a comma separated list of owner/repo pairs
pub fn parse_repos(list: &str) -> Result<Vec<SourceEntity>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(SourceEntity::parse)
        .collect()
}

fn parse_positive<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(v) if v > T::default() => Ok(v),
        _ => Err(SyncError::Config(format!(
            "{} must be a positive number, got '{}'",
            key, value
        ))),
    }
}
