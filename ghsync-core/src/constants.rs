// Constants used throughout ghsync

// Upstream API
pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const GITHUB_ACCEPT: &str = "application/vnd.github+json";
pub const USER_AGENT: &str = "ghsync/0.1";
pub const DEFAULT_REPOS: &str = "apache/airflow,dbt-labs/dbt-core";
pub const DEFAULT_PER_PAGE: u32 = 100;
pub const STATE_ALL: &str = "all";

// Query parameter names
pub const PARAM_PER_PAGE: &str = "per_page";
pub const PARAM_STATE: &str = "state";
pub const PARAM_SINCE: &str = "since";

// Statuses retried at the transport layer
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_BASE_MS: u64 = 1000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// Destination tables
pub const DEFAULT_SCHEMA: &str = "RAW";
pub const ISSUES_TABLE: &str = "GITHUB_ISSUES";
pub const COMMENTS_TABLE: &str = "GITHUB_COMMENTS";
pub const REPOSITORIES_TABLE: &str = "GITHUB_REPOSITORIES";

// Columns stamped onto every row
pub const SOURCE_OWNER_COL: &str = "SOURCE_OWNER";
pub const SOURCE_REPO_COL: &str = "SOURCE_REPO";
pub const INGESTED_AT_COL: &str = "INGESTED_AT";
pub const UPDATED_AT_COL: &str = "UPDATED_AT";
// Column used when a record is not a JSON object
pub const VALUE_COL: &str = "VALUE";

// Destination write limits
pub const DEFAULT_CHUNK_SIZE: usize = 5000;
pub const MAX_BIND_PARAMS: usize = 65535;
pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const DEFAULT_MAX_WORKERS: usize = 5;
