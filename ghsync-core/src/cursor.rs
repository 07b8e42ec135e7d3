//! Pull-based pagination over GitHub list endpoints

use crate::client::GitHubClient;
use crate::error::{Result, SyncError};
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Yields one batch of raw records per page until the `next` link runs out.
///
/// Query parameters are only attached to the first request; later requests
/// use the server supplied next-page URL verbatim.
pub struct PageCursor<'a> {
    client: &'a GitHubClient,
    next: Option<Url>,
    pages: usize,
}

impl<'a> PageCursor<'a> {
    pub fn new(client: &'a GitHubClient, url: &str, params: &[(&str, String)]) -> Result<Self> {
        let first = Url::parse_with_params(url, params)?;
        Ok(Self {
            client,
            next: Some(first),
            pages: 0,
        })
    }

    /// Fetch the next page. `Ok(None)` once exhausted, and on every call after.
    /// Any error also exhausts the cursor.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<Value>>> {
        let Some(url) = self.next.take() else {
            return Ok(None);
        };

        let response = self.client.get(url.as_str()).await?;
        let next_link = response.link.as_deref().and_then(parse_next_link);
        let body = response.json(url.as_str())?;

        let records = match body {
            Value::Array(records) => records,
            other => {
                return Err(SyncError::FatalRequest {
                    status: None,
                    url: url.to_string(),
                    message: format!("expected a JSON array, got {}", json_kind(&other)),
                })
            }
        };

        if records.is_empty() {
            debug!(url = %url, "empty page, pagination finished");
            return Ok(None);
        }

        if let Some(link) = next_link {
            let next = url.join(&link).map_err(|err| SyncError::FatalRequest {
                status: None,
                url: url.to_string(),
                message: format!("invalid next link '{}': {}", link, err),
            })?;
            self.next = Some(next);
        }

        self.pages += 1;
        Ok(Some(records))
    }

    /// Number of non-empty pages returned so far
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }
}

/// Extract the `rel="next"` target from a Link header
///
/// Format: `<url>; rel="next", <url>; rel="last"`
pub fn parse_next_link(link: &str) -> Option<String> {
    for part in link.split(',') {
        let mut segments = part.split(';');
        let target = segments.next()?.trim();
        let is_next = segments.any(|param| {
            let param = param.trim();
            param
                .strip_prefix("rel=")
                .map(|rel| rel.trim_matches('"').split_whitespace().any(|r| r == "next"))
                .unwrap_or(false)
        });
        if is_next {
            let url = target.strip_prefix('<')?.strip_suffix('>')?;
            return Some(url.to_string());
        }
    }
    None
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
