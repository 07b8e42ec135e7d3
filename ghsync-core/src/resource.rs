//! Source entities and the resources synced for each of them

use crate::constants::{COMMENTS_TABLE, ISSUES_TABLE};
use crate::error::{Result, SyncError};
use std::fmt;

/// One upstream repository to sync, identified by owner and name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceEntity {
    pub owner: String,
    pub repo: String,
}

impl SourceEntity {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parse "owner/repo", splitting on the first slash only
    pub fn parse(entity: &str) -> Result<Self> {
        match entity.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => {
                Ok(Self::new(owner, repo))
            }
            _ => Err(SyncError::Config(format!(
                "Invalid repository '{}', expected owner/repo",
                entity
            ))),
        }
    }

    /// Path of the repository itself, e.g. `/repos/apache/airflow`
    pub fn repo_path(&self) -> String {
        format!("/repos/{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for SourceEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Paginated resources synced incrementally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceSpec {
    Issues,
    IssueComments,
}

impl ResourceSpec {
    pub const ALL: [ResourceSpec; 2] = [ResourceSpec::Issues, ResourceSpec::IssueComments];

    /// Logical resource name
    pub fn name(&self) -> &'static str {
        match self {
            ResourceSpec::Issues => "issues",
            ResourceSpec::IssueComments => "issue-comments",
        }
    }

    /// Destination table, one table per resource
    pub fn table(&self) -> &'static str {
        match self {
            ResourceSpec::Issues => ISSUES_TABLE,
            ResourceSpec::IssueComments => COMMENTS_TABLE,
        }
    }

    /// Endpoint path for an entity
    pub fn endpoint(&self, entity: &SourceEntity) -> String {
        match self {
            ResourceSpec::Issues => format!("{}/issues", entity.repo_path()),
            ResourceSpec::IssueComments => format!("{}/issues/comments", entity.repo_path()),
        }
    }
}

impl fmt::Display for ResourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
