//! Pull request values and the provider capability
//!
//! The reconciler never talks to a provider. The caller resolves the list of
//! open pull requests once per cycle and hands it in.

use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Repository identity on a code-hosting provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repository {
    pub org: String,
    #[serde(default)]
    pub project: String,
    pub name: String,
}

impl Repository {
    /// Work out the repository from a clone URL
    ///
    /// Accepts `https://host/org/name(.git)`, `ssh://git@host/org/name.git`
    /// and `git@host:org/name.git`. Segments between the org and the name
    /// (GitLab subgroups, Azure DevOps projects) become the project; Azure's
    /// `_git` marker is dropped.
    pub fn from_url(url: &str) -> Option<Self> {
        let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
        let (host, path) = match rest.split_once('/') {
            Some((host, path)) if !host.contains(':') || url.contains("://") => (host, path),
            _ => rest.split_once(':')?,
        };
        if host.is_empty() {
            return None;
        }

        let mut segments: Vec<&str> = path
            .split('/')
            .filter(|s| !s.is_empty() && *s != "_git")
            .collect();
        if segments.len() < 2 {
            return None;
        }
        let last = segments.pop()?;
        let name = last.strip_suffix(".git").unwrap_or(last);
        let org = segments.remove(0);
        if name.is_empty() {
            return None;
        }

        Some(Self {
            org: org.to_string(),
            project: segments.join("/"),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.project.is_empty() {
            write!(f, "{}/{}", self.org, self.name)
        } else {
            write!(f, "{}/{}/{}", self.org, self.project, self.name)
        }
    }
}

/// An open pull (or merge) request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub repository: Repository,
    pub number: u64,
    pub base_branch: String,
    pub head_branch: String,
}

impl PullRequest {
    /// `<headBranch>-<number>`
    pub fn branch_id(&self) -> BranchId {
        BranchId::new(&self.head_branch, self.number)
    }
}

/// Key of a derived pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(String);

impl BranchId {
    pub fn new(head_branch: &str, number: u64) -> Self {
        Self(format!("{head_branch}-{number}"))
    }

    /// Recover a branch id from a derived object name
    ///
    /// The name must be `<base>-<branchId>` and the branch id must end with
    /// `-<pr_id>`.
    pub fn from_derived_name(name: &str, base: &str, pr_id: &str) -> Option<Self> {
        let rest = name.strip_prefix(base)?.strip_prefix('-')?;
        let head = rest.strip_suffix(pr_id)?.strip_suffix('-')?;
        if head.is_empty() || pr_id.parse::<u64>().is_err() {
            return None;
        }
        Some(Self(rest.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Supplies the open pull requests of a repository
pub trait PullRequestProvider {
    fn list_pull_requests(&self, repository: &Repository)
    -> Result<Vec<PullRequest>, ProviderError>;
}

/// Provider backed by a fixed list
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    pull_requests: Vec<PullRequest>,
}

impl StaticProvider {
    pub fn new(pull_requests: Vec<PullRequest>) -> Self {
        Self { pull_requests }
    }
}

impl PullRequestProvider for StaticProvider {
    fn list_pull_requests(
        &self,
        repository: &Repository,
    ) -> Result<Vec<PullRequest>, ProviderError> {
        Ok(self
            .pull_requests
            .iter()
            .filter(|pr| &pr.repository == repository)
            .cloned()
            .collect())
    }
}

/// Provider reading a JSON array of pull requests from disk
///
/// The file is re-read on every call so an external process can keep it
/// current.
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    path: PathBuf,
}

impl JsonFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every pull request in the file, regardless of repository
    pub fn load_all(&self) -> Result<Vec<PullRequest>, ProviderError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| ProviderError::Read {
            path: self.path.clone(),
            source,
        })?;
        let prs: Vec<PullRequest> = serde_json::from_str(&content)?;
        log::debug!(
            "Loaded {} pull requests from {}",
            prs.len(),
            self.path.display()
        );
        Ok(prs)
    }
}

impl PullRequestProvider for JsonFileProvider {
    fn list_pull_requests(
        &self,
        repository: &Repository,
    ) -> Result<Vec<PullRequest>, ProviderError> {
        StaticProvider::new(self.load_all()?).list_pull_requests(repository)
    }
}
