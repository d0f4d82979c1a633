//! Repository fetching over the GitHub REST API.
//!
//! Workflow of [`GitHubFetcher::fetch`]:
//! 1. Resolve the branch to its head commit and root tree.
//! 2. List the tree recursively. If GitHub truncates that listing, list it
//!    again one directory at a time, skipping directories the filters exclude.
//! 3. Drop entries that fail the active directory/extension filters or
//!    exceed the size limit. Nothing is downloaded for them.
//! 4. Download the remaining blobs with bounded concurrency, in path order.
//! 5. Optionally look up the last commit author of each file.
//!
//! Every failure in steps 1, 2 and 4 collapses into a single [`FetchError`];
//! callers get either the full document set or nothing.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::config::GithubConfig;
use crate::error::FetchError;
use crate::filter::FetchFilters;
use crate::models::{Document, RepoRef};

/// A place documents can be fetched from.
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Fetch every file of `repo` that passes `filters`.
    async fn fetch(&self, repo: &RepoRef, filters: &FetchFilters)
        -> Result<Vec<Document>, FetchError>;
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    commit: BranchCommit,
}

#[derive(Debug, Deserialize)]
struct BranchCommit {
    sha: String,
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    tree: ShaRef,
    #[serde(default)]
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct ShaRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    content: String,
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct CommitListItem {
    commit: CommitDetail,
}

/// Fetches repository files from GitHub (or GitHub Enterprise) with a token.
pub struct GitHubFetcher {
    client: reqwest::Client,
    token: String,
    api_base: String,
    web_base: String,
    concurrency: usize,
    fetch_authors: bool,
    max_file_bytes: u64,
}

impl GitHubFetcher {
    pub fn new(config: &GithubConfig, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("repo-chat/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            token: token.to_string(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            web_base: config.web_base.trim_end_matches('/').to_string(),
            concurrency: config.concurrency.max(1),
            fetch_authors: config.fetch_authors,
            max_file_bytes: config.max_file_bytes,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.api_base, path);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("GET {} returned {}: {}", url, status, body.trim());
        }

        resp.json::<T>()
            .await
            .with_context(|| format!("GET {} returned an unexpected body", url))
    }

    async fn resolve_branch(&self, repo: &RepoRef) -> Result<BranchCommit> {
        let path = format!("/repos/{}/branches/{}", repo.slug(), repo.branch);
        let branch: BranchResponse = self.get_json(&path, &[]).await?;
        Ok(branch.commit)
    }

    async fn list_blobs(
        &self,
        repo: &RepoRef,
        tree_sha: &str,
        filters: &FetchFilters,
    ) -> Result<Vec<TreeEntry>> {
        let path = format!("/repos/{}/git/trees/{}", repo.slug(), tree_sha);
        let tree: TreeResponse = self.get_json(&path, &[("recursive", "1")]).await?;
        let entries = if tree.truncated {
            tracing::info!(
                repo = %repo.slug(),
                "recursive tree listing truncated, walking directories"
            );
            self.walk_tree(repo, tree_sha, filters).await?
        } else {
            tree.tree
        };
        Ok(entries
            .into_iter()
            .filter(|e| e.kind == "blob")
            .map(|mut e| {
                e.path = e.path.replace('\\', "/");
                e
            })
            .collect())
    }

    /// List the tree one directory at a time, skipping directories the
    /// filters rule out. A directory whose own listing is truncated fails.
    async fn walk_tree(
        &self,
        repo: &RepoRef,
        root_sha: &str,
        filters: &FetchFilters,
    ) -> Result<Vec<TreeEntry>> {
        let mut pending = vec![(String::new(), root_sha.to_string())];
        let mut blobs = Vec::new();

        while let Some((prefix, sha)) = pending.pop() {
            let path = format!("/repos/{}/git/trees/{}", repo.slug(), sha);
            let tree: TreeResponse = self.get_json(&path, &[]).await?;
            if tree.truncated {
                bail!(
                    "Tree listing of '{}' truncated by the API",
                    if prefix.is_empty() { "/" } else { prefix.as_str() }
                );
            }
            for mut entry in tree.tree {
                if !prefix.is_empty() {
                    entry.path = format!("{}/{}", prefix, entry.path);
                }
                match entry.kind.as_str() {
                    "blob" => blobs.push(entry),
                    "tree" if filters.may_descend(&entry.path) => {
                        pending.push((entry.path, entry.sha))
                    }
                    "tree" => tracing::debug!(dir = %entry.path, "skipping filtered directory"),
                    _ => {}
                }
            }
        }

        Ok(blobs)
    }

    async fn download(&self, repo: &RepoRef, entry: &TreeEntry) -> Result<Option<String>> {
        let path = format!("/repos/{}/git/blobs/{}", repo.slug(), entry.sha);
        let blob: BlobResponse = self.get_json(&path, &[]).await?;
        let bytes = decode_blob(&blob)
            .with_context(|| format!("Failed to decode blob for {}", entry.path))?;
        match String::from_utf8(bytes) {
            Ok(text) => Ok(Some(text)),
            Err(_) => {
                tracing::debug!(path = %entry.path, "skipping non-UTF-8 file");
                Ok(None)
            }
        }
    }

    /// Author of the last commit touching `path`; absent on any failure.
    async fn last_author(&self, repo: &RepoRef, commit: &str, path: &str) -> Option<String> {
        let api_path = format!("/repos/{}/commits", repo.slug());
        let query = [("path", path), ("sha", commit), ("per_page", "1")];
        match self.get_json::<Vec<CommitListItem>>(&api_path, &query).await {
            Ok(items) => items
                .into_iter()
                .next()
                .and_then(|item| item.commit.author)
                .and_then(|a| a.name)
                .filter(|name| !name.trim().is_empty()),
            Err(e) => {
                tracing::debug!(path, error = %e, "author lookup failed");
                None
            }
        }
    }

    async fn fetch_documents(&self, repo: &RepoRef, filters: &FetchFilters) -> Result<Vec<Document>> {
        let head = self.resolve_branch(repo).await?;
        let commit_sha = head.sha;
        tracing::debug!(
            repo = %repo.slug(),
            branch = %repo.branch,
            commit = %commit_sha,
            last_author = ?head.commit.author.and_then(|a| a.name),
            "resolved branch"
        );

        let mut entries = self.list_blobs(repo, &head.commit.tree.sha, filters).await?;
        let listed = entries.len();
        entries.retain(|e| filters.allows(&e.path) && within_size_limit(e, self.max_file_bytes));
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries.dedup_by(|a, b| a.path == b.path);
        tracing::info!(
            repo = %repo.slug(),
            listed,
            selected = entries.len(),
            "filtered repository tree"
        );

        let commit_sha = commit_sha.as_str();
        let documents: Vec<Option<Document>> = stream::iter(entries)
            .map(|entry| async move {
                let content = match self.download(repo, &entry).await? {
                    Some(content) => content,
                    None => return Ok(None),
                };
                let author = if self.fetch_authors {
                    self.last_author(repo, commit_sha, &entry.path).await
                } else {
                    None
                };
                let url = build_web_url(&self.web_base, repo, commit_sha, &entry.path);
                Ok::<_, anyhow::Error>(Some(Document {
                    path: entry.path,
                    content,
                    author,
                    url: Some(url),
                }))
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        Ok(documents.into_iter().flatten().collect())
    }
}

#[async_trait]
impl RepositorySource for GitHubFetcher {
    async fn fetch(
        &self,
        repo: &RepoRef,
        filters: &FetchFilters,
    ) -> Result<Vec<Document>, FetchError> {
        for filter in filters.active() {
            tracing::debug!(
                kind = ?filter.kind,
                mode = %filter.mode,
                values = ?filter.values,
                "applying filter"
            );
        }
        match self.fetch_documents(repo, filters).await {
            Ok(docs) => {
                tracing::info!(repo = %repo.slug(), documents = docs.len(), "repository fetched");
                Ok(docs)
            }
            Err(e) => {
                tracing::warn!(repo = %repo.slug(), branch = %repo.branch, error = %format!("{:#}", e), "repository fetch failed");
                Err(FetchError::new(e))
            }
        }
    }
}

fn decode_blob(blob: &BlobResponse) -> Result<Vec<u8>> {
    match blob.encoding.as_str() {
        "base64" => {
            let compact: String = blob
                .content
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
        }
        "utf-8" | "utf8" => Ok(blob.content.clone().into_bytes()),
        other => bail!("Unsupported blob encoding: {}", other),
    }
}

fn within_size_limit(entry: &TreeEntry, max_bytes: u64) -> bool {
    match entry.size {
        Some(size) if size > max_bytes => {
            tracing::debug!(path = %entry.path, size, max_bytes, "skipping file over size limit");
            false
        }
        _ => true,
    }
}

/// Browsable link to `path` at `commit`.
fn build_web_url(web_base: &str, repo: &RepoRef, commit: &str, path: &str) -> String {
    format!("{}/{}/blob/{}/{}", web_base, repo.slug(), commit, path)
}
