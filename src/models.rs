//! Core data models used throughout repo-chat.
//!
//! These types represent the repository reference, fetched documents,
//! embedded chunks, retrieval results, and conversation turns that flow
//! through the ingestion and retrieval pipeline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Branch used when the caller leaves the branch blank.
pub const DEFAULT_BRANCH: &str = "main";

/// A validated reference to a remote repository and the branch to index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    pub branch: String,
}

impl RepoRef {
    /// Build a reference, normalising the branch.
    ///
    /// The branch is trimmed and lower-cased; a blank branch becomes
    /// [`DEFAULT_BRANCH`].
    pub fn new(owner: impl Into<String>, name: impl Into<String>, branch: Option<&str>) -> Self {
        let branch = branch.map(|b| b.trim().to_lowercase()).unwrap_or_default();
        let branch = if branch.is_empty() {
            DEFAULT_BRANCH.to_string()
        } else {
            branch
        };
        Self {
            owner: owner.into(),
            name: name.into(),
            branch,
        }
    }

    /// `owner/name`, as used in API paths and log lines.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// One fetched file.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Repository-relative path with `/` separators.
    pub path: String,
    pub content: String,
    /// Author of the most recent commit touching the file, when known.
    pub author: Option<String>,
    /// Browsable link to the file at the fetched commit.
    pub url: Option<String>,
}

/// Attribution shared by every chunk cut from the same document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub path: String,
    pub author: Option<String>,
    pub url: Option<String>,
}

impl From<&Document> for SourceRef {
    fn from(doc: &Document) -> Self {
        Self {
            path: doc.path.clone(),
            author: doc.author.clone(),
            url: doc.url.clone(),
        }
    }
}

/// A piece of a document's text together with its embedding.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub source: Arc<SourceRef>,
    /// Position of this chunk within its document.
    pub index: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A chunk returned for a query, with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub file: String,
    pub author: Option<String>,
    /// Cosine similarity clamped to `[0.0, 1.0]`.
    pub score: f32,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl RetrievedChunk {
    pub fn citation(&self) -> SourceCitation {
        SourceCitation {
            file: self.file.clone(),
            author: self.author.clone(),
            score: self.score,
            url: self.url.clone(),
        }
    }
}

/// Citation metadata kept on an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub file: String,
    pub author: Option<String>,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single entry of the conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceCitation>>,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_sources(mut self, sources: Vec<SourceCitation>) -> Self {
        self.sources = Some(sources);
        self
    }
}
