//! Typed failures for every user-triggered operation.
//!
//! Each kind is recoverable: the front ends render its message and
//! return to the interactive loop with the prior session state intact.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The repository URL did not match `https://<host>/<owner>/<repo>`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Failed parsing repository URL, please try again.")]
pub struct ParseError {
    pub input: String,
}

/// Fetching the repository failed for any reason.
///
/// The cause is kept for logging only; callers must not branch on it.
#[derive(Debug, Error)]
#[error("Error loading github repository, check your github token and repository information.")]
pub struct FetchError {
    #[source]
    source: BoxError,
}

impl FetchError {
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Embedding failed while indexing the repository: {0}")]
    Embedding(#[source] BoxError),

    #[error("Embedding service returned {got} vectors for {expected} chunks")]
    CountMismatch { expected: usize, got: usize },

    #[error("Embedding dimensions are inconsistent: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("No repository has been indexed yet. Load a repository first.")]
    NoIndex,

    #[error("Question must not be empty")]
    EmptyQuestion,
}

/// Failures of a single `ask` call.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Failed to embed the question: {0}")]
    Embedding(#[source] BoxError),

    #[error("Failed to generate an answer: {0}")]
    Generation(#[source] BoxError),
}

/// Everything a session command can fail with.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Missing credentials: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Chat(#[from] ChatError),
}

impl SessionError {
    /// Machine-readable code used by the HTTP API.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::MissingCredentials(_) => "missing_credentials",
            SessionError::Parse(_) => "parse_error",
            SessionError::Fetch(_) => "fetch_error",
            SessionError::Index(_) => "index_error",
            SessionError::Chat(ChatError::Query(_)) => "query_error",
            SessionError::Chat(_) => "chat_error",
        }
    }
}
