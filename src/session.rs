//! Per-session context and the commands applied to it.
//!
//! A [`Session`] owns everything one user interacts with: credentials, the
//! current [`Index`] (if any), the conversation transcript, and whether the
//! repository form should still be shown. Each user action is a discrete
//! command (`load`, `ask`, `clear`) taking `&mut self`, so commands within a
//! session are strictly sequential.
//!
//! The index is held as `Arc<Index>` and only ever replaced wholesale after
//! a complete, successful build. A failed load leaves the previous `Arc`
//! untouched.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::attribution::format_sources;
use crate::chat::{ChatEngine, DEFAULT_SYSTEM_PROMPT};
use crate::config::Config;
use crate::conversation::ConversationStore;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::{ChatError, QueryError, SessionError};
use crate::fetch::{GitHubFetcher, RepositorySource};
use crate::filter::{FetchFilters, FilterMode, FilterSpec};
use crate::index::{Index, IndexBuilder};
use crate::llm::{create_chat_model, ChatModel};
use crate::locator::RepoLocator;
use crate::models::{ConversationTurn, RepoRef, RetrievedChunk};

/// The two secrets a session needs before any repository operation.
#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub github_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "***"))
            .field("github_token", &self.github_token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Credentials {
    pub fn new(openai_api_key: Option<String>, github_token: Option<String>) -> Self {
        Self {
            openai_api_key,
            github_token,
        }
    }

    /// Read `OPENAI_API_KEY` and `GITHUB_TOKEN` from the environment.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("OPENAI_API_KEY").ok(),
            std::env::var("GITHUB_TOKEN").ok(),
        )
    }

    /// Fill in any missing secret from `other`.
    pub fn or(self, other: Credentials) -> Self {
        Self {
            openai_api_key: present(self.openai_api_key).or(present(other.openai_api_key)),
            github_token: present(self.github_token).or(present(other.github_token)),
        }
    }

    /// Human-readable names of the secrets that are absent or blank.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if present(self.openai_api_key.clone()).is_none() {
            missing.push("OpenAI API key");
        }
        if present(self.github_token.clone()).is_none() {
            missing.push("GitHub personal access token");
        }
        missing
    }
}

fn present(secret: Option<String>) -> Option<String> {
    secret.filter(|s| !s.trim().is_empty())
}

/// Inputs of the "load repository" form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadRequest {
    pub url: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub directories: String,
    #[serde(default)]
    pub directory_mode: FilterMode,
    #[serde(default)]
    pub extensions: String,
    #[serde(default)]
    pub extension_mode: FilterMode,
}

impl LoadRequest {
    pub fn filters(&self) -> FetchFilters {
        FetchFilters::new(
            FilterSpec::directories(&self.directories, self.directory_mode),
            FilterSpec::extensions(&self.extensions, self.extension_mode),
        )
    }
}

/// Outcome of a successful load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub repo: RepoRef,
    pub documents: usize,
    pub chunks: usize,
}

/// A successful answer, as appended to the transcript.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    pub answer: String,
    pub sources: Vec<RetrievedChunk>,
    /// Citation block rendered by [`format_sources`].
    pub sources_text: String,
}

/// The external services a session talks to.
pub struct Services {
    pub source: Arc<dyn RepositorySource>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub model: Arc<dyn ChatModel>,
}

impl Services {
    /// Build the GitHub, embedding, and chat clients from configuration.
    pub fn from_config(config: &Config, credentials: &Credentials) -> anyhow::Result<Self> {
        let token = credentials.github_token.as_deref().unwrap_or_default();
        let key = credentials.openai_api_key.as_deref();
        Ok(Self {
            source: Arc::new(GitHubFetcher::new(&config.github, token)?),
            embedder: Arc::from(create_provider(&config.embedding, key)?),
            model: Arc::from(create_chat_model(&config.llm, key)?),
        })
    }
}

pub struct Session {
    credentials: Credentials,
    locator: RepoLocator,
    source: Option<Arc<dyn RepositorySource>>,
    builder: Option<IndexBuilder>,
    engine: Option<ChatEngine>,
    index: Option<Arc<Index>>,
    repo: Option<RepoRef>,
    conversation: ConversationStore,
    config_expanded: bool,
}

impl Session {
    /// Create a session from configuration.
    ///
    /// Missing credentials do not fail construction; every command checks
    /// them first and reports which ones are missing.
    pub fn new(config: &Config, credentials: Credentials) -> anyhow::Result<Self> {
        let services = if credentials.missing().is_empty() {
            Some(Services::from_config(config, &credentials)?)
        } else {
            None
        };
        Ok(Self::assemble(config, credentials, services))
    }

    /// Create a session around caller-supplied services.
    pub fn with_services(config: &Config, credentials: Credentials, services: Services) -> Self {
        Self::assemble(config, credentials, Some(services))
    }

    fn assemble(config: &Config, credentials: Credentials, services: Option<Services>) -> Self {
        let (source, builder, engine) = match services {
            Some(s) => {
                let builder = IndexBuilder::new(
                    s.embedder.clone(),
                    config.chunking.clone(),
                    config.embedding.batch_size,
                );
                let engine = ChatEngine::new(s.embedder, s.model)
                    .with_top_k(config.retrieval.top_k)
                    .with_max_history_turns(config.llm.max_history_turns)
                    .with_system_prompt(
                        config
                            .llm
                            .system_prompt
                            .clone()
                            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
                    );
                (Some(s.source), Some(builder), Some(engine))
            }
            None => (None, None, None),
        };
        Self {
            credentials,
            locator: RepoLocator::new(&config.github.host),
            source,
            builder,
            engine,
            index: None,
            repo: None,
            conversation: ConversationStore::new(),
            config_expanded: true,
        }
    }

    /// Fails with the list of missing secrets, if any.
    pub fn ensure_ready(&self) -> Result<(), SessionError> {
        let missing = self.credentials.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SessionError::MissingCredentials(missing))
        }
    }

    pub fn index(&self) -> Option<&Arc<Index>> {
        self.index.as_ref()
    }

    pub fn repo(&self) -> Option<&RepoRef> {
        self.repo.as_ref()
    }

    pub fn transcript(&self) -> &[ConversationTurn] {
        self.conversation.all()
    }

    /// Whether the repository form should still be shown expanded.
    pub fn config_expanded(&self) -> bool {
        self.config_expanded
    }

    /// Fetch and index a repository, replacing the current index on success.
    pub async fn load(&mut self, request: &LoadRequest) -> Result<LoadSummary, SessionError> {
        self.ensure_ready()?;
        let (source, builder) = match (&self.source, &self.builder) {
            (Some(source), Some(builder)) => (source.clone(), builder),
            _ => return Err(SessionError::MissingCredentials(self.credentials.missing())),
        };

        let repo = self
            .locator
            .parse(&request.url, request.branch.as_deref())?;
        let filters = request.filters();

        tracing::info!(repo = %repo.slug(), branch = %repo.branch, "loading repository");
        let documents = source.fetch(&repo, &filters).await?;
        let built = builder.build(documents).await?;

        let summary = LoadSummary {
            repo: repo.clone(),
            documents: built.document_count(),
            chunks: built.len(),
        };
        self.index = Some(Arc::new(built));
        self.repo = Some(repo);
        self.config_expanded = false;
        Ok(summary)
    }

    /// Ask a question about the loaded repository.
    ///
    /// The user turn is recorded first. The assistant turn is recorded only
    /// when an answer was produced; on failure the transcript ends with the
    /// user turn.
    pub async fn ask(&mut self, question: &str) -> Result<AssistantReply, SessionError> {
        self.ensure_ready()?;
        let engine = match &self.engine {
            Some(engine) => engine,
            None => return Err(SessionError::MissingCredentials(self.credentials.missing())),
        };
        // Checked before touching the transcript so a rejected question leaves no trace.
        let index = match &self.index {
            Some(index) => index.clone(),
            None => return Err(ChatError::from(QueryError::NoIndex).into()),
        };
        if question.trim().is_empty() {
            return Err(ChatError::from(QueryError::EmptyQuestion).into());
        }

        let history = self.conversation.all().to_vec();
        self.conversation.append(ConversationTurn::user(question));

        let answer = match engine.ask(question, Some(&index), &history).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(error = %e, "answer generation failed");
                return Err(e.into());
            }
        };

        let citations = answer.retrieved.iter().map(|r| r.citation()).collect();
        let sources_text = format_sources(&answer.retrieved);
        self.conversation
            .append(ConversationTurn::assistant(answer.answer.clone()).with_sources(citations));

        Ok(AssistantReply {
            answer: answer.answer,
            sources: answer.retrieved,
            sources_text,
        })
    }

    /// Reset the transcript to the greeting.
    pub fn clear(&mut self) {
        self.conversation.reset();
    }
}
