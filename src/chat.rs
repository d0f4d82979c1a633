//! Retrieval-augmented question answering.
//!
//! [`ChatEngine::ask`] embeds the question, retrieves the nearest chunks
//! from the session's [`Index`], and asks the [`ChatModel`] to answer with
//! those chunks placed in the system prompt as context. Prior turns of the
//! conversation are replayed between the system prompt and the question.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{ChatError, QueryError};
use crate::index::Index;
use crate::llm::{ChatModel, PromptMessage, PromptRole};
use crate::models::{ConversationTurn, RetrievedChunk};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an assistant that answers questions about a \
source code repository. Base your answers on the repository context provided below, quote \
file paths when they help, and say so plainly when the context does not contain the answer.";

/// Result of a successful question.
#[derive(Debug, Clone)]
pub struct ChatAnswer {
    pub answer: String,
    /// Retrieved chunks, best first.
    pub retrieved: Vec<RetrievedChunk>,
}

pub struct ChatEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    model: Arc<dyn ChatModel>,
    top_k: usize,
    max_history_turns: usize,
    system_prompt: String,
}

impl ChatEngine {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, model: Arc<dyn ChatModel>) -> Self {
        Self {
            embedder,
            model,
            top_k: 2,
            max_history_turns: 10,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_max_history_turns(mut self, turns: usize) -> Self {
        self.max_history_turns = turns;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Answer `question` against `index`.
    ///
    /// `history` is the transcript before this question. An index with no
    /// chunks is legal: nothing is retrieved and the model answers without
    /// context.
    pub async fn ask(
        &self,
        question: &str,
        index: Option<&Index>,
        history: &[ConversationTurn],
    ) -> Result<ChatAnswer, ChatError> {
        let index = index.ok_or(QueryError::NoIndex)?;
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion.into());
        }

        let retrieved = if index.is_empty() {
            Vec::new()
        } else {
            let query_vec = self
                .embedder
                .embed_query(question)
                .await
                .map_err(|e| ChatError::Embedding(e.into()))?;
            index.search(&query_vec, self.top_k)
        };

        tracing::debug!(
            retrieved = retrieved.len(),
            model = self.model.model_name(),
            "generating answer"
        );

        let messages = self.build_messages(question, &retrieved, history);
        let answer = self
            .model
            .complete(&messages)
            .await
            .map_err(|e| ChatError::Generation(e.into()))?;

        Ok(ChatAnswer { answer, retrieved })
    }

    fn build_messages(
        &self,
        question: &str,
        retrieved: &[RetrievedChunk],
        history: &[ConversationTurn],
    ) -> Vec<PromptMessage> {
        let mut messages = vec![PromptMessage::new(
            PromptRole::System,
            system_with_context(&self.system_prompt, retrieved),
        )];

        let skip = history.len().saturating_sub(self.max_history_turns);
        messages.extend(
            history
                .iter()
                .skip(skip)
                .map(|turn| PromptMessage::new(turn.role.into(), turn.content.clone())),
        );

        messages.push(PromptMessage::new(PromptRole::User, question));
        messages
    }
}

fn system_with_context(system_prompt: &str, retrieved: &[RetrievedChunk]) -> String {
    let mut context = String::new();
    for hit in retrieved {
        context.push_str(&format!("file_path: {}\n\n{}\n\n", hit.file, hit.text));
    }
    format!(
        "{}\n\nContext information is below.\n--------------------\n{}--------------------\n",
        system_prompt, context
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("embedding service down")
        }
    }

    /// Records the prompts it receives and answers with a fixed string.
    #[derive(Default)]
    struct RecordingModel {
        prompts: Mutex<Vec<Vec<PromptMessage>>>,
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        fn model_name(&self) -> &str {
            "recording"
        }
        async fn complete(&self, messages: &[PromptMessage]) -> Result<String> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            Ok("the answer".to_string())
        }
    }

    fn engine(embedder: Arc<dyn EmbeddingProvider>, model: Arc<RecordingModel>) -> ChatEngine {
        ChatEngine::new(embedder, model)
    }

    #[tokio::test]
    async fn test_no_index_is_query_error() {
        let model = Arc::new(RecordingModel::default());
        let err = engine(Arc::new(FixedEmbedder), model.clone())
            .ask("anything", None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Query(QueryError::NoIndex)));
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_answers_without_context() {
        let model = Arc::new(RecordingModel::default());
        let index = Index::empty();
        // The embedder is never consulted for an empty index.
        let answer = engine(Arc::new(FailingEmbedder), model.clone())
            .ask("what is this?", Some(&index), &[])
            .await
            .unwrap();
        assert!(answer.retrieved.is_empty());
        assert_eq!(answer.answer, "the answer");

        let prompts = model.prompts.lock().unwrap();
        let system = &prompts[0][0];
        assert_eq!(system.role, PromptRole::System);
        assert!(system
            .content
            .ends_with("--------------------\n--------------------\n"));
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let model = Arc::new(RecordingModel::default());
        let err = engine(Arc::new(FixedEmbedder), model)
            .ask("   ", Some(&Index::empty()), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Query(QueryError::EmptyQuestion)));
    }

    #[test]
    fn test_history_is_bounded_and_question_last() {
        let model = Arc::new(RecordingModel::default());
        let engine = engine(Arc::new(FixedEmbedder), model).with_max_history_turns(2);
        let history = vec![
            ConversationTurn::assistant("greeting"),
            ConversationTurn::user("first question"),
            ConversationTurn::assistant("first answer"),
        ];
        let messages = engine.build_messages("second question", &[], &history);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "first question");
        assert_eq!(messages[2].role, PromptRole::Assistant);
        assert_eq!(messages[3], PromptMessage::new(PromptRole::User, "second question"));
    }

    #[test]
    fn test_context_block_lists_retrieved_files() {
        let hits = vec![RetrievedChunk {
            file: "src/main.rs".to_string(),
            author: None,
            score: 0.9,
            text: "fn main() {}".to_string(),
            url: None,
        }];
        let system = system_with_context("be helpful", &hits);
        assert!(system.starts_with("be helpful\n\nContext information is below."));
        assert!(system.contains("file_path: src/main.rs\n\nfn main() {}"));
    }
}
