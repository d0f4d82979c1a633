//! In-memory vector index over a repository's chunks.
//!
//! An [`Index`] is built in one piece by [`IndexBuilder::build`] and never
//! edited afterwards. Sessions hold it behind an `Arc` and replace the whole
//! value on reload, so a reader sees either the old or the new index.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::chunk::chunk_text;
use crate::config::ChunkingConfig;
use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::error::IndexError;
use crate::models::{Chunk, Document, RetrievedChunk, SourceRef};

#[derive(Debug)]
pub struct Index {
    chunks: Vec<Chunk>,
    documents: usize,
    built_at: DateTime<Utc>,
}

impl Index {
    /// An index with no chunks; queries against it retrieve nothing.
    pub fn empty() -> Self {
        Self {
            chunks: Vec::new(),
            documents: 0,
            built_at: Utc::now(),
        }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of documents that contributed at least one chunk.
    pub fn document_count(&self) -> usize {
        self.documents
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// The `k` chunks most similar to `query_vec`, best first.
    ///
    /// Scores are cosine similarity clamped to `[0, 1]`. Equal scores keep
    /// their chunk order.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Vec<RetrievedChunk> {
        let mut scored: Vec<(f32, &Chunk)> = self
            .chunks
            .iter()
            .map(|c| {
                let sim = cosine_similarity(query_vec, &c.embedding);
                (sim.clamp(0.0, 1.0), c)
            })
            .collect();

        // `sort_by` is stable, which keeps ties in chunk order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(score, c)| RetrievedChunk {
                file: c.source.path.clone(),
                author: c.source.author.clone(),
                score,
                text: c.text.clone(),
                url: c.source.url.clone(),
            })
            .collect()
    }
}

/// Chunks and embeds documents into a fresh [`Index`].
pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingProvider>,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        chunking: ChunkingConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            chunking,
            batch_size: batch_size.max(1),
        }
    }

    /// Build an index from `documents`.
    ///
    /// Any embedding failure fails the whole build; no partial index is
    /// returned.
    pub async fn build(&self, documents: Vec<Document>) -> Result<Index, IndexError> {
        let mut pending: Vec<(Arc<SourceRef>, usize, String)> = Vec::new();
        let mut documents_with_chunks = 0;

        for doc in &documents {
            let pieces = chunk_text(
                &doc.content,
                self.chunking.max_tokens,
                self.chunking.overlap_tokens,
            );
            if pieces.is_empty() {
                tracing::debug!(path = %doc.path, "document produced no chunks");
                continue;
            }
            documents_with_chunks += 1;
            let source = Arc::new(SourceRef::from(doc));
            for (i, text) in pieces.into_iter().enumerate() {
                pending.push((source.clone(), i, text));
            }
        }

        let mut chunks = Vec::with_capacity(pending.len());
        let mut dims: Option<usize> = None;

        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|(_, _, text)| text.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .map_err(|e| IndexError::Embedding(e.into()))?;

            if vectors.len() != batch.len() {
                return Err(IndexError::CountMismatch {
                    expected: batch.len(),
                    got: vectors.len(),
                });
            }

            for ((source, index, text), embedding) in batch.iter().zip(vectors) {
                let expected = *dims.get_or_insert(embedding.len());
                if embedding.len() != expected {
                    return Err(IndexError::DimensionMismatch {
                        expected,
                        got: embedding.len(),
                    });
                }
                chunks.push(Chunk {
                    source: source.clone(),
                    index: *index,
                    text: text.clone(),
                    embedding,
                });
            }
        }

        tracing::info!(
            documents = documents.len(),
            chunks = chunks.len(),
            model = self.embedder.model_name(),
            "index built"
        );

        Ok(Index {
            chunks,
            documents: documents_with_chunks,
            built_at: Utc::now(),
        })
    }
}
