use crate::embeddings::Embedder;
use crate::error::RagError;
use crate::models::{DocumentChunk, IndexEntry, RetrievedChunk};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Exhaustive cosine-similarity index over a single document's chunks.
///
/// Entries are immutable after `build`; searching only reads them.
#[derive(Debug, Clone)]
pub struct InMemoryVectorIndex {
    entries: Vec<IndexEntry>,
    dimensions: usize,
}

impl InMemoryVectorIndex {
    pub fn build(entries: Vec<IndexEntry>) -> Result<Self, RagError> {
        let dimensions = entries.first().map(|entry| entry.embedding.len()).unwrap_or(0);
        check_entries(&entries, dimensions)?;

        Ok(Self {
            entries,
            dimensions,
        })
    }

    /// Pairs chunks with their vectors one-to-one and builds the index.
    pub fn from_chunks(
        chunks: Vec<DocumentChunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, RagError> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::EmbeddingService(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry { chunk, embedding })
            .collect();

        Self::build(entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Best `k` entries for `query_vector`, best first. Equal scores keep
    /// insertion order.
    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, RagError> {
        if self.entries.is_empty() {
            return Err(RagError::Retrieval("index is empty".to_string()));
        }
        if k == 0 {
            return Err(RagError::Retrieval("k must be at least 1".to_string()));
        }
        if query_vector.len() != self.dimensions {
            return Err(RagError::Retrieval(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.dimensions
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, cosine_similarity(query_vector, &entry.embedding)))
            .collect();

        // sort_by is stable, so ties stay in insertion order.
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(position, score)| {
                let chunk = &self.entries[position].chunk;
                RetrievedChunk {
                    chunk_id: chunk.chunk_id.clone(),
                    page: chunk.page,
                    text: chunk.text.clone(),
                    score,
                }
            })
            .collect())
    }
}

/// Embeds query text with the same model used for the index, then searches.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<InMemoryVectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(index: Arc<InMemoryVectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &InMemoryVectorIndex {
        &self.index
    }

    pub async fn retrieve(
        &self,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        if self.index.is_empty() {
            return Err(RagError::Retrieval("index is empty".to_string()));
        }

        let query_vector = self
            .embedder
            .embed_query(query_text)
            .await
            .map_err(|error| RagError::Retrieval(format!("query embedding failed: {error}")))?;

        let hits = self.index.search(&query_vector, k)?;
        debug!(k, hits = hits.len(), best = ?hits.first().map(|hit| hit.score), "retrieved chunks");
        Ok(hits)
    }
}

/// Every entry must share one non-zero dimensionality and a unique chunk id.
fn check_entries(entries: &[IndexEntry], dimensions: usize) -> Result<(), RagError> {
    let mut seen = HashSet::with_capacity(entries.len());

    for entry in entries {
        if entry.embedding.len() != dimensions || dimensions == 0 {
            return Err(RagError::Retrieval(format!(
                "chunk {} has embedding dimension {} (index expects {dimensions})",
                entry.chunk.chunk_index,
                entry.embedding.len()
            )));
        }
        if !seen.insert(entry.chunk.chunk_id.as_str()) {
            return Err(RagError::Retrieval(format!(
                "duplicate chunk id {} in index build",
                entry.chunk.chunk_id
            )));
        }
    }

    Ok(())
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}
