use crate::chunking::{build_chunks, ChunkingConfig};
use crate::composer::{Answer, AnswerComposer};
use crate::config::RagConfig;
use crate::embeddings::{build_embedder, Embedder};
use crate::error::RagError;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::index::{InMemoryVectorIndex, Retriever};
use crate::llm::{build_language_model, LanguageModel};
use crate::models::RetrievedChunk;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Shared components used to build a fresh pipeline for each loaded document.
#[derive(Clone)]
pub struct PipelineBuilder {
    extractor: Arc<dyn PdfExtractor>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    chunking: ChunkingConfig,
    top_k: usize,
}

impl PipelineBuilder {
    pub fn new(
        extractor: Arc<dyn PdfExtractor>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        chunking: ChunkingConfig,
        top_k: usize,
    ) -> Result<Self, RagError> {
        chunking.validate()?;
        if top_k == 0 {
            return Err(RagError::InvalidConfig("top_k must be at least 1".to_string()));
        }

        Ok(Self {
            extractor,
            embedder,
            model,
            chunking,
            top_k,
        })
    }

    pub fn from_config(config: &RagConfig) -> Result<Self, RagError> {
        config.validate()?;
        Self::new(
            Arc::new(LopdfExtractor),
            build_embedder(config)?,
            build_language_model(config)?,
            config.chunking,
            config.top_k,
        )
    }

    /// Loader -> chunker -> embedder -> index. The index keeps every chunk's
    /// text, so the source file is not needed once this returns.
    pub async fn build(&self, path: &Path) -> Result<RagPipeline, RagError> {
        let started = Instant::now();

        let extractor = Arc::clone(&self.extractor);
        let owned_path = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || extractor.extract_pages(&owned_path))
            .await
            .map_err(|error| {
                RagError::DocumentLoad(format!("pdf extraction task failed: {error}"))
            })??;

        let chunks = build_chunks(&pages, self.chunking)?;
        if chunks.is_empty() {
            return Err(RagError::DocumentLoad(format!(
                "no text chunks could be produced from {}",
                path.display()
            )));
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        let index = InMemoryVectorIndex::from_chunks(chunks, embeddings)?;

        info!(
            path = %path.display(),
            pages = pages.len(),
            chunks = index.len(),
            dimensions = index.dimensions(),
            embedding_model = %self.embedder.model_name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline built"
        );

        Ok(RagPipeline {
            page_count: pages.len(),
            retriever: Retriever::new(Arc::new(index), Arc::clone(&self.embedder)),
            composer: AnswerComposer::new(Arc::clone(&self.model)),
            top_k: self.top_k,
        })
    }
}

pub struct RagPipeline {
    retriever: Retriever,
    composer: AnswerComposer,
    top_k: usize,
    page_count: usize,
}

impl RagPipeline {
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn chunk_count(&self) -> usize {
        self.retriever.index().len()
    }

    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedChunk>, RagError> {
        self.retriever.retrieve(question, self.top_k).await
    }

    pub async fn ask(&self, question: &str) -> Answer {
        self.ask_with_sources(question).await.0
    }

    /// Like [`ask`](Self::ask) but also hands back the chunks the answer was grounded on.
    pub async fn ask_with_sources(&self, question: &str) -> (Answer, Vec<RetrievedChunk>) {
        if question.trim().is_empty() {
            return (Answer::EmptyQuestion, Vec::new());
        }

        let started = Instant::now();
        let chunks = match self.retrieve(question).await {
            Ok(chunks) => chunks,
            Err(error) => return (Answer::Failed(error), Vec::new()),
        };

        let answer = self.composer.compose(question, &chunks).await;
        info!(
            top_k = self.top_k,
            retrieved = chunks.len(),
            model = %self.composer.model_name(),
            failed = answer.is_failure(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "question answered"
        );

        (answer, chunks)
    }
}
