pub mod chunking;
pub mod composer;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use chunking::{build_chunks, ChunkingConfig, RecursiveSplitter};
pub use composer::{
    format_context, parse_output, render_prompt, Answer, AnswerComposer, EMPTY_QUESTION_MESSAGE,
    INFERENCE_ERROR_PREFIX,
};
pub use config::{EmbeddingProvider, RagConfig};
pub use embeddings::{
    build_embedder, CharacterNgramEmbedder, Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{RagError, Result};
pub use extractor::{extract_page_texts, LopdfExtractor, PdfExtractor};
pub use index::{cosine_similarity, InMemoryVectorIndex, Retriever};
pub use llm::{build_language_model, ChatMessage, LanguageModel, OllamaChatModel};
pub use models::{
    DocumentChunk, IndexEntry, LoadSummary, PageText, RetrievedChunk, SessionStatus,
};
pub use orchestrator::{PipelineBuilder, RagPipeline};
pub use session::SessionController;
