use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("document load error: {0}")]
    DocumentLoad(String),

    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    #[error("retrieval error: {0}")]
    Retrieval(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No document loaded. Please upload a PDF first.")]
    NoDocumentLoaded,
}

impl RagError {
    /// True for failures caused by the caller's input rather than the pipeline.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NoDocumentLoaded | Self::InvalidConfig(_))
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;
