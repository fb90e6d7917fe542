//! Holds at most one loaded document and serialises every operation on it.
//!
//! All of `load`, `query` and `clear` take the same lock for their whole
//! duration, so a question never sees a half-built pipeline.

use crate::composer::Answer;
use crate::error::RagError;
use crate::models::{LoadSummary, RetrievedChunk, SessionStatus};
use crate::orchestrator::{PipelineBuilder, RagPipeline};
use chrono::Utc;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

pub const READY_MESSAGE: &str = "Document is ready";
pub const EMPTY_MESSAGE: &str = "No document loaded";

struct ActiveSession {
    id: Uuid,
    pipeline: RagPipeline,
    summary: LoadSummary,
}

pub struct SessionController {
    builder: PipelineBuilder,
    slot: Mutex<Option<ActiveSession>>,
}

impl SessionController {
    pub fn new(builder: PipelineBuilder) -> Self {
        Self {
            builder,
            slot: Mutex::new(None),
        }
    }

    /// Replaces whatever is loaded with a pipeline for `path`. On failure the
    /// session is left empty rather than serving the previous document.
    pub async fn load(&self, path: &Path, filename: &str) -> Result<LoadSummary, RagError> {
        let mut slot = self.slot.lock().await;

        if let Some(previous) = slot.take() {
            info!(
                session = %previous.id,
                filename = %previous.summary.filename,
                "discarding previous document"
            );
        }

        let pipeline = match self.builder.build(path).await {
            Ok(pipeline) => pipeline,
            Err(error) => {
                warn!(path = %path.display(), %error, "document load failed; session is empty");
                return Err(error);
            }
        };

        let summary = LoadSummary {
            filename: filename.to_string(),
            pages: pipeline.page_count(),
            chunks: pipeline.chunk_count(),
            loaded_at: Utc::now(),
        };
        let id = Uuid::new_v4();
        info!(
            session = %id,
            filename,
            pages = summary.pages,
            chunks = summary.chunks,
            "document loaded"
        );

        *slot = Some(ActiveSession {
            id,
            pipeline,
            summary: summary.clone(),
        });
        Ok(summary)
    }

    pub async fn query(&self, question: &str) -> Result<Answer, RagError> {
        Ok(self.query_with_sources(question).await?.0)
    }

    pub async fn query_with_sources(
        &self,
        question: &str,
    ) -> Result<(Answer, Vec<RetrievedChunk>), RagError> {
        let slot = self.slot.lock().await;
        let session = slot.as_ref().ok_or(RagError::NoDocumentLoaded)?;
        Ok(session.pipeline.ask_with_sources(question).await)
    }

    /// Returns whether a document was loaded before the call.
    pub async fn clear(&self) -> bool {
        let mut slot = self.slot.lock().await;
        match slot.take() {
            Some(previous) => {
                info!(
                    session = %previous.id,
                    filename = %previous.summary.filename,
                    "session cleared"
                );
                true
            }
            None => false,
        }
    }

    pub async fn has_document(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    pub async fn status(&self) -> SessionStatus {
        let slot = self.slot.lock().await;
        match slot.as_ref() {
            Some(session) => SessionStatus {
                has_document: true,
                filename: Some(session.summary.filename.clone()),
                chunks: Some(session.summary.chunks),
                loaded_at: Some(session.summary.loaded_at),
                message: READY_MESSAGE.to_string(),
            },
            None => SessionStatus {
                has_document: false,
                filename: None,
                chunks: None,
                loaded_at: None,
                message: EMPTY_MESSAGE.to_string(),
            },
        }
    }
}
