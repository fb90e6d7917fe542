//! Turns retrieved chunks and a question into a grounded answer.
//!
//! Each stage is a plain function so it can be exercised on its own:
//! [`format_context`] -> [`render_prompt`] -> [`LanguageModel::complete`] -> [`parse_output`].

use crate::error::RagError;
use crate::llm::{ChatMessage, LanguageModel};
use crate::models::RetrievedChunk;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

pub const EMPTY_QUESTION_MESSAGE: &str = "Please provide a question.";
pub const INFERENCE_ERROR_PREFIX: &str = "Error during inference:";

const PROMPT_INSTRUCTION: &str = "Answer the question based ONLY on the following context.
If the context does not contain the answer, say \"I don't know\".";

/// Outcome of one question. Failures stay typed until rendered with `Display`.
#[derive(Debug)]
pub enum Answer {
    Generated(String),
    EmptyQuestion,
    Failed(RagError),
}

impl Answer {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn into_text(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generated(text) => f.write_str(text),
            Self::EmptyQuestion => f.write_str(EMPTY_QUESTION_MESSAGE),
            Self::Failed(error) => write!(f, "{INFERENCE_ERROR_PREFIX} {error}"),
        }
    }
}

/// Joins chunk texts in retrieval order with a blank line between them.
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Context and question are inserted verbatim, never re-scanned.
pub fn render_prompt(context: &str, question: &str) -> String {
    format!("{PROMPT_INSTRUCTION}\n\nContext: {context}\n\nQuestion: {question}\n\nAnswer:")
}

/// Extracts the plain answer from the message envelope, dropping any
/// `<think>` reasoning block some local models prepend.
pub fn parse_output(message: ChatMessage) -> Result<String, RagError> {
    static THINK_BLOCK: OnceLock<Option<Regex>> = OnceLock::new();
    let think_block = THINK_BLOCK.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").ok());

    let content = match think_block {
        Some(pattern) => pattern.replace_all(&message.content, "").into_owned(),
        None => message.content,
    };

    let answer = content.trim();
    if answer.is_empty() {
        return Err(RagError::Inference("model returned an empty answer".to_string()));
    }
    Ok(answer.to_string())
}

pub struct AnswerComposer {
    model: Arc<dyn LanguageModel>,
}

impl AnswerComposer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Never fails: model errors are returned as [`Answer::Failed`].
    pub async fn compose(&self, question: &str, chunks: &[RetrievedChunk]) -> Answer {
        if question.trim().is_empty() {
            return Answer::EmptyQuestion;
        }

        match self.generate(question, chunks).await {
            Ok(text) => Answer::Generated(text),
            Err(error) => {
                warn!(model = %self.model.model_name(), %error, "answer generation failed");
                Answer::Failed(error)
            }
        }
    }

    async fn generate(
        &self,
        question: &str,
        chunks: &[RetrievedChunk],
    ) -> Result<String, RagError> {
        let context = format_context(chunks);
        let prompt = render_prompt(&context, question);
        debug!(
            model = %self.model.model_name(),
            context_chunks = chunks.len(),
            prompt_chars = prompt.chars().count(),
            "invoking language model"
        );

        let message = self.model.complete(&prompt).await?;
        parse_output(message)
    }
}
