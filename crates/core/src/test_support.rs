use crate::embeddings::{CharacterNgramEmbedder, Embedder};
use crate::error::RagError;
use crate::llm::{ChatMessage, LanguageModel};
use crate::models::{DocumentChunk, RetrievedChunk};
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub(crate) fn chunk(id: &str, index: u64, text: &str) -> DocumentChunk {
    DocumentChunk {
        chunk_id: id.to_string(),
        source_path: "/tmp/doc.pdf".to_string(),
        page: 1,
        chunk_index: index,
        text: text.to_string(),
    }
}

pub(crate) fn retrieved(text: &str, score: f32) -> RetrievedChunk {
    RetrievedChunk {
        chunk_id: format!("id-{text}"),
        page: 1,
        text: text.to_string(),
        score,
    }
}

/// Writes a PDF with one line of Courier text per page.
pub(crate) fn write_text_pdf(
    path: &Path,
    pages: &[&str],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path)?;
    Ok(())
}

/// Character-trigram embedder that counts calls and can be told to fail.
#[derive(Default)]
pub(crate) struct CountingEmbedder {
    inner: CharacterNgramEmbedder,
    calls: AtomicUsize,
    fail: bool,
}

impl CountingEmbedder {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn model_name(&self) -> &str {
        "counting"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RagError::EmbeddingService("backend unreachable".to_string()));
        }
        self.inner.embed_batch(texts).await
    }
}

enum Reply {
    Fixed(String),
    EchoContext,
    Fail(String),
}

pub(crate) struct StubModel {
    reply: Reply,
    prompts: Mutex<Vec<String>>,
}

impl StubModel {
    pub(crate) fn replying(text: &str) -> Self {
        Self::with(Reply::Fixed(text.to_string()))
    }

    /// Answers with the context block of the prompt it receives.
    pub(crate) fn echo_context() -> Self {
        Self::with(Reply::EchoContext)
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self::with(Reply::Fail(message.to_string()))
    }

    fn with(reply: Reply) -> Self {
        Self {
            reply,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|prompts| prompts.clone()).unwrap_or_default()
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts().len()
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, prompt: &str) -> Result<ChatMessage, RagError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        match &self.reply {
            Reply::Fixed(text) => Ok(ChatMessage::assistant(text.clone())),
            Reply::Fail(message) => Err(RagError::Inference(message.clone())),
            Reply::EchoContext => {
                let context = prompt
                    .split_once("Context: ")
                    .and_then(|(_, rest)| rest.split_once("\n\nQuestion:"))
                    .map(|(context, _)| context.trim().to_string())
                    .unwrap_or_default();
                if context.is_empty() {
                    Ok(ChatMessage::assistant("I don't know."))
                } else {
                    Ok(ChatMessage::assistant(context))
                }
            }
        }
    }
}
