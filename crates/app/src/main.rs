mod server;

use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_rag_core::config::{DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL, DEFAULT_OLLAMA_URL};
use pdf_rag_core::{
    Answer, ChunkingConfig, EmbeddingProvider, PipelineBuilder, RagConfig, RetrievedChunk,
    SessionController,
};
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version, about = "Ask questions about a PDF using a local model")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_URL", default_value = DEFAULT_OLLAMA_URL)]
    ollama_url: String,

    /// Embedding backend: `ollama` or the offline `ngram` embedder
    #[arg(long, env = "EMBEDDING_PROVIDER", default_value = "ollama")]
    embedding_provider: EmbeddingProvider,

    /// Embedding model served by Ollama
    #[arg(long, env = "EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Chat model served by Ollama
    #[arg(long, env = "CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Sampling temperature for answers
    #[arg(long, env = "TEMPERATURE", default_value = "0.7")]
    temperature: f32,

    /// Maximum characters per chunk
    #[arg(long, env = "CHUNK_SIZE", default_value = "800")]
    chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[arg(long, env = "CHUNK_OVERLAP", default_value = "200")]
    chunk_overlap: usize,

    /// Number of chunks retrieved per question
    #[arg(long, env = "TOP_K", default_value = "3")]
    top_k: usize,

    /// Timeout in seconds for each embedding or model request
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "120")]
    request_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Load a PDF and answer one question.
    Ask {
        /// PDF to load.
        #[arg(long)]
        pdf: PathBuf,
        /// Question to answer from the document.
        #[arg(long)]
        question: String,
        /// Print the retrieved chunks after the answer.
        #[arg(long, default_value_t = false)]
        show_sources: bool,
    },
    /// Load a PDF and answer questions read from stdin.
    Chat {
        /// PDF to load.
        #[arg(long)]
        pdf: PathBuf,
        /// Print the retrieved chunks after each answer.
        #[arg(long, default_value_t = false)]
        show_sources: bool,
    },
    /// Serve the upload/ask/status/clear HTTP API.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:5000")]
        bind: SocketAddr,
        /// Maximum upload size in megabytes.
        #[arg(long, default_value = "50")]
        max_upload_mb: usize,
    },
}

impl Cli {
    fn rag_config(&self) -> RagConfig {
        RagConfig {
            chunking: ChunkingConfig {
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
            },
            top_k: self.top_k,
            ollama_url: self.ollama_url.clone(),
            embedding_provider: self.embedding_provider,
            embedding_model: self.embedding_model.clone(),
            chat_model: self.chat_model.clone(),
            temperature: self.temperature,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.rag_config();
    let builder = PipelineBuilder::from_config(&config)
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;
    let session = Arc::new(SessionController::new(builder));

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        chat_model = %config.chat_model,
        embedding_provider = ?config.embedding_provider,
        "pdf-rag boot"
    );

    match cli.command {
        Command::Ask {
            pdf,
            question,
            show_sources,
        } => {
            load_document(&session, &pdf).await?;
            let (answer, sources) = session
                .query_with_sources(&question)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            print_answer(&answer, &sources, show_sources);
        }
        Command::Chat { pdf, show_sources } => {
            load_document(&session, &pdf).await?;
            run_chat(&session, show_sources).await?;
        }
        Command::Serve {
            bind,
            max_upload_mb,
        } => {
            let max_upload_bytes = max_upload_mb.saturating_mul(1024 * 1024);
            server::serve(session, bind, max_upload_bytes).await?;
        }
    }

    Ok(())
}

async fn load_document(session: &SessionController, path: &Path) -> anyhow::Result<()> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("document.pdf");

    let summary = session
        .load(path, filename)
        .await
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    eprintln!(
        "loaded {} ({} pages, {} chunks)",
        summary.filename, summary.pages, summary.chunks
    );
    Ok(())
}

/// Reads one question per line. `:load <path>`, `:clear` and `:quit` are
/// handled locally.
async fn run_chat(session: &SessionController, show_sources: bool) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            ":quit" | ":exit" => break,
            ":clear" => {
                session.clear().await;
                println!("Current document cleared");
                continue;
            }
            _ => {}
        }

        if let Some(path) = line.strip_prefix(":load ") {
            if let Err(error) = load_document(session, Path::new(path.trim())).await {
                println!("{error}");
            }
            continue;
        }

        match session.query_with_sources(line).await {
            Ok((answer, sources)) => print_answer(&answer, &sources, show_sources),
            Err(error) => println!("{error}"),
        }
    }

    Ok(())
}

fn print_answer(answer: &Answer, sources: &[RetrievedChunk], show_sources: bool) {
    println!("{answer}");

    if show_sources {
        for (rank, source) in sources.iter().enumerate() {
            println!(
                "[{}] page={} score={:.4}\n{}",
                rank + 1,
                source.page,
                source.score,
                source.text
            );
        }
    }
}
