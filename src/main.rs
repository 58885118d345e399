//! # Docent CLI (`docent`)
//!
//! Starts the HTTP API or runs a single assistant operation from the shell.
//!
//! ## Usage
//!
//! ```bash
//! docent --config ./config/docent.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docent serve` | Start the HTTP API |
//! | `docent chat "<message>"` | Ask the indexed corpus a question |
//! | `docent ask <file> --question "<q>"` | Upload a file and ask one question about it |
//! | `docent extract <file>` | Upload a file and print its extracted text |
//!
//! Service keys are read from the environment (or `.env`); see [`docent::config`].
//! Logging is controlled with `RUST_LOG` (default `docent=info,tower_http=info`).

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docent::assistant::{Assistant, UploadedFile};
use docent::config::{self, Secrets};
use docent::server;

/// Docent: a document-grounded conversational assistant.
#[derive(Parser)]
#[command(
    name = "docent",
    about = "Docent: a document-grounded conversational assistant",
    version,
    long_about = "Docent answers questions against an Azure Cognitive Search index or against \
    freshly uploaded documents (extracted with Azure AI Document Intelligence), using Azure OpenAI \
    for completions. It can run as an HTTP API or answer one-off questions from the command line."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Ask a question against the indexed corpus.
    Chat {
        /// The question.
        message: String,
    },

    /// Upload a file and ask one question about it.
    Ask {
        /// Path to the document.
        file: PathBuf,

        /// The question to answer from the document.
        #[arg(long, short)]
        question: String,
    },

    /// Upload a file and print the extracted text.
    Extract {
        /// Path to the document.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let secrets = Secrets::from_env()?;
    let assistant = Arc::new(Assistant::from_config(&cfg, &secrets)?);

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg, assistant).await?;
        }
        Commands::Chat { message } => {
            println!("{}", assistant.chat(&message).await);
        }
        Commands::Ask { file, question } => {
            let upload = read_upload(&file)?;
            let answer = assistant.upload_and_ask(upload, &question).await?;
            println!("{}", answer);
        }
        Commands::Extract { file } => {
            let upload = read_upload(&file)?;
            let document = assistant.extract_text(upload).await?;
            println!("{}", document.body_text);
        }
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "docent=info,tower_http=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_upload(path: &Path) -> anyhow::Result<UploadedFile> {
    use anyhow::Context;

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    Ok(UploadedFile {
        content_type: content_type_for(&name).to_string(),
        name,
        bytes,
    })
}

/// MIME type from the file extension, for formats the extraction service accepts.
fn content_type_for(name: &str) -> &'static str {
    match name.rsplit('.').next().map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("pdf") => "application/pdf",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("pptx") => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("html" | "htm") => "text/html",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("tif" | "tiff") => "image/tiff",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}
