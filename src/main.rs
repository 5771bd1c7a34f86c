//! # Carrel CLI (`carrel`)
//!
//! The `carrel` binary is the boundary layer over the Carrel core. It
//! resolves configuration, wires up the embedding/completion/OCR
//! providers, and wraps every ingestion and query in the owner's
//! conversation log.
//!
//! ## Usage
//!
//! ```bash
//! carrel --config ./config/carrel.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `carrel init` | Create the data layout and build the global index |
//! | `carrel rebuild-global` | Rebuild the global index from the corpus directory |
//! | `carrel ingest --owner <o> <file>` | Ingest one upload into the owner's index |
//! | `carrel ask --owner <o> "<query>"` | Answer a query (owner index first, global fallback) |
//! | `carrel files --owner <o>` | List the owner's uploaded files |
//! | `carrel history --owner <o>` | Print the owner's conversation log |
//! | `carrel sessions` | List owners with session state |
//! | `carrel usage --owner <o>` | Show the owner's index size against the quota |
//! | `carrel clear --owner <o>` | Wipe the owner's uploads, index, and log |
//!
//! ## Examples
//!
//! ```bash
//! # Build the global index from ./corpus
//! carrel init
//!
//! # Ingest a PDF for one owner
//! carrel ingest --owner alice@example.com ./reports/q3.pdf
//!
//! # Ask against the owner's documents, falling back to the corpus
//! carrel ask --owner alice@example.com "what was the Q3 revenue"
//!
//! # Wipe the session
//! carrel clear --owner alice@example.com
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use carrel::config::{self, Config};
use carrel::{chatlog, completion, corpus, embedding, ocr, quota, router, session};

const DEFAULT_CONFIG_PATH: &str = "./config/carrel.toml";
const UPLOAD_ACK: &str = "Thanks! I've processed your file. Ask me anything.";

/// Carrel — a retrieval-augmented chat backend over per-user document
/// sessions.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/carrel.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "carrel",
    about = "Carrel — retrieval-augmented chat over per-user document sessions",
    version,
    long_about = "Carrel ingests per-user document uploads (PDF, DOCX, XLSX, CSV, text, images), \
    maintains one persistent vector index per owner plus a global corpus index, and answers \
    queries from the owner's documents with graceful fallback to the global index."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When omitted, `./config/carrel.toml` is used if present, otherwise
    /// built-in offline defaults (hash embeddings, extractive answers).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the data directory layout and build the global index.
    ///
    /// The global index is built from the configured corpus directory if
    /// it does not exist yet. This command is idempotent — an existing
    /// global index is left as is.
    Init,

    /// Rebuild the global index from the corpus directory.
    ///
    /// Clears the global index and re-extracts every supported file under
    /// the corpus root. Unreadable files are logged and skipped.
    RebuildGlobal,

    /// Ingest one uploaded file into an owner's session.
    ///
    /// Persists the raw file, checks the owner's index quota, extracts and
    /// chunks the text, and updates the owner's index incrementally.
    /// Extraction or indexing trouble degrades to an unindexed upload;
    /// only the quota check and file persistence can fail the command.
    Ingest {
        /// Owner identifier the upload belongs to.
        #[arg(long)]
        owner: String,

        /// Path of the file to ingest. The bare filename becomes the
        /// source label in the owner's index.
        file: PathBuf,
    },

    /// Answer a query from the owner's documents.
    ///
    /// Searches the owner's index first; when the owner has no usable
    /// index, no matching chunks, or the completion yields nothing, the
    /// same query is answered from the global index instead.
    Ask {
        /// Owner identifier whose session the query runs in.
        #[arg(long)]
        owner: String,

        /// The question to answer.
        query: String,
    },

    /// List an owner's uploaded files.
    Files {
        /// Owner identifier.
        #[arg(long)]
        owner: String,
    },

    /// Print an owner's conversation log, oldest first.
    History {
        /// Owner identifier.
        #[arg(long)]
        owner: String,
    },

    /// List owners that have session state on disk.
    Sessions,

    /// Show an owner's index size against the quota ceiling.
    Usage {
        /// Owner identifier.
        #[arg(long)]
        owner: String,
    },

    /// Wipe an owner's uploads, index, and conversation log.
    ///
    /// Idempotent — clearing an owner with no session state succeeds.
    Clear {
        /// Owner identifier.
        #[arg(long)]
        owner: String,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("carrel=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.is_file() {
                config::load_config(default)
            } else {
                Ok(Config::default())
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let cfg = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => run_init(&cfg).await?,
        Commands::RebuildGlobal => run_rebuild_global(&cfg).await?,
        Commands::Ingest { owner, file } => run_ingest(&cfg, &owner, &file).await?,
        Commands::Ask { owner, query } => run_ask(&cfg, &owner, &query).await?,
        Commands::Files { owner } => run_files(&cfg, &owner)?,
        Commands::History { owner } => run_history(&cfg, &owner)?,
        Commands::Sessions => run_sessions(&cfg)?,
        Commands::Usage { owner } => run_usage(&cfg, &owner)?,
        Commands::Clear { owner } => run_clear(&cfg, &owner)?,
    }

    Ok(())
}

async fn run_init(cfg: &Config) -> Result<()> {
    std::fs::create_dir_all(cfg.uploads_root())?;

    let embedder = embedding::create_provider(&cfg.embedding)?;
    let ocr_engine = ocr::create_ocr(&cfg.ocr)?;
    let global = corpus::open_or_build(cfg, embedder.as_ref(), ocr_engine.as_ref()).await?;
    let chunks = global.len().await?;
    global.close().await;

    println!("initialized");
    println!("  data dir: {}", cfg.storage.data_dir.display());
    println!("  corpus dir: {}", cfg.corpus.root.display());
    println!("  global index chunks: {}", chunks);
    Ok(())
}

async fn run_rebuild_global(cfg: &Config) -> Result<()> {
    let embedder = embedding::create_provider(&cfg.embedding)?;
    let ocr_engine = ocr::create_ocr(&cfg.ocr)?;
    let (index, report) = corpus::rebuild(cfg, embedder.as_ref(), ocr_engine.as_ref()).await?;
    index.close().await;

    println!("global index rebuilt");
    println!("  files indexed: {}", report.files_indexed);
    println!("  files skipped: {}", report.files_skipped);
    println!("  chunks: {}", report.chunks);
    Ok(())
}

async fn run_ingest(cfg: &Config, owner: &str, path: &Path) -> Result<()> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("upload path has no usable filename")?
        .to_string();
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read upload: {}", path.display()))?;

    let embedder = embedding::create_provider(&cfg.embedding)?;
    let ocr_engine = ocr::create_ocr(&cfg.ocr)?;

    let receipt = session::ingest_file(
        cfg,
        embedder.as_ref(),
        ocr_engine.as_ref(),
        owner,
        &filename,
        &bytes,
    )
    .await?;

    chatlog::append_message(
        cfg,
        owner,
        chatlog::ROLE_USER,
        &format!("[Uploaded file: {}]", filename),
    )?;
    chatlog::append_message(cfg, owner, chatlog::ROLE_ASSISTANT, UPLOAD_ACK)?;

    println!("ingested {} for {}", receipt.filename, receipt.owner);
    println!("  records: {}", receipt.records);
    println!("  chunks: {}", receipt.chunks);
    println!("  indexed: {}", if receipt.indexed { "yes" } else { "no" });
    println!("  sha256: {}", receipt.content_hash);
    Ok(())
}

async fn run_ask(cfg: &Config, owner: &str, query: &str) -> Result<()> {
    let embedder = embedding::create_provider(&cfg.embedding)?;
    let completer = completion::create_completion(&cfg.completion)?;
    let ocr_engine = ocr::create_ocr(&cfg.ocr)?;

    let global = corpus::open_or_build(cfg, embedder.as_ref(), ocr_engine.as_ref()).await?;

    chatlog::append_message(cfg, owner, chatlog::ROLE_USER, query)?;

    let routed = router::answer(
        cfg,
        embedder.as_ref(),
        completer.as_ref(),
        &global,
        owner,
        query,
    )
    .await;
    global.close().await;
    let routed = routed?;

    chatlog::append_message(cfg, owner, chatlog::ROLE_ASSISTANT, &routed.text)?;

    println!("{}", routed.text);
    if !routed.sources.is_empty() {
        println!();
        println!("sources: {}", routed.sources.join(", "));
    }
    if routed.used_fallback {
        println!("(answered from the global index)");
    }
    Ok(())
}

fn run_files(cfg: &Config, owner: &str) -> Result<()> {
    let files = session::list_files(cfg, owner)?;
    if files.is_empty() {
        println!("no files.");
        return Ok(());
    }
    for file in files {
        println!("{}", file);
    }
    Ok(())
}

fn run_history(cfg: &Config, owner: &str) -> Result<()> {
    let entries = chatlog::history(cfg, owner)?;
    if entries.is_empty() {
        println!("no history.");
        return Ok(());
    }
    for entry in entries {
        println!("{}: {}", entry.role, entry.text);
    }
    Ok(())
}

fn run_sessions(cfg: &Config) -> Result<()> {
    let owners = chatlog::sessions(cfg)?;
    if owners.is_empty() {
        println!("no sessions.");
        return Ok(());
    }
    for owner in owners {
        let meta = session::read_meta(cfg, &owner).unwrap_or_default();
        let last_used = meta.last_used.as_deref().unwrap_or("never");
        println!(
            "{}  [{} file(s), last used: {}]",
            owner,
            meta.files.len(),
            last_used
        );
    }
    Ok(())
}

fn run_usage(cfg: &Config, owner: &str) -> Result<()> {
    let used = quota::usage(cfg, owner)?;
    println!("usage for {}", owner);
    println!("  index bytes: {}", used);
    println!("  ceiling: {}", cfg.quota.max_index_bytes);
    Ok(())
}

fn run_clear(cfg: &Config, owner: &str) -> Result<()> {
    session::clear_owner(cfg, owner)?;
    println!("cleared session data for {}", owner);
    Ok(())
}
