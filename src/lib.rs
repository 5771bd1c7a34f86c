//! # Carrel
//!
//! A retrieval-augmented chat backend over per-user document sessions.
//!
//! Carrel ingests uploaded documents (PDF, DOCX, XLSX, CSV, text,
//! images), extracts and chunks their text, and maintains one persistent
//! vector index per owner plus a global index built from a shared corpus.
//! Queries run against the owner's index first and fall back to the
//! global index whenever the owner-scoped path yields nothing usable.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────────┐   ┌─────────────┐
//! │  Uploads  │──▶│ Extract (+OCR) │──▶│ Owner Index │
//! │ per owner │   │    + Chunk     │   │   (SQLite)  │
//! └───────────┘   └────────────────┘   └──────┬──────┘
//!                                             │
//! ┌───────────┐   ┌────────────────┐          ▼
//! │  Corpus   │──▶│  Global Index  │──▶ Retrieval Router ──▶ Completion
//! └───────────┘   └────────────────┘    (owner first,
//!                                        global fallback)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! carrel init                                  # build the global index
//! carrel ingest --owner alice ./notes.pdf      # index an upload
//! carrel ask --owner alice "what are my notes about"
//! carrel clear --owner alice                   # wipe the session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Per-format text extraction |
//! | [`ocr`] | Image transcription seam |
//! | [`chunk`] | Boundary-aware text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Persistent per-owner vector index |
//! | [`quota`] | Per-owner storage ceiling |
//! | [`session`] | Upload ingestion pipeline |
//! | [`corpus`] | Global index lifecycle |
//! | [`router`] | Two-tier retrieval |
//! | [`completion`] | Answer synthesis providers |
//! | [`chatlog`] | Per-owner conversation log |

pub mod chatlog;
pub mod chunk;
pub mod completion;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod models;
pub mod ocr;
pub mod quota;
pub mod router;
pub mod session;
