//! # snap2tex
//!
//! Convert document-page images into a single, compilable typeset document
//! (LaTeX or Typst), render it to a PDF, and round-trip PDFs back into page
//! images for re-conversion.
//!
//! The heavy lifting — reading the page — is delegated to an external
//! vision model; this crate is the orchestration around it: fan out
//! per-image recognition calls with partial-failure tolerance and live
//! progress, merge heterogeneous per-page fragments into one structurally
//! valid document, drive a format-specific compiler with a best-effort fix
//! retry path, and manage the derived temporary artifacts.
//!
//! ## Pipeline Overview
//!
//! ```text
//! images (or PDF)
//!  │
//!  ├─ 1. Rasterize  PDF → page PNGs via pdfium (only for PDF input)
//!  ├─ 2. Orchestrate  concurrent recognition calls, progress events
//!  ├─ 3. Sanitize   strip fences/tags from each model response
//!  ├─ 4. Combine    merge fragments, dedupe preamble, one wrapper
//!  ├─ 5. Compile    pdflatex / typst CLI (or remote fallback) → PDF
//!  └─ 6. Store      artifact reference + TempAsset cleanup
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snap2tex::{
//!     combine, compile, orchestrate, recognition, ArtifactStore, ConversionJob,
//!     DocFormat, ImageInput, JobConfig, ProgressChannel,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = JobConfig::builder().format(DocFormat::Latex).build()?;
//!     let store = ArtifactStore::open(&config.output_dir)?;
//!     let backend = recognition::resolve_backend(&config)?;
//!
//!     let images = vec![ImageInput::new(std::fs::read("page1.png")?, "image/png")];
//!     let job = ConversionJob::new(images, None, config.format);
//!     let progress = ProgressChannel::default();
//!
//!     let batch = orchestrate::convert_batch(&backend, &job, &config, &progress).await?;
//!     let source = combine::combine_to_source(
//!         &batch.markups_in_submission_order(),
//!         config.format,
//!     );
//!     let pdf_ref = compile::compile(&source, config.format, &config, &store).await?;
//!     println!("PDF at {}", store.root().join(pdf_ref).display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `snap2tex` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! snap2tex = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod combine;
pub mod compile;
pub mod config;
pub mod error;
pub mod orchestrate;
pub mod outcome;
pub mod progress;
pub mod prompts;
pub mod rasterize;
pub mod recognition;
pub mod sanitize;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use combine::{combine_or_fix, combine_to_source, CombinedDocument};
pub use compile::{compile as compile_document, request_fix};
pub use config::{DocFormat, JobConfig, JobConfigBuilder};
pub use error::{ItemError, Snap2TexError};
pub use orchestrate::{convert_batch, convert_single, ConversionJob};
pub use outcome::{BatchOutput, ConversionOutcome, ImageInput, PageMarkup};
pub use progress::{ProgressChannel, ProgressEvent};
pub use rasterize::{assets_to_inputs, rasterize_pdf};
pub use recognition::{resolve_backend, HttpRecognitionClient, RecognitionBackend};
pub use sanitize::sanitize_markup;
pub use store::{ArtifactStore, TempAsset};
