//! Error types for the snap2tex library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Snap2TexError`] — **Fatal**: the job cannot proceed or produced
//!   nothing usable (store unwritable, engine missing, every conversion
//!   failed). Returned as `Err(Snap2TexError)` from the top-level pipeline
//!   functions.
//!
//! * [`ItemError`] — **Non-fatal**: a single image in a batch failed
//!   (recognition error, empty model response) but its siblings are fine.
//!   Stored inside [`crate::outcome::ConversionOutcome`] so callers can
//!   inspect partial success rather than losing the whole batch to one bad
//!   image.
//!
//! The pipeline never retries a fatal error on its own; retries are
//! caller-initiated (re-submit the batch, or run the explicit fix path).

use std::path::PathBuf;
use thiserror::Error;

use crate::config::DocFormat;

/// All fatal errors returned by the snap2tex library.
///
/// Per-image failures use [`ItemError`] and are stored in
/// [`crate::outcome::ConversionOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Snap2TexError {
    // ── Upstream failures ─────────────────────────────────────────────────
    /// The recognition service is not configured (missing API key etc.).
    #[error("Recognition service is not configured.\n{hint}")]
    RecognitionNotConfigured { hint: String },

    /// Every image in the batch failed; there is nothing to combine.
    #[error("All {total} conversions failed.\nFirst error: {first}", first = .reasons.first().map(String::as_str).unwrap_or("unknown"))]
    AllConversionsFailed { total: usize, reasons: Vec<String> },

    // ── Compilation failures ──────────────────────────────────────────────
    /// The combined source is empty or whitespace-only; no engine was run.
    #[error("no valid content generated: combined {format} source is empty")]
    NoContent { format: DocFormat },

    /// The typesetting engine rejected the document or produced no PDF.
    #[error("{format} compilation failed: {diagnostic}")]
    CompileFailed { format: DocFormat, diagnostic: String },

    /// The engine binary could not be launched at all.
    #[error("Typesetting engine '{engine}' not found.\nInstall it or point the config at an existing binary.")]
    EngineMissing { engine: String },

    /// The remote compile endpoint returned a non-2xx status or a response
    /// that is not a PDF.
    #[error("Remote compile at '{url}' failed: {reason}")]
    RemoteCompileFailed { url: String, reason: String },

    // ── Rasterization failures ────────────────────────────────────────────
    /// The uploaded bytes are not a PDF.
    #[error("Input is not a valid PDF (first bytes: {magic:?})")]
    NotAPdf { magic: [u8; 4] },

    /// pdfium returned an error for a specific page.
    #[error("Rasterization failed for page {page}: {detail}")]
    RasterizeFailed { page: usize, detail: String },

    /// The PDF could not be opened at all.
    #[error("PDF could not be opened: {detail}")]
    CorruptPdf { detail: String },

    // ── Resource failures ─────────────────────────────────────────────────
    /// A filesystem operation in the artifact store failed. Never retried.
    #[error("Artifact store operation failed on '{path}': {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An artifact reference contained path separators or parent-directory
    /// components and was rejected.
    #[error("Invalid artifact reference '{reference}'")]
    InvalidReference { reference: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image in a batch.
///
/// Stored in [`crate::outcome::ConversionOutcome::Failure`]; the batch as a
/// whole continues unless every item fails.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// The recognition call failed (network error, non-success response,
    /// retries exhausted).
    #[error("Image {index}: recognition failed: {detail}")]
    Recognition { index: usize, detail: String },

    /// The recognition service answered but the sanitized markup was empty.
    #[error("Image {index}: recognition returned no markup")]
    EmptyMarkup { index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_failed_display_shows_first_reason() {
        let e = Snap2TexError::AllConversionsFailed {
            total: 3,
            reasons: vec!["timeout".into(), "socket closed".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("All 3 conversions failed"), "got: {msg}");
        assert!(msg.contains("timeout"), "got: {msg}");
    }

    #[test]
    fn all_failed_display_without_reasons() {
        let e = Snap2TexError::AllConversionsFailed {
            total: 1,
            reasons: vec![],
        };
        assert!(e.to_string().contains("unknown"));
    }

    #[test]
    fn no_content_display_names_the_guard() {
        let e = Snap2TexError::NoContent {
            format: DocFormat::Latex,
        };
        assert!(e.to_string().contains("no valid content generated"));
    }

    #[test]
    fn item_error_display() {
        let e = ItemError::Recognition {
            index: 2,
            detail: "HTTP 500".into(),
        };
        assert!(e.to_string().contains("Image 2"));
        assert!(e.to_string().contains("HTTP 500"));
    }
}
