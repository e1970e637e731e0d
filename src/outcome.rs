//! Data model for conversion jobs: inputs, per-item outcomes, and the
//! aggregate batch result.

use serde::{Deserialize, Serialize};

use crate::error::ItemError;

/// One page image submitted for recognition.
///
/// Immutable once accepted: the payload and MIME type are fixed at
/// construction, so a job can share inputs across tasks without copies
/// being mutated underneath it.
#[derive(Debug, Clone)]
pub struct ImageInput {
    bytes: Vec<u8>,
    mime_type: String,
}

impl ImageInput {
    /// Wrap raw image bytes with their MIME type (e.g. "image/png").
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Raw image payload.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// MIME type of the payload.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Guess a MIME type from a file extension, defaulting to JPEG.
    pub fn mime_for_extension(ext: &str) -> &'static str {
        match ext.to_ascii_lowercase().as_str() {
            "png" => "image/png",
            "webp" => "image/webp",
            "gif" => "image/gif",
            _ => "image/jpeg",
        }
    }
}

/// Tagged per-image result. `index` is the 0-based submission position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConversionOutcome {
    /// Recognition produced (sanitized) markup for this image.
    Success { index: usize, markup: String },
    /// Recognition failed for this image; siblings are unaffected.
    Failure { index: usize, error: ItemError },
}

impl ConversionOutcome {
    /// Submission index of the image this outcome belongs to.
    pub fn index(&self) -> usize {
        match self {
            ConversionOutcome::Success { index, .. } => *index,
            ConversionOutcome::Failure { index, .. } => *index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success { .. })
    }
}

/// Sanitized markup for one image, tagged with its submission index.
///
/// Batch results arrive in completion order; sort by `index` when the
/// original page order matters (it usually does before combination).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMarkup {
    pub index: usize,
    pub markup: String,
}

/// Aggregate result of a batch conversion.
///
/// A batch succeeds as long as at least one image converted; failures are
/// enumerated here for caller visibility rather than aborting the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    /// Successful markups in completion order.
    pub markups: Vec<PageMarkup>,
    /// Per-image failures, one entry per failed input.
    pub failures: Vec<ItemError>,
    /// Number of images submitted.
    pub total: usize,
}

impl BatchOutput {
    pub fn success_count(&self) -> usize {
        self.markups.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    /// Markups sorted back into submission order.
    pub fn markups_in_submission_order(&self) -> Vec<&str> {
        let mut pages: Vec<&PageMarkup> = self.markups.iter().collect();
        pages.sort_by_key(|p| p.index);
        pages.iter().map(|p| p.markup.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_guessing() {
        assert_eq!(ImageInput::mime_for_extension("PNG"), "image/png");
        assert_eq!(ImageInput::mime_for_extension("jpg"), "image/jpeg");
        assert_eq!(ImageInput::mime_for_extension("tiff"), "image/jpeg");
    }

    #[test]
    fn submission_order_restores_index_order() {
        let out = BatchOutput {
            markups: vec![
                PageMarkup { index: 2, markup: "C".into() },
                PageMarkup { index: 0, markup: "A".into() },
                PageMarkup { index: 1, markup: "B".into() },
            ],
            failures: vec![],
            total: 3,
        };
        assert_eq!(out.markups_in_submission_order(), vec!["A", "B", "C"]);
    }

    #[test]
    fn outcome_accessors() {
        let ok = ConversionOutcome::Success { index: 1, markup: "x".into() };
        assert!(ok.is_success());
        assert_eq!(ok.index(), 1);
        let bad = ConversionOutcome::Failure {
            index: 4,
            error: ItemError::EmptyMarkup { index: 4 },
        };
        assert!(!bad.is_success());
        assert_eq!(bad.index(), 4);
    }
}
