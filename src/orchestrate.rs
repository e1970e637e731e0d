//! Conversion orchestrator: fan recognition calls out across a batch.
//!
//! All per-image calls are dispatched onto one stream and driven with
//! `buffer_unordered(config.concurrency)`, so wall-clock time for a batch is
//! bounded by the slowest call rather than the sum, while the concurrency
//! cap bounds outbound request pressure on large batches.
//!
//! Each call is fault-isolated: an error becomes a
//! [`ConversionOutcome::Failure`] for that image and never cancels or
//! affects its siblings. After every completion (success or failure) a
//! shared counter is bumped and a percentage event goes out on the job's
//! progress channel; the final percent event of a batch is always 100.
//! There is no mid-flight cancellation — dropping a progress subscriber
//! stops delivery, not the job.

use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{DocFormat, JobConfig};
use crate::error::{ItemError, Snap2TexError};
use crate::outcome::{BatchOutput, ConversionOutcome, ImageInput, PageMarkup};
use crate::progress::{percent, ProgressChannel, ProgressEvent};
use crate::recognition::RecognitionBackend;
use crate::sanitize::sanitize_markup;

/// One batch of page images with its shared context and target format.
///
/// Created on request receipt and discarded after the result is returned;
/// the orchestrator is the only mutator of its completion counter.
#[derive(Debug)]
pub struct ConversionJob {
    pub images: Vec<ImageInput>,
    pub context: Option<String>,
    pub format: DocFormat,
}

impl ConversionJob {
    pub fn new(images: Vec<ImageInput>, context: Option<String>, format: DocFormat) -> Self {
        Self {
            images,
            context,
            format,
        }
    }
}

/// Convert one image, bypassing the batching and progress machinery.
pub async fn convert_single(
    backend: &Arc<dyn RecognitionBackend>,
    image: &ImageInput,
    format: DocFormat,
    context: Option<&str>,
) -> ConversionOutcome {
    convert_item(backend, 0, image, format, context).await
}

/// Convert a batch of images, tolerating partial failure.
///
/// Returns `Ok(BatchOutput)` when at least one image converted; the failures
/// list enumerates the rest. Returns
/// [`Snap2TexError::AllConversionsFailed`] carrying every per-item reason
/// when nothing succeeded. Markups arrive in completion order — sort via
/// [`BatchOutput::markups_in_submission_order`] when page order matters.
pub async fn convert_batch(
    backend: &Arc<dyn RecognitionBackend>,
    job: &ConversionJob,
    config: &JobConfig,
    progress: &ProgressChannel,
) -> Result<BatchOutput, Snap2TexError> {
    let total = job.images.len();
    if total == 0 {
        return Err(Snap2TexError::InvalidConfig(
            "A conversion job needs at least one image".into(),
        ));
    }
    info!("Converting batch of {} images to {}", total, job.format);

    let completed = Arc::new(AtomicUsize::new(0));

    let outcomes: Vec<ConversionOutcome> = stream::iter(job.images.iter().enumerate().map(
        |(index, image)| {
            let backend = Arc::clone(backend);
            let completed = Arc::clone(&completed);
            let progress = progress.clone();
            let context = job.context.as_deref();
            let format = job.format;
            async move {
                let outcome = convert_item(&backend, index, image, format, context).await;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                progress.emit(ProgressEvent::Percent {
                    done,
                    total,
                    percent: percent(done, total),
                });
                outcome
            }
        },
    ))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    let mut markups = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            ConversionOutcome::Success { index, markup } => {
                markups.push(PageMarkup { index, markup })
            }
            ConversionOutcome::Failure { error, .. } => failures.push(error),
        }
    }

    progress.emit(ProgressEvent::Finished {
        succeeded: markups.len(),
        failed: failures.len(),
    });

    if markups.is_empty() {
        let reasons: Vec<String> = failures.iter().map(|e| e.to_string()).collect();
        return Err(Snap2TexError::AllConversionsFailed { total, reasons });
    }

    info!(
        "Batch done: {}/{} converted, {} failed",
        markups.len(),
        total,
        failures.len()
    );

    Ok(BatchOutput {
        markups,
        failures,
        total,
    })
}

/// Convert one image into an outcome, never propagating the error upward.
async fn convert_item(
    backend: &Arc<dyn RecognitionBackend>,
    index: usize,
    image: &ImageInput,
    format: DocFormat,
    context: Option<&str>,
) -> ConversionOutcome {
    match backend.transcribe(image, format, context).await {
        Ok(raw) => {
            let markup = sanitize_markup(&raw);
            if markup.is_empty() {
                warn!("Image {}: empty markup after sanitizing", index);
                ConversionOutcome::Failure {
                    index,
                    error: ItemError::EmptyMarkup { index },
                }
            } else {
                debug!("Image {}: {} chars of markup", index, markup.len());
                ConversionOutcome::Success { index, markup }
            }
        }
        Err(e) => {
            warn!("Image {}: recognition failed: {}", index, e);
            ConversionOutcome::Failure {
                index,
                error: ItemError::Recognition {
                    index,
                    detail: e.to_string(),
                },
            }
        }
    }
}
