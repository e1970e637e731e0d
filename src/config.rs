//! Configuration types for the conversion-combination-compilation pipeline.
//!
//! All pipeline behaviour is controlled through [`JobConfig`], built via its
//! [`JobConfigBuilder`]. Keeping every knob in one struct makes it trivial to
//! share configs across tasks, log them, and diff two runs to understand why
//! their outputs differ.
//!
//! # Design choice: builder over constructor
//! A fifteen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::Snap2TexError;
use crate::recognition::RecognitionBackend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Target typesetting format of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocFormat {
    /// LaTeX (`\documentclass` / `\begin{document}` wrapper). Default.
    #[default]
    Latex,
    /// Typst (`#import` / `#set page` preamble).
    Typst,
}

impl fmt::Display for DocFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocFormat::Latex => f.write_str("latex"),
            DocFormat::Typst => f.write_str("typst"),
        }
    }
}

impl std::str::FromStr for DocFormat {
    type Err = Snap2TexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latex" | "tex" => Ok(DocFormat::Latex),
            "typst" | "typ" => Ok(DocFormat::Typst),
            other => Err(Snap2TexError::InvalidConfig(format!(
                "Unknown format '{other}' (expected 'latex' or 'typst')"
            ))),
        }
    }
}

impl DocFormat {
    /// File extension of serialized source in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            DocFormat::Latex => "tex",
            DocFormat::Typst => "typ",
        }
    }
}

/// Configuration for one conversion job.
///
/// Built via [`JobConfig::builder()`] or [`JobConfig::default()`].
///
/// # Example
/// ```rust
/// use snap2tex::{DocFormat, JobConfig};
///
/// let config = JobConfig::builder()
///     .format(DocFormat::Typst)
///     .concurrency(4)
///     .output_dir("out")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct JobConfig {
    /// Target document format. Default: [`DocFormat::Latex`].
    pub format: DocFormat,

    /// Number of concurrent recognition calls per batch. Default: 10.
    ///
    /// Recognition is network-bound, so fanning out cuts wall-clock time
    /// roughly by the concurrency factor. The cap also bounds outbound
    /// request pressure for very large batches; raise it only if the
    /// upstream service tolerates the load.
    pub concurrency: usize,

    /// Vision model used for image → markup transcription.
    /// Default: "grok-vision-beta".
    pub vision_model: String,

    /// Text model used for the fix-up rewrite path. Default: "grok-beta".
    pub text_model: String,

    /// Base URL of the OpenAI-compatible recognition endpoint.
    /// If `None`, read from `SNAP2TEX_BASE_URL`, falling back to the x.ai API.
    pub api_base_url: Option<String>,

    /// API key for the recognition endpoint.
    /// If `None`, read from `SNAP2TEX_API_KEY` then `XAI_API_KEY`.
    pub api_key: Option<String>,

    /// Pre-constructed recognition backend. Takes precedence over the HTTP
    /// client settings above; this is the seam tests use to inject mocks.
    pub backend: Option<Arc<dyn RecognitionBackend>>,

    /// Sampling temperature for recognition calls. Default: 0.1.
    ///
    /// Low temperature keeps the model faithful to what is on the page,
    /// which is exactly what transcription wants.
    pub temperature: f32,

    /// Maximum tokens the model may generate per image. Default: 4096.
    pub max_tokens: usize,

    /// Transient-error retries per recognition call. Default: 2.
    ///
    /// Retry lives inside a single call; the orchestrator never
    /// re-dispatches an item and compile/store failures are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (doubles per attempt). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-recognition-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Artifact store root directory. Default: "output".
    ///
    /// Shared across concurrent jobs; unique file names are the only
    /// mutual-exclusion mechanism, so no locking is needed.
    pub output_dir: PathBuf,

    /// LaTeX engine binary. Default: "pdflatex".
    pub latex_engine: String,

    /// Typst compiler binary. Default: "typst".
    pub typst_engine: String,

    /// Remote compile endpoint used when no local engine is available.
    /// `None` disables the fallback.
    pub remote_compile_url: Option<String>,

    /// Longest edge of a rasterized PDF page in pixels. Default: 2048.
    ///
    /// Fixed high density so re-fed pages stay legible to the vision model;
    /// capping pixels rather than DPI keeps memory bounded on oversized
    /// pages.
    pub raster_max_pixels: u32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            format: DocFormat::Latex,
            concurrency: 10,
            vision_model: "grok-vision-beta".to_string(),
            text_model: "grok-beta".to_string(),
            api_base_url: None,
            api_key: None,
            backend: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            output_dir: PathBuf::from("output"),
            latex_engine: "pdflatex".to_string(),
            typst_engine: "typst".to_string(),
            remote_compile_url: None,
            raster_max_pixels: 2048,
        }
    }
}

impl fmt::Debug for JobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobConfig")
            .field("format", &self.format)
            .field("concurrency", &self.concurrency)
            .field("vision_model", &self.vision_model)
            .field("text_model", &self.text_model)
            .field("api_base_url", &self.api_base_url)
            .field("backend", &self.backend.as_ref().map(|_| "<dyn RecognitionBackend>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("output_dir", &self.output_dir)
            .field("latex_engine", &self.latex_engine)
            .field("typst_engine", &self.typst_engine)
            .field("remote_compile_url", &self.remote_compile_url)
            .field("raster_max_pixels", &self.raster_max_pixels)
            .finish()
    }
}

impl JobConfig {
    /// Create a new builder for `JobConfig`.
    pub fn builder() -> JobConfigBuilder {
        JobConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`JobConfig`].
#[derive(Debug)]
pub struct JobConfigBuilder {
    config: JobConfig,
}

impl JobConfigBuilder {
    pub fn format(mut self, format: DocFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = model.into();
        self
    }

    pub fn text_model(mut self, model: impl Into<String>) -> Self {
        self.config.text_model = model.into();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn RecognitionBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn latex_engine(mut self, engine: impl Into<String>) -> Self {
        self.config.latex_engine = engine.into();
        self
    }

    pub fn typst_engine(mut self, engine: impl Into<String>) -> Self {
        self.config.typst_engine = engine.into();
        self
    }

    pub fn remote_compile_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote_compile_url = Some(url.into());
        self
    }

    pub fn raster_max_pixels(mut self, px: u32) -> Self {
        self.config.raster_max_pixels = px.max(256);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<JobConfig, Snap2TexError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(Snap2TexError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.latex_engine.trim().is_empty() || c.typst_engine.trim().is_empty() {
            return Err(Snap2TexError::InvalidConfig(
                "Engine binary names must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
