//! CLI binary for snap2tex.
//!
//! A thin shim over the library crate: maps flags to `JobConfig`, wires the
//! job's progress channel into an indicatif bar, and prints the artifact
//! path of the compiled PDF.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use snap2tex::{
    combine, compile, orchestrate, rasterize, recognition, ArtifactStore, ConversionJob,
    DocFormat, ImageInput, JobConfig, ProgressChannel, ProgressEvent,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert two page photos into one compiled LaTeX PDF
  snap2tex page1.jpg page2.jpg

  # Typst instead of LaTeX, with shared context for the model
  snap2tex --format typst --context "linear algebra lecture notes" scan.png

  # Re-convert an existing PDF (pages are rasterized first)
  snap2tex old-homework.pdf

  # Print the combined source without compiling
  snap2tex --combine-only page1.png page2.png

  # One-shot fix of a document that fails to render
  snap2tex --fix broken.tex

ENVIRONMENT VARIABLES:
  SNAP2TEX_API_KEY    Recognition service API key (XAI_API_KEY also honoured)
  SNAP2TEX_BASE_URL   OpenAI-compatible endpoint base URL
  PDFIUM_LIB_PATH     Path to an existing libpdfium (PDF input only)

SETUP:
  1. Set API key:     export SNAP2TEX_API_KEY=xai-...
  2. Convert:         snap2tex page1.jpg page2.jpg
"#;

/// Convert page images to a compiled LaTeX or Typst PDF using vision models.
#[derive(Parser, Debug)]
#[command(
    name = "snap2tex",
    version,
    about = "Convert page images to a compiled LaTeX or Typst PDF using vision models",
    arg_required_else_help = true,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image files (jpg/png/webp), or a single PDF to rasterize first.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Target format: latex or typst.
    #[arg(short, long, env = "SNAP2TEX_FORMAT", default_value = "latex")]
    format: String,

    /// Free-text context shared across all images of this job.
    #[arg(short, long, env = "SNAP2TEX_CONTEXT")]
    context: Option<String>,

    /// Artifact output directory.
    #[arg(short, long, env = "SNAP2TEX_OUTPUT", default_value = "output")]
    output_dir: PathBuf,

    /// Number of concurrent recognition calls.
    #[arg(long, env = "SNAP2TEX_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Vision model for transcription.
    #[arg(long, env = "SNAP2TEX_VISION_MODEL")]
    vision_model: Option<String>,

    /// LaTeX engine binary.
    #[arg(long, env = "SNAP2TEX_LATEX_ENGINE", default_value = "pdflatex")]
    latex_engine: String,

    /// Typst compiler binary.
    #[arg(long, env = "SNAP2TEX_TYPST_ENGINE", default_value = "typst")]
    typst_engine: String,

    /// Remote compile endpoint used when the local engine is missing.
    #[arg(long, env = "SNAP2TEX_REMOTE_COMPILE")]
    remote_compile: Option<String>,

    /// Print the combined source to stdout instead of compiling.
    #[arg(long)]
    combine_only: bool,

    /// Treat the single input as markup and run the one-shot fix rewrite,
    /// then recompile.
    #[arg(long)]
    fix: bool,

    /// Keep rasterized page images instead of cleaning them up.
    #[arg(long)]
    keep_pages: bool,

    /// Transient-error retries per recognition call.
    #[arg(long, env = "SNAP2TEX_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-recognition-call timeout in seconds.
    #[arg(long, env = "SNAP2TEX_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Disable the progress bar.
    #[arg(long, env = "SNAP2TEX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SNAP2TEX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the artifact path.
    #[arg(short, long, env = "SNAP2TEX_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Suppress INFO-level library logs while the bar is active; the bar is
    // all the feedback that matters then.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let format: DocFormat = cli.format.parse().context("Invalid --format")?;
    let config = build_config(&cli, format)?;
    let store = ArtifactStore::open(&config.output_dir).context("Cannot open output directory")?;
    let backend = recognition::resolve_backend(&config)?;

    // ── Fix mode: rewrite one broken document and recompile ──────────────
    if cli.fix {
        if cli.inputs.len() != 1 {
            bail!("--fix takes exactly one markup file");
        }
        let source = tokio::fs::read_to_string(&cli.inputs[0])
            .await
            .with_context(|| format!("Cannot read {}", cli.inputs[0].display()))?;
        let fixed = combine::combine_or_fix(&backend, &[source.as_str()], format, true).await?;
        let reference = compile::compile(&fixed, format, &config, &store).await?;
        finish(&cli, &store, &reference);
        return Ok(());
    }

    // ── Resolve inputs: a single PDF is rasterized first ─────────────────
    let mut page_assets = Vec::new();
    let images: Vec<ImageInput> = if cli.inputs.len() == 1 && is_pdf(&cli.inputs[0]) {
        let bytes = tokio::fs::read(&cli.inputs[0])
            .await
            .with_context(|| format!("Cannot read {}", cli.inputs[0].display()))?;
        page_assets = rasterize::rasterize_pdf(bytes, &config, &store).await?;
        if !cli.quiet {
            eprintln!("Rasterized {} pages", page_assets.len());
        }
        rasterize::assets_to_inputs(&store, &page_assets).await?
    } else {
        let mut images = Vec::with_capacity(cli.inputs.len());
        for path in &cli.inputs {
            if is_pdf(path) {
                bail!("A PDF must be the only input");
            }
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Cannot read {}", path.display()))?;
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            images.push(ImageInput::new(bytes, ImageInput::mime_for_extension(ext)));
        }
        images
    };

    if images.is_empty() {
        bail!("No page images to convert");
    }

    // ── Run the batch with a live progress bar ───────────────────────────
    let progress = ProgressChannel::default();
    let bar_task = show_progress.then(|| spawn_bar(images.len(), &progress));

    let job = ConversionJob::new(images, cli.context.clone(), format);
    let batch = orchestrate::convert_batch(&backend, &job, &config, &progress).await;

    if let Some(task) = bar_task {
        let _ = task.await;
    }

    let batch = match batch {
        Ok(batch) => batch,
        Err(err) => {
            cleanup_pages(&cli, &store, &page_assets).await;
            return Err(err.into());
        }
    };
    if !cli.quiet {
        if batch.failed_count() == 0 {
            eprintln!(
                "{} {} pages converted",
                green("✔"),
                bold(&batch.success_count().to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages converted ({} failed)",
                red("⚠"),
                batch.success_count(),
                batch.total,
                batch.failed_count()
            );
            for failure in &batch.failures {
                eprintln!("  {} {}", red("✗"), failure);
            }
        }
    }

    // Page order matters for a document: restore submission order.
    let fragments = batch.markups_in_submission_order();
    let source = combine::combine_to_source(&fragments, format);

    if cli.combine_only {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(source.as_bytes()).context("stdout")?;
        cleanup_pages(&cli, &store, &page_assets).await;
        return Ok(());
    }

    let compiled = compile::compile(&source, format, &config, &store).await;
    cleanup_pages(&cli, &store, &page_assets).await;
    let reference = compiled?;
    finish(&cli, &store, &reference);
    Ok(())
}

/// Map CLI args to `JobConfig`.
fn build_config(cli: &Cli, format: DocFormat) -> Result<JobConfig> {
    let mut builder = JobConfig::builder()
        .format(format)
        .concurrency(cli.concurrency)
        .output_dir(cli.output_dir.clone())
        .latex_engine(cli.latex_engine.clone())
        .typst_engine(cli.typst_engine.clone())
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout);
    if let Some(ref model) = cli.vision_model {
        builder = builder.vision_model(model.clone());
    }
    if let Some(ref url) = cli.remote_compile {
        builder = builder.remote_compile_url(url.clone());
    }
    builder.build().context("Invalid configuration")
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Drive an indicatif bar from the job's progress channel until the
/// terminal `Finished` event.
fn spawn_bar(total: usize, progress: &ProgressChannel) -> tokio::task::JoinHandle<()> {
    let mut rx = progress.subscribe();
    tokio::spawn(async move {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        while let Ok(event) = rx.recv().await {
            match event {
                ProgressEvent::Percent { done, percent, .. } => {
                    bar.set_position(done as u64);
                    bar.set_message(format!("{percent}%"));
                }
                ProgressEvent::Finished { .. } => break,
            }
        }
        bar.finish_and_clear();
    })
}

async fn cleanup_pages(cli: &Cli, store: &ArtifactStore, assets: &[snap2tex::TempAsset]) {
    if cli.keep_pages || assets.is_empty() {
        return;
    }
    let removed = store.cleanup(assets).await;
    if !cli.quiet {
        eprintln!("Cleaned up {removed} page images");
    }
}

fn finish(cli: &Cli, store: &ArtifactStore, reference: &str) {
    let path = store.root().join(reference);
    if cli.quiet {
        println!("{}", path.display());
    } else {
        println!("{} PDF written to {}", green("✔"), bold(&path.display().to_string()));
    }
}
