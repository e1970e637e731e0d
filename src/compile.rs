//! Compilation backend: turn combined source into a PDF in the artifact
//! store.
//!
//! Each format has its own local strategy — LaTeX engines read the source
//! from stdin with a unique jobname, the Typst CLI wants a scratch file and
//! an explicit output path. Both write into a scratch directory first and
//! move the finished PDF into the store, so concurrent jobs sharing one
//! store never collide (unique names are the only mutual exclusion).
//!
//! When the local engine binary is absent and a remote compile endpoint is
//! configured, the source is shipped over the wire and the returned PDF
//! bytes are persisted locally — the serving process then never needs the
//! engine installed.
//!
//! Engine failures are never retried here. The separate correction path
//! ([`request_fix`]) is a single-shot best-effort rewrite the caller invokes
//! explicitly after observing a render failure — not a
//! compile-diagnose-repair loop.

use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{DocFormat, JobConfig};
use crate::error::Snap2TexError;
use crate::prompts;
use crate::recognition::RecognitionBackend;
use crate::sanitize::sanitize_markup;
use crate::store::ArtifactStore;

/// Compile `source` into a PDF, returning its store reference.
///
/// Guards against empty input before any engine is spawned; falls back to
/// the configured remote endpoint when the local engine binary is missing.
pub async fn compile(
    source: &str,
    format: DocFormat,
    config: &JobConfig,
    store: &ArtifactStore,
) -> Result<String, Snap2TexError> {
    if source.trim().is_empty() {
        return Err(Snap2TexError::NoContent { format });
    }

    let local = match format {
        DocFormat::Latex => compile_latex_local(source, config, store).await,
        DocFormat::Typst => compile_typst_local(source, config, store).await,
    };

    match (local, &config.remote_compile_url) {
        (Err(Snap2TexError::EngineMissing { engine }), Some(url)) => {
            warn!("Engine '{}' missing, falling back to remote compile", engine);
            compile_remote(source, format, url, store).await
        }
        (result, _) => result,
    }
}

/// Pipe LaTeX source into the local engine's stdin.
///
/// The engine runs inside a scratch directory with a store-unique jobname;
/// only the finished PDF is moved into the store, the `.log`/`.aux` litter
/// disappears with the scratch directory.
async fn compile_latex_local(
    source: &str,
    config: &JobConfig,
    store: &ArtifactStore,
) -> Result<String, Snap2TexError> {
    let scratch = tempfile::tempdir().map_err(|e| Snap2TexError::Store {
        path: std::env::temp_dir(),
        source: e,
    })?;
    let reference = store.unique_name("doc", "pdf");
    let jobname = reference.trim_end_matches(".pdf").to_string();

    let mut child = Command::new(&config.latex_engine)
        .arg("-interaction=nonstopmode")
        .arg("-halt-on-error")
        .arg(format!("-jobname={jobname}"))
        .arg("-output-directory")
        .arg(scratch.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(&config.latex_engine, e))?;

    // Feed stdin from a separate task while wait_with_output drains the
    // output pipes. A sequential write deadlocks once the engine has filled
    // its stdout pipe and stops reading stdin (LaTeX engines echo the source
    // into their log), which any multi-page document is large enough to hit.
    let writer = child.stdin.take().map(|mut stdin| {
        let payload = source.as_bytes().to_vec();
        tokio::spawn(async move {
            // An engine exiting before consuming everything closes the pipe;
            // that run surfaces as a compile failure below, not a write error.
            let _ = stdin.write_all(&payload).await;
            // Dropping stdin signals end-of-source to the engine.
        })
    });

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| Snap2TexError::Internal(format!("engine wait: {e}")))?;
    if let Some(writer) = writer {
        let _ = writer.await;
    }

    let pdf_path = scratch.path().join(&reference);
    if !output.status.success() || !pdf_path.exists() {
        return Err(Snap2TexError::CompileFailed {
            format: DocFormat::Latex,
            diagnostic: engine_diagnostic(&output),
        });
    }

    store.adopt(&pdf_path, &reference).await?;
    info!("LaTeX compile produced '{}'", reference);
    Ok(reference)
}

/// Run the Typst CLI against a scratch input file.
async fn compile_typst_local(
    source: &str,
    config: &JobConfig,
    store: &ArtifactStore,
) -> Result<String, Snap2TexError> {
    let scratch = tempfile::tempdir().map_err(|e| Snap2TexError::Store {
        path: std::env::temp_dir(),
        source: e,
    })?;
    let reference = store.unique_name("doc", "pdf");
    let input_path = scratch.path().join("input.typ");
    let output_path = scratch.path().join(&reference);

    tokio::fs::write(&input_path, source)
        .await
        .map_err(|e| Snap2TexError::Store {
            path: input_path.clone(),
            source: e,
        })?;

    let output = Command::new(&config.typst_engine)
        .arg("compile")
        .arg(&input_path)
        .arg(&output_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| spawn_error(&config.typst_engine, e))?;

    if !output.status.success() || !output_path.exists() {
        return Err(Snap2TexError::CompileFailed {
            format: DocFormat::Typst,
            diagnostic: engine_diagnostic(&output),
        });
    }

    store.adopt(&output_path, &reference).await?;
    info!("Typst compile produced '{}'", reference);
    Ok(reference)
    // scratch (and the input file) is removed on drop
}

/// Submit the source to a hosted compile endpoint and persist the PDF
/// locally before returning a reference.
async fn compile_remote(
    source: &str,
    format: DocFormat,
    url: &str,
    store: &ArtifactStore,
) -> Result<String, Snap2TexError> {
    let client = reqwest::Client::new();
    let response = client
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(source.to_string())
        .send()
        .await
        .map_err(|e| Snap2TexError::RemoteCompileFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(Snap2TexError::RemoteCompileFailed {
            url: url.to_string(),
            reason: format!("HTTP {status}"),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !content_type.starts_with("application/pdf") {
        return Err(Snap2TexError::RemoteCompileFailed {
            url: url.to_string(),
            reason: format!("expected application/pdf, got '{content_type}'"),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Snap2TexError::RemoteCompileFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let reference = store.unique_name("doc", "pdf");
    store.save(&reference, &bytes).await?;
    info!("Remote {} compile produced '{}'", format, reference);
    Ok(reference)
}

/// Correction path: ask the recognition channel for a single-shot rewrite of
/// one broken document and return the sanitized markup as a new combination
/// candidate. Invoked explicitly by the caller after a render failure.
pub async fn request_fix(
    backend: &Arc<dyn RecognitionBackend>,
    source: &str,
    format: DocFormat,
) -> Result<String, Snap2TexError> {
    debug!("Requesting fix rewrite for {} source ({} chars)", format, source.len());
    let raw = backend
        .rewrite(
            prompts::FIX_SYSTEM_DIRECTIVE,
            &prompts::fix_request(format, source),
        )
        .await?;
    Ok(sanitize_markup(&raw))
}

fn spawn_error(engine: &str, e: std::io::Error) -> Snap2TexError {
    if e.kind() == std::io::ErrorKind::NotFound {
        Snap2TexError::EngineMissing {
            engine: engine.to_string(),
        }
    } else {
        Snap2TexError::Internal(format!("failed to launch '{engine}': {e}"))
    }
}

/// Condense an engine's output into a diagnostic: last lines of stderr, or
/// stdout when stderr is silent (LaTeX engines log errors to stdout).
fn engine_diagnostic(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let text = if stderr.trim().is_empty() { stdout } else { stderr };
    let tail: Vec<&str> = text.lines().rev().take(15).collect();
    let mut lines: Vec<&str> = tail.into_iter().rev().collect();
    if lines.is_empty() {
        lines.push("engine produced no output");
    }
    format!("exit {}: {}", output.status, lines.join("\n"))
}
