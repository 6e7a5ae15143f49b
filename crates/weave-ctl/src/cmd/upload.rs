//! Upload commands: start, resume from a state file, resume by tx id.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use weave_core::config::WeaveConfig;
use weave_core::Transaction;
use weave_transfer::{HttpTransport, SerializedUploader, UploadError, UploadSource, Uploader};

/// Options shared by every upload flavour.
pub struct UploadOpts {
    pub config: WeaveConfig,
    /// Where to persist progress after each step.
    pub state: Option<PathBuf>,
    /// Worker count; `None` runs the sequential uploader.
    pub concurrent: Option<usize>,
}

fn read_payload(path: &str) -> Result<Bytes> {
    let data = std::fs::read(path).with_context(|| format!("failed to read file: {}", path))?;
    Ok(Bytes::from(data))
}

fn save_state(path: &Path, uploader: &Uploader<HttpTransport>) -> Result<()> {
    let json = uploader.to_serialized().to_json()?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write state file: {}", path.display()))
}

pub async fn cmd_upload(tx_path: &str, file: &str, opts: UploadOpts) -> Result<()> {
    let text = std::fs::read_to_string(tx_path)
        .with_context(|| format!("failed to read transaction: {}", tx_path))?;
    let tx: Transaction = serde_json::from_str(&text).context("failed to parse transaction JSON")?;
    run(UploadSource::Fresh(tx), file, opts).await
}

pub async fn cmd_resume(state_path: &str, file: &str, mut opts: UploadOpts) -> Result<()> {
    let text = std::fs::read_to_string(state_path)
        .with_context(|| format!("failed to read state file: {}", state_path))?;
    let state = SerializedUploader::from_json(&text)?;
    opts.state.get_or_insert_with(|| PathBuf::from(state_path));
    run(UploadSource::ResumeFromState(state), file, opts).await
}

pub async fn cmd_resume_id(id: &str, file: &str, opts: UploadOpts) -> Result<()> {
    run(UploadSource::ResumeById(id.to_string()), file, opts).await
}

async fn run(source: UploadSource, file: &str, opts: UploadOpts) -> Result<()> {
    let data = read_payload(file)?;
    let mut settings = opts.config.upload.clone();
    if let Some(n) = opts.concurrent {
        settings.concurrency = n;
    }

    let transport = Arc::new(
        HttpTransport::from_config(&opts.config.gateway).context("failed to build HTTP client")?,
    );
    let mut uploader = Uploader::from_source(transport, source, data, settings)
        .await
        .context("failed to prepare upload")?;

    println!("═══════════════════════════════════════");
    println!("  Upload {}", uploader.transaction().id);
    println!("═══════════════════════════════════════");
    println!("  Gateway : {}", opts.config.gateway.url);
    println!("  Chunks  : {}", uploader.total_chunks());
    let mode = match opts.concurrent {
        Some(n) => format!("concurrent ({} workers)", n),
        None => "sequential".to_string(),
    };
    println!("  Mode    : {}", mode);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping after the current request");
            on_signal.cancel();
        }
    });

    let result = if opts.concurrent.is_some() {
        uploader.upload_concurrently(cancel).await.map(|report| {
            println!(
                "  Submitted {} chunks ({} retries)",
                report.submitted, report.retries
            )
        })
    } else {
        drive(&mut uploader, opts.state.as_deref(), &cancel).await
    };

    if let Some(path) = &opts.state {
        save_state(path, &uploader)?;
    }

    match result {
        Ok(()) => {
            println!("  ✓ complete");
            Ok(())
        }
        Err(e) => {
            if e.is_resumable() {
                if let Some(path) = &opts.state {
                    println!(
                        "  Progress saved to {}; resume with `weave-ctl resume`",
                        path.display()
                    );
                }
            }
            Err(e).context(format!(
                "upload stopped at {}/{} chunks (last response {}: {})",
                uploader.uploaded_chunks(),
                uploader.total_chunks(),
                uploader.last_response_status(),
                uploader.last_response_error()
            ))
        }
    }
}

/// Step the sequential uploader to completion, persisting after each step.
/// An interrupt ends a backoff wait at once.
async fn drive(
    uploader: &mut Uploader<HttpTransport>,
    state: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<(), UploadError> {
    while !uploader.is_complete() {
        uploader.upload_chunk_or_cancel(cancel).await?;

        if let Some(path) = state {
            if let Err(e) = save_state(path, uploader) {
                tracing::warn!(error = %e, "failed to persist upload state");
            }
        }
        println!(
            "  {:>3}%  {}/{} chunks  last status {}",
            uploader.pct_complete(),
            uploader.uploaded_chunks(),
            uploader.total_chunks(),
            uploader.last_response_status()
        );
    }
    Ok(())
}
