//! weave-ctl: command-line interface for chunked weave uploads.

mod cmd;

use std::path::PathBuf;

use anyhow::{Context, Result};

use weave_core::config::WeaveConfig;

use cmd::upload::UploadOpts;

fn print_usage() {
    println!("Usage: weave-ctl [--gateway <url>] <command>");
    println!();
    println!("Commands:");
    println!("  chunk <file>                    Show data root and chunk layout");
    println!("  verify <file>                   Build and validate every chunk proof");
    println!("  upload <tx.json> <file>         Upload a signed transaction and its data");
    println!("  resume <state.json> <file>      Continue an upload from a state file");
    println!("  resume-id <tx-id> <file>        Continue an upload the gateway already holds");
    println!();
    println!("Options:");
    println!("  --gateway <url>      Gateway base URL (default: from config)");
    println!("  --state <path>       Persist upload progress to <path> after each step");
    println!("  --concurrent <n>     Upload chunks with <n> workers");
    println!();
    println!("Config: {}", WeaveConfig::file_path().display());
}

fn load_config() -> WeaveConfig {
    if let Err(e) = WeaveConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    WeaveConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        WeaveConfig::default()
    })
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut gateway: Option<String> = None;
    let mut state: Option<PathBuf> = None;
    let mut concurrent: Option<usize> = None;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--gateway" => {
                i += 1;
                gateway = Some(args.get(i).context("--gateway requires a value")?.clone());
            }
            "--state" => {
                i += 1;
                state = Some(args.get(i).context("--state requires a path")?.into());
            }
            "--concurrent" => {
                i += 1;
                concurrent = Some(
                    args.get(i)
                        .context("--concurrent requires a value")?
                        .parse()
                        .context("--concurrent must be a number")?,
                );
            }
            other => remaining.push(other),
        }
        i += 1;
    }

    let opts = || {
        let mut config = load_config();
        if let Some(url) = &gateway {
            config.gateway.url = url.clone();
        }
        UploadOpts {
            config,
            state: state.clone(),
            concurrent,
        }
    };

    match remaining.as_slice() {
        ["chunk", file] => cmd::chunk::cmd_chunk(file),
        ["verify", file] => cmd::chunk::cmd_verify(file),
        ["upload", tx, file] => cmd::upload::cmd_upload(tx, file, opts()).await,
        ["resume", state_file, file] => cmd::upload::cmd_resume(state_file, file, opts()).await,
        ["resume-id", id, file] => cmd::upload::cmd_resume_id(id, file, opts()).await,
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
