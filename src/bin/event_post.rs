//! Operator tool that re-triggers letter processing by posting a synthetic
//! object-created notification to a running Letterflow server.
//!
//! The pipeline has no internal watchdog for records stuck in PROCESSING; replaying the
//! same storage key is the recovery path, and idempotent overwrite makes it safe to
//! repeat.

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::json;

#[derive(Parser)]
#[command(
    name = "event-post",
    about = "Post an object-created notification to a running Letterflow server"
)]
struct Cli {
    /// Base URL of the Letterflow server.
    #[arg(long, default_value = "http://127.0.0.1:4100")]
    server: String,
    /// Storage bucket the objects live in.
    #[arg(long)]
    bucket: String,
    /// Object keys to re-trigger, exactly as stored.
    keys: Vec<String>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    if cli.keys.is_empty() {
        bail!("at least one object key is required");
    }

    // Keys are percent-encoded the way storage notifications deliver them; the server
    // decodes them back before processing.
    let records: Vec<_> = cli
        .keys
        .iter()
        .map(|key| {
            json!({
                "s3": {
                    "bucket": { "name": cli.bucket },
                    "object": { "key": urlencoding::encode(key).into_owned() }
                }
            })
        })
        .collect();
    let payload = json!({ "Records": records });

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/events", cli.server.trim_end_matches('/')))
        .json(&payload)
        .send()
        .await
        .context("failed to reach Letterflow server")?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        bail!("server returned {status}: {body}");
    }

    println!("{body}");
    Ok(())
}
