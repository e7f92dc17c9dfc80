use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use colored::Colorize;
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use orbit_application::Engine;
use orbit_core::backend::{BackendId, OperationType};
use orbit_core::event::{EngineEvent, EventChannel, OutputStream};
use orbit_core::operation::{ExecuteOptions, OperationRequest};

use super::display;

#[derive(Args)]
pub struct RunArgs {
    /// Target backend (cli, web_scraper, browser, code_host, ide)
    backend: BackendId,

    /// Operation type, e.g. chat, analyze-project, scrape
    operation: OperationType,

    /// Operation parameter as key=value; JSON values are parsed
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, Value)>,

    /// Skip the result cache
    #[arg(long)]
    no_cache: bool,

    /// Deadline in milliseconds (backend default otherwise)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print process output as it arrives
    #[arg(long)]
    stream: bool,

    /// Print the response as JSON
    #[arg(long)]
    json: bool,
}

/// Parses `key=value`. The value is taken as JSON when it parses as JSON and
/// as a plain string otherwise, so `depth=3` is a number and `url=https://x`
/// a string.
fn parse_param(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key=value, got '{raw}'"))?;
    if key.is_empty() {
        bail!("parameter name is empty in '{raw}'");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub async fn run(engine: &Engine, args: RunArgs) -> Result<()> {
    // Only the command-line backend emits output chunks.
    let streaming = args.stream && args.backend == BackendId::Cli;
    let mut request = OperationRequest::new(args.backend, args.operation);
    for (key, value) in args.params {
        request = request.with_param(key, value);
    }

    let mut options = if args.no_cache {
        ExecuteOptions::no_cache()
    } else {
        ExecuteOptions::default()
    };
    if let Some(ms) = args.timeout_ms {
        options = options.with_timeout(Duration::from_millis(ms));
    }

    let printer = streaming.then(|| {
        let mut output = engine.subscribe(EventChannel::Output);
        tokio::spawn(async move {
            while let Some(event) = output.recv().await {
                if let EngineEvent::OutputChunk { stream, chunk, .. } = event {
                    match stream {
                        OutputStream::Stdout => {
                            print!("{chunk}");
                            let _ = std::io::stdout().flush();
                        }
                        OutputStream::Stderr => eprint!("{chunk}"),
                    }
                }
            }
        })
    });

    let orchestrator = Arc::clone(engine.orchestrator());
    let mut task = tokio::spawn(async move { orchestrator.execute(request, options).await });

    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("{}", "Cancelling...".yellow());
            engine.orchestrator().cancel_all().await;
            task.await
        }
    };
    if let Some(printer) = printer {
        printer.abort();
    }

    let response = joined
        .context("Operation task panicked")?
        .context("Operation failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        if let Some(output) = &response.result {
            if (!streaming || response.from_cache) && !output.output.is_empty() {
                println!("{}", output.output.trim_end());
            }
            eprintln!(
                "{} {}",
                display::status(response.status),
                display::output_summary(output, response.from_cache).dimmed()
            );
        } else {
            eprintln!("{}", display::status(response.status));
        }
        if let Some(error) = &response.error {
            eprintln!("{} {}", "error:".red().bold(), error);
        }
    }

    if !response.is_success() {
        bail!("operation {:?}", response.status);
    }
    Ok(())
}
