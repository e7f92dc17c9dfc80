use anyhow::{Context, Result, bail};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use orbit_application::{BatchOptions, Engine, InsightsReport};
use orbit_core::operation::OperationRequest;

use super::display;

#[derive(Args)]
pub struct BatchArgs {
    /// JSON file holding an array of {backend, operation_type, parameters}
    file: PathBuf,

    /// Dispatch every operation concurrently
    #[arg(long)]
    parallel: bool,

    /// Stop at the first failure (sequential mode only)
    #[arg(long, conflicts_with = "parallel")]
    stop_on_error: bool,

    /// Print the operation history and insights afterwards
    #[arg(long)]
    report: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(engine: &Engine, args: BatchArgs) -> Result<()> {
    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let requests: Vec<OperationRequest> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", args.file.display()))?;
    let total = requests.len();

    let results = engine
        .batch()
        .execute_batch(
            requests,
            BatchOptions {
                parallel: args.parallel,
                stop_on_error: args.stop_on_error,
            },
        )
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for item in &results {
            let mark = if item.success { "✓".green() } else { "✗".red() };
            let mut line = format!(
                "{} #{} {}/{}",
                mark, item.index, item.request.backend, item.request.operation_type
            );
            if let Some(output) = &item.result {
                line.push_str(&format!(
                    "  {}",
                    display::output_summary(output, item.from_cache).dimmed()
                ));
            }
            println!("{line}");
            if let Some(error) = &item.error {
                println!("    {}", error.red());
            }
        }
        if results.len() < total {
            println!(
                "{}",
                format!("{} operations not attempted", total - results.len()).yellow()
            );
        }
    }

    if args.report {
        print_report(engine).await;
    }

    let failed = results.iter().filter(|r| !r.success).count();
    if failed > 0 {
        bail!("{failed} of {total} operations failed");
    }
    Ok(())
}

async fn print_report(engine: &Engine) {
    println!("\n{}", "History".bold());
    for op in engine.orchestrator().history().await {
        let duration = op
            .duration_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_default();
        println!(
            "  {}  {:<11} {}/{} {}",
            op.id.dimmed(),
            display::status(op.status),
            op.backend,
            op.operation_type,
            duration
        );
    }

    let insights: InsightsReport = engine.insights().await;
    println!("\n{}", "Insights".bold());
    println!(
        "  {} operations, {:.0}% success, {:.1}/min",
        insights.counts.total,
        insights.success_rate * 100.0,
        insights.throughput_per_minute
    );
    if let (Some(mean), Some(p95)) = (insights.mean_latency_ms, insights.p95_latency_ms) {
        println!("  latency mean {mean:.0}ms, p95 {p95}ms");
    }
    if insights.total_tokens > 0 {
        println!(
            "  ~{} tokens, ${:.4}",
            insights.total_tokens, insights.total_cost
        );
    }
    for (backend, stats) in &insights.by_backend {
        println!(
            "  {:<12} {} ok / {} failed / {} cancelled",
            backend.to_string(),
            stats.counts.completed,
            stats.counts.failed,
            stats.counts.cancelled
        );
    }
}
