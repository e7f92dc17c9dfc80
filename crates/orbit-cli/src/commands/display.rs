//! Shared terminal formatting.

use colored::{ColoredString, Colorize};

use orbit_core::operation::{OperationOutput, OperationStatus};

pub fn status(status: OperationStatus) -> ColoredString {
    match status {
        OperationStatus::Pending => "pending".dimmed(),
        OperationStatus::Running => "running".cyan(),
        OperationStatus::Completed => "completed".green(),
        OperationStatus::Failed => "failed".red(),
        OperationStatus::Cancelled => "cancelled".yellow(),
    }
}

/// One-line summary of timing, usage and provenance.
pub fn output_summary(output: &OperationOutput, from_cache: bool) -> String {
    let mut parts = vec![format!("{}ms", output.duration_ms)];
    if let Some(code) = output.exit_code {
        parts.push(format!("exit {code}"));
    }
    if let (Some(tokens), Some(cost)) = (output.tokens, output.cost) {
        parts.push(format!("~{tokens} tokens, ${cost:.4}"));
    }
    if from_cache {
        parts.push("cached".to_string());
    }
    if output.simulated {
        parts.push("SIMULATED".yellow().to_string());
    }
    parts.join(" · ")
}
