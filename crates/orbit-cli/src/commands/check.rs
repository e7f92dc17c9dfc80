use anyhow::{Result, bail};
use colored::Colorize;

use orbit_application::Engine;
use orbit_core::backend::BackendId;

pub async fn run(engine: &Engine) -> Result<()> {
    let report = engine.sessions().check_availability().await;
    let program = &engine.config().cli.program;

    if report.available {
        let version = report.version.as_deref().unwrap_or("unknown version");
        println!("{} {} ({})", "✓".green(), program.bold(), version);
        if report.simulated {
            println!(
                "  {}",
                "simulation mode: results are synthetic".yellow()
            );
        }
        println!("  capabilities: {}", report.capabilities.join(", "));
    } else {
        let reason = report.reason.as_deref().unwrap_or("unknown reason");
        println!("{} {}: {}", "✗".red(), program.bold(), reason);
    }

    for id in engine.orchestrator().registry().ids() {
        if id == BackendId::Cli {
            continue;
        }
        let adapter = engine.orchestrator().registry().get(id)?;
        match adapter.ensure_connected().await {
            Ok(()) => println!("{} {}", "✓".green(), id.to_string().bold()),
            Err(e) => println!("{} {}: {}", "✗".red(), id.to_string().bold(), e),
        }
    }

    if !report.available {
        bail!("{program} is not available");
    }
    Ok(())
}
