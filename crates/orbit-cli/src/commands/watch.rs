use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

use orbit_application::Engine;
use orbit_core::event::{EventChannel, FileChangeKind};

/// Prints file events until Ctrl-C.
pub async fn run(engine: &Engine, paths: Vec<PathBuf>) -> Result<()> {
    let mut events = engine.subscribe(EventChannel::FileSystem);
    engine.watch(&paths)?;
    eprintln!(
        "{}",
        format!("Watching {} path(s), Ctrl-C to stop", paths.len()).dimmed()
    );

    loop {
        tokio::select! {
            event = events.recv_file_event() => {
                let Some(event) = event else { break };
                let kind = match event.kind {
                    FileChangeKind::Created => "created".green(),
                    FileChangeKind::Modified => "modified".cyan(),
                    FileChangeKind::Deleted => "deleted".red(),
                };
                println!(
                    "{} {:<8} {}",
                    event.timestamp.format("%H:%M:%S%.3f").to_string().dimmed(),
                    kind,
                    event.path.display()
                );
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}
