//! Filesystem watcher feeding the event bus.
//!
//! Each watched root gets its own recursive `notify` watcher. Raw
//! notifications are reduced to created/modified/deleted [`FileEvent`]s and
//! published on the file-system channel; paths under ignored directories
//! (`.git`, `node_modules`, ...) are dropped.

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use orbit_core::error::{OrbitError, Result};
use orbit_core::event::{EngineEvent, EventBus, FileChangeKind, FileEvent};

pub struct FsWatcher {
    bus: EventBus,
    ignored: Arc<Vec<String>>,
    watches: Mutex<HashMap<PathBuf, RecommendedWatcher>>,
}

impl FsWatcher {
    pub fn new(bus: EventBus, ignored: Vec<String>) -> Self {
        Self {
            bus,
            ignored: Arc::new(ignored),
            watches: Mutex::new(HashMap::new()),
        }
    }

    /// Starts watching each path recursively. Already watched paths are skipped.
    ///
    /// # Errors
    ///
    /// `OrbitError::Watch` if a path does not exist or the OS watcher fails;
    /// roots registered before the failing one stay watched.
    pub fn watch(&self, paths: &[PathBuf]) -> Result<()> {
        let mut watches = self.lock()?;
        for path in paths {
            if watches.contains_key(path) {
                continue;
            }
            if !path.exists() {
                return Err(OrbitError::Watch(format!(
                    "{} does not exist",
                    path.display()
                )));
            }

            let bus = self.bus.clone();
            let ignored = Arc::clone(&self.ignored);
            let mut watcher =
                notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                    Ok(event) => {
                        for file_event in translate(&event, &ignored) {
                            bus.publish(EngineEvent::FileChanged(file_event));
                        }
                    }
                    Err(e) => tracing::warn!("[FsWatcher] Watch error: {}", e),
                })
                .map_err(|e| OrbitError::Watch(e.to_string()))?;

            watcher
                .watch(path, RecursiveMode::Recursive)
                .map_err(|e| OrbitError::Watch(format!("{}: {}", path.display(), e)))?;

            tracing::info!("[FsWatcher] Watching {:?}", path);
            watches.insert(path.clone(), watcher);
        }
        Ok(())
    }

    /// Stops watching `path`, or every path when `None`.
    pub fn unwatch(&self, path: Option<&Path>) -> Result<()> {
        let mut watches = self.lock()?;
        match path {
            Some(path) => {
                if watches.remove(path).is_none() {
                    return Err(OrbitError::not_found("watch", path.display().to_string()));
                }
                tracing::info!("[FsWatcher] Stopped watching {:?}", path);
            }
            None => {
                let count = watches.len();
                watches.clear();
                tracing::info!("[FsWatcher] Stopped {} watches", count);
            }
        }
        Ok(())
    }

    pub fn watched(&self) -> Vec<PathBuf> {
        self.lock()
            .map(|watches| {
                let mut paths: Vec<_> = watches.keys().cloned().collect();
                paths.sort();
                paths
            })
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<PathBuf, RecommendedWatcher>>> {
        self.watches
            .lock()
            .map_err(|_| OrbitError::internal("watcher lock poisoned"))
    }
}

fn is_ignored(path: &Path, ignored: &[String]) -> bool {
    path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| ignored.iter().any(|i| i == name))
    })
}

/// Reduces one notify event to zero or more file events.
fn translate(event: &Event, ignored: &[String]) -> Vec<FileEvent> {
    let kinds: Vec<(usize, FileChangeKind)> = match &event.kind {
        EventKind::Create(_) => all(event, FileChangeKind::Created),
        EventKind::Remove(_) => all(event, FileChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => all(event, FileChangeKind::Deleted),
            RenameMode::To => all(event, FileChangeKind::Created),
            RenameMode::Both => vec![(0, FileChangeKind::Deleted), (1, FileChangeKind::Created)],
            _ => event
                .paths
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let kind = if p.exists() {
                        FileChangeKind::Created
                    } else {
                        FileChangeKind::Deleted
                    };
                    (i, kind)
                })
                .collect(),
        },
        EventKind::Modify(_) => all(event, FileChangeKind::Modified),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    };

    kinds
        .into_iter()
        .filter_map(|(i, kind)| event.paths.get(i).map(|p| (p, kind)))
        .filter(|(path, _)| !is_ignored(path, ignored))
        .map(|(path, kind)| FileEvent::new(path.clone(), kind))
        .collect()
}

fn all(event: &Event, kind: FileChangeKind) -> Vec<(usize, FileChangeKind)> {
    (0..event.paths.len()).map(|i| (i, kind)).collect()
}
