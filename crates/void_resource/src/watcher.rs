//! File system watcher for hot-reload
//!
//! Watches the project root of an [`OsFileSystem`] and reloads cached
//! resources in place when their file changes on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecursiveMode, Watcher};

use crate::error::{ResourceError, ResourceResult};
use crate::io::OsFileSystem;
use crate::path::ResourcePath;
use crate::subsystem::ResourceSubsystem;

/// Default time a path is ignored after an event for it
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Reloads live cached resources when their file changes
pub struct ResourceWatcher {
    watcher: notify::RecommendedWatcher,
    rx: crossbeam_channel::Receiver<notify::Result<Event>>,
    subsystem: ResourceSubsystem,
    fs: OsFileSystem,
    /// Debounce tracking - prevents duplicate reloads
    debounce: HashMap<PathBuf, Instant>,
    debounce_duration: Duration,
}

impl ResourceWatcher {
    /// Create a watcher for `fs`'s project root, reloading into `subsystem`
    ///
    /// `fs` should be the filesystem `subsystem` reads from.
    pub fn new(subsystem: ResourceSubsystem, fs: OsFileSystem) -> ResourceResult<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|e| watch_error(fs.project_root(), e))?;

        watcher
            .watch(fs.project_root(), RecursiveMode::Recursive)
            .map_err(|e| watch_error(fs.project_root(), e))?;
        log::info!("Watching {:?} for resource changes", fs.project_root());

        Ok(Self {
            watcher,
            rx,
            subsystem,
            fs,
            debounce: HashMap::new(),
            debounce_duration: DEFAULT_DEBOUNCE,
        })
    }

    /// Set debounce duration
    pub fn set_debounce(&mut self, duration: Duration) {
        self.debounce_duration = duration;
    }

    /// Drain pending events and reload affected resources; returns how many
    /// resources were reloaded
    pub fn process(&mut self) -> usize {
        let changed = self.drain();
        self.reload(&changed)
    }

    /// Stop watching
    pub fn stop(mut self) {
        if let Err(err) = self.watcher.unwatch(self.fs.project_root()) {
            log::warn!("Failed to stop watching {:?}: {}", self.fs.project_root(), err);
        }
    }

    /// Changed files as resource paths, debounced
    fn drain(&mut self) -> Vec<ResourcePath> {
        let now = Instant::now();
        let mut changed = Vec::new();

        while let Ok(result) = self.rx.try_recv() {
            let event = match result {
                Ok(event) => event,
                Err(err) => {
                    log::warn!("File watch error: {}", err);
                    continue;
                }
            };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                continue;
            }
            for path in event.paths {
                if path.is_dir() || !self.accept(&path, now) {
                    continue;
                }
                if let Some(res_path) = self.fs.resource_path(&path) {
                    if !changed.contains(&res_path) {
                        changed.push(res_path);
                    }
                }
            }
        }

        let keep = self.debounce_duration.max(Duration::from_secs(5));
        self.debounce.retain(|_, time| now.duration_since(*time) < keep);
        changed
    }

    /// Record an event for `path`; false while it is still debounced
    fn accept(&mut self, path: &Path, now: Instant) -> bool {
        if let Some(last) = self.debounce.get(path) {
            if now.duration_since(*last) < self.debounce_duration {
                return false;
            }
        }
        self.debounce.insert(path.to_path_buf(), now);
        true
    }

    fn reload(&self, changed: &[ResourcePath]) -> usize {
        let mut reloaded = 0;
        for path in changed {
            let Some(resource) = self.subsystem.cache().lookup(path) else {
                continue;
            };
            match self.subsystem.reload_from_file(&resource) {
                Ok(()) => {
                    log::info!("Hot-reloaded {}", path);
                    reloaded += 1;
                }
                Err(err) => log::warn!("Hot-reload of {} failed: {}", path, err),
            }
        }
        reloaded
    }
}

fn watch_error(root: &Path, err: notify::Error) -> ResourceError {
    ResourceError::Io {
        path: root.display().to_string(),
        details: format!("failed to watch: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryFileSystem;
    use std::sync::Arc;

    fn watcher(root: &Path) -> ResourceWatcher {
        let subsystem = ResourceSubsystem::new(Arc::new(MemoryFileSystem::new()));
        ResourceWatcher::new(subsystem, OsFileSystem::new(root, root.join("user"))).unwrap()
    }

    #[test]
    fn test_debounce() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = watcher(dir.path());
        let file = dir.path().join("a.txt");
        let now = Instant::now();

        assert!(watcher.accept(&file, now));
        assert!(!watcher.accept(&file, now + Duration::from_millis(10)));
        assert!(watcher.accept(&file, now + DEFAULT_DEBOUNCE * 2));
    }

    #[test]
    fn test_reload_skips_uncached() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = watcher(dir.path());
        assert_eq!(watcher.reload(&[ResourcePath::new("res://a.txt")]), 0);
        watcher.stop();
    }
}
