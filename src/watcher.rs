//! Reload trigger for library directories.
//!
//! Raw notify events go into a channel; a worker thread waits for the burst to
//! go quiet for the debounce window and then fires the change callback once.

use crate::error::{Result, SnipError};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

enum Signal {
    Changed,
    Stop,
}

struct Running {
    // Dropped before the worker is joined so no new events are queued.
    watcher: Option<RecommendedWatcher>,
    tx: Sender<Signal>,
    stopped: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    watched: Vec<PathBuf>,
}

pub struct LibraryWatcher {
    debounce: Duration,
    running: Option<Running>,
}

impl LibraryWatcher {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            running: None,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Directories actually being watched, after canonicalization and dedupe.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.running
            .as_ref()
            .map(|r| r.watched.clone())
            .unwrap_or_default()
    }

    /// Watch `roots` and call `on_change` after each quiet burst of changes.
    ///
    /// Missing roots are skipped with a warning. Calling `start` on a running
    /// watcher stops it first, so this also re-points it.
    pub fn start<F>(&mut self, roots: &[PathBuf], on_change: F) -> Result<()>
    where
        F: Fn() + Send + 'static,
    {
        self.stop();

        let targets = watch_targets(roots);
        let (tx, rx) = mpsc::channel();
        let stopped = Arc::new(AtomicBool::new(false));

        let events = tx.clone();
        let file_roots: Vec<PathBuf> = targets.iter().filter_map(|t| t.file.clone()).collect();
        let dir_roots: Vec<PathBuf> = targets
            .iter()
            .filter(|t| t.file.is_none())
            .map(|t| t.dir.clone())
            .collect();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if is_relevant(&event, &dir_roots, &file_roots) {
                        let _ = events.send(Signal::Changed);
                    }
                }
                Err(e) => error!(error = %e, "Watch error"),
            },
            Config::default(),
        )?;

        let mut watched = Vec::new();
        let mut modes: BTreeMap<PathBuf, RecursiveMode> = BTreeMap::new();
        for target in &targets {
            let mode = if target.file.is_some() {
                RecursiveMode::NonRecursive
            } else {
                RecursiveMode::Recursive
            };
            let entry = modes.entry(target.dir.clone()).or_insert(mode);
            if mode == RecursiveMode::Recursive {
                *entry = RecursiveMode::Recursive;
            }
        }
        for (dir, mode) in modes {
            match watcher.watch(&dir, mode) {
                Ok(()) => {
                    debug!(path = %dir.display(), ?mode, "Watching");
                    watched.push(dir);
                }
                Err(e) => warn!(path = %dir.display(), error = %e, "Cannot watch directory, skipping"),
            }
        }

        let worker_stopped = Arc::clone(&stopped);
        let debounce = self.debounce;
        let handle = thread::Builder::new()
            .name("library-watch".to_string())
            .spawn(move || debounce_loop(rx, debounce, worker_stopped, on_change))
            .map_err(|e| SnipError::Watch(format!("cannot spawn debounce thread: {}", e)))?;

        info!(roots = watched.len(), debounce_ms = debounce.as_millis() as u64, "Library watcher started");
        self.running = Some(Running {
            watcher: Some(watcher),
            tx,
            stopped,
            handle,
            watched,
        });
        Ok(())
    }

    /// Stop watching. No callback fires after this returns.
    pub fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        running.stopped.store(true, Ordering::SeqCst);
        drop(running.watcher.take());
        let _ = running.tx.send(Signal::Stop);

        if running.handle.thread().id() == thread::current().id() {
            return;
        }
        if running.handle.join().is_err() {
            error!("Library watch thread panicked");
        }
        info!("Library watcher stopped");
    }

    /// Feed a synthetic change into the debounce worker.
    #[cfg(test)]
    pub(crate) fn inject(&self) {
        if let Some(running) = &self.running {
            let _ = running.tx.send(Signal::Changed);
        }
    }
}

impl Default for LibraryWatcher {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl Drop for LibraryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn debounce_loop<F>(rx: Receiver<Signal>, debounce: Duration, stopped: Arc<AtomicBool>, on_change: F)
where
    F: Fn(),
{
    loop {
        match rx.recv() {
            Ok(Signal::Changed) => {}
            Ok(Signal::Stop) | Err(_) => return,
        }

        // Extend the window while events keep arriving.
        loop {
            match rx.recv_timeout(debounce) {
                Ok(Signal::Changed) => continue,
                Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => break,
            }
        }

        if stopped.load(Ordering::SeqCst) {
            return;
        }
        debug!("Library change settled, reloading");
        on_change();
    }
}

struct WatchTarget {
    dir: PathBuf,
    /// Set when the configured root is a single file; its parent is watched.
    file: Option<PathBuf>,
}

fn watch_targets(roots: &[PathBuf]) -> Vec<WatchTarget> {
    let mut targets: Vec<WatchTarget> = Vec::new();
    for root in roots {
        let Ok(canonical) = root.canonicalize() else {
            warn!(path = %root.display(), "Library root does not exist, not watching it");
            continue;
        };

        let target = if canonical.is_dir() {
            WatchTarget {
                dir: canonical,
                file: None,
            }
        } else {
            let Some(parent) = canonical.parent().map(Path::to_path_buf) else {
                continue;
            };
            WatchTarget {
                dir: parent,
                file: Some(canonical),
            }
        };

        let duplicate = targets
            .iter()
            .any(|t| t.dir == target.dir && t.file == target.file);
        if !duplicate {
            targets.push(target);
        }
    }
    targets
}

fn is_relevant(event: &Event, dir_roots: &[PathBuf], file_roots: &[PathBuf]) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event.paths.iter().any(|path| {
        dir_roots.iter().any(|dir| path.starts_with(dir)) || file_roots.iter().any(|f| path == f)
    }) || (event.paths.is_empty() && !dir_roots.is_empty())
}
