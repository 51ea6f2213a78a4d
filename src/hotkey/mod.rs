//! Global hotkey service.
//!
//! The service owns the registered callbacks and one worker thread; the
//! platform work of seeing key presses outside our windows is delegated to a
//! [`HotkeyBackend`] picked once at construction.

mod combo;
mod rdev_backend;
#[cfg(target_os = "linux")]
mod x11;

pub use combo::{Hotkey, Key, Modifiers};
pub use rdev_backend::RdevBackend;
#[cfg(target_os = "linux")]
pub use x11::X11GrabBackend;

use crate::config::HotkeyBackendKind;
use crate::error::{Result, SnipError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long the worker waits on the backend before re-checking for shutdown.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub type HotkeyCallback = Arc<dyn Fn() + Send + Sync>;

/// A way of observing key combinations system-wide.
pub trait HotkeyBackend: Send {
    fn name(&self) -> &'static str;

    /// Start reporting `hotkey`. Grabbing an already grabbed hotkey is a no-op.
    fn grab(&mut self, hotkey: &Hotkey) -> Result<()>;

    fn release(&mut self, hotkey: &Hotkey) -> Result<()>;

    /// Wait at most `timeout` for a grabbed hotkey to be pressed.
    fn poll_or_block(&mut self, timeout: Duration) -> Result<Option<Hotkey>>;
}

/// Pick the backend for this session. Runs once, at service construction.
pub fn select_backend(kind: HotkeyBackendKind) -> Box<dyn HotkeyBackend> {
    let backend: Box<dyn HotkeyBackend> = match kind {
        HotkeyBackendKind::Rdev => Box::new(RdevBackend::new()),
        HotkeyBackendKind::X11 => x11_backend().unwrap_or_else(|| Box::new(RdevBackend::new())),
        HotkeyBackendKind::Auto => {
            // rdev's record hook silently sees nothing under several
            // compositors; a passive grab on the root window works wherever
            // an X server (or Xwayland) is reachable.
            let x11 = std::env::var_os("DISPLAY")
                .is_some()
                .then(x11_backend)
                .flatten();
            x11.unwrap_or_else(|| Box::new(RdevBackend::new()))
        }
    };

    if let Some(caveat) = wayland_caveat(backend.name(), is_wayland_session()) {
        warn!(backend = backend.name(), "{}", caveat);
    }
    backend
}

/// What a Wayland user should know about `backend`, if anything.
fn wayland_caveat(backend: &str, wayland: bool) -> Option<&'static str> {
    if !wayland {
        return None;
    }
    Some(match backend {
        "x11-grab" => "Wayland session: Xwayland grabs only fire while an X client has focus; bind a compositor shortcut to reach native windows",
        _ => "Wayland session: global hotkeys may not fire; bind a compositor shortcut instead",
    })
}

#[cfg(target_os = "linux")]
fn x11_backend() -> Option<Box<dyn HotkeyBackend>> {
    match X11GrabBackend::connect() {
        Ok(backend) => Some(Box::new(backend)),
        Err(e) => {
            warn!(error = %e, "X11 key grabbing unavailable, falling back to rdev");
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn x11_backend() -> Option<Box<dyn HotkeyBackend>> {
    warn!("X11 key grabbing is only available on Linux, falling back to rdev");
    None
}

pub(crate) fn is_wayland_session() -> bool {
    std::env::var_os("WAYLAND_DISPLAY").is_some()
        || std::env::var("XDG_SESSION_TYPE").is_ok_and(|s| s.eq_ignore_ascii_case("wayland"))
}

struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct HotkeyService {
    backend: Arc<Mutex<Box<dyn HotkeyBackend>>>,
    bindings: Arc<Mutex<HashMap<Hotkey, HotkeyCallback>>>,
    worker: Option<Worker>,
    backend_name: &'static str,
}

impl HotkeyService {
    pub fn new(kind: HotkeyBackendKind) -> Self {
        Self::with_backend(select_backend(kind))
    }

    pub fn with_backend(backend: Box<dyn HotkeyBackend>) -> Self {
        let backend_name = backend.name();
        info!(backend = backend_name, "Hotkey backend selected");
        Self {
            backend: Arc::new(Mutex::new(backend)),
            bindings: Arc::new(Mutex::new(HashMap::new())),
            worker: None,
            backend_name,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    /// Bind `combo` to `callback`. Binding a combo again replaces its callback.
    pub fn register<F>(&self, combo: &str, callback: F) -> Result<Hotkey>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let hotkey = Hotkey::parse(combo)?;

        let mut bindings = self.bindings.lock().unwrap_or_else(|e| e.into_inner());
        if !bindings.contains_key(&hotkey) {
            self.backend
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .grab(&hotkey)
                .inspect_err(|e| error!(hotkey = %hotkey, error = %e, "Failed to register hotkey"))?;
        }
        bindings.insert(hotkey, Arc::new(callback));

        info!(hotkey = %hotkey, "Hotkey registered");
        Ok(hotkey)
    }

    pub fn unregister(&self, combo: &str) -> Result<()> {
        let hotkey = Hotkey::parse(combo)?;
        let removed = self
            .bindings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&hotkey);

        if removed.is_some() {
            self.backend
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .release(&hotkey)?;
            info!(hotkey = %hotkey, "Hotkey unregistered");
        }
        Ok(())
    }

    pub fn unregister_all(&self) {
        let drained: Vec<Hotkey> = self
            .bindings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(hotkey, _)| hotkey)
            .collect();

        let mut backend = self.backend.lock().unwrap_or_else(|e| e.into_inner());
        for hotkey in drained {
            if let Err(e) = backend.release(&hotkey) {
                warn!(hotkey = %hotkey, error = %e, "Failed to release hotkey");
            }
        }
    }

    pub fn registered(&self) -> Vec<Hotkey> {
        self.bindings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Start dispatching. Starting a running service does nothing.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let running = Arc::new(AtomicBool::new(true));
        let backend = Arc::clone(&self.backend);
        let bindings = Arc::clone(&self.bindings);
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || dispatch_loop(backend, bindings, flag))
            .map_err(|e| SnipError::HotkeyBackend(format!("cannot spawn listener thread: {}", e)))?;

        self.worker = Some(Worker { running, handle });
        info!(backend = self.backend_name, "Hotkey listener started");
        Ok(())
    }

    /// Stop dispatching. Once this returns no callback will run again.
    /// Safe to call when the service was never started.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        worker.running.store(false, Ordering::SeqCst);
        if worker.handle.thread().id() == thread::current().id() {
            // Called from inside a callback: the loop exits once it returns.
            return;
        }
        if worker.handle.join().is_err() {
            error!("Hotkey listener thread panicked");
        }
        info!("Hotkey listener stopped");
    }
}

impl Drop for HotkeyService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch_loop(
    backend: Arc<Mutex<Box<dyn HotkeyBackend>>>,
    bindings: Arc<Mutex<HashMap<Hotkey, HotkeyCallback>>>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        let polled = backend
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .poll_or_block(POLL_INTERVAL);

        match polled {
            Ok(Some(hotkey)) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let callback = bindings
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(&hotkey)
                    .cloned();
                match callback {
                    Some(callback) => {
                        debug!(hotkey = %hotkey, "Hotkey pressed");
                        callback();
                    }
                    None => debug!(hotkey = %hotkey, "Pressed hotkey has no binding"),
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "Hotkey backend failed; global hotkeys disabled");
                break;
            }
        }
    }
}
