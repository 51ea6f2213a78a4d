//! Puts snippet text into whichever application has focus.
//!
//! Text goes through the clipboard followed by a synthetic paste keystroke,
//! never by typing characters one by one, so input methods and keyboard
//! layouts cannot mangle it. Each step logs and degrades on its own.

mod clipboard;
mod focus;
mod paste;

pub use clipboard::{copy_to_clipboard, ArboardClipboard};
pub use focus::NoFocusTracking;
#[cfg(target_os = "linux")]
pub use focus::X11Focus;
pub use paste::{CommandPaste, EnigoPaste, PasteTool};

use crate::config::{ClipboardSettings, PasteBackendKind};
use crate::error::{Result, SnipError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Opaque handle for a top-level window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

pub trait ClipboardBackend: Send {
    /// Current text contents, `None` when the clipboard holds no text.
    fn get_text(&mut self) -> Result<Option<String>>;

    fn set_text(&mut self, text: &str) -> Result<()>;
}

pub trait PasteBackend: Send {
    fn name(&self) -> &'static str;

    /// Send the platform paste keystroke to the focused window.
    fn paste(&mut self) -> Result<()>;
}

pub trait FocusTracker: Send {
    fn active_window(&mut self) -> Result<Option<WindowId>>;

    fn activate(&mut self, window: WindowId) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InserterSettings {
    pub restore_previous: bool,
    pub restore_delay: Duration,
    pub paste_delay: Duration,
}

impl From<&ClipboardSettings> for InserterSettings {
    fn from(settings: &ClipboardSettings) -> Self {
        Self {
            restore_previous: settings.restore_previous,
            restore_delay: Duration::from_millis(settings.restore_delay_ms),
            paste_delay: Duration::from_millis(settings.paste_delay_ms),
        }
    }
}

impl Default for InserterSettings {
    fn default() -> Self {
        Self::from(&ClipboardSettings::default())
    }
}

type SharedClipboard = Arc<Mutex<Box<dyn ClipboardBackend>>>;

/// Outcome of a successful [`TextInserter::insert`].
///
/// Holds the deferred clipboard restore, if one was scheduled. Dropping it
/// lets the restore run detached.
#[derive(Debug)]
pub struct Insertion {
    restore: Option<JoinHandle<()>>,
}

impl Insertion {
    pub fn restore_pending(&self) -> bool {
        self.restore.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Block until the deferred restore (if any) has run.
    pub fn wait(self) {
        if let Some(handle) = self.restore {
            if handle.join().is_err() {
                error!("Clipboard restore thread panicked");
            }
        }
    }
}

pub struct TextInserter {
    clipboard: SharedClipboard,
    paste: Box<dyn PasteBackend>,
    focus: Box<dyn FocusTracker>,
    settings: InserterSettings,
    remembered: Option<WindowId>,
}

impl TextInserter {
    /// Build with platform backends chosen once for this session.
    pub fn new(settings: &ClipboardSettings) -> Result<Self> {
        let clipboard = ArboardClipboard::new()?;
        Ok(Self::with_backends(
            Box::new(clipboard),
            select_paste_backend(settings.paste_backend),
            select_focus_tracker(),
            InserterSettings::from(settings),
        ))
    }

    pub fn with_backends(
        clipboard: Box<dyn ClipboardBackend>,
        paste: Box<dyn PasteBackend>,
        focus: Box<dyn FocusTracker>,
        settings: InserterSettings,
    ) -> Self {
        info!(paste = paste.name(), "Text inserter ready");
        Self {
            clipboard: Arc::new(Mutex::new(clipboard)),
            paste,
            focus,
            settings,
            remembered: None,
        }
    }

    pub fn settings(&self) -> InserterSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: InserterSettings) {
        self.settings = settings;
    }

    pub fn paste_backend_name(&self) -> &'static str {
        self.paste.name()
    }

    /// Note the window that has focus now so the next insert can return to it.
    /// Call before our own UI takes focus.
    pub fn remember_focus(&mut self) {
        self.remembered = match self.focus.active_window() {
            Ok(window) => window,
            Err(e) => {
                warn!(error = %e, "Could not read the active window");
                None
            }
        };
        debug!(window = ?self.remembered, "Remembered focus");
    }

    pub fn remembered_window(&self) -> Option<WindowId> {
        self.remembered
    }

    pub fn insert(&mut self, text: &str) -> Result<Insertion> {
        if text.is_empty() {
            return Err(SnipError::Other("nothing to insert".to_string()));
        }

        let previous = if self.settings.restore_previous {
            match self.lock_clipboard().get_text() {
                Ok(previous) => previous,
                Err(e) => {
                    warn!(error = %e, "Could not read clipboard, it will not be restored");
                    None
                }
            }
        } else {
            None
        };

        self.lock_clipboard()
            .set_text(text)
            .inspect_err(|e| error!(error = %e, "Failed to write clipboard"))?;
        debug!(chars = text.chars().count(), "Clipboard written");

        if let Some(target) = self.remembered.take() {
            self.refocus(target);
        }
        thread::sleep(self.settings.paste_delay);

        if let Err(e) = self.paste.paste() {
            error!(backend = self.paste.name(), error = %e, "Paste keystroke failed");
            if let Some(previous) = previous {
                if let Err(e) = self.lock_clipboard().set_text(&previous) {
                    warn!(error = %e, "Could not put the previous clipboard back");
                }
            }
            return Err(e);
        }
        info!(backend = self.paste.name(), "Snippet pasted");

        let restore = previous.map(|previous| self.schedule_restore(text.to_string(), previous));
        Ok(Insertion { restore })
    }

    fn refocus(&mut self, target: WindowId) {
        match self.focus.active_window() {
            Ok(Some(current)) if current == target => {}
            _ => match self.focus.activate(target) {
                Ok(()) => debug!(window = ?target, "Focus restored"),
                Err(e) => warn!(window = ?target, error = %e, "Could not restore focus"),
            },
        }
    }

    fn schedule_restore(&self, inserted: String, previous: String) -> JoinHandle<()> {
        let clipboard = Arc::clone(&self.clipboard);
        let delay = self.settings.restore_delay;

        thread::spawn(move || {
            thread::sleep(delay);
            let mut clipboard = clipboard.lock().unwrap_or_else(|e| e.into_inner());
            match clipboard.get_text() {
                // Someone copied something else meanwhile; theirs wins.
                Ok(Some(current)) if current != inserted => {
                    debug!("Clipboard changed since insert, not restoring");
                }
                Ok(_) => match clipboard.set_text(&previous) {
                    Ok(()) => debug!("Clipboard restored"),
                    Err(e) => warn!(error = %e, "Failed to restore clipboard"),
                },
                Err(e) => warn!(error = %e, "Could not read clipboard before restore"),
            }
        })
    }

    fn lock_clipboard(&self) -> std::sync::MutexGuard<'_, Box<dyn ClipboardBackend>> {
        self.clipboard.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Pick the paste mechanism for this session.
pub fn select_paste_backend(kind: PasteBackendKind) -> Box<dyn PasteBackend> {
    let tool = match kind {
        PasteBackendKind::Native => return Box::new(EnigoPaste::new()),
        PasteBackendKind::Xdotool => Some(PasteTool::Xdotool),
        PasteBackendKind::Wtype => Some(PasteTool::Wtype),
        PasteBackendKind::Ydotool => Some(PasteTool::Ydotool),
        PasteBackendKind::Auto => None,
    };

    if let Some(tool) = tool {
        return match CommandPaste::locate(tool) {
            Some(backend) => Box::new(backend),
            None => {
                warn!(tool = tool.program(), "Paste tool not found, using native paste");
                Box::new(EnigoPaste::new())
            }
        };
    }

    if cfg!(target_os = "linux") {
        let candidates: &[PasteTool] = if crate::hotkey::is_wayland_session() {
            &[PasteTool::Wtype, PasteTool::Ydotool]
        } else {
            &[PasteTool::Xdotool]
        };
        if let Some(backend) = candidates.iter().find_map(|&tool| CommandPaste::locate(tool)) {
            return Box::new(backend);
        }
        warn!("No external paste tool found, native paste may not reach every window");
    }
    Box::new(EnigoPaste::new())
}

pub fn select_focus_tracker() -> Box<dyn FocusTracker> {
    #[cfg(target_os = "linux")]
    if std::env::var_os("DISPLAY").is_some() {
        match X11Focus::connect() {
            Ok(tracker) => return Box::new(tracker),
            Err(e) => warn!(error = %e, "Focus tracking unavailable"),
        }
    }
    Box::new(NoFocusTracking)
}
