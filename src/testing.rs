//! In-memory stand-ins for the OS services, so tests run without a display.

use crate::app::{AppEvent, EventSender, Palette};
use crate::error::{Result, SnipError};
use crate::hotkey::{Hotkey, HotkeyBackend};
use crate::index::LibrarySet;
use crate::inserter::{ClipboardBackend, FocusTracker, PasteBackend, WindowId};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct HotkeyState {
    grabbed: HashSet<Hotkey>,
    refused: HashSet<Hotkey>,
    pressed: VecDeque<Hotkey>,
    grabs: usize,
}

/// Hotkey backend driven by [`FakeHotkeyBackend::press`].
#[derive(Clone, Default)]
pub struct FakeHotkeyBackend {
    state: Arc<Mutex<HotkeyState>>,
}

impl FakeHotkeyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, hotkey: Hotkey) {
        locked(&self.state).pressed.push_back(hotkey);
    }

    /// Make grabs of `hotkey` fail as if another program owned it.
    pub fn refuse(&self, hotkey: Hotkey) {
        locked(&self.state).refused.insert(hotkey);
    }

    pub fn grab_count(&self) -> usize {
        locked(&self.state).grabs
    }

    pub fn grabbed(&self) -> Vec<Hotkey> {
        locked(&self.state).grabbed.iter().copied().collect()
    }
}

impl HotkeyBackend for FakeHotkeyBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn grab(&mut self, hotkey: &Hotkey) -> Result<()> {
        let mut state = locked(&self.state);
        if state.refused.contains(hotkey) {
            return Err(SnipError::HotkeyTaken(hotkey.to_string()));
        }
        state.grabs += 1;
        state.grabbed.insert(*hotkey);
        Ok(())
    }

    fn release(&mut self, hotkey: &Hotkey) -> Result<()> {
        locked(&self.state).grabbed.remove(hotkey);
        Ok(())
    }

    fn poll_or_block(&mut self, timeout: Duration) -> Result<Option<Hotkey>> {
        {
            let mut state = locked(&self.state);
            if let Some(hotkey) = state.pressed.pop_front() {
                return Ok(state.grabbed.contains(&hotkey).then_some(hotkey));
            }
        }
        thread::sleep(timeout.min(Duration::from_millis(5)));
        Ok(None)
    }
}

#[derive(Default)]
struct ClipboardState {
    text: Option<String>,
    fail_writes: bool,
}

#[derive(Clone, Default)]
pub struct FakeClipboard {
    state: Arc<Mutex<ClipboardState>>,
}

impl FakeClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: &str) -> Self {
        let clipboard = Self::new();
        clipboard.set(text);
        clipboard
    }

    pub fn text(&self) -> Option<String> {
        locked(&self.state).text.clone()
    }

    /// Change the contents from "another application".
    pub fn set(&self, text: &str) {
        locked(&self.state).text = Some(text.to_string());
    }

    pub fn fail_writes(&self) {
        locked(&self.state).fail_writes = true;
    }
}

impl ClipboardBackend for FakeClipboard {
    fn get_text(&mut self) -> Result<Option<String>> {
        Ok(self.text())
    }

    fn set_text(&mut self, text: &str) -> Result<()> {
        let mut state = locked(&self.state);
        if state.fail_writes {
            return Err(SnipError::Clipboard("clipboard is locked".to_string()));
        }
        state.text = Some(text.to_string());
        Ok(())
    }
}

/// Records what the "focused application" received on each paste.
#[derive(Clone)]
pub struct FakePaste {
    clipboard: FakeClipboard,
    seen: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl FakePaste {
    pub fn new(clipboard: &FakeClipboard) -> Self {
        Self {
            clipboard: clipboard.clone(),
            seen: Arc::default(),
            fail: false,
        }
    }

    pub fn failing(clipboard: &FakeClipboard) -> Self {
        Self {
            fail: true,
            ..Self::new(clipboard)
        }
    }

    pub fn seen(&self) -> Vec<String> {
        locked(&self.seen).clone()
    }
}

impl PasteBackend for FakePaste {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn paste(&mut self) -> Result<()> {
        if self.fail {
            return Err(SnipError::PasteTool("no paste tool".to_string()));
        }
        if let Some(text) = self.clipboard.text() {
            locked(&self.seen).push(text);
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakeFocus {
    active: Arc<Mutex<Option<WindowId>>>,
    activations: Arc<Mutex<Vec<WindowId>>>,
}

impl FakeFocus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, window: Option<WindowId>) {
        *locked(&self.active) = window;
    }

    pub fn activations(&self) -> Vec<WindowId> {
        locked(&self.activations).clone()
    }
}

impl FocusTracker for FakeFocus {
    fn active_window(&mut self) -> Result<Option<WindowId>> {
        Ok(*locked(&self.active))
    }

    fn activate(&mut self, window: WindowId) -> Result<()> {
        locked(&self.activations).push(window);
        *locked(&self.active) = Some(window);
        Ok(())
    }
}

#[derive(Default)]
struct PaletteState {
    shows: usize,
    refreshes: usize,
    snapshot: Option<Arc<LibrarySet>>,
}

/// Palette that counts calls and optionally "picks" the first snippet.
#[derive(Clone, Default)]
pub struct RecordingPalette {
    state: Arc<Mutex<PaletteState>>,
    pick_first: bool,
}

impl RecordingPalette {
    pub fn picking_first() -> Self {
        Self {
            pick_first: true,
            ..Self::default()
        }
    }

    pub fn shows(&self) -> usize {
        locked(&self.state).shows
    }

    pub fn refreshes(&self) -> usize {
        locked(&self.state).refreshes
    }
}

impl Palette for RecordingPalette {
    fn show(&mut self, events: &EventSender) {
        let mut state = locked(&self.state);
        state.shows += 1;
        if !self.pick_first {
            return;
        }
        let first = state
            .snapshot
            .as_ref()
            .and_then(|s| s.all_snippets().into_iter().next());
        if let Some(snippet) = first {
            let _ = events.send(AppEvent::Insert(snippet));
        }
    }

    fn refresh(&mut self, snapshot: Arc<LibrarySet>) {
        let mut state = locked(&self.state);
        state.refreshes += 1;
        state.snapshot = Some(snapshot);
    }
}

/// Write a minimal valid library file.
pub fn write_library(path: &Path, name: &str, snippets: &[(&str, &str, &str)]) {
    let snippets: Vec<serde_json::Value> = snippets
        .iter()
        .map(|(id, name, content)| serde_json::json!({ "id": id, "name": name, "content": content }))
        .collect();
    let doc = serde_json::json!({ "name": name, "language": "text", "snippets": snippets });
    std::fs::write(path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
}
