//! snipkit - snippet libraries on a global hotkey.
//!
//! Snippet libraries are JSON files on disk. They are loaded into an index
//! that the palette searches, reloaded when the files change, and the chosen
//! snippet is pasted into whatever application had focus.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod hotkey;
pub mod index;
pub mod inserter;
pub mod loader;
pub mod models;
pub mod ui;
pub mod watcher;

#[cfg(test)]
mod testing;

// Re-export
pub use app::{App, AppEvent, Palette};
pub use config::AppConfig;
pub use error::{Result, SnipError};
pub use hotkey::{Hotkey, HotkeyBackend, HotkeyService};
pub use index::{LibraryManager, LibrarySet};
pub use inserter::{Insertion, PasteBackend, TextInserter};
pub use loader::{load, load_all, LoadFailure, LoadReport};
pub use models::{Library, Snippet};
pub use watcher::LibraryWatcher;
