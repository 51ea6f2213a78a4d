use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnipError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid hotkey '{combo}': {reason}")]
    InvalidHotkey { combo: String, reason: String },

    #[error("Hotkey {0} is already grabbed by another application")]
    HotkeyTaken(String),

    #[error("Hotkey backend error: {0}")]
    HotkeyBackend(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Keyboard controller error: {0}")]
    Enigo(String),

    #[error("Paste tool error: {0}")]
    PasteTool(String),

    #[error("Focus error: {0}")]
    Focus(String),

    #[error("Library not found: {0}")]
    LibraryNotFound(String),

    #[error("Snippet '{id}' not found in library '{library}'")]
    SnippetNotFound { library: String, id: String },

    #[error("Invalid snippet: {0}")]
    InvalidSnippet(String),

    #[error("{0} library file(s) failed to load")]
    LibrariesFailed(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Error: {0}")]
    Other(String),
}

impl From<notify::Error> for SnipError {
    fn from(err: notify::Error) -> Self {
        SnipError::Watch(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SnipError>;
