use super::ClipboardBackend;
use crate::error::{Result, SnipError};
use arboard::Clipboard;

/// The system clipboard through arboard.
///
/// One instance lives as long as the inserter: on X11 the process that set
/// the selection must keep serving it, so a short-lived handle would drop
/// the text before the paste reads it.
pub struct ArboardClipboard {
    inner: Clipboard,
}

impl ArboardClipboard {
    pub fn new() -> Result<Self> {
        let inner = Clipboard::new().map_err(|e| SnipError::Clipboard(e.to_string()))?;
        Ok(Self { inner })
    }
}

impl ClipboardBackend for ArboardClipboard {
    fn get_text(&mut self) -> Result<Option<String>> {
        match self.inner.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(SnipError::Clipboard(e.to_string())),
        }
    }

    fn set_text(&mut self, text: &str) -> Result<()> {
        self.inner
            .set_text(text)
            .map_err(|e| SnipError::Clipboard(e.to_string()))
    }
}

/// Copy `text` to the clipboard once, for the CLI.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    ArboardClipboard::new()?.set_text(text)
}
