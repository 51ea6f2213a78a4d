use super::PasteBackend;
use crate::error::{Result, SnipError};
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// How long an external paste tool may run before it is killed.
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(2);

/// Ctrl+V (Cmd+V on macOS) through enigo.
///
/// The controller is created per paste; it is cheap and not `Send` everywhere.
#[derive(Debug, Default)]
pub struct EnigoPaste;

impl EnigoPaste {
    pub fn new() -> Self {
        Self
    }
}

impl PasteBackend for EnigoPaste {
    fn name(&self) -> &'static str {
        "enigo"
    }

    fn paste(&mut self) -> Result<()> {
        let mut enigo = Enigo::new(&Settings::default())
            .map_err(|e| SnipError::Enigo(format!("Failed to create keyboard controller: {}", e)))?;

        let modifier = if cfg!(target_os = "macos") {
            Key::Meta
        } else {
            Key::Control
        };

        enigo
            .key(modifier, Direction::Press)
            .map_err(|e| SnipError::Enigo(format!("Failed to press modifier: {}", e)))?;
        let clicked = enigo
            .key(Key::Unicode('v'), Direction::Click)
            .map_err(|e| SnipError::Enigo(format!("Failed to send paste key: {}", e)));
        // Always let go of the modifier, even when the click failed.
        let released = enigo
            .key(modifier, Direction::Release)
            .map_err(|e| SnipError::Enigo(format!("Failed to release modifier: {}", e)));

        clicked.and(released)
    }
}

/// External keystroke injectors for Linux sessions where synthetic input
/// from enigo is filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasteTool {
    Xdotool,
    Wtype,
    Ydotool,
}

impl PasteTool {
    pub fn program(self) -> &'static str {
        match self {
            PasteTool::Xdotool => "xdotool",
            PasteTool::Wtype => "wtype",
            PasteTool::Ydotool => "ydotool",
        }
    }

    pub fn args(self) -> &'static [&'static str] {
        match self {
            PasteTool::Xdotool => &["key", "--clearmodifiers", "ctrl+v"],
            PasteTool::Wtype => &["-M", "ctrl", "v", "-m", "ctrl"],
            // Raw evdev codes: 29 = left ctrl, 47 = v.
            PasteTool::Ydotool => &["key", "29:1", "47:1", "47:0", "29:0"],
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandPaste {
    tool: PasteTool,
    program: PathBuf,
    timeout: Duration,
}

impl CommandPaste {
    /// Find `tool` on `PATH`.
    pub fn locate(tool: PasteTool) -> Option<Self> {
        let program = which::which(tool.program()).ok()?;
        debug!(tool = tool.program(), path = %program.display(), "Found paste tool");
        Some(Self::with_program(tool, program))
    }

    pub fn with_program(tool: PasteTool, program: PathBuf) -> Self {
        Self {
            tool,
            program,
            timeout: TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tool(&self) -> PasteTool {
        self.tool
    }
}

impl PasteBackend for CommandPaste {
    fn name(&self) -> &'static str {
        self.tool.program()
    }

    fn paste(&mut self) -> Result<()> {
        run_with_timeout(
            Command::new(&self.program).args(self.tool.args()),
            self.timeout,
        )
    }
}

fn run_with_timeout(command: &mut Command, timeout: Duration) -> Result<()> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| SnipError::PasteTool(format!("cannot run {}: {}", program, e)))?;

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return if status.success() {
                Ok(())
            } else {
                Err(SnipError::PasteTool(format!("{} exited with {}", program, status)))
            };
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SnipError::PasteTool(format!(
                "{} timed out after {:?}",
                program, timeout
            )));
        }
        thread::sleep(Duration::from_millis(10));
    }
}
