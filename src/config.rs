//! Application settings.
//!
//! One JSON document under the platform config directory. Every field has a
//! default so partial files load; out-of-range values are clamped with a
//! warning rather than rejected.

use crate::error::Result;
use crate::index::write_atomically;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const APP_DIR_NAME: &str = "snipkit";
pub const CONFIG_FILENAME: &str = "config.json";
pub const SNIPPETS_DIR_NAME: &str = "snippets";
pub const CONFIG_VERSION: &str = "1.0";

pub const PALETTE_SIZE_RANGE: (u32, u32) = (200, 4096);
pub const FONT_SIZE_RANGE: (u32, u32) = (6, 72);
pub const MAX_RESTORE_DELAY_MS: u64 = 10_000;
pub const MAX_PASTE_DELAY_MS: u64 = 2_000;
pub const DEBOUNCE_RANGE_MS: (u64, u64) = (50, 5_000);

/// `<config_dir>/snipkit`, falling back to the working directory.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILENAME)
}

pub fn default_library_root() -> PathBuf {
    config_dir().join(SNIPPETS_DIR_NAME)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HotkeyBackendKind {
    #[default]
    Auto,
    Rdev,
    X11,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasteBackendKind {
    #[default]
    Auto,
    Native,
    Xdotool,
    Wtype,
    Ydotool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PalettePosition {
    #[default]
    Remember,
    Cursor,
    Fixed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    System,
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeySettings {
    pub summon_palette: String,
    pub backend: HotkeyBackendKind,
}

impl Default for HotkeySettings {
    fn default() -> Self {
        Self {
            summon_palette: "Ctrl+Shift+Space".to_string(),
            backend: HotkeyBackendKind::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaletteSettings {
    pub enabled: bool,
    pub position: PalettePosition,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
    pub hide_on_focus_loss: bool,
    pub hide_on_selection: bool,
    pub show_preview: bool,
}

impl Default for PaletteSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            position: PalettePosition::Remember,
            width: 350,
            height: 450,
            x: None,
            y: None,
            hide_on_focus_loss: true,
            hide_on_selection: true,
            show_preview: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardSettings {
    pub restore_previous: bool,
    /// How long the inserted text stays on the clipboard before the previous
    /// contents come back. A guess at how long the target app takes to read
    /// the paste; there is no completion signal to wait on.
    pub restore_delay_ms: u64,
    /// Pause between refocusing the target window and sending the paste key.
    pub paste_delay_ms: u64,
    pub paste_backend: PasteBackendKind,
}

impl Default for ClipboardSettings {
    fn default() -> Self {
        Self {
            restore_previous: true,
            restore_delay_ms: 500,
            paste_delay_ms: 150,
            paste_backend: PasteBackendKind::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    pub enabled: bool,
    pub debounce_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppearanceSettings {
    pub theme: Theme,
    pub font_family: String,
    pub font_size: u32,
}

impl Default for AppearanceSettings {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            font_family: "monospace".to_string(),
            font_size: 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupSettings {
    pub start_minimized: bool,
    pub start_on_login: bool,
}

impl Default for StartupSettings {
    fn default() -> Self {
        Self {
            start_minimized: true,
            start_on_login: false,
        }
    }
}

/// Immutable settings snapshot. Changes are made by building a new value and
/// handing it to the app, never by mutating a shared one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub version: String,
    pub hotkey: HotkeySettings,
    pub palette: PaletteSettings,
    pub clipboard: ClipboardSettings,
    pub watch: WatchSettings,
    pub appearance: AppearanceSettings,
    pub startup: StartupSettings,
    pub library_paths: Vec<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            hotkey: HotkeySettings::default(),
            palette: PaletteSettings::default(),
            clipboard: ClipboardSettings::default(),
            watch: WatchSettings::default(),
            appearance: AppearanceSettings::default(),
            startup: StartupSettings::default(),
            library_paths: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load from `path`. A missing or unreadable file yields defaults; this
    /// never fails.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(Some(config)) => {
                info!(path = %path.display(), "Loaded config");
                config
            }
            Ok(None) => {
                info!(path = %path.display(), "No config file, using defaults");
                Self::default()
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Invalid config file, using defaults");
                Self::default()
            }
        }
    }

    /// Like [`AppConfig::load`] but surfaces parse errors. `Ok(None)` when the
    /// file does not exist.
    pub fn try_load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        let mut config: AppConfig = serde_json::from_str(&text)?;
        config.validate_and_clamp();
        Ok(Some(config))
    }

    /// Write atomically, creating the parent directory as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        write_atomically(path, &serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Pull out-of-range values back into range. Returns how many fields were
    /// corrected.
    pub fn validate_and_clamp(&mut self) -> usize {
        let mut corrected = 0;

        corrected += clamp_field("palette.width", &mut self.palette.width, PALETTE_SIZE_RANGE);
        corrected += clamp_field("palette.height", &mut self.palette.height, PALETTE_SIZE_RANGE);
        corrected += clamp_field("appearance.font_size", &mut self.appearance.font_size, FONT_SIZE_RANGE);
        corrected += clamp_field(
            "clipboard.restore_delay_ms",
            &mut self.clipboard.restore_delay_ms,
            (0, MAX_RESTORE_DELAY_MS),
        );
        corrected += clamp_field(
            "clipboard.paste_delay_ms",
            &mut self.clipboard.paste_delay_ms,
            (0, MAX_PASTE_DELAY_MS),
        );
        corrected += clamp_field("watch.debounce_ms", &mut self.watch.debounce_ms, DEBOUNCE_RANGE_MS);

        if self.hotkey.summon_palette.trim().is_empty() {
            warn!("hotkey.summon_palette is empty, restoring default");
            self.hotkey.summon_palette = HotkeySettings::default().summon_palette;
            corrected += 1;
        }
        if self.appearance.font_family.trim().is_empty() {
            warn!("appearance.font_family is empty, restoring default");
            self.appearance.font_family = AppearanceSettings::default().font_family;
            corrected += 1;
        }
        if self.palette.position == PalettePosition::Fixed
            && (self.palette.x.is_none() || self.palette.y.is_none())
        {
            warn!("palette.position is fixed but x/y are not both set, using remember");
            self.palette.position = PalettePosition::Remember;
            corrected += 1;
        }

        corrected
    }

    /// Roots to scan for libraries; the platform default when none are set.
    pub fn library_roots(&self) -> Vec<PathBuf> {
        if self.library_paths.is_empty() {
            vec![default_library_root()]
        } else {
            self.library_paths.clone()
        }
    }
}

fn clamp_field<T>(name: &str, value: &mut T, (min, max): (T, T)) -> usize
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    let clamped = if *value < min {
        min
    } else if *value > max {
        max
    } else {
        return 0;
    };
    warn!(field = name, value = %value, clamped = %clamped, "Config value out of range");
    *value = clamped;
    1
}
