use super::{Hotkey, HotkeyBackend, Key, Modifiers};
use crate::error::{Result, SnipError};
use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::xproto::{ConnectionExt, GrabMode, Keycode, ModMask, Window};
use x11rb::protocol::{ErrorKind, Event};
use x11rb::rust_connection::RustConnection;

const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// Passive key grabs on the root window.
///
/// The grab is exclusive: the focused application never sees the combo, and a
/// combo another client already grabbed is reported as taken.
pub struct X11GrabBackend {
    conn: RustConnection,
    root: Window,
    keymap: HashMap<u32, Keycode>,
    grabs: HashMap<(Keycode, u16), Hotkey>,
}

impl X11GrabBackend {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None)
            .map_err(|e| SnipError::HotkeyBackend(format!("cannot connect to X display: {}", e)))?;
        let root = conn.setup().roots[screen_num].root;
        let keymap = load_keymap(&conn)?;

        info!(keysyms = keymap.len(), "Connected to X display for key grabbing");
        Ok(Self {
            conn,
            root,
            keymap,
            grabs: HashMap::new(),
        })
    }

    fn keycode_for(&self, hotkey: &Hotkey) -> Result<Keycode> {
        let keysym = keysym_of(hotkey.key);
        self.keymap.get(&keysym).copied().ok_or_else(|| {
            SnipError::HotkeyBackend(format!("no keycode for {} in the current keymap", hotkey.key))
        })
    }
}

impl HotkeyBackend for X11GrabBackend {
    fn name(&self) -> &'static str {
        "x11-grab"
    }

    fn grab(&mut self, hotkey: &Hotkey) -> Result<()> {
        let keycode = self.keycode_for(hotkey)?;
        let base = mod_mask_of(hotkey.modifiers);
        if self.grabs.contains_key(&(keycode, base)) {
            return Ok(());
        }

        // Grab once per lock-key state so CapsLock or NumLock don't hide the combo.
        for extra in lock_variants() {
            let cookie = self
                .conn
                .grab_key(
                    false,
                    self.root,
                    ModMask::from(base | extra),
                    keycode,
                    GrabMode::ASYNC,
                    GrabMode::ASYNC,
                )
                .map_err(|e| SnipError::HotkeyBackend(e.to_string()))?;

            match cookie.check() {
                Ok(()) => {}
                Err(ReplyError::X11Error(err)) if err.error_kind == ErrorKind::Access => {
                    self.ungrab_variants(keycode, base);
                    return Err(SnipError::HotkeyTaken(hotkey.to_string()));
                }
                Err(e) => {
                    self.ungrab_variants(keycode, base);
                    return Err(SnipError::HotkeyBackend(e.to_string()));
                }
            }
        }

        self.grabs.insert((keycode, base), *hotkey);
        debug!(hotkey = %hotkey, keycode, "Key grabbed");
        Ok(())
    }

    fn release(&mut self, hotkey: &Hotkey) -> Result<()> {
        let keycode = self.keycode_for(hotkey)?;
        let base = mod_mask_of(hotkey.modifiers);
        if self.grabs.remove(&(keycode, base)).is_some() {
            self.ungrab_variants(keycode, base);
            self.conn
                .flush()
                .map_err(|e| SnipError::HotkeyBackend(e.to_string()))?;
        }
        Ok(())
    }

    fn poll_or_block(&mut self, timeout: Duration) -> Result<Option<Hotkey>> {
        let deadline = Instant::now() + timeout;
        loop {
            let event = self
                .conn
                .poll_for_event()
                .map_err(|e| SnipError::HotkeyBackend(format!("X connection lost: {}", e)))?;

            match event {
                Some(Event::KeyPress(press)) => {
                    let state = u16::from(press.state) & relevant_mask();
                    if let Some(hotkey) = self.grabs.get(&(press.detail, state)) {
                        return Ok(Some(*hotkey));
                    }
                }
                Some(_) => {}
                None => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    thread::sleep(IDLE_SLEEP);
                }
            }
        }
    }
}

impl X11GrabBackend {
    fn ungrab_variants(&self, keycode: Keycode, base: u16) {
        for extra in lock_variants() {
            let _ = self
                .conn
                .ungrab_key(keycode, self.root, ModMask::from(base | extra));
        }
    }
}

impl Drop for X11GrabBackend {
    fn drop(&mut self) {
        let grabs: Vec<(Keycode, u16)> = self.grabs.keys().copied().collect();
        for (keycode, base) in grabs {
            self.ungrab_variants(keycode, base);
        }
        let _ = self.conn.flush();
    }
}

fn load_keymap(conn: &RustConnection) -> Result<HashMap<u32, Keycode>> {
    let setup = conn.setup();
    let (min, max) = (setup.min_keycode, setup.max_keycode);
    let mapping = conn
        .get_keyboard_mapping(min, max - min + 1)
        .map_err(|e| SnipError::HotkeyBackend(e.to_string()))?
        .reply()
        .map_err(|e| SnipError::HotkeyBackend(e.to_string()))?;

    let per = usize::from(mapping.keysyms_per_keycode.max(1));
    let mut keymap = HashMap::new();
    for (offset, syms) in mapping.keysyms.chunks(per).enumerate() {
        let Ok(offset) = u8::try_from(offset) else {
            break;
        };
        let keycode = min.saturating_add(offset);
        for &sym in syms.iter().filter(|&&s| s != 0) {
            keymap.entry(sym).or_insert(keycode);
        }
    }
    Ok(keymap)
}

fn relevant_mask() -> u16 {
    u16::from(ModMask::CONTROL | ModMask::SHIFT | ModMask::M1 | ModMask::M4)
}

fn lock_variants() -> [u16; 4] {
    let caps = u16::from(ModMask::LOCK);
    let num = u16::from(ModMask::M2);
    [0, caps, num, caps | num]
}

fn mod_mask_of(modifiers: Modifiers) -> u16 {
    let mut mask = 0;
    if modifiers.contains(Modifiers::CTRL) {
        mask |= u16::from(ModMask::CONTROL);
    }
    if modifiers.contains(Modifiers::SHIFT) {
        mask |= u16::from(ModMask::SHIFT);
    }
    if modifiers.contains(Modifiers::ALT) {
        mask |= u16::from(ModMask::M1);
    }
    if modifiers.contains(Modifiers::SUPER) {
        mask |= u16::from(ModMask::M4);
    }
    mask
}

fn keysym_of(key: Key) -> u32 {
    match key {
        Key::Letter(c) | Key::Digit(c) => c as u32,
        Key::F(n) => 0xffbe + u32::from(n) - 1,
        Key::Space => 0x0020,
        Key::Enter => 0xff0d,
        Key::Tab => 0xff09,
        Key::Escape => 0xff1b,
        Key::Backspace => 0xff08,
        Key::Delete => 0xffff,
        Key::Insert => 0xff63,
        Key::Home => 0xff50,
        Key::End => 0xff57,
        Key::PageUp => 0xff55,
        Key::PageDown => 0xff56,
        Key::Left => 0xff51,
        Key::Up => 0xff52,
        Key::Right => 0xff53,
        Key::Down => 0xff54,
    }
}
