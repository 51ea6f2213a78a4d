use super::{Hotkey, HotkeyBackend, Key, Modifiers};
use crate::error::{Result, SnipError};
use rdev::{EventType, Key as RdevKey};
use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, error};

enum ListenerMessage {
    Pressed(Hotkey),
    Failed(String),
}

/// Hotkeys seen through rdev's global input hook.
///
/// rdev cannot stop a running `listen`, so the hook thread is spawned on the
/// first poll and lives for the rest of the process. Only grabbed combos are
/// forwarded.
pub struct RdevBackend {
    grabbed: Arc<Mutex<HashSet<Hotkey>>>,
    tx: Sender<ListenerMessage>,
    rx: Receiver<ListenerMessage>,
    listening: bool,
}

impl RdevBackend {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            grabbed: Arc::new(Mutex::new(HashSet::new())),
            tx,
            rx,
            listening: false,
        }
    }

    fn spawn_listener(&mut self) -> Result<()> {
        let grabbed = Arc::clone(&self.grabbed);
        let tx = self.tx.clone();

        thread::Builder::new()
            .name("rdev-hook".to_string())
            .spawn(move || {
                let mut held = Modifiers::NONE;
                let events = tx.clone();
                let callback = move |event: rdev::Event| match event.event_type {
                    EventType::KeyPress(key) => {
                        if let Some(modifier) = modifier_of(key) {
                            held.insert(modifier);
                            return;
                        }
                        let Some(key) = key_of(key) else {
                            return;
                        };
                        let hotkey = Hotkey::new(held, key);
                        let wanted = grabbed
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .contains(&hotkey);
                        if wanted {
                            let _ = events.send(ListenerMessage::Pressed(hotkey));
                        }
                    }
                    EventType::KeyRelease(key) => {
                        if let Some(modifier) = modifier_of(key) {
                            held.remove(modifier);
                        }
                    }
                    _ => {}
                };

                if let Err(e) = rdev::listen(callback) {
                    error!(error = ?e, "rdev listener stopped");
                    let _ = tx.send(ListenerMessage::Failed(format!("{:?}", e)));
                }
            })
            .map_err(|e| SnipError::HotkeyBackend(format!("cannot spawn rdev hook: {}", e)))?;

        self.listening = true;
        debug!("rdev hook thread spawned");
        Ok(())
    }
}

impl Default for RdevBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HotkeyBackend for RdevBackend {
    fn name(&self) -> &'static str {
        "rdev"
    }

    fn grab(&mut self, hotkey: &Hotkey) -> Result<()> {
        if let Key::F(n) = hotkey.key {
            if n > 12 {
                return Err(SnipError::HotkeyBackend(format!(
                    "{} cannot be observed through rdev",
                    hotkey
                )));
            }
        }
        self.grabbed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(*hotkey);
        Ok(())
    }

    fn release(&mut self, hotkey: &Hotkey) -> Result<()> {
        self.grabbed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(hotkey);
        Ok(())
    }

    fn poll_or_block(&mut self, timeout: Duration) -> Result<Option<Hotkey>> {
        if !self.listening {
            self.spawn_listener()?;
        }

        match self.rx.recv_timeout(timeout) {
            Ok(ListenerMessage::Pressed(hotkey)) => Ok(Some(hotkey)),
            Ok(ListenerMessage::Failed(reason)) => Err(SnipError::HotkeyBackend(reason)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            // We hold a sender ourselves, so this cannot happen while self lives.
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }
}

fn modifier_of(key: RdevKey) -> Option<Modifiers> {
    match key {
        RdevKey::ControlLeft | RdevKey::ControlRight => Some(Modifiers::CTRL),
        RdevKey::Alt | RdevKey::AltGr => Some(Modifiers::ALT),
        RdevKey::ShiftLeft | RdevKey::ShiftRight => Some(Modifiers::SHIFT),
        RdevKey::MetaLeft | RdevKey::MetaRight => Some(Modifiers::SUPER),
        _ => None,
    }
}

fn key_of(key: RdevKey) -> Option<Key> {
    let key = match key {
        RdevKey::KeyA => Key::Letter('a'),
        RdevKey::KeyB => Key::Letter('b'),
        RdevKey::KeyC => Key::Letter('c'),
        RdevKey::KeyD => Key::Letter('d'),
        RdevKey::KeyE => Key::Letter('e'),
        RdevKey::KeyF => Key::Letter('f'),
        RdevKey::KeyG => Key::Letter('g'),
        RdevKey::KeyH => Key::Letter('h'),
        RdevKey::KeyI => Key::Letter('i'),
        RdevKey::KeyJ => Key::Letter('j'),
        RdevKey::KeyK => Key::Letter('k'),
        RdevKey::KeyL => Key::Letter('l'),
        RdevKey::KeyM => Key::Letter('m'),
        RdevKey::KeyN => Key::Letter('n'),
        RdevKey::KeyO => Key::Letter('o'),
        RdevKey::KeyP => Key::Letter('p'),
        RdevKey::KeyQ => Key::Letter('q'),
        RdevKey::KeyR => Key::Letter('r'),
        RdevKey::KeyS => Key::Letter('s'),
        RdevKey::KeyT => Key::Letter('t'),
        RdevKey::KeyU => Key::Letter('u'),
        RdevKey::KeyV => Key::Letter('v'),
        RdevKey::KeyW => Key::Letter('w'),
        RdevKey::KeyX => Key::Letter('x'),
        RdevKey::KeyY => Key::Letter('y'),
        RdevKey::KeyZ => Key::Letter('z'),
        RdevKey::Num0 => Key::Digit('0'),
        RdevKey::Num1 => Key::Digit('1'),
        RdevKey::Num2 => Key::Digit('2'),
        RdevKey::Num3 => Key::Digit('3'),
        RdevKey::Num4 => Key::Digit('4'),
        RdevKey::Num5 => Key::Digit('5'),
        RdevKey::Num6 => Key::Digit('6'),
        RdevKey::Num7 => Key::Digit('7'),
        RdevKey::Num8 => Key::Digit('8'),
        RdevKey::Num9 => Key::Digit('9'),
        RdevKey::F1 => Key::F(1),
        RdevKey::F2 => Key::F(2),
        RdevKey::F3 => Key::F(3),
        RdevKey::F4 => Key::F(4),
        RdevKey::F5 => Key::F(5),
        RdevKey::F6 => Key::F(6),
        RdevKey::F7 => Key::F(7),
        RdevKey::F8 => Key::F(8),
        RdevKey::F9 => Key::F(9),
        RdevKey::F10 => Key::F(10),
        RdevKey::F11 => Key::F(11),
        RdevKey::F12 => Key::F(12),
        RdevKey::Space => Key::Space,
        RdevKey::Return => Key::Enter,
        RdevKey::Tab => Key::Tab,
        RdevKey::Escape => Key::Escape,
        RdevKey::Backspace => Key::Backspace,
        RdevKey::Delete => Key::Delete,
        RdevKey::Insert => Key::Insert,
        RdevKey::Home => Key::Home,
        RdevKey::End => Key::End,
        RdevKey::PageUp => Key::PageUp,
        RdevKey::PageDown => Key::PageDown,
        RdevKey::UpArrow => Key::Up,
        RdevKey::DownArrow => Key::Down,
        RdevKey::LeftArrow => Key::Left,
        RdevKey::RightArrow => Key::Right,
        _ => return None,
    };
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_keys_and_modifiers() {
        assert_eq!(key_of(RdevKey::KeyK), Some(Key::Letter('k')));
        assert_eq!(key_of(RdevKey::Return), Some(Key::Enter));
        assert_eq!(key_of(RdevKey::ShiftLeft), None);
        assert_eq!(modifier_of(RdevKey::ControlRight), Some(Modifiers::CTRL));
        assert_eq!(modifier_of(RdevKey::KeyA), None);
    }

    #[test]
    fn high_function_keys_are_refused() {
        let mut backend = RdevBackend::new();
        let f13 = Hotkey::parse("Ctrl+F13").unwrap();
        assert!(backend.grab(&f13).is_err());
        assert!(backend.grab(&Hotkey::parse("Ctrl+F12").unwrap()).is_ok());
    }
}
