use crate::error::{Result, SnipError};
use std::fmt;
use std::str::FromStr;

/// Set of held modifier keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const CTRL: Modifiers = Modifiers(1);
    pub const ALT: Modifiers = Modifiers(1 << 1);
    pub const SHIFT: Modifiers = Modifiers(1 << 2);
    pub const SUPER: Modifiers = Modifiers(1 << 3);

    pub fn contains(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Modifiers) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Modifiers) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Modifiers) -> Modifiers {
        Modifiers(self.0 | rhs.0)
    }
}

/// The non-modifier key that completes a combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// `a`..=`z`, stored lowercase.
    Letter(char),
    /// `0`..=`9`.
    Digit(char),
    /// `F1`..=`F24`.
    F(u8),
    Space,
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
}

impl Key {
    fn parse(token: &str) -> Option<Key> {
        let lower = token.to_ascii_lowercase();
        let mut chars = lower.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c.is_ascii_lowercase() {
                return Some(Key::Letter(c));
            }
            if c.is_ascii_digit() {
                return Some(Key::Digit(c));
            }
            return None;
        }

        let key = match lower.as_str() {
            "space" => Key::Space,
            "enter" | "return" => Key::Enter,
            "tab" => Key::Tab,
            "esc" | "escape" => Key::Escape,
            "backspace" => Key::Backspace,
            "delete" | "del" => Key::Delete,
            "insert" | "ins" => Key::Insert,
            "home" => Key::Home,
            "end" => Key::End,
            "pageup" | "pgup" => Key::PageUp,
            "pagedown" | "pgdn" => Key::PageDown,
            "up" => Key::Up,
            "down" => Key::Down,
            "left" => Key::Left,
            "right" => Key::Right,
            other => {
                let n: u8 = other.strip_prefix('f')?.parse().ok()?;
                if (1..=24).contains(&n) {
                    Key::F(n)
                } else {
                    return None;
                }
            }
        };
        Some(key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Letter(c) | Key::Digit(c) => write!(f, "{}", c.to_ascii_uppercase()),
            Key::F(n) => write!(f, "F{}", n),
            Key::Space => f.write_str("Space"),
            Key::Enter => f.write_str("Enter"),
            Key::Tab => f.write_str("Tab"),
            Key::Escape => f.write_str("Esc"),
            Key::Backspace => f.write_str("Backspace"),
            Key::Delete => f.write_str("Delete"),
            Key::Insert => f.write_str("Insert"),
            Key::Home => f.write_str("Home"),
            Key::End => f.write_str("End"),
            Key::PageUp => f.write_str("PageUp"),
            Key::PageDown => f.write_str("PageDown"),
            Key::Up => f.write_str("Up"),
            Key::Down => f.write_str("Down"),
            Key::Left => f.write_str("Left"),
            Key::Right => f.write_str("Right"),
        }
    }
}

/// A parsed key combination such as `Ctrl+Shift+Space`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hotkey {
    pub modifiers: Modifiers,
    pub key: Key,
}

impl Hotkey {
    pub fn new(modifiers: Modifiers, key: Key) -> Self {
        Self { modifiers, key }
    }

    pub fn parse(combo: &str) -> Result<Hotkey> {
        let invalid = |reason: &str| SnipError::InvalidHotkey {
            combo: combo.to_string(),
            reason: reason.to_string(),
        };

        let tokens: Vec<&str> = combo
            .split('+')
            .map(|t| t.trim().trim_start_matches('<').trim_end_matches('>'))
            .collect();
        if combo.trim().is_empty() {
            return Err(invalid("combination is empty"));
        }
        if tokens.iter().any(|t| t.is_empty()) {
            return Err(invalid("empty key name between '+' separators"));
        }

        let (key_token, modifier_tokens) = tokens
            .split_last()
            .ok_or_else(|| invalid("combination is empty"))?;

        let mut modifiers = Modifiers::NONE;
        for token in modifier_tokens {
            let modifier = parse_modifier(token)
                .ok_or_else(|| invalid(&format!("'{}' is not a modifier", token)))?;
            if modifiers.contains(modifier) {
                return Err(invalid(&format!("modifier '{}' repeated", token)));
            }
            modifiers.insert(modifier);
        }

        if parse_modifier(key_token).is_some() {
            return Err(invalid("combination must end with a non-modifier key"));
        }
        let key = Key::parse(key_token)
            .ok_or_else(|| invalid(&format!("unknown key '{}'", key_token)))?;

        Ok(Hotkey { modifiers, key })
    }
}

fn parse_modifier(token: &str) -> Option<Modifiers> {
    match token.to_ascii_lowercase().as_str() {
        "ctrl" | "control" => Some(Modifiers::CTRL),
        "alt" | "option" => Some(Modifiers::ALT),
        "shift" => Some(Modifiers::SHIFT),
        "super" | "cmd" | "command" | "meta" | "win" => Some(Modifiers::SUPER),
        _ => None,
    }
}

impl FromStr for Hotkey {
    type Err = SnipError;

    fn from_str(s: &str) -> Result<Self> {
        Hotkey::parse(s)
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, name) in [
            (Modifiers::CTRL, "Ctrl"),
            (Modifiers::ALT, "Alt"),
            (Modifiers::SHIFT, "Shift"),
            (Modifiers::SUPER, "Super"),
        ] {
            if self.modifiers.contains(flag) {
                write!(f, "{}+", name)?;
            }
        }
        write!(f, "{}", self.key)
    }
}
