use crate::error::ParseError;
use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Modifiers in canonical serialization order
const MODIFIER_NAMES: [(Modifiers, &str, PhysicalKey); 4] = [
    (Modifiers::CONTROL, "Ctrl", PhysicalKey::Control),
    (Modifiers::ALT, "Alt", PhysicalKey::Alt),
    (Modifiers::SHIFT, "Shift", PhysicalKey::Shift),
    (Modifiers::SUPER, "Win", PhysicalKey::Win),
];

/// Canonical key names. The first entry for a code is the one we print.
///
/// Only keys whose physical state can be polled are listed; a key the
/// release detector cannot see (F21-F24, PrintScreen, Pause, ...) would never
/// release correctly, so it does not parse.
pub(crate) const KEY_NAMES: &[(&str, Code)] = &[
    ("A", Code::KeyA),
    ("B", Code::KeyB),
    ("C", Code::KeyC),
    ("D", Code::KeyD),
    ("E", Code::KeyE),
    ("F", Code::KeyF),
    ("G", Code::KeyG),
    ("H", Code::KeyH),
    ("I", Code::KeyI),
    ("J", Code::KeyJ),
    ("K", Code::KeyK),
    ("L", Code::KeyL),
    ("M", Code::KeyM),
    ("N", Code::KeyN),
    ("O", Code::KeyO),
    ("P", Code::KeyP),
    ("Q", Code::KeyQ),
    ("R", Code::KeyR),
    ("S", Code::KeyS),
    ("T", Code::KeyT),
    ("U", Code::KeyU),
    ("V", Code::KeyV),
    ("W", Code::KeyW),
    ("X", Code::KeyX),
    ("Y", Code::KeyY),
    ("Z", Code::KeyZ),
    ("0", Code::Digit0),
    ("1", Code::Digit1),
    ("2", Code::Digit2),
    ("3", Code::Digit3),
    ("4", Code::Digit4),
    ("5", Code::Digit5),
    ("6", Code::Digit6),
    ("7", Code::Digit7),
    ("8", Code::Digit8),
    ("9", Code::Digit9),
    ("F1", Code::F1),
    ("F2", Code::F2),
    ("F3", Code::F3),
    ("F4", Code::F4),
    ("F5", Code::F5),
    ("F6", Code::F6),
    ("F7", Code::F7),
    ("F8", Code::F8),
    ("F9", Code::F9),
    ("F10", Code::F10),
    ("F11", Code::F11),
    ("F12", Code::F12),
    ("F13", Code::F13),
    ("F14", Code::F14),
    ("F15", Code::F15),
    ("F16", Code::F16),
    ("F17", Code::F17),
    ("F18", Code::F18),
    ("F19", Code::F19),
    ("F20", Code::F20),
    ("Space", Code::Space),
    ("Enter", Code::Enter),
    ("Tab", Code::Tab),
    ("Escape", Code::Escape),
    ("Backspace", Code::Backspace),
    ("Delete", Code::Delete),
    ("Insert", Code::Insert),
    ("Home", Code::Home),
    ("End", Code::End),
    ("PageUp", Code::PageUp),
    ("PageDown", Code::PageDown),
    ("CapsLock", Code::CapsLock),
    ("Up", Code::ArrowUp),
    ("Down", Code::ArrowDown),
    ("Left", Code::ArrowLeft),
    ("Right", Code::ArrowRight),
    ("Minus", Code::Minus),
    ("Equal", Code::Equal),
    ("BracketLeft", Code::BracketLeft),
    ("BracketRight", Code::BracketRight),
    ("Backslash", Code::Backslash),
    ("Semicolon", Code::Semicolon),
    ("Quote", Code::Quote),
    ("Comma", Code::Comma),
    ("Period", Code::Period),
    ("Slash", Code::Slash),
    ("Backquote", Code::Backquote),
    ("Numpad0", Code::Numpad0),
    ("Numpad1", Code::Numpad1),
    ("Numpad2", Code::Numpad2),
    ("Numpad3", Code::Numpad3),
    ("Numpad4", Code::Numpad4),
    ("Numpad5", Code::Numpad5),
    ("Numpad6", Code::Numpad6),
    ("Numpad7", Code::Numpad7),
    ("Numpad8", Code::Numpad8),
    ("Numpad9", Code::Numpad9),
    ("NumpadAdd", Code::NumpadAdd),
    ("NumpadSubtract", Code::NumpadSubtract),
    ("NumpadMultiply", Code::NumpadMultiply),
    ("NumpadDivide", Code::NumpadDivide),
    ("NumpadDecimal", Code::NumpadDecimal),
    ("NumpadEnter", Code::NumpadEnter),
    ("NumpadEqual", Code::NumpadEqual),
];

/// Alternative spellings accepted on input only
const KEY_ALIASES: &[(&str, Code)] = &[
    ("d0", Code::Digit0),
    ("d1", Code::Digit1),
    ("d2", Code::Digit2),
    ("d3", Code::Digit3),
    ("d4", Code::Digit4),
    ("d5", Code::Digit5),
    ("d6", Code::Digit6),
    ("d7", Code::Digit7),
    ("d8", Code::Digit8),
    ("d9", Code::Digit9),
    ("digit0", Code::Digit0),
    ("digit1", Code::Digit1),
    ("digit2", Code::Digit2),
    ("digit3", Code::Digit3),
    ("digit4", Code::Digit4),
    ("digit5", Code::Digit5),
    ("digit6", Code::Digit6),
    ("digit7", Code::Digit7),
    ("digit8", Code::Digit8),
    ("digit9", Code::Digit9),
    ("return", Code::Enter),
    ("esc", Code::Escape),
    ("back", Code::Backspace),
    ("del", Code::Delete),
    ("ins", Code::Insert),
    ("pgup", Code::PageUp),
    ("prior", Code::PageUp),
    ("pgdn", Code::PageDown),
    ("next", Code::PageDown),
    ("arrowup", Code::ArrowUp),
    ("arrowdown", Code::ArrowDown),
    ("arrowleft", Code::ArrowLeft),
    ("arrowright", Code::ArrowRight),
    ("grave", Code::Backquote),
    ("add", Code::NumpadAdd),
    ("subtract", Code::NumpadSubtract),
    ("multiply", Code::NumpadMultiply),
    ("divide", Code::NumpadDivide),
    ("decimal", Code::NumpadDecimal),
    ("caps", Code::CapsLock),
    ("capital", Code::CapsLock),
];

/// A physical key whose live state can be queried.
///
/// Modifiers are side-agnostic: either the left or the right key counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalKey {
    Control,
    Alt,
    Shift,
    Win,
    Code(Code),
}

/// A parsed keybinding: a modifier set plus exactly one non-modifier key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    pub modifiers: Modifiers,
    pub code: Code,
}

impl Key {
    /// Create a new Key with the given modifiers and code
    pub fn new(modifiers: Modifiers, code: Code) -> Self {
        Key { modifiers, code }
    }

    /// Parse a keybinding string such as `"F1"` or `"Ctrl+Shift+T"`.
    ///
    /// Tokens are separated by `+`, trimmed, and matched case-insensitively.
    /// Every token but the last must be a modifier (`Ctrl`/`Control`, `Alt`,
    /// `Shift`, `Win`/`Windows`); the last is the key.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let parts: Vec<&str> = s.split('+').map(str::trim).collect();
        let Some((key_part, modifier_parts)) = parts.split_last() else {
            return Err(ParseError::InvalidKey(s.to_string()));
        };

        let mut modifiers = Modifiers::empty();
        for part in modifier_parts {
            modifiers |= parse_modifier(part)?;
        }

        let code = parse_code(key_part)?;
        Ok(Key { modifiers, code })
    }

    /// Convert this Key to a global_hotkey HotKey
    pub fn to_hotkey(&self) -> HotKey {
        let mods = (!self.modifiers.is_empty()).then_some(self.modifiers);
        HotKey::new(mods, self.code)
    }

    /// The keys that must all be held for this binding to count as pressed
    pub fn physical_keys(&self) -> Vec<PhysicalKey> {
        let mut keys: Vec<PhysicalKey> = MODIFIER_NAMES
            .iter()
            .filter(|(m, _, _)| self.modifiers.contains(*m))
            .map(|(_, _, physical)| *physical)
            .collect();
        keys.push(PhysicalKey::Code(self.code));
        keys
    }
}

impl From<Key> for HotKey {
    fn from(key: Key) -> Self {
        key.to_hotkey()
    }
}

impl From<&Key> for HotKey {
    fn from(key: &Key) -> Self {
        key.to_hotkey()
    }
}

impl TryFrom<&str> for Key {
    type Error = ParseError;

    fn try_from(s: &str) -> Result<Self, ParseError> {
        Key::parse(s)
    }
}

impl TryFrom<String> for Key {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, ParseError> {
        Key::parse(&s)
    }
}

impl FromStr for Key {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, ParseError> {
        Key::parse(s)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (modifier, name, _) in MODIFIER_NAMES {
            if self.modifiers.contains(modifier) {
                write!(f, "{name}+")?;
            }
        }
        match code_name(self.code) {
            Some(name) => f.write_str(name),
            None => write!(f, "{:?}", self.code),
        }
    }
}

impl Serialize for Key {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Key::parse(&s).map_err(serde::de::Error::custom)
    }
}

fn parse_modifier(s: &str) -> Result<Modifiers, ParseError> {
    match s.to_lowercase().as_str() {
        "ctrl" | "control" => Ok(Modifiers::CONTROL),
        "alt" => Ok(Modifiers::ALT),
        "shift" => Ok(Modifiers::SHIFT),
        "win" | "windows" => Ok(Modifiers::SUPER),
        _ => Err(ParseError::InvalidModifier(s.to_string())),
    }
}

/// Resolve a key token. There is no entry for the null key, so `"none"` fails.
fn parse_code(s: &str) -> Result<Code, ParseError> {
    KEY_NAMES
        .iter()
        .chain(KEY_ALIASES)
        .find(|(name, _)| name.eq_ignore_ascii_case(s))
        .map(|(_, code)| *code)
        .ok_or_else(|| ParseError::InvalidKey(s.to_string()))
}

fn code_name(code: Code) -> Option<&'static str> {
    KEY_NAMES
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(name, _)| *name)
}
