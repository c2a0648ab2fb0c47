//! Hotkey bindings: a base key plus an exact modifier mask.

use crate::key::{Key, KeyCode};
use anyhow::{anyhow, bail, Context, Result};

bitflags::bitflags! {
    /// Modifier keys that can be combined with a hotkey.
    ///
    /// The mask is always compared as a whole: `CONTROL` does not match
    /// `CONTROL | SHIFT`.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        const ALT = 0b001;
        const CONTROL = 0b010;
        const SHIFT = 0b100;
    }
}

impl Modifiers {
    /// No modifier held.
    pub const NONE: Modifiers = Modifiers::empty();
}

/// A single modifier key, as queried from a [`ModifierSampler`](crate::ModifierSampler).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Alt,
    Control,
    Shift,
}

impl Modifier {
    pub const ALL: [Modifier; 3] = [Modifier::Alt, Modifier::Control, Modifier::Shift];

    /// The mask bit for this modifier.
    pub fn flag(self) -> Modifiers {
        match self {
            Modifier::Alt => Modifiers::ALT,
            Modifier::Control => Modifiers::CONTROL,
            Modifier::Shift => Modifiers::SHIFT,
        }
    }
}

/// A hotkey combination: base key code plus modifier mask.
///
/// Two bindings are equal only when both the key and the full mask match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Binding {
    pub key: KeyCode,
    pub modifiers: Modifiers,
}

impl Binding {
    /// Create a binding from anything that names a key.
    pub fn new(key: impl Into<KeyCode>, modifiers: Modifiers) -> Self {
        Self {
            key: key.into(),
            modifiers,
        }
    }
}

impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if self.modifiers.contains(Modifiers::CONTROL) {
            parts.push("Ctrl".to_string());
        }
        if self.modifiers.contains(Modifiers::ALT) {
            parts.push("Alt".to_string());
        }
        if self.modifiers.contains(Modifiers::SHIFT) {
            parts.push("Shift".to_string());
        }
        parts.push(self.key.to_string());
        write!(f, "{}", parts.join("+"))
    }
}

/// Parse a hotkey string like "Ctrl+Shift+Up", "F10" or "Alt+0x41".
pub fn parse_hotkey(s: &str) -> Result<Binding> {
    let parts: Vec<&str> = s.split('+').map(str::trim).collect();
    let mut modifiers = Modifiers::NONE;

    let (key_str, modifier_parts) = match parts.split_last() {
        Some((key, mods)) if !key.is_empty() => (*key, mods),
        _ => bail!("Empty hotkey string"),
    };

    // Everything before the last part is a modifier
    for part in modifier_parts {
        let flag = match part.to_uppercase().as_str() {
            "SHIFT" => Modifiers::SHIFT,
            "CTRL" | "CONTROL" => Modifiers::CONTROL,
            "ALT" => Modifiers::ALT,
            _ => return Err(anyhow!("Unknown modifier: {}", part)),
        };
        if modifiers.contains(flag) {
            bail!("Duplicate modifier: {}", part);
        }
        modifiers |= flag;
    }

    let key = parse_key_code(key_str)?;
    Ok(Binding { key, modifiers })
}

fn parse_key_code(s: &str) -> Result<KeyCode> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        // from_str_radix alone would also take a leading sign
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            bail!("Invalid key code: {}", s);
        }
        let raw = u32::from_str_radix(hex, 16)
            .with_context(|| format!("Invalid key code: {}", s))?;
        return Ok(KeyCode(raw));
    }
    Key::parse(s).map(Key::code)
}
