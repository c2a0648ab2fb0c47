//! Key catalogue and raw key codes.

use anyhow::{anyhow, Result};

/// Raw base-key code as delivered by the interceptor.
///
/// Codes use Win32 virtual-key numbering on every platform; backends that
/// deliver a different numbering translate through [`Key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(pub u32);

impl std::fmt::Display for KeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match Key::from_code(*self) {
            Some(key) => write!(f, "{}", key),
            None => write!(f, "{:#04x}", self.0),
        }
    }
}

impl From<Key> for KeyCode {
    fn from(key: Key) -> Self {
        key.code()
    }
}

macro_rules! keys {
    ($($variant:ident => $name:literal, $code:literal;)*) => {
        /// Named keys that can be used as the base key of a hotkey.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Key {
            $($variant,)*
        }

        impl Key {
            /// Every named key, in catalogue order.
            pub const ALL: &'static [Key] = &[$(Key::$variant,)*];

            /// Virtual-key code for this key.
            pub fn code(self) -> KeyCode {
                match self {
                    $(Key::$variant => KeyCode($code),)*
                }
            }

            /// Canonical display name.
            pub fn name(self) -> &'static str {
                match self {
                    $(Key::$variant => $name,)*
                }
            }

            /// Reverse lookup from a virtual-key code.
            pub fn from_code(code: KeyCode) -> Option<Self> {
                match code.0 {
                    $($code => Some(Key::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

keys! {
    Backspace => "Backspace", 0x08;
    Tab => "Tab", 0x09;
    Enter => "Enter", 0x0D;
    Pause => "Pause", 0x13;
    CapsLock => "CapsLock", 0x14;
    Escape => "Escape", 0x1B;
    Space => "Space", 0x20;
    PageUp => "PageUp", 0x21;
    PageDown => "PageDown", 0x22;
    End => "End", 0x23;
    Home => "Home", 0x24;
    Left => "Left", 0x25;
    Up => "Up", 0x26;
    Right => "Right", 0x27;
    Down => "Down", 0x28;
    PrintScreen => "PrintScreen", 0x2C;
    Insert => "Insert", 0x2D;
    Delete => "Delete", 0x2E;
    Num0 => "0", 0x30;
    Num1 => "1", 0x31;
    Num2 => "2", 0x32;
    Num3 => "3", 0x33;
    Num4 => "4", 0x34;
    Num5 => "5", 0x35;
    Num6 => "6", 0x36;
    Num7 => "7", 0x37;
    Num8 => "8", 0x38;
    Num9 => "9", 0x39;
    A => "A", 0x41;
    B => "B", 0x42;
    C => "C", 0x43;
    D => "D", 0x44;
    E => "E", 0x45;
    F => "F", 0x46;
    G => "G", 0x47;
    H => "H", 0x48;
    I => "I", 0x49;
    J => "J", 0x4A;
    K => "K", 0x4B;
    L => "L", 0x4C;
    M => "M", 0x4D;
    N => "N", 0x4E;
    O => "O", 0x4F;
    P => "P", 0x50;
    Q => "Q", 0x51;
    R => "R", 0x52;
    S => "S", 0x53;
    T => "T", 0x54;
    U => "U", 0x55;
    V => "V", 0x56;
    W => "W", 0x57;
    X => "X", 0x58;
    Y => "Y", 0x59;
    Z => "Z", 0x5A;
    F1 => "F1", 0x70;
    F2 => "F2", 0x71;
    F3 => "F3", 0x72;
    F4 => "F4", 0x73;
    F5 => "F5", 0x74;
    F6 => "F6", 0x75;
    F7 => "F7", 0x76;
    F8 => "F8", 0x77;
    F9 => "F9", 0x78;
    F10 => "F10", 0x79;
    F11 => "F11", 0x7A;
    F12 => "F12", 0x7B;
    F13 => "F13", 0x7C;
    F14 => "F14", 0x7D;
    F15 => "F15", 0x7E;
    F16 => "F16", 0x7F;
    F17 => "F17", 0x80;
    F18 => "F18", 0x81;
    F19 => "F19", 0x82;
    F20 => "F20", 0x83;
    F21 => "F21", 0x84;
    F22 => "F22", 0x85;
    F23 => "F23", 0x86;
    F24 => "F24", 0x87;
    NumLock => "NumLock", 0x90;
    ScrollLock => "ScrollLock", 0x91;
    VolumeMute => "VolumeMute", 0xAD;
    VolumeDown => "VolumeDown", 0xAE;
    VolumeUp => "VolumeUp", 0xAF;
    MediaNext => "MediaNext", 0xB0;
    MediaPrevious => "MediaPrevious", 0xB1;
    MediaStop => "MediaStop", 0xB2;
    MediaPlayPause => "MediaPlayPause", 0xB3;
}

impl Key {
    /// Parse a key from a string like "F8", "ScrollLock" or "a".
    ///
    /// Matching is case-insensitive and ignores `_`, so "scroll_lock" works too.
    pub fn parse(s: &str) -> Result<Self> {
        let wanted: String = s
            .chars()
            .filter(|c| *c != '_')
            .collect::<String>()
            .to_uppercase();
        if wanted.is_empty() {
            return Err(anyhow!("Empty key name"));
        }

        Key::ALL
            .iter()
            .copied()
            .find(|key| key.name().to_uppercase() == wanted)
            .or_else(|| alias(&wanted))
            .ok_or_else(|| anyhow!("Unknown key: {}", s))
    }
}

fn alias(upper: &str) -> Option<Key> {
    let key = match upper {
        "ESC" => Key::Escape,
        "RETURN" => Key::Enter,
        "DEL" => Key::Delete,
        "INS" => Key::Insert,
        "PGUP" => Key::PageUp,
        "PGDN" => Key::PageDown,
        "UPARROW" => Key::Up,
        "DOWNARROW" => Key::Down,
        "LEFTARROW" => Key::Left,
        "RIGHTARROW" => Key::Right,
        "PRTSC" | "SNAPSHOT" => Key::PrintScreen,
        "SCROLL" => Key::ScrollLock,
        _ => return None,
    };
    Some(key)
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_keys() {
        assert_eq!(Key::parse("F8").unwrap(), Key::F8);
        assert_eq!(Key::parse("scroll_lock").unwrap(), Key::ScrollLock);
        assert_eq!(Key::parse("up").unwrap(), Key::Up);
        assert_eq!(Key::parse("7").unwrap(), Key::Num7);
        assert_eq!(Key::parse("esc").unwrap(), Key::Escape);
    }

    #[test]
    fn test_parse_unknown_key() {
        assert!(Key::parse("Hyper").is_err());
        assert!(Key::parse("").is_err());
    }

    #[test]
    fn test_codes_are_unique_and_reversible() {
        for key in Key::ALL {
            assert_eq!(Key::from_code(key.code()), Some(*key));
        }
    }

    #[test]
    fn test_key_code_display() {
        assert_eq!(KeyCode(0x26).to_string(), "Up");
        assert_eq!(KeyCode(0xFF).to_string(), "0xff");
    }
}
