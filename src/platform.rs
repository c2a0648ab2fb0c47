//! Interfaces to the platform's keyboard interception and key-state APIs.
//!
//! The interception callback only ever talks to the platform through these
//! traits, so it can be driven by [`fake`](crate::fake) implementations in
//! tests.

use crate::error::PlatformError;
use crate::hotkey::{Modifier, Modifiers};
use crate::key::KeyCode;

/// Message kind attached to a raw keyboard event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    KeyDown,
    KeyUp,
    /// Key down while Alt is held (or F10), reported separately on Windows.
    SysKeyDown,
    SysKeyUp,
    /// Any other message; always forwarded.
    Other(u32),
}

impl MessageKind {
    /// Key-down, including the system variant.
    pub fn is_down(self) -> bool {
        matches!(self, MessageKind::KeyDown | MessageKind::SysKeyDown)
    }

    /// Key-up, including the system variant.
    pub fn is_up(self) -> bool {
        matches!(self, MessageKind::KeyUp | MessageKind::SysKeyUp)
    }
}

/// One keyboard event as delivered by an [`Interceptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawKeyEvent {
    /// Platform hook code. Negative means "do not process, pass it on".
    pub code: i32,
    pub kind: MessageKind,
    pub key: KeyCode,
}

impl RawKeyEvent {
    /// Event with hook code 0 (process normally).
    pub fn new(kind: MessageKind, key: impl Into<KeyCode>) -> Self {
        Self {
            code: 0,
            kind,
            key: key.into(),
        }
    }

    /// Plain key-down event.
    pub fn key_down(key: impl Into<KeyCode>) -> Self {
        Self::new(MessageKind::KeyDown, key)
    }

    /// Plain key-up event.
    pub fn key_up(key: impl Into<KeyCode>) -> Self {
        Self::new(MessageKind::KeyUp, key)
    }
}

/// What the interceptor should do with the event after the callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Pass the event on to the next hook / other applications.
    Forward,
    /// Consume the event.
    Swallow,
}

/// Callback installed into the platform hook. Invoked once per keyboard event.
pub type KeyboardCallback = Box<dyn FnMut(&RawKeyEvent) -> Verdict + Send>;

/// Opaque identifier of an installed interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookHandle(u64);

impl HookHandle {
    /// Wrap a backend-specific handle value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Backend-specific handle value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// OS-level keyboard interception point.
///
/// `install` takes ownership of the callback and must keep it alive until a
/// successful `uninstall`. A failed `uninstall` must leave the hook installed.
/// Forwarding is the interceptor's job: it passes the event on whenever the
/// callback returns [`Verdict::Forward`].
pub trait Interceptor: Send {
    fn install(&mut self, callback: KeyboardCallback) -> Result<HookHandle, PlatformError>;

    fn uninstall(&mut self, handle: HookHandle) -> Result<(), PlatformError>;
}

/// Real-time modifier key state, queried at callback time.
pub trait ModifierSampler: Send + Sync {
    fn is_pressed(&self, modifier: Modifier) -> bool;

    /// Current state of all modifiers as a mask.
    fn sample(&self) -> Modifiers {
        Modifier::ALL
            .iter()
            .filter(|m| self.is_pressed(**m))
            .fold(Modifiers::NONE, |mask, m| mask | m.flag())
    }
}
