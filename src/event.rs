//! Values handed to hotkey subscribers.

use crate::hotkey::Modifiers;
use crate::key::KeyCode;
use std::sync::Arc;

/// Whether the matched keystroke went down or came back up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Pressed,
    Released,
}

/// A matched keystroke, produced by the interception callback and consumed
/// immediately by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyEvent {
    pub key: KeyCode,
    pub modifiers: Modifiers,
    pub name: Option<Arc<str>>,
    pub direction: Direction,
    /// Swallow decision before any subscriber has run.
    pub swallow: bool,
    pub(crate) forward_default: bool,
}

/// Arguments passed to a pressed/released handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyArgs {
    pub key: KeyCode,
    pub modifiers: Modifiers,
    pub name: Option<Arc<str>>,
    pub direction: Direction,
    /// Forward flag the binding was registered with.
    pub forward_default: bool,
    /// Set to `true` to swallow the keystroke. Only honoured by
    /// [`DispatchMode::Inline`](crate::DispatchMode::Inline).
    pub handled: bool,
}

impl HotkeyArgs {
    pub(crate) fn from_event(event: &HotkeyEvent) -> Self {
        Self {
            key: event.key,
            modifiers: event.modifiers,
            name: event.name.clone(),
            direction: event.direction,
            forward_default: event.forward_default,
            handled: event.swallow,
        }
    }

    /// Name the hotkey was registered under, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// A panic caught while processing a keystroke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFault {
    /// Hotkey being dispatched, if the fault happened after a match.
    pub hotkey: Option<String>,
    /// Position of the failing handler in its channel, `None` when the
    /// interception callback itself failed.
    pub handler: Option<usize>,
    pub message: String,
}

impl std::fmt::Display for HandlerFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.hotkey, self.handler) {
            (Some(hotkey), Some(idx)) => {
                write!(f, "handler {} for {} panicked: {}", idx, hotkey, self.message)
            }
            (Some(hotkey), None) => write!(f, "dispatch of {} panicked: {}", hotkey, self.message),
            (None, _) => write!(f, "keyboard callback panicked: {}", self.message),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
