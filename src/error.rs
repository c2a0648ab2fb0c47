//! Errors surfaced by registration and hook lifecycle calls.

use crate::hotkey::Binding;

/// Failure reported by the platform interception or key-state APIs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PlatformError {
    pub message: String,
}

impl PlatformError {
    /// Wrap a platform failure description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors returned by [`HotkeyListener`](crate::HotkeyListener) and
/// [`Registry`](crate::Registry) operations.
///
/// None of these leave the registry or the hook half-updated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HotkeyError {
    #[error("{}", duplicate_binding(.binding, .existing_name))]
    DuplicateBinding {
        binding: Binding,
        existing_name: Option<String>,
    },

    #[error("hotkey name {0:?} is already in use")]
    DuplicateName(String),

    #[error("hotkey name must not be empty")]
    InvalidName,

    #[error("hotkey {0} is not registered")]
    NotFound(String),

    #[error("keyboard hook is already installed")]
    AlreadyInstalled,

    #[error("keyboard hook is not installed")]
    NotInstalled,

    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),
}

fn duplicate_binding(binding: &Binding, existing_name: &Option<String>) -> String {
    match existing_name {
        Some(name) => format!("hotkey {} is already registered as {:?}", binding, name),
        None => format!("hotkey {} is already registered", binding),
    }
}
