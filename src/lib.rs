//! Global hotkeys on top of a low-level keyboard hook.
//!
//! Register named hotkeys (a base key plus an exact modifier mask) and get
//! notified when any of them is pressed or released anywhere on the system,
//! even while the application does not have focus.
//!
//! # Features
//!
//! - **Exact modifier matching** - `Ctrl+Up` does not fire while `Ctrl+Shift` is held
//! - **Named hotkeys** - rebind a name without touching its subscribers
//! - **Swallow or forward** - handlers decide whether other applications see the keystroke
//! - **Cheap hot path** - keys no binding uses are rejected before modifiers are sampled
//! - **Injectable platform** - [`fake`] drives the whole pipeline without an OS hook
//! - **Backends** - Windows (`WH_KEYBOARD_LL`) and Linux (evdev, observe-only)
//!
//! # Example
//!
//! ```no_run
//! use hotkey_hook::{parse_hotkey, HotkeyListenerBuilder};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut listener = HotkeyListenerBuilder::new()
//!         .add_named_hotkey("VolumeUp", parse_hotkey("Ctrl+Shift+Up")?)
//!         .build()?;
//!
//!     listener.on_pressed(|args| {
//!         println!("{:?} pressed", args.name());
//!         // Keep the keystroke away from other applications
//!         args.handled = true;
//!     });
//!     listener.on_released(|args| println!("{:?} released", args.name()));
//!
//!     listener.hook()?;
//!     // ... run the platform message loop ...
//!     listener.unhook()?;
//!     Ok(())
//! }
//! ```
//!
//! # Dispatch
//!
//! [`DispatchMode::Inline`] (the default) runs handlers inside the keyboard
//! callback and lets them swallow the keystroke. [`DispatchMode::Deferred`]
//! decides from the binding's `forward_default` flag right away and queues
//! the event for [`HotkeyListener::dispatch_pending`].
//!
//! # Linux Requirements
//!
//! On Linux, the user must have permission to read from `/dev/input/event*` devices.
//! This typically means running as root or being a member of the `input` group.

mod callback;
mod config;
mod dispatch;
mod error;
mod event;
pub mod fake;
mod hotkey;
mod key;
mod listener;
mod platform;
mod registry;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(windows)]
mod windows;

pub use config::{HotkeyConfig, HotkeyEntry};
pub use dispatch::{DispatchMode, FaultSink, Handler, SubscriptionId};
pub use error::{HotkeyError, PlatformError};
pub use event::{Direction, HandlerFault, HotkeyArgs, HotkeyEvent};
pub use hotkey::{parse_hotkey, Binding, Modifier, Modifiers};
pub use key::{Key, KeyCode};
pub use listener::{HotkeyListener, HotkeyListenerBuilder};
pub use platform::{
    HookHandle, Interceptor, KeyboardCallback, MessageKind, ModifierSampler, RawKeyEvent, Verdict,
};
pub use registry::{Match, Registration, Registry};

#[cfg(target_os = "linux")]
pub use linux::{find_keyboards, EvdevInterceptor, EvdevModifierSampler};

#[cfg(windows)]
pub use crate::windows::{AsyncKeyStateSampler, LowLevelKeyboardHook};
