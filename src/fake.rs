//! In-process stand-ins for the platform hook, for tests and simulations.
//!
//! Both types are cheap handles over shared state: keep a clone, give the
//! other to [`HotkeyListenerBuilder`](crate::HotkeyListenerBuilder), then
//! drive keystrokes and modifier state from the test.

use crate::error::PlatformError;
use crate::hotkey::{Modifier, Modifiers};
use crate::key::KeyCode;
use crate::platform::{
    HookHandle, Interceptor, KeyboardCallback, ModifierSampler, RawKeyEvent, Verdict,
};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Modifier sampler whose state is set by hand.
#[derive(Debug, Clone, Default)]
pub struct FakeModifiers {
    bits: Arc<AtomicU8>,
}

impl FakeModifiers {
    /// Create a sampler with no modifiers held.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of currently held modifiers.
    pub fn set(&self, modifiers: Modifiers) {
        self.bits.store(modifiers.bits(), Ordering::SeqCst);
    }

    /// Release every modifier.
    pub fn clear(&self) {
        self.set(Modifiers::NONE);
    }
}

impl ModifierSampler for FakeModifiers {
    fn is_pressed(&self, modifier: Modifier) -> bool {
        Modifiers::from_bits_truncate(self.bits.load(Ordering::SeqCst)).contains(modifier.flag())
    }
}

#[derive(Default)]
struct State {
    handle: Option<HookHandle>,
    callback: Option<KeyboardCallback>,
    next_handle: u64,
    install_error: Option<String>,
    uninstall_error: Option<String>,
    forwarded: Vec<RawKeyEvent>,
}

/// Interceptor that replays synthetic events into the installed callback.
#[derive(Clone, Default)]
pub struct FakeInterceptor {
    state: Arc<Mutex<State>>,
}

impl FakeInterceptor {
    /// Create an interceptor with nothing installed.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a callback is currently installed.
    pub fn is_installed(&self) -> bool {
        self.state().handle.is_some()
    }

    /// Make the next `install` calls fail with `message` (or succeed with `None`).
    pub fn fail_install(&self, message: Option<&str>) {
        self.state().install_error = message.map(String::from);
    }

    /// Make the next `uninstall` calls fail with `message` (or succeed with `None`).
    pub fn fail_uninstall(&self, message: Option<&str>) {
        self.state().uninstall_error = message.map(String::from);
    }

    /// Feed one raw event through the hook. Without a hook every event is forwarded.
    ///
    /// The callback runs without the internal lock held, so it may unhook.
    pub fn send(&self, event: RawKeyEvent) -> Verdict {
        let taken = {
            let mut state = self.state();
            let handle = state.handle;
            handle.zip(state.callback.take())
        };

        let verdict = match taken {
            Some((handle, mut callback)) => {
                let verdict = callback(&event);
                let mut state = self.state();
                if state.handle == Some(handle) && state.callback.is_none() {
                    state.callback = Some(callback);
                }
                verdict
            }
            None => Verdict::Forward,
        };

        if verdict == Verdict::Forward {
            self.state().forwarded.push(event);
        }
        verdict
    }

    /// Send a key-down for `key`.
    pub fn press(&self, key: impl Into<KeyCode>) -> Verdict {
        self.send(RawKeyEvent::key_down(key))
    }

    /// Send a key-up for `key`.
    pub fn release(&self, key: impl Into<KeyCode>) -> Verdict {
        self.send(RawKeyEvent::key_up(key))
    }

    /// Events that were passed on to "other applications".
    pub fn forwarded(&self) -> Vec<RawKeyEvent> {
        self.state().forwarded.clone()
    }
}

impl Interceptor for FakeInterceptor {
    fn install(&mut self, callback: KeyboardCallback) -> Result<HookHandle, PlatformError> {
        let mut state = self.state();
        if let Some(message) = &state.install_error {
            return Err(PlatformError::new(message.clone()));
        }
        if state.handle.is_some() {
            return Err(PlatformError::new("fake hook already installed"));
        }
        state.next_handle += 1;
        let handle = HookHandle::new(state.next_handle);
        state.handle = Some(handle);
        state.callback = Some(callback);
        Ok(handle)
    }

    fn uninstall(&mut self, handle: HookHandle) -> Result<(), PlatformError> {
        let mut state = self.state();
        if let Some(message) = &state.uninstall_error {
            return Err(PlatformError::new(message.clone()));
        }
        if state.handle != Some(handle) {
            return Err(PlatformError::new("unknown hook handle"));
        }
        state.handle = None;
        state.callback = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;

    #[test]
    fn test_fake_modifiers_sample() {
        let mods = FakeModifiers::new();
        assert_eq!(mods.sample(), Modifiers::NONE);
        mods.set(Modifiers::CONTROL | Modifiers::SHIFT);
        assert!(mods.is_pressed(Modifier::Control));
        assert!(!mods.is_pressed(Modifier::Alt));
        assert_eq!(mods.sample(), Modifiers::CONTROL | Modifiers::SHIFT);
    }

    #[test]
    fn test_fake_interceptor_lifecycle() {
        let fake = FakeInterceptor::new();
        let mut hook = fake.clone();

        assert_eq!(fake.press(Key::A), Verdict::Forward);
        let handle = hook.install(Box::new(|_: &RawKeyEvent| Verdict::Swallow)).unwrap();
        assert!(fake.is_installed());
        assert_eq!(fake.press(Key::A), Verdict::Swallow);

        fake.fail_uninstall(Some("busy"));
        assert!(hook.uninstall(handle).is_err());
        assert!(fake.is_installed());

        fake.fail_uninstall(None);
        hook.uninstall(handle).unwrap();
        assert!(!fake.is_installed());
        assert_eq!(fake.forwarded().len(), 1);
    }
}
