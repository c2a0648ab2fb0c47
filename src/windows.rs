//! Windows implementation using a `WH_KEYBOARD_LL` hook.
//!
//! The hook procedure runs on the thread that installed it, and only while
//! that thread pumps messages. Install, uninstall and the message loop must
//! therefore all live on the same thread. Windows silently removes hooks
//! whose procedure takes too long to return.

use crate::error::PlatformError;
use crate::hotkey::Modifier;
use crate::key::KeyCode;
use crate::platform::{
    HookHandle, Interceptor, KeyboardCallback, MessageKind, ModifierSampler, RawKeyEvent, Verdict,
};
use std::cell::{Cell, RefCell};
use ::windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use ::windows::Win32::UI::Input::KeyboardAndMouse::{
    GetAsyncKeyState, VIRTUAL_KEY, VK_CONTROL, VK_MENU, VK_SHIFT,
};
use ::windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, SetWindowsHookExW, UnhookWindowsHookEx, HHOOK, KBDLLHOOKSTRUCT,
    WH_KEYBOARD_LL, WM_KEYDOWN, WM_KEYUP, WM_SYSKEYDOWN, WM_SYSKEYUP,
};

thread_local! {
    static HOOK: Cell<Option<HHOOK>> = const { Cell::new(None) };
    static CALLBACK: RefCell<Option<KeyboardCallback>> = const { RefCell::new(None) };
}

fn message_kind(msg: u32) -> MessageKind {
    match msg {
        WM_KEYDOWN => MessageKind::KeyDown,
        WM_KEYUP => MessageKind::KeyUp,
        WM_SYSKEYDOWN => MessageKind::SysKeyDown,
        WM_SYSKEYUP => MessageKind::SysKeyUp,
        other => MessageKind::Other(other),
    }
}

fn handle_of(hook: HHOOK) -> HookHandle {
    HookHandle::new(hook.0 as usize as u64)
}

// The callback is taken out of its slot while it runs, so a nested hook
// call forwards and a handler may unhook from inside the callback.
fn run_callback(event: &RawKeyEvent) -> Verdict {
    let Some(mut callback) = CALLBACK.with(|slot| slot.try_borrow_mut().ok()?.take()) else {
        return Verdict::Forward;
    };
    let verdict = callback(event);

    if HOOK.with(Cell::get).is_some() {
        CALLBACK.with(|slot| {
            if let Ok(mut slot) = slot.try_borrow_mut() {
                if slot.is_none() {
                    *slot = Some(callback);
                }
            }
        });
    }
    verdict
}

unsafe extern "system" fn hook_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    let hook = HOOK.with(Cell::get);

    // Negative codes must go straight to the next hook without touching lparam.
    if code >= 0 {
        let kb = unsafe { &*(lparam.0 as *const KBDLLHOOKSTRUCT) };
        let event = RawKeyEvent {
            code,
            kind: message_kind(wparam.0 as u32),
            key: KeyCode(kb.vkCode),
        };
        if run_callback(&event) == Verdict::Swallow {
            return LRESULT(1);
        }
    }

    unsafe { CallNextHookEx(hook, code, wparam, lparam) }
}

/// Low-level keyboard hook for the calling thread.
#[derive(Debug, Default)]
pub struct LowLevelKeyboardHook {
    _private: (),
}

impl LowLevelKeyboardHook {
    /// Create a hook for the calling thread. Nothing is installed yet.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Interceptor for LowLevelKeyboardHook {
    fn install(&mut self, callback: KeyboardCallback) -> Result<HookHandle, PlatformError> {
        if HOOK.with(Cell::get).is_some() {
            return Err(PlatformError::new(
                "A keyboard hook is already installed on this thread",
            ));
        }

        CALLBACK.with(|slot| {
            slot.try_borrow_mut()
                .map(|mut slot| *slot = Some(callback))
                .map_err(|_| PlatformError::new("Keyboard callback slot is busy"))
        })?;

        match unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(hook_proc), None, 0) } {
            Ok(hook) => {
                HOOK.with(|h| h.set(Some(hook)));
                log::debug!("WH_KEYBOARD_LL installed");
                Ok(handle_of(hook))
            }
            Err(e) => {
                CALLBACK.with(|slot| slot.borrow_mut().take());
                Err(PlatformError::new(format!("SetWindowsHookExW failed: {}", e)))
            }
        }
    }

    fn uninstall(&mut self, handle: HookHandle) -> Result<(), PlatformError> {
        let hook = HOOK
            .with(Cell::get)
            .filter(|hook| handle_of(*hook) == handle)
            .ok_or_else(|| PlatformError::new("Hook handle is not installed on this thread"))?;

        unsafe { UnhookWindowsHookEx(hook) }
            .map_err(|e| PlatformError::new(format!("UnhookWindowsHookEx failed: {}", e)))?;

        HOOK.with(|h| h.set(None));
        // Empty if we are being called from inside the callback; run_callback drops it then.
        CALLBACK.with(|slot| {
            if let Ok(mut slot) = slot.try_borrow_mut() {
                slot.take();
            }
        });
        log::debug!("WH_KEYBOARD_LL removed");
        Ok(())
    }
}

/// Samples modifier state with `GetAsyncKeyState`, independent of the event
/// being processed.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsyncKeyStateSampler;

impl ModifierSampler for AsyncKeyStateSampler {
    fn is_pressed(&self, modifier: Modifier) -> bool {
        let vk: VIRTUAL_KEY = match modifier {
            Modifier::Alt => VK_MENU,
            Modifier::Control => VK_CONTROL,
            Modifier::Shift => VK_SHIFT,
        };
        // High bit set means the key is down right now.
        unsafe { GetAsyncKeyState(vk.0 as i32) < 0 }
    }
}
