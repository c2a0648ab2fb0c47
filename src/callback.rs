//! The keyboard callback: runs for every keystroke on the system.
//!
//! Stages, cheapest first:
//! 1. filter on hook code and message kind
//! 2. reject keys that no binding uses
//! 3. sample modifiers, look up the exact binding, dispatch
//!
//! Nothing in here may block or panic out to the platform. A contended or
//! poisoned registry counts as "no match".

use crate::dispatch::Dispatcher;
use crate::event::{panic_message, Direction, HandlerFault, HotkeyEvent};
use crate::hotkey::Binding;
use crate::platform::{ModifierSampler, RawKeyEvent, Verdict};
use crate::registry::Registry;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::RwLock;

/// State shared between the owning listener and the installed callback.
pub(crate) struct Core {
    pub registry: RwLock<Registry>,
    pub dispatcher: Dispatcher,
    pub sampler: Box<dyn ModifierSampler>,
}

impl Core {
    /// Entry point for the installed callback.
    pub fn intercept(&self, event: &RawKeyEvent) -> Verdict {
        match catch_unwind(AssertUnwindSafe(|| self.route(event))) {
            Ok(verdict) => verdict,
            Err(payload) => {
                self.dispatcher.report(HandlerFault {
                    hotkey: None,
                    handler: None,
                    message: panic_message(payload.as_ref()),
                });
                Verdict::Forward
            }
        }
    }

    fn route(&self, event: &RawKeyEvent) -> Verdict {
        if event.code < 0 {
            return Verdict::Forward;
        }
        let direction = if event.kind.is_down() {
            Direction::Pressed
        } else if event.kind.is_up() {
            Direction::Released
        } else {
            return Verdict::Forward;
        };

        let Some(occurrence) = self.match_event(event, direction) else {
            return Verdict::Forward;
        };
        log::trace!(
            "Hotkey {} {:?}",
            Binding::new(occurrence.key, occurrence.modifiers),
            direction
        );
        self.dispatcher.deliver(occurrence)
    }

    // The registry guard is released before dispatch so handlers may
    // register or remove hotkeys.
    fn match_event(&self, event: &RawKeyEvent, direction: Direction) -> Option<HotkeyEvent> {
        let registry = self.registry.try_read().ok()?;
        if !registry.is_watched(event.key) {
            return None;
        }

        let modifiers = self.sampler.sample();
        let found = registry.lookup(&Binding::new(event.key, modifiers))?;

        Some(HotkeyEvent {
            key: event.key,
            modifiers,
            name: found.name,
            direction,
            swallow: self.dispatcher.initial_swallow(found.forward_default),
            forward_default: found.forward_default,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{log_fault, DispatchMode};
    use crate::event::HotkeyArgs;
    use crate::fake::FakeModifiers;
    use crate::hotkey::Modifiers;
    use crate::key::Key;
    use crate::platform::MessageKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn core(mode: DispatchMode, modifiers: &FakeModifiers) -> Core {
        Core {
            registry: RwLock::new(Registry::new()),
            dispatcher: Dispatcher::new(mode, log_fault()),
            sampler: Box::new(modifiers.clone()),
        }
    }

    fn counter(core: &Core, direction: Direction, handle: bool) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        core.dispatcher.subscribe(
            direction,
            Arc::new(move |args: &mut HotkeyArgs| {
                seen.fetch_add(1, Ordering::SeqCst);
                args.handled = handle;
            }),
        );
        calls
    }

    #[test]
    fn test_negative_code_is_forwarded_untouched() {
        let mods = FakeModifiers::new();
        let core = core(DispatchMode::Inline, &mods);
        core.registry
            .write()
            .unwrap()
            .add(Binding::new(Key::A, Modifiers::NONE), None, false)
            .unwrap();
        let calls = counter(&core, Direction::Pressed, true);

        let mut event = RawKeyEvent::key_down(Key::A);
        event.code = -1;
        assert_eq!(core.intercept(&event), Verdict::Forward);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_other_messages_are_forwarded() {
        let mods = FakeModifiers::new();
        let core = core(DispatchMode::Inline, &mods);
        core.registry
            .write()
            .unwrap()
            .add(Binding::new(Key::A, Modifiers::NONE), None, false)
            .unwrap();
        let calls = counter(&core, Direction::Pressed, true);

        let event = RawKeyEvent::new(MessageKind::Other(0x0102), Key::A);
        assert_eq!(core.intercept(&event), Verdict::Forward);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_system_variants_are_matched() {
        let mods = FakeModifiers::new();
        mods.set(Modifiers::ALT);
        let core = core(DispatchMode::Inline, &mods);
        core.registry
            .write()
            .unwrap()
            .add(Binding::new(Key::F4, Modifiers::ALT), None, false)
            .unwrap();
        let pressed = counter(&core, Direction::Pressed, true);
        let released = counter(&core, Direction::Released, false);

        let down = RawKeyEvent::new(MessageKind::SysKeyDown, Key::F4);
        let up = RawKeyEvent::new(MessageKind::SysKeyUp, Key::F4);
        assert_eq!(core.intercept(&down), Verdict::Swallow);
        assert_eq!(core.intercept(&up), Verdict::Forward);
        assert_eq!(pressed.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unwatched_key_never_samples_modifiers() {
        struct PanickingSampler;
        impl ModifierSampler for PanickingSampler {
            fn is_pressed(&self, _: crate::hotkey::Modifier) -> bool {
                panic!("sampled on the fast-reject path")
            }
        }

        let core = Core {
            registry: RwLock::new(Registry::new()),
            dispatcher: Dispatcher::new(DispatchMode::Inline, log_fault()),
            sampler: Box::new(PanickingSampler),
        };
        core.registry
            .write()
            .unwrap()
            .add(Binding::new(Key::A, Modifiers::NONE), None, false)
            .unwrap();

        // Unwatched: sampler is never consulted.
        assert_eq!(core.intercept(&RawKeyEvent::key_down(Key::B)), Verdict::Forward);
        // Watched: the sampler panics, the callback swallows the fault and forwards.
        assert_eq!(core.intercept(&RawKeyEvent::key_down(Key::A)), Verdict::Forward);
    }

    #[test]
    fn test_contended_registry_forwards() {
        let mods = FakeModifiers::new();
        let core = core(DispatchMode::Inline, &mods);
        core.registry
            .write()
            .unwrap()
            .add(Binding::new(Key::A, Modifiers::NONE), None, false)
            .unwrap();
        let calls = counter(&core, Direction::Pressed, true);

        let guard = core.registry.write().unwrap();
        assert_eq!(core.intercept(&RawKeyEvent::key_down(Key::A)), Verdict::Forward);
        drop(guard);
        assert_eq!(core.intercept(&RawKeyEvent::key_down(Key::A)), Verdict::Swallow);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deferred_swallows_unless_forward_default() {
        let mods = FakeModifiers::new();
        let core = core(DispatchMode::Deferred, &mods);
        {
            let mut registry = core.registry.write().unwrap();
            registry
                .add(Binding::new(Key::A, Modifiers::NONE), None, false)
                .unwrap();
            registry
                .add(Binding::new(Key::B, Modifiers::NONE), None, true)
                .unwrap();
        }
        let calls = counter(&core, Direction::Pressed, false);

        assert_eq!(core.intercept(&RawKeyEvent::key_down(Key::A)), Verdict::Swallow);
        assert_eq!(core.intercept(&RawKeyEvent::key_down(Key::B)), Verdict::Forward);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(core.dispatcher.dispatch_pending(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
