//! Listener builder, hotkey registration and hook lifecycle.

use crate::callback::Core;
use crate::config::HotkeyConfig;
use crate::dispatch::{log_fault, DispatchMode, Dispatcher, FaultSink, SubscriptionId};
use crate::error::HotkeyError;
use crate::event::{Direction, HandlerFault, HotkeyArgs};
use crate::hotkey::{parse_hotkey, Binding};
use crate::platform::{HookHandle, Interceptor, KeyboardCallback, ModifierSampler, RawKeyEvent};
use crate::registry::{Match, Registration, Registry};
use anyhow::{Context, Result};
use std::sync::{Arc, PoisonError, RwLockReadGuard, RwLockWriteGuard};

struct PendingHotkey {
    binding: Binding,
    name: Option<String>,
    forward_default: bool,
}

/// Builder for creating a hotkey listener.
#[derive(Default)]
pub struct HotkeyListenerBuilder {
    hotkeys: Vec<PendingHotkey>,
    mode: DispatchMode,
    fault_sink: Option<FaultSink>,
    interceptor: Option<Box<dyn Interceptor>>,
    sampler: Option<Box<dyn ModifierSampler>>,
}

impl HotkeyListenerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unnamed hotkey to listen for.
    pub fn add_hotkey(self, binding: Binding) -> Self {
        self.add_hotkey_with(binding, None, false)
    }

    /// Add a hotkey under a unique name.
    pub fn add_named_hotkey(self, name: &str, binding: Binding) -> Self {
        self.add_hotkey_with(binding, Some(name), false)
    }

    /// Add a hotkey with every registration option spelled out.
    pub fn add_hotkey_with(
        mut self,
        binding: Binding,
        name: Option<&str>,
        forward_default: bool,
    ) -> Self {
        self.hotkeys.push(PendingHotkey {
            binding,
            name: name.map(String::from),
            forward_default,
        });
        self
    }

    /// Choose how matched hotkeys reach subscribers. Defaults to inline.
    pub fn dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Where handler and callback panics are reported. Defaults to `log::error!`.
    pub fn fault_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&HandlerFault) + Send + Sync + 'static,
    {
        self.fault_sink = Some(Arc::new(sink));
        self
    }

    /// Use a specific interception backend instead of the platform default.
    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptor = Some(Box::new(interceptor));
        self
    }

    /// Use a specific modifier sampler instead of the platform default.
    pub fn modifier_sampler(mut self, sampler: impl ModifierSampler + 'static) -> Self {
        self.sampler = Some(Box::new(sampler));
        self
    }

    /// Apply a loaded configuration: dispatch mode plus its hotkeys.
    pub fn with_config(mut self, config: &HotkeyConfig) -> Result<Self> {
        self.mode = config.dispatch;
        for entry in &config.hotkeys {
            let binding = parse_hotkey(&entry.hotkey)
                .with_context(|| format!("Invalid hotkey {:?}", entry.hotkey))?;
            self = self.add_hotkey_with(binding, entry.name.as_deref(), entry.forward);
        }
        Ok(self)
    }

    /// Build the listener. The hook is not installed until [`HotkeyListener::hook`].
    pub fn build(self) -> Result<HotkeyListener, HotkeyError> {
        let interceptor = match self.interceptor {
            Some(interceptor) => interceptor,
            None => default_interceptor()?,
        };
        let sampler = match self.sampler {
            Some(sampler) => sampler,
            None => default_sampler()?,
        };

        let mut registry = Registry::new();
        for hotkey in &self.hotkeys {
            registry.add(hotkey.binding, hotkey.name.as_deref(), hotkey.forward_default)?;
        }

        let core = Core {
            registry: std::sync::RwLock::new(registry),
            dispatcher: Dispatcher::new(self.mode, self.fault_sink.unwrap_or_else(log_fault)),
            sampler,
        };
        Ok(HotkeyListener {
            core: Arc::new(core),
            interceptor,
            handle: None,
        })
    }
}

#[cfg(windows)]
fn default_interceptor() -> Result<Box<dyn Interceptor>, HotkeyError> {
    Ok(Box::new(crate::windows::LowLevelKeyboardHook::new()))
}

#[cfg(windows)]
fn default_sampler() -> Result<Box<dyn ModifierSampler>, HotkeyError> {
    Ok(Box::new(crate::windows::AsyncKeyStateSampler))
}

#[cfg(target_os = "linux")]
fn default_interceptor() -> Result<Box<dyn Interceptor>, HotkeyError> {
    Ok(Box::new(crate::linux::EvdevInterceptor::new()))
}

#[cfg(target_os = "linux")]
fn default_sampler() -> Result<Box<dyn ModifierSampler>, HotkeyError> {
    let sampler = crate::linux::EvdevModifierSampler::open()
        .map_err(|e| crate::error::PlatformError::new(format!("{:#}", e)))?;
    Ok(Box::new(sampler))
}

#[cfg(not(any(windows, target_os = "linux")))]
fn default_interceptor() -> Result<Box<dyn Interceptor>, HotkeyError> {
    Err(crate::error::PlatformError::new(
        "Keyboard interception is not supported on this platform",
    )
    .into())
}

#[cfg(not(any(windows, target_os = "linux")))]
fn default_sampler() -> Result<Box<dyn ModifierSampler>, HotkeyError> {
    Err(crate::error::PlatformError::new(
        "Modifier sampling is not supported on this platform",
    )
    .into())
}

/// Application-owned hotkey context: registry, subscribers and the keyboard hook.
///
/// Each listener is independent. Registration and subscription never block
/// on the keyboard callback for longer than one registry update.
///
/// # Example
///
/// ```no_run
/// use hotkey_hook::{parse_hotkey, HotkeyListenerBuilder};
///
/// fn main() -> anyhow::Result<()> {
///     let mut listener = HotkeyListenerBuilder::new()
///         .add_named_hotkey("VolumeUp", parse_hotkey("Ctrl+Shift+Up")?)
///         .build()?;
///
///     listener.on_pressed(|args| {
///         println!("{:?} pressed", args.name());
///         args.handled = true;
///     });
///     listener.hook()?;
///     Ok(())
/// }
/// ```
pub struct HotkeyListener {
    core: Arc<Core>,
    interceptor: Box<dyn Interceptor>,
    handle: Option<HookHandle>,
}

impl HotkeyListener {
    fn registry(&self) -> RwLockWriteGuard<'_, Registry> {
        self.core
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // Queries share the lock with the callback's try_read, so keystrokes
    // arriving meanwhile are still matched.
    fn registry_read(&self) -> RwLockReadGuard<'_, Registry> {
        self.core
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an unnamed hotkey.
    pub fn add(&self, binding: Binding) -> Result<(), HotkeyError> {
        self.add_with(binding, None, false)
    }

    /// Register a hotkey under a unique name.
    pub fn add_named(&self, name: &str, binding: Binding) -> Result<(), HotkeyError> {
        self.add_with(binding, Some(name), false)
    }

    /// Register a hotkey. `forward_default` only matters in
    /// [`DispatchMode::Deferred`].
    pub fn add_with(
        &self,
        binding: Binding,
        name: Option<&str>,
        forward_default: bool,
    ) -> Result<(), HotkeyError> {
        self.registry().add(binding, name, forward_default)
    }

    /// Unregister the hotkey with this exact key and modifiers.
    pub fn remove(&self, binding: &Binding) -> Result<Registration, HotkeyError> {
        self.registry().remove(binding)
    }

    /// Unregister a hotkey by name.
    pub fn remove_named(&self, name: &str) -> Result<Registration, HotkeyError> {
        self.registry().remove_named(name)
    }

    /// Move `name` to a new binding. Subscribers keyed on the name keep working.
    ///
    /// On failure the old binding stays registered.
    pub fn rebind(&self, name: &str, binding: Binding) -> Result<(), HotkeyError> {
        let mut registry = self.registry();
        let old = registry.remove_named(name)?;
        if let Err(e) = registry.add(binding, Some(name), old.forward_default) {
            registry.add(old.binding, Some(name), old.forward_default)?;
            return Err(e);
        }
        Ok(())
    }

    /// Find the registration for an exact key and modifier combination.
    pub fn lookup(&self, binding: &Binding) -> Option<Match> {
        self.registry_read().lookup(binding)
    }

    /// Current binding of a named hotkey.
    pub fn binding_for(&self, name: &str) -> Option<Binding> {
        self.registry_read().binding_for(name)
    }

    /// Snapshot of every current registration.
    pub fn registrations(&self) -> Vec<Registration> {
        self.registry_read().iter().cloned().collect()
    }

    /// Subscribe to hotkey presses.
    pub fn on_pressed<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&mut HotkeyArgs) + Send + Sync + 'static,
    {
        self.core
            .dispatcher
            .subscribe(Direction::Pressed, Arc::new(handler))
    }

    /// Subscribe to hotkey releases.
    pub fn on_released<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&mut HotkeyArgs) + Send + Sync + 'static,
    {
        self.core
            .dispatcher
            .subscribe(Direction::Released, Arc::new(handler))
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.core.dispatcher.unsubscribe(id)
    }

    /// Dispatch mode chosen at build time.
    pub fn dispatch_mode(&self) -> DispatchMode {
        self.core.dispatcher.mode()
    }

    /// Deliver hotkeys queued by the callback in [`DispatchMode::Deferred`].
    ///
    /// Call this from the thread that should run the handlers. Returns the
    /// number of events delivered; always zero in inline mode.
    pub fn dispatch_pending(&self) -> usize {
        self.core.dispatcher.dispatch_pending()
    }

    /// Install the keyboard hook.
    pub fn hook(&mut self) -> Result<(), HotkeyError> {
        if self.handle.is_some() {
            return Err(HotkeyError::AlreadyInstalled);
        }

        let core = Arc::clone(&self.core);
        let callback: KeyboardCallback =
            Box::new(move |event: &RawKeyEvent| core.intercept(event));
        let handle = self.interceptor.install(callback).map_err(|e| {
            log::warn!("Failed to install keyboard hook: {}", e);
            e
        })?;

        self.handle = Some(handle);
        log::info!("Keyboard hook installed");
        Ok(())
    }

    /// Remove the keyboard hook. On failure the hook stays installed.
    pub fn unhook(&mut self) -> Result<(), HotkeyError> {
        let handle = self.handle.ok_or(HotkeyError::NotInstalled)?;
        self.interceptor.uninstall(handle).map_err(|e| {
            log::warn!("Failed to remove keyboard hook: {}", e);
            e
        })?;

        self.handle = None;
        log::info!("Keyboard hook removed");
        Ok(())
    }

    /// Whether the keyboard hook is currently installed.
    pub fn is_hooked(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.interceptor.uninstall(handle) {
                log::warn!("Failed to remove keyboard hook on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use crate::fake::{FakeInterceptor, FakeModifiers};
    use crate::hotkey::Modifiers;
    use crate::key::Key;

    fn listener(fake: &FakeInterceptor) -> HotkeyListener {
        HotkeyListenerBuilder::new()
            .interceptor(fake.clone())
            .modifier_sampler(FakeModifiers::new())
            .build()
            .unwrap()
    }

    #[test]
    fn test_hook_twice_fails() {
        let fake = FakeInterceptor::new();
        let mut listener = listener(&fake);
        listener.hook().unwrap();
        assert_eq!(listener.hook(), Err(HotkeyError::AlreadyInstalled));
        assert!(listener.is_hooked());
    }

    #[test]
    fn test_unhook_when_not_hooked_fails() {
        let fake = FakeInterceptor::new();
        let mut listener = listener(&fake);
        assert_eq!(listener.unhook(), Err(HotkeyError::NotInstalled));
        listener.hook().unwrap();
        listener.unhook().unwrap();
        assert_eq!(listener.unhook(), Err(HotkeyError::NotInstalled));
    }

    #[test]
    fn test_install_failure_is_platform_error() {
        let fake = FakeInterceptor::new();
        fake.fail_install(Some("access denied"));
        let mut listener = listener(&fake);
        assert_eq!(
            listener.hook(),
            Err(HotkeyError::Platform(PlatformError::new("access denied")))
        );
        assert!(!listener.is_hooked());

        fake.fail_install(None);
        listener.hook().unwrap();
    }

    #[test]
    fn test_uninstall_failure_keeps_handle() {
        let fake = FakeInterceptor::new();
        let mut listener = listener(&fake);
        listener.hook().unwrap();

        fake.fail_uninstall(Some("still busy"));
        assert!(matches!(listener.unhook(), Err(HotkeyError::Platform(_))));
        assert!(listener.is_hooked());
        assert!(fake.is_installed());

        fake.fail_uninstall(None);
        listener.unhook().unwrap();
        assert!(!fake.is_installed());
    }

    #[test]
    fn test_drop_removes_hook() {
        let fake = FakeInterceptor::new();
        let mut listener = listener(&fake);
        listener.hook().unwrap();
        drop(listener);
        assert!(!fake.is_installed());
    }

    #[test]
    fn test_builder_duplicate_fails() {
        let binding = Binding::new(Key::X, Modifiers::NONE);
        let result = HotkeyListenerBuilder::new()
            .interceptor(FakeInterceptor::new())
            .modifier_sampler(FakeModifiers::new())
            .add_hotkey(binding)
            .add_hotkey(binding)
            .build();
        assert!(matches!(result, Err(HotkeyError::DuplicateBinding { .. })));
    }

    #[test]
    fn test_rebind_failure_restores_old_binding() {
        let fake = FakeInterceptor::new();
        let listener = listener(&fake);
        let old = Binding::new(Key::Up, Modifiers::CONTROL);
        let taken = Binding::new(Key::Down, Modifiers::CONTROL);
        listener.add_named("Volume", old).unwrap();
        listener.add(taken).unwrap();

        assert!(matches!(
            listener.rebind("Volume", taken),
            Err(HotkeyError::DuplicateBinding { .. })
        ));
        assert_eq!(listener.binding_for("Volume"), Some(old));
    }

    #[test]
    fn test_queries_do_not_block_matching() {
        let fake = FakeInterceptor::new();
        let mut listener = listener(&fake);
        let binding = Binding::new(Key::Up, Modifiers::NONE);
        listener.add(binding).unwrap();
        listener.on_pressed(|args| args.handled = true);
        listener.hook().unwrap();

        // A query in progress on another thread holds the same guard.
        let query = listener.registry_read();
        assert!(query.lookup(&binding).is_some());
        assert_eq!(fake.press(Key::Up), crate::platform::Verdict::Swallow);
        drop(query);

        let update = listener.registry();
        assert_eq!(fake.press(Key::Up), crate::platform::Verdict::Forward);
        drop(update);
    }
}
