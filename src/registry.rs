//! Registered hotkeys and the name <-> binding maps.
//!
//! Pure data structure: no I/O, no locking. [`HotkeyListener`](crate::HotkeyListener)
//! wraps it in a lock shared with the interception callback.

use crate::error::HotkeyError;
use crate::hotkey::Binding;
use crate::key::KeyCode;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One registered hotkey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub binding: Binding,
    pub name: Option<Arc<str>>,
    /// Forward the keystroke to other applications when dispatch cannot
    /// decide synchronously.
    pub forward_default: bool,
}

/// Result of a successful [`Registry::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub name: Option<Arc<str>>,
    pub forward_default: bool,
}

#[derive(Debug, Default)]
pub struct Registry {
    bindings: HashMap<Binding, Registration>,
    names: HashMap<Arc<str>, Binding>,
    // Number of bindings per base key; a key is watched while its count is non-zero.
    watched: HashMap<KeyCode, usize>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `binding`, optionally under a unique `name`.
    pub fn add(
        &mut self,
        binding: Binding,
        name: Option<&str>,
        forward_default: bool,
    ) -> Result<(), HotkeyError> {
        if name.is_some_and(str::is_empty) {
            return Err(HotkeyError::InvalidName);
        }
        if let Some(existing) = self.bindings.get(&binding) {
            return Err(HotkeyError::DuplicateBinding {
                binding,
                existing_name: existing.name.as_deref().map(String::from),
            });
        }
        if let Some(name) = name {
            if self.names.contains_key(name) {
                return Err(HotkeyError::DuplicateName(name.to_string()));
            }
        }

        let name: Option<Arc<str>> = name.map(Arc::from);
        if let Some(name) = &name {
            self.names.insert(Arc::clone(name), binding);
        }
        *self.watched.entry(binding.key).or_insert(0) += 1;
        self.bindings.insert(
            binding,
            Registration {
                binding,
                name,
                forward_default,
            },
        );

        log::debug!("Registered hotkey {}", binding);
        Ok(())
    }

    /// Remove the registration for `binding`, returning it.
    pub fn remove(&mut self, binding: &Binding) -> Result<Registration, HotkeyError> {
        let registration = self
            .bindings
            .remove(binding)
            .ok_or_else(|| HotkeyError::NotFound(binding.to_string()))?;

        if let Some(name) = &registration.name {
            self.names.remove(name);
        }
        if let Some(count) = self.watched.get_mut(&binding.key) {
            *count -= 1;
            if *count == 0 {
                self.watched.remove(&binding.key);
            }
        }

        log::debug!("Removed hotkey {}", binding);
        Ok(registration)
    }

    /// Remove the registration known as `name`.
    pub fn remove_named(&mut self, name: &str) -> Result<Registration, HotkeyError> {
        if name.is_empty() {
            return Err(HotkeyError::InvalidName);
        }
        let binding = *self
            .names
            .get(name)
            .ok_or_else(|| HotkeyError::NotFound(format!("{:?}", name)))?;
        self.remove(&binding)
    }

    /// Exact-mask lookup of a candidate binding.
    pub fn lookup(&self, binding: &Binding) -> Option<Match> {
        self.bindings.get(binding).map(|r| Match {
            name: r.name.clone(),
            forward_default: r.forward_default,
        })
    }

    /// Binding currently registered under `name`.
    pub fn binding_for(&self, name: &str) -> Option<Binding> {
        self.names.get(name).copied()
    }

    /// Fast pre-filter: does any binding use `key` as its base key?
    pub fn is_watched(&self, key: KeyCode) -> bool {
        self.watched.contains_key(&key)
    }

    /// Every base key used by at least one binding.
    pub fn watched_keys(&self) -> HashSet<KeyCode> {
        self.watched.keys().copied().collect()
    }

    /// Iterate over all registrations, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Registration> {
        self.bindings.values()
    }

    /// Number of registered bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no binding is registered.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::Modifiers;
    use crate::key::Key;

    fn projected_keys(registry: &Registry) -> HashSet<KeyCode> {
        registry.iter().map(|r| r.binding.key).collect()
    }

    #[test]
    fn test_distinct_bindings_register() {
        let mut registry = Registry::new();
        registry
            .add(Binding::new(Key::A, Modifiers::CONTROL), None, false)
            .unwrap();
        registry
            .add(Binding::new(Key::A, Modifiers::SHIFT), None, false)
            .unwrap();
        registry
            .add(Binding::new(Key::B, Modifiers::CONTROL), None, false)
            .unwrap();
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let mut registry = Registry::new();
        let binding = Binding::new(Key::X, Modifiers::NONE);
        registry.add(binding, None, false).unwrap();
        let err = registry.add(binding, None, false).unwrap_err();
        assert_eq!(
            err,
            HotkeyError::DuplicateBinding {
                binding,
                existing_name: None
            }
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_binding_reports_existing_name() {
        let mut registry = Registry::new();
        let binding = Binding::new(Key::Up, Modifiers::CONTROL);
        registry.add(binding, Some("VolumeUp"), false).unwrap();
        match registry.add(binding, Some("Other"), false) {
            Err(HotkeyError::DuplicateBinding { existing_name, .. }) => {
                assert_eq!(existing_name.as_deref(), Some("VolumeUp"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(registry.binding_for("Other").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected_without_side_effects() {
        let mut registry = Registry::new();
        registry
            .add(Binding::new(Key::Up, Modifiers::CONTROL), Some("Up"), false)
            .unwrap();
        let second = Binding::new(Key::Down, Modifiers::CONTROL);
        assert_eq!(
            registry.add(second, Some("Up"), false),
            Err(HotkeyError::DuplicateName("Up".to_string()))
        );
        assert!(registry.lookup(&second).is_none());
        assert!(!registry.is_watched(Key::Down.code()));
    }

    #[test]
    fn test_empty_name_is_invalid() {
        let mut registry = Registry::new();
        let binding = Binding::new(Key::Up, Modifiers::NONE);
        assert_eq!(
            registry.add(binding, Some(""), false),
            Err(HotkeyError::InvalidName)
        );
        assert_eq!(registry.remove_named(""), Err(HotkeyError::InvalidName));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_lookup_returns_supplied_name() {
        let mut registry = Registry::new();
        let binding = Binding::new(Key::Up, Modifiers::CONTROL | Modifiers::SHIFT);
        registry.add(binding, Some("VolumeUp"), true).unwrap();

        let found = registry.lookup(&binding).unwrap();
        assert_eq!(found.name.as_deref(), Some("VolumeUp"));
        assert!(found.forward_default);
        assert_eq!(registry.binding_for("VolumeUp"), Some(binding));
    }

    #[test]
    fn test_lookup_is_exact_mask() {
        let mut registry = Registry::new();
        registry
            .add(Binding::new(Key::Up, Modifiers::CONTROL), None, false)
            .unwrap();
        assert!(registry
            .lookup(&Binding::new(Key::Up, Modifiers::CONTROL | Modifiers::SHIFT))
            .is_none());
        assert!(registry
            .lookup(&Binding::new(Key::Up, Modifiers::NONE))
            .is_none());
    }

    #[test]
    fn test_remove_named_clears_both_directions() {
        let mut registry = Registry::new();
        let binding = Binding::new(Key::Up, Modifiers::CONTROL);
        registry.add(binding, Some("VolumeUp"), false).unwrap();

        let removed = registry.remove_named("VolumeUp").unwrap();
        assert_eq!(removed.binding, binding);
        assert!(registry.lookup(&binding).is_none());
        assert!(registry.binding_for("VolumeUp").is_none());
        assert!(!registry.is_watched(binding.key));
    }

    #[test]
    fn test_remove_unknown() {
        let mut registry = Registry::new();
        assert!(matches!(
            registry.remove_named("Unknown"),
            Err(HotkeyError::NotFound(_))
        ));
        assert!(matches!(
            registry.remove(&Binding::new(Key::A, Modifiers::NONE)),
            Err(HotkeyError::NotFound(_))
        ));
    }

    #[test]
    fn test_name_is_reusable_after_removal() {
        let mut registry = Registry::new();
        registry
            .add(Binding::new(Key::Up, Modifiers::CONTROL), Some("Volume"), false)
            .unwrap();
        registry.remove_named("Volume").unwrap();
        let rebound = Binding::new(Key::PageUp, Modifiers::ALT);
        registry.add(rebound, Some("Volume"), false).unwrap();
        assert_eq!(registry.binding_for("Volume"), Some(rebound));
    }

    #[test]
    fn test_watched_keys_track_bindings() {
        let mut registry = Registry::new();
        let bindings = [
            Binding::new(Key::A, Modifiers::NONE),
            Binding::new(Key::A, Modifiers::CONTROL),
            Binding::new(Key::B, Modifiers::ALT),
            Binding::new(Key::C, Modifiers::SHIFT),
            Binding::new(Key::C, Modifiers::SHIFT | Modifiers::ALT),
        ];

        // Deterministic interleaving of adds and removes.
        let script: [(bool, usize); 12] = [
            (true, 0),
            (true, 1),
            (true, 2),
            (false, 0),
            (true, 3),
            (true, 4),
            (false, 1),
            (false, 3),
            (true, 0),
            (false, 2),
            (false, 4),
            (false, 0),
        ];
        for (add, idx) in script {
            if add {
                registry.add(bindings[idx], None, false).unwrap();
            } else {
                registry.remove(&bindings[idx]).unwrap();
            }
            assert_eq!(registry.watched_keys(), projected_keys(&registry));
        }
        assert!(registry.watched_keys().is_empty());
    }

    #[test]
    fn test_removing_one_of_two_bindings_keeps_key_watched() {
        let mut registry = Registry::new();
        let plain = Binding::new(Key::A, Modifiers::NONE);
        let ctrl = Binding::new(Key::A, Modifiers::CONTROL);
        registry.add(plain, None, false).unwrap();
        registry.add(ctrl, None, false).unwrap();
        registry.remove(&plain).unwrap();
        assert!(registry.is_watched(Key::A.code()));
        registry.remove(&ctrl).unwrap();
        assert!(!registry.is_watched(Key::A.code()));
    }
}
