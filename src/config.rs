//! Serializable hotkey configuration.

use crate::dispatch::DispatchMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One configured hotkey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Textual form accepted by [`parse_hotkey`](crate::parse_hotkey), e.g. "Ctrl+Shift+Up".
    pub hotkey: String,
    /// Forward the keystroke in deferred dispatch mode.
    #[serde(default)]
    pub forward: bool,
}

/// Hotkeys and dispatch mode, loadable from JSON.
///
/// ```json
/// {
///   "dispatch": "inline",
///   "hotkeys": [
///     { "name": "VolumeUp", "hotkey": "Ctrl+Shift+Up" },
///     { "hotkey": "F9", "forward": true }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyConfig {
    #[serde(default)]
    pub dispatch: DispatchMode,
    #[serde(default)]
    pub hotkeys: Vec<HotkeyEntry>,
}

impl HotkeyConfig {
    /// Parse configuration from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).context("Failed to parse hotkey configuration")
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json_str(&contents).with_context(|| format!("In {}", path.display()))
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize hotkey configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let config = HotkeyConfig::from_json_str(
            r#"{
                "dispatch": "deferred",
                "hotkeys": [
                    { "name": "VolumeUp", "hotkey": "Ctrl+Shift+Up" },
                    { "hotkey": "F9", "forward": true }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.dispatch, DispatchMode::Deferred);
        assert_eq!(config.hotkeys.len(), 2);
        assert_eq!(config.hotkeys[0].name.as_deref(), Some("VolumeUp"));
        assert!(!config.hotkeys[0].forward);
        assert!(config.hotkeys[1].name.is_none());
        assert!(config.hotkeys[1].forward);
    }

    #[test]
    fn test_defaults() {
        let config = HotkeyConfig::from_json_str("{}").unwrap();
        assert_eq!(config, HotkeyConfig::default());
        assert_eq!(config.dispatch, DispatchMode::Inline);
    }

    #[test]
    fn test_rejects_unknown_mode() {
        assert!(HotkeyConfig::from_json_str(r#"{ "dispatch": "sometimes" }"#).is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = HotkeyConfig {
            dispatch: DispatchMode::Deferred,
            hotkeys: vec![HotkeyEntry {
                name: Some("Mute".to_string()),
                hotkey: "Ctrl+Alt+M".to_string(),
                forward: false,
            }],
        };
        let json = config.to_json_string().unwrap();
        assert_eq!(HotkeyConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = HotkeyConfig::load("/nonexistent/hotkeys.json").unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read"));
    }
}
