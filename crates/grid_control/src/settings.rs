//! Declarative controller definitions.
//!
//! A scenario lists controllers as `(element, priority, settings)` entries.
//! Settings are either given inline, tagged by `"type"`, or reference a named
//! preset from the [`PresetRegistry`](crate::PresetRegistry).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::controller::Priority;
use crate::pv::PvSettings;
use crate::storage::StorageSettings;
use crate::transformer::TransformerSettings;

/// The closed set of controller families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    PvController,
    StorageController,
    TransformerController,
}

impl ControllerKind {
    pub const ALL: [ControllerKind; 3] = [
        ControllerKind::PvController,
        ControllerKind::StorageController,
        ControllerKind::TransformerController,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PvController => "pv_controller",
            Self::StorageController => "storage_controller",
            Self::TransformerController => "transformer_controller",
        }
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for one controller, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerSettings {
    PvController(PvSettings),
    StorageController(StorageSettings),
    TransformerController(TransformerSettings),
}

impl ControllerSettings {
    #[must_use]
    pub fn kind(&self) -> ControllerKind {
        match self {
            Self::PvController(_) => ControllerKind::PvController,
            Self::StorageController(_) => ControllerKind::StorageController,
            Self::TransformerController(_) => ControllerKind::TransformerController,
        }
    }
}

/// Where a controller's settings come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingsSource {
    Preset { kind: ControllerKind, preset: String },
    Inline(ControllerSettings),
}

/// One entry of the declarative controller list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerSpec {
    /// `Class.name` of the element the controller is bound to.
    pub element: String,
    #[serde(default)]
    pub priority: Priority,
    pub settings: SettingsSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_settings_json() {
        let spec: ControllerSpec = serde_json::from_str(
            r#"{
                "element": "Transformer.sub",
                "priority": 2,
                "settings": {
                    "type": "transformer_controller",
                    "monitored_element": "Bus.secondary",
                    "v_target": 1.0,
                    "bandwidth": 0.02
                }
            }"#,
        )
        .unwrap();
        assert_eq!(spec.priority, Priority(2));
        match spec.settings {
            SettingsSource::Inline(settings) => {
                assert_eq!(settings.kind(), ControllerKind::TransformerController);
            }
            other => panic!("expected inline settings, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_pv_mode_json() {
        let settings: ControllerSettings = serde_json::from_str(
            r#"{"type": "pv_controller", "mode": "constant_power_factor", "power_factor": 0.95}"#,
        )
        .unwrap();
        assert_eq!(settings.kind(), ControllerKind::PvController);
    }

    #[test]
    fn test_preset_reference_json() {
        let spec: ControllerSpec = serde_json::from_str(
            r#"{"element": "PVSystem.roof", "settings": {"kind": "pv_controller", "preset": "volt-var"}}"#,
        )
        .unwrap();
        assert_eq!(spec.priority, Priority(0));
        assert_eq!(
            spec.settings,
            SettingsSource::Preset {
                kind: ControllerKind::PvController,
                preset: "volt-var".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result: Result<ControllerSettings, _> =
            serde_json::from_str(r#"{"type": "motor_stall"}"#);
        assert!(result.is_err());
    }
}
