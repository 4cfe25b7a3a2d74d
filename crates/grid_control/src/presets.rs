//! Named controller settings.
//!
//! The preset registry maps `(kind, name)` to a full settings block so that
//! scenarios can write `{"kind": "pv_controller", "preset": "volt-var"}`
//! instead of repeating the curve for every inverter.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::ConstructionError;
use crate::pv::{PvMode, PvSettings};
use crate::settings::{ControllerKind, ControllerSettings};

/// Registry of named settings, grouped by controller kind.
#[derive(Debug, Clone, Default)]
pub struct PresetRegistry {
    presets: BTreeMap<ControllerKind, BTreeMap<String, ControllerSettings>>,
}

impl PresetRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry seeded with the built-in `cpf` and `volt-var` PV presets.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.reset_defaults();
        registry
    }

    /// Drop every preset and restore the built-in ones.
    pub fn reset_defaults(&mut self) {
        self.presets.clear();
        let defaults = [
            (
                "cpf",
                PvSettings {
                    mode: PvMode::ConstantPowerFactor { power_factor: 0.95 },
                    damping: 1.0,
                    voltage_property: "voltage".to_string(),
                },
            ),
            (
                "volt-var",
                PvSettings {
                    mode: PvMode::VoltVar {
                        v_points: [0.92, 0.98, 1.02, 1.08],
                        q_max_kvar: None,
                    },
                    damping: 0.5,
                    voltage_property: "voltage".to_string(),
                },
            ),
        ];
        for (name, settings) in defaults {
            self.presets
                .entry(ControllerKind::PvController)
                .or_default()
                .insert(name.to_string(), ControllerSettings::PvController(settings));
        }
        debug!("preset registry reset to defaults");
    }

    /// Register settings under `name`. The kind is taken from the settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError::DuplicatePreset`] if the name is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        settings: ControllerSettings,
    ) -> Result<(), ConstructionError> {
        let name = name.into();
        let kind = settings.kind();
        let entries = self.presets.entry(kind).or_default();
        if entries.contains_key(&name) {
            return Err(ConstructionError::DuplicatePreset { kind, name });
        }
        debug!(%kind, name, "registered preset");
        entries.insert(name, settings);
        Ok(())
    }

    /// Remove a preset.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError::UnknownPreset`] if it is not registered.
    pub fn unregister(&mut self, kind: ControllerKind, name: &str) -> Result<(), ConstructionError> {
        self.presets
            .get_mut(&kind)
            .and_then(|entries| entries.remove(name))
            .map(|_| ())
            .ok_or_else(|| ConstructionError::UnknownPreset {
                kind,
                name: name.to_string(),
            })
    }

    #[must_use]
    pub fn is_registered(&self, kind: ControllerKind, name: &str) -> bool {
        self.presets
            .get(&kind)
            .is_some_and(|entries| entries.contains_key(name))
    }

    /// Names registered for a kind, sorted.
    #[must_use]
    pub fn list(&self, kind: ControllerKind) -> Vec<&str> {
        self.presets
            .get(&kind)
            .map(|entries| entries.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Settings registered under `(kind, name)`.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError::UnknownPreset`] if it is not registered.
    pub fn settings(
        &self,
        kind: ControllerKind,
        name: &str,
    ) -> Result<&ControllerSettings, ConstructionError> {
        self.presets
            .get(&kind)
            .and_then(|entries| entries.get(name))
            .ok_or_else(|| ConstructionError::UnknownPreset {
                kind,
                name: name.to_string(),
            })
    }
}
