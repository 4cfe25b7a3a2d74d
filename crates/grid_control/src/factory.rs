//! Builds bound controllers from a declarative controller list.
//!
//! All validation happens here: once [`ControllerFactory::build`] returns,
//! every controller references an existing element and readable properties,
//! so the convergence loop never meets a structural error.

use grid_engine::{ElementId, Engine};
use tracing::info;

use crate::any::AnyController;
use crate::controller::Controller;
use crate::error::ConstructionError;
use crate::presets::PresetRegistry;
use crate::set::ControllerSet;
use crate::settings::{ControllerSettings, ControllerSpec, SettingsSource};

/// Resolve an element name, failing fast if the engine does not know it.
pub(crate) fn bind_element(engine: &dyn Engine, name: &str) -> Result<ElementId, ConstructionError> {
    engine
        .resolve_element(name)
        .ok_or_else(|| ConstructionError::UnknownElement(name.to_string()))
}

/// Check that a property exists and is numeric, returning its current value.
pub(crate) fn require_numeric(
    engine: &dyn Engine,
    element: ElementId,
    element_name: &str,
    property: &str,
) -> Result<f64, ConstructionError> {
    engine
        .read_f64(element, property)
        .map_err(|source| ConstructionError::engine(element_name, source))
}

/// Turns [`ControllerSpec`]s into a [`ControllerSet`].
#[derive(Debug, Clone, Copy)]
pub struct ControllerFactory<'a> {
    presets: &'a PresetRegistry,
    tier_count: usize,
}

impl<'a> ControllerFactory<'a> {
    #[must_use]
    pub fn new(presets: &'a PresetRegistry, tier_count: usize) -> Self {
        Self {
            presets,
            tier_count,
        }
    }

    /// Resolve a spec's settings, following preset references.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError::UnknownPreset`] for a dangling reference.
    pub fn resolve_settings<'s>(
        &self,
        spec: &'s ControllerSpec,
    ) -> Result<&'s ControllerSettings, ConstructionError>
    where
        'a: 's,
    {
        match &spec.settings {
            SettingsSource::Inline(settings) => Ok(settings),
            SettingsSource::Preset { kind, preset } => self.presets.settings(*kind, preset),
        }
    }

    /// Build one controller.
    ///
    /// # Errors
    ///
    /// Any [`ConstructionError`] for this spec.
    pub fn build_one(
        &self,
        spec: &ControllerSpec,
        engine: &dyn Engine,
    ) -> Result<AnyController, ConstructionError> {
        let settings = self.resolve_settings(spec)?;
        AnyController::build(&spec.element, spec.priority, settings, engine)
    }

    /// Build every controller and group them by tier.
    ///
    /// Stops at the first error; nothing is partially returned.
    ///
    /// # Errors
    ///
    /// The first [`ConstructionError`] encountered.
    pub fn build(
        &self,
        specs: &[ControllerSpec],
        engine: &dyn Engine,
    ) -> Result<ControllerSet<AnyController>, ConstructionError> {
        let mut set = ControllerSet::new(self.tier_count);
        for spec in specs {
            let controller = self.build_one(spec, engine)?;
            let label = controller.label();
            let kind = controller.kind();
            let priority = controller.priority();
            set.insert(controller)?;
            info!(controller = %label, %kind, %priority, "created controller");
        }
        Ok(set)
    }
}
