//! Closed dispatch over the built-in controller kinds.

use grid_engine::{ElementId, Engine, EngineError, TimeStep};

use crate::controller::{Controller, ControllerState, Priority};
use crate::error::ConstructionError;
use crate::pv::PvController;
use crate::settings::{ControllerKind, ControllerSettings};
use crate::storage::StorageController;
use crate::transformer::TransformerController;

/// Any built-in controller. The variant is chosen once, at construction.
#[derive(Debug, Clone)]
pub enum AnyController {
    Pv(PvController),
    Storage(StorageController),
    Transformer(TransformerController),
}

impl AnyController {
    /// Construct the controller kind selected by `settings`.
    ///
    /// # Errors
    ///
    /// Returns the kind's construction error.
    pub fn build(
        element: &str,
        priority: Priority,
        settings: &ControllerSettings,
        engine: &dyn Engine,
    ) -> Result<Self, ConstructionError> {
        Ok(match settings {
            ControllerSettings::PvController(s) => {
                Self::Pv(PvController::new(element, priority, s, engine)?)
            }
            ControllerSettings::StorageController(s) => {
                Self::Storage(StorageController::new(element, priority, s, engine)?)
            }
            ControllerSettings::TransformerController(s) => {
                Self::Transformer(TransformerController::new(element, priority, s, engine)?)
            }
        })
    }

    #[must_use]
    pub fn kind(&self) -> ControllerKind {
        match self {
            Self::Pv(_) => ControllerKind::PvController,
            Self::Storage(_) => ControllerKind::StorageController,
            Self::Transformer(_) => ControllerKind::TransformerController,
        }
    }

    fn inner(&self) -> &dyn Controller {
        match self {
            Self::Pv(c) => c,
            Self::Storage(c) => c,
            Self::Transformer(c) => c,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Controller {
        match self {
            Self::Pv(c) => c,
            Self::Storage(c) => c,
            Self::Transformer(c) => c,
        }
    }
}

impl Controller for AnyController {
    fn element_name(&self) -> &str {
        self.inner().element_name()
    }

    fn element(&self) -> ElementId {
        self.inner().element()
    }

    fn priority(&self) -> Priority {
        self.inner().priority()
    }

    fn update(
        &mut self,
        engine: &mut dyn Engine,
        tier: Priority,
        time: TimeStep,
        update_results: bool,
    ) -> Result<f64, EngineError> {
        self.inner_mut().update(engine, tier, time, update_results)
    }

    fn state(&self) -> ControllerState {
        self.inner().state()
    }
}
