//! Peak-shaving dispatch for storage elements.

use grid_engine::{ElementId, Engine, EngineError, PropertyValue, TimeStep};
use serde::{Deserialize, Serialize};

use crate::controller::{Controller, ControllerState, Decision, EpochMemo, Priority, damped};
use crate::error::ConstructionError;
use crate::factory::{bind_element, require_numeric};

fn default_damping() -> f64 {
    1.0
}

fn default_kw_property() -> String {
    "kw".to_string()
}

/// Settings for a [`StorageController`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Element whose power flow is being shaved, e.g. `Transformer.sub`.
    pub monitored_element: String,
    #[serde(default = "default_kw_property")]
    pub monitored_property: String,
    /// Flow above which the storage discharges.
    pub kw_limit: f64,
    /// Maximum discharge power.
    pub kw_rated: f64,
    #[serde(default = "default_damping")]
    pub damping: f64,
}

/// Discharges the storage element (`kw`, positive = discharge) so that the
/// monitored flow stays at or below `kw_limit`.
#[derive(Debug, Clone)]
pub struct StorageController {
    element_name: String,
    element: ElementId,
    priority: Priority,
    monitored: ElementId,
    monitored_property: String,
    kw_limit: f64,
    kw_rated: f64,
    damping: f64,
    memo: EpochMemo,
}

impl StorageController {
    /// Bind a storage controller to `element_name`.
    ///
    /// # Errors
    ///
    /// Fails if either element is unknown, a required property is missing,
    /// or the settings are out of range.
    pub fn new(
        element_name: &str,
        priority: Priority,
        settings: &StorageSettings,
        engine: &dyn Engine,
    ) -> Result<Self, ConstructionError> {
        let element = bind_element(engine, element_name)?;
        require_numeric(engine, element, element_name, "kw")?;
        let monitored = bind_element(engine, &settings.monitored_element)?;
        require_numeric(
            engine,
            monitored,
            &settings.monitored_element,
            &settings.monitored_property,
        )?;

        if !(settings.kw_rated > 0.0 && settings.kw_rated.is_finite()) {
            return Err(ConstructionError::invalid(
                element_name,
                format!("kw_rated must be positive, got {}", settings.kw_rated),
            ));
        }
        if !settings.kw_limit.is_finite() {
            return Err(ConstructionError::invalid(element_name, "kw_limit must be finite"));
        }
        if !(settings.damping > 0.0 && settings.damping <= 1.0) {
            return Err(ConstructionError::invalid(
                element_name,
                format!("damping must be in (0, 1], got {}", settings.damping),
            ));
        }

        Ok(Self {
            element_name: element_name.to_string(),
            element,
            priority,
            monitored,
            monitored_property: settings.monitored_property.clone(),
            kw_limit: settings.kw_limit,
            kw_rated: settings.kw_rated,
            damping: settings.damping,
            memo: EpochMemo::default(),
        })
    }
}

impl Controller for StorageController {
    fn element_name(&self) -> &str {
        &self.element_name
    }

    fn element(&self) -> ElementId {
        self.element
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn update(
        &mut self,
        engine: &mut dyn Engine,
        tier: Priority,
        _time: TimeStep,
        _update_results: bool,
    ) -> Result<f64, EngineError> {
        if tier != self.priority {
            return Ok(0.0);
        }

        let epoch = engine.solve_epoch();
        let mut memo = self.memo;
        let decision = memo.get_or_decide(epoch, || {
            let dispatch = engine.read_f64(self.element, "kw")?;
            let flow = engine.read_f64(self.monitored, &self.monitored_property)?;
            let target = (dispatch + flow - self.kw_limit).clamp(0.0, self.kw_rated);
            Ok(Decision {
                setpoint: damped(dispatch, target, self.damping),
                error: (target - dispatch).abs(),
            })
        })?;
        self.memo = memo;

        engine.write_element_property(self.element, "kw", PropertyValue::Number(decision.setpoint))?;
        Ok(decision.error)
    }

    fn state(&self) -> ControllerState {
        let decision = self.memo.last().unwrap_or_default();
        ControllerState::from([
            ("kw".to_string(), decision.setpoint),
            ("error".to_string(), decision.error),
        ])
    }
}
