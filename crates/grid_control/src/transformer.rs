//! On-load tap changer regulation.

use grid_engine::{ElementId, Engine, EngineError, PropertyValue, TimeStep};
use serde::{Deserialize, Serialize};

use crate::controller::{Controller, ControllerState, Decision, EpochMemo, Priority};
use crate::error::ConstructionError;
use crate::factory::{bind_element, require_numeric};

fn default_voltage_property() -> String {
    "voltage".to_string()
}

fn default_min_tap() -> i32 {
    -16
}

fn default_max_tap() -> i32 {
    16
}

/// Settings for a [`TransformerController`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerSettings {
    /// Element whose voltage is regulated, usually the secondary bus.
    pub monitored_element: String,
    #[serde(default = "default_voltage_property")]
    pub monitored_property: String,
    /// Regulation target in per unit.
    pub v_target: f64,
    /// Full width of the dead band around `v_target`.
    pub bandwidth: f64,
    #[serde(default = "default_min_tap")]
    pub min_tap: i32,
    #[serde(default = "default_max_tap")]
    pub max_tap: i32,
}

/// Moves the transformer `tap` one position per iteration until the
/// monitored voltage is inside the dead band or the tap hits a limit.
///
/// The reported error is the number of tap positions moved.
#[derive(Debug, Clone)]
pub struct TransformerController {
    element_name: String,
    element: ElementId,
    priority: Priority,
    monitored: ElementId,
    monitored_property: String,
    v_target: f64,
    half_band: f64,
    min_tap: f64,
    max_tap: f64,
    memo: EpochMemo,
}

impl TransformerController {
    /// Bind a tap controller to `element_name`.
    ///
    /// # Errors
    ///
    /// Fails if either element is unknown, a required property is missing,
    /// or the settings are out of range.
    pub fn new(
        element_name: &str,
        priority: Priority,
        settings: &TransformerSettings,
        engine: &dyn Engine,
    ) -> Result<Self, ConstructionError> {
        let element = bind_element(engine, element_name)?;
        require_numeric(engine, element, element_name, "tap")?;
        let monitored = bind_element(engine, &settings.monitored_element)?;
        require_numeric(
            engine,
            monitored,
            &settings.monitored_element,
            &settings.monitored_property,
        )?;

        if !(settings.bandwidth > 0.0 && settings.bandwidth.is_finite()) {
            return Err(ConstructionError::invalid(
                element_name,
                format!("bandwidth must be positive, got {}", settings.bandwidth),
            ));
        }
        if settings.min_tap > settings.max_tap {
            return Err(ConstructionError::invalid(
                element_name,
                format!(
                    "min_tap {} is above max_tap {}",
                    settings.min_tap, settings.max_tap
                ),
            ));
        }

        Ok(Self {
            element_name: element_name.to_string(),
            element,
            priority,
            monitored,
            monitored_property: settings.monitored_property.clone(),
            v_target: settings.v_target,
            half_band: settings.bandwidth / 2.0,
            min_tap: f64::from(settings.min_tap),
            max_tap: f64::from(settings.max_tap),
            memo: EpochMemo::default(),
        })
    }

    fn next_tap(&self, tap: f64, voltage: f64) -> f64 {
        let step = if voltage < self.v_target - self.half_band {
            1.0
        } else if voltage > self.v_target + self.half_band {
            -1.0
        } else {
            0.0
        };
        (tap.round() + step).clamp(self.min_tap, self.max_tap)
    }
}

impl Controller for TransformerController {
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
            let tap = engine.read_f64(self.element, "tap")?;
            let voltage = engine.read_f64(self.monitored, &self.monitored_property)?;
            let next = self.next_tap(tap, voltage);
            Ok(Decision {
                setpoint: next,
                error: (next - tap).abs(),
            })
        })?;
        self.memo = memo;

        engine.write_element_property(self.element, "tap", PropertyValue::Number(decision.setpoint))?;
        Ok(decision.error)
    }

    fn state(&self) -> ControllerState {
        let decision = self.memo.last().unwrap_or_default();
        ControllerState::from([
            ("tap".to_string(), decision.setpoint),
            ("error".to_string(), decision.error),
        ])
    }
}
