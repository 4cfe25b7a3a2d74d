//! Reactive power control for PV inverters.
//!
//! Two modes are supported: constant power factor, where reactive output
//! follows active output, and volt-var, where reactive output follows the
//! terminal voltage along a piecewise-linear curve.

use grid_engine::{ElementId, Engine, EngineError, PropertyValue, TimeStep};
use serde::{Deserialize, Serialize};

use crate::controller::{Controller, ControllerState, Decision, EpochMemo, Priority, damped};
use crate::error::ConstructionError;
use crate::factory::{bind_element, require_numeric};

/// Fraction of the inverter rating available for reactive power when a
/// volt-var curve does not give an explicit limit.
const DEFAULT_Q_FRACTION: f64 = 0.44;

fn default_damping() -> f64 {
    1.0
}

fn default_voltage_property() -> String {
    "voltage".to_string()
}

/// Settings for a [`PvController`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvSettings {
    #[serde(flatten)]
    pub mode: PvMode,
    /// Fraction of the remaining correction applied per iteration, in (0, 1].
    #[serde(default = "default_damping")]
    pub damping: f64,
    /// Property of the element holding its terminal voltage in per unit.
    #[serde(default = "default_voltage_property")]
    pub voltage_property: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PvMode {
    /// `kvar = kw · tan(acos(|pf|))`, absorbing when `pf` is negative.
    ConstantPowerFactor { power_factor: f64 },
    /// Piecewise-linear curve through `v_points` (`v1 < v2 <= v3 < v4`):
    /// full injection below `v1`, none between `v2` and `v3`, full
    /// absorption above `v4`.
    VoltVar {
        v_points: [f64; 4],
        #[serde(default)]
        q_max_kvar: Option<f64>,
    },
}

#[derive(Debug, Clone)]
enum Mode {
    PowerFactor { ratio: f64 },
    VoltVar { v: [f64; 4], q_max: f64 },
}

/// Inverter reactive power controller. Writes the element's `kvar`.
#[derive(Debug, Clone)]
pub struct PvController {
    element_name: String,
    element: ElementId,
    priority: Priority,
    mode: Mode,
    damping: f64,
    voltage_property: String,
    memo: EpochMemo,
}

impl PvController {
    /// Bind a PV controller to `element_name`.
    ///
    /// # Errors
    ///
    /// Fails if the element is unknown, lacks `kw`/`kvar`/the voltage
    /// property, or the settings are out of range.
    pub fn new(
        element_name: &str,
        priority: Priority,
        settings: &PvSettings,
        engine: &dyn Engine,
    ) -> Result<Self, ConstructionError> {
        let element = bind_element(engine, element_name)?;
        require_numeric(engine, element, element_name, "kvar")?;

        if !(settings.damping > 0.0 && settings.damping <= 1.0) {
            return Err(ConstructionError::invalid(
                element_name,
                format!("damping must be in (0, 1], got {}", settings.damping),
            ));
        }

        let mode = match &settings.mode {
            PvMode::ConstantPowerFactor { power_factor } => {
                let pf = *power_factor;
                if !(pf.abs() > 0.0 && pf.abs() <= 1.0) {
                    return Err(ConstructionError::invalid(
                        element_name,
                        format!("power factor must satisfy 0 < |pf| <= 1, got {pf}"),
                    ));
                }
                require_numeric(engine, element, element_name, "kw")?;
                let ratio = pf.abs().acos().tan() * pf.signum();
                Mode::PowerFactor { ratio }
            }
            PvMode::VoltVar {
                v_points,
                q_max_kvar,
            } => {
                let [v1, v2, v3, v4] = *v_points;
                if !(v1 < v2 && v2 <= v3 && v3 < v4) {
                    return Err(ConstructionError::invalid(
                        element_name,
                        format!("volt-var points must satisfy v1 < v2 <= v3 < v4, got {v_points:?}"),
                    ));
                }
                require_numeric(engine, element, element_name, &settings.voltage_property)?;
                let q_max = match q_max_kvar {
                    Some(q) => *q,
                    None => {
                        require_numeric(engine, element, element_name, "kva_rated")?
                            * DEFAULT_Q_FRACTION
                    }
                };
                if !(q_max > 0.0 && q_max.is_finite()) {
                    return Err(ConstructionError::invalid(
                        element_name,
                        format!("reactive power limit must be positive, got {q_max}"),
                    ));
                }
                Mode::VoltVar {
                    v: *v_points,
                    q_max,
                }
            }
        };

        Ok(Self {
            element_name: element_name.to_string(),
            element,
            priority,
            mode,
            damping: settings.damping,
            voltage_property: settings.voltage_property.clone(),
            memo: EpochMemo::default(),
        })
    }

    fn target_kvar(&self, engine: &dyn Engine) -> Result<f64, EngineError> {
        match self.mode {
            Mode::PowerFactor { ratio } => Ok(engine.read_f64(self.element, "kw")? * ratio),
            Mode::VoltVar { v, q_max } => {
                let voltage = engine.read_f64(self.element, &self.voltage_property)?;
                Ok(volt_var_curve(voltage, v, q_max))
            }
        }
    }
}

/// Reactive power demanded by a volt-var curve at `voltage`.
#[must_use]
pub fn volt_var_curve(voltage: f64, [v1, v2, v3, v4]: [f64; 4], q_max: f64) -> f64 {
    if voltage <= v1 {
        q_max
    } else if voltage < v2 {
        q_max * (v2 - voltage) / (v2 - v1)
    } else if voltage <= v3 {
        0.0
    } else if voltage < v4 {
        -q_max * (voltage - v3) / (v4 - v3)
    } else {
        -q_max
    }
}

impl Controller for PvController {
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
            let applied = engine.read_f64(self.element, "kvar")?;
            let target = self.target_kvar(&*engine)?;
            Ok(Decision {
                setpoint: damped(applied, target, self.damping),
                error: (target - applied).abs(),
            })
        })?;
        self.memo = memo;

        engine.write_element_property(
            self.element,
            "kvar",
            PropertyValue::Number(decision.setpoint),
        )?;
        Ok(decision.error)
    }

    fn state(&self) -> ControllerState {
        let decision = self.memo.last().unwrap_or_default();
        ControllerState::from([
            ("kvar".to_string(), decision.setpoint),
            ("error".to_string(), decision.error),
        ])
    }
}
