//! The [`Controller`] contract and the priority tier type.
//!
//! A controller is bound to one network element. On every call to
//! [`Controller::update`] it reads the current solved state, writes at most
//! one new control setting, and returns how far its target quantity is from
//! its setpoint. It never re-solves the engine itself.

use std::collections::BTreeMap;
use std::fmt;

use grid_engine::{ElementId, Engine, EngineError, TimeStep};
use serde::{Deserialize, Serialize};

/// Priority tier of a controller. Lower values are processed first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observable post-update state of a controller, recorded in results.
pub type ControllerState = BTreeMap<String, f64>;

/// A unit of feedback logic bound to one network element.
///
/// # Contract
///
/// - Domain conditions (out-of-band voltage, saturated limits) are reported
///   through the returned error, never through `Err`. `Err` is reserved for
///   the engine itself failing.
/// - At most one write to the engine per call.
/// - Two calls with no solve in between return the same error and leave the
///   engine in the same state. Use [`EpochMemo`] to get this for free.
pub trait Controller {
    /// The `Class.name` of the owning element.
    fn element_name(&self) -> &str;

    /// Handle of the owning element.
    fn element(&self) -> ElementId;

    /// The tier this controller was declared in. Never changes.
    fn priority(&self) -> Priority;

    /// Compute a correction for the current solved state and return the
    /// local convergence error.
    ///
    /// `update_results` is set on a tier's results-committing pass.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] only if the engine rejects a read or write.
    fn update(
        &mut self,
        engine: &mut dyn Engine,
        tier: Priority,
        time: TimeStep,
        update_results: bool,
    ) -> Result<f64, EngineError>;

    /// Observable state after the most recent update.
    fn state(&self) -> ControllerState;

    /// Identifier used in logs and results, `Controller.<element>`.
    fn label(&self) -> String {
        format!("Controller.{}", self.element_name())
    }
}

/// A control decision: the setting to write and the error it corrects.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Decision {
    pub setpoint: f64,
    pub error: f64,
}

/// Remembers the decision taken for one solve epoch.
///
/// Controllers read back their own writes, so a second evaluation against the
/// same solution would otherwise see a different "applied" value.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochMemo {
    entry: Option<(u64, Decision)>,
}

impl EpochMemo {
    /// Return the decision cached for `epoch`, or compute and cache it.
    ///
    /// # Errors
    ///
    /// Propagates the error of `decide`.
    pub fn get_or_decide<F>(&mut self, epoch: u64, decide: F) -> Result<Decision, EngineError>
    where
        F: FnOnce() -> Result<Decision, EngineError>,
    {
        if let Some((cached_epoch, decision)) = self.entry
            && cached_epoch == epoch
        {
            return Ok(decision);
        }
        let decision = decide()?;
        self.entry = Some((epoch, decision));
        Ok(decision)
    }

    /// The most recent decision, if any.
    #[must_use]
    pub fn last(&self) -> Option<Decision> {
        self.entry.map(|(_, d)| d)
    }
}

/// Step `applied` toward `target` by `damping` (1.0 jumps straight there).
#[must_use]
pub fn damped(applied: f64, target: f64, damping: f64) -> f64 {
    applied + damping * (target - applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memo_reuses_decision_within_epoch() {
        let mut memo = EpochMemo::default();
        let first = memo
            .get_or_decide(3, || {
                Ok(Decision {
                    setpoint: 1.0,
                    error: 0.5,
                })
            })
            .unwrap();
        let second = memo
            .get_or_decide(3, || panic!("must not re-decide in the same epoch"))
            .unwrap();
        assert_eq!(first, second);

        let third = memo
            .get_or_decide(4, || {
                Ok(Decision {
                    setpoint: 2.0,
                    error: 0.0,
                })
            })
            .unwrap();
        assert_eq!(third.setpoint, 2.0);
        assert_eq!(memo.last(), Some(third));
    }

    #[test]
    fn test_damped_step() {
        assert_eq!(damped(0.0, 10.0, 1.0), 10.0);
        assert_eq!(damped(0.0, 10.0, 0.5), 5.0);
        assert_eq!(damped(4.0, 4.0, 0.3), 4.0);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority(0) < Priority(1));
        assert_eq!(Priority(2).index(), 2);
        assert_eq!(Priority(1).to_string(), "1");
    }
}
