//! The engine adapter contract.
//!
//! The scheduler never does physics. It drives an [`Engine`] through two
//! operations (advance one step, re-solve at the current step) and reads or
//! writes element properties in between.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::element::ElementId;
use crate::error::EngineError;
use crate::value::PropertyValue;

/// Index of a simulation time step, counted from 0.
///
/// The step index is the only notion of time the scheduler hands to
/// controllers and to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeStep(pub u64);

impl TimeStep {
    #[must_use]
    pub const fn index(self) -> u64 {
        self.0
    }

    /// The step after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TimeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// An external solver exposing the operations the scheduler needs.
///
/// An engine starts *before* step 0: [`Engine::current_time`] is `None`
/// until the first [`Engine::advance_one_step`], which moves it to step 0.
/// Time only ever moves forward.
pub trait Engine {
    /// Advance the engine's internal time by one step and solve.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SolveFailed`] if the solve does not complete.
    fn advance_one_step(&mut self) -> Result<TimeStep, EngineError>;

    /// Re-solve at the current time with whatever settings were written
    /// since the last solve.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SolveFailed`] if the solve does not complete.
    fn resolve_at_current_time(&mut self) -> Result<(), EngineError>;

    /// Read one property of an element.
    ///
    /// # Errors
    ///
    /// Returns an error if the element or property is unknown.
    fn read_element_property(
        &self,
        element: ElementId,
        property: &str,
    ) -> Result<PropertyValue, EngineError>;

    /// Write one property of an element. The write takes effect at the next
    /// solve.
    ///
    /// # Errors
    ///
    /// Returns an error if the element or property is unknown.
    fn write_element_property(
        &mut self,
        element: ElementId,
        property: &str,
        value: PropertyValue,
    ) -> Result<(), EngineError>;

    /// The step the engine is currently solved at.
    fn current_time(&self) -> Option<TimeStep>;

    /// Counter bumped by every advance and every re-solve.
    ///
    /// Two reads with the same epoch are guaranteed to observe the same
    /// solved state.
    fn solve_epoch(&self) -> u64;

    /// Resolve a `Class.name` to a handle.
    fn resolve_element(&self, name: &str) -> Option<ElementId>;

    /// The `Class.name` of a handle.
    fn element_name(&self, element: ElementId) -> Option<String>;

    /// Read a numeric property.
    ///
    /// # Errors
    ///
    /// As [`Engine::read_element_property`], plus [`EngineError::NotNumeric`].
    fn read_f64(&self, element: ElementId, property: &str) -> Result<f64, EngineError> {
        let value = self.read_element_property(element, property)?;
        value.as_f64().ok_or_else(|| EngineError::NotNumeric {
            element: self.element_name(element).unwrap_or_default(),
            property: property.to_string(),
            found: value.kind(),
        })
    }
}
