//! Controller construction errors.
//!
//! Every variant is fatal at setup. Nothing here is ever raised from inside
//! the convergence loop.

use grid_engine::EngineError;

use crate::controller::Priority;
use crate::settings::ControllerKind;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConstructionError {
    /// The controller references an element the engine does not know.
    #[error("controller references unknown element `{0}`")]
    UnknownElement(String),

    /// The engine rejected a property the controller needs.
    #[error("controller for `{element}` cannot use the engine: {source}")]
    Engine {
        element: String,
        #[source]
        source: EngineError,
    },

    /// The settings are out of range or inconsistent.
    #[error("invalid settings for controller on `{element}`: {reason}")]
    InvalidSettings { element: String, reason: String },

    /// The declared priority has no tier.
    #[error("controller on `{element}` declares priority {priority}, but only {tier_count} tiers exist")]
    PriorityOutOfRange {
        element: String,
        priority: Priority,
        tier_count: usize,
    },

    /// A second controller was declared for the same element.
    #[error("element `{0}` already has a controller")]
    DuplicateController(String),

    /// A preset lookup failed.
    #[error("no `{kind}` preset named `{name}` is registered")]
    UnknownPreset { kind: ControllerKind, name: String },

    /// A preset name is already taken.
    #[error("`{kind}` preset `{name}` is already registered")]
    DuplicatePreset { kind: ControllerKind, name: String },
}

impl ConstructionError {
    pub(crate) fn invalid(element: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSettings {
            element: element.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn engine(element: &str, source: EngineError) -> Self {
        Self::Engine {
            element: element.to_string(),
            source,
        }
    }
}
