//! Engine-adapter error types.

use crate::element::ElementId;
use crate::engine::TimeStep;

/// Errors raised by the engine adapter.
///
/// Lookup errors (`UnknownElement`, `UnknownProperty`, `NotNumeric`) and
/// `InvalidSpec` are structural and surface at setup; `SolveFailed` means the
/// engine is unusable and the run must stop.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// An element name did not follow the `Class.name` convention.
    #[error("malformed element name `{0}` (expected `Class.name`)")]
    BadElementName(String),

    /// An element name was used twice while populating the arena.
    #[error("element `{0}` is defined more than once")]
    DuplicateElement(String),

    /// No element with this name exists.
    #[error("unknown element `{0}`")]
    UnknownElement(String),

    /// No element with this handle exists.
    #[error("unknown element handle {0}")]
    UnknownHandle(ElementId),

    /// The element exists but does not carry the property.
    #[error("element `{element}` has no property `{property}`")]
    UnknownProperty { element: String, property: String },

    /// The property exists but does not hold a number.
    #[error("property `{element}.{property}` is a {found}, expected a number")]
    NotNumeric {
        element: String,
        property: String,
        found: &'static str,
    },

    /// A declarative network description is inconsistent.
    #[error("invalid network description: {0}")]
    InvalidSpec(String),

    /// The solver failed to produce a solution.
    #[error("solve failed at {time:?}: {reason}")]
    SolveFailed {
        time: Option<TimeStep>,
        reason: String,
    },
}
