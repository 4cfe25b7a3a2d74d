//! Element identifiers, names and allocation.
//!
//! An [`ElementId`] is a stable handle into the [`ElementStore`](crate::ElementStore).
//! Element names follow the `Class.name` convention used by network models
//! (e.g. `Load.house_1`, `Transformer.sub`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A stable handle to one network element.
///
/// Handles are allocated once at setup and never reused for the lifetime of
/// the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u64);

impl ElementId {
    /// The null / invalid element sentinel.
    pub const INVALID: ElementId = ElementId(0);

    /// Create an element id from a raw `u64`.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` identifier.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is a valid (non-zero) handle.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Element({})", self.0)
    }
}

/// Allocates monotonically increasing element ids. Ids start at 1.
#[derive(Debug)]
pub struct ElementAllocator {
    next_id: u64,
}

impl ElementAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    pub fn allocate(&mut self) -> ElementId {
        let id = self.next_id;
        self.next_id += 1;
        ElementId(id)
    }

    /// Returns the number of ids handed out so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.next_id - 1
    }
}

impl Default for ElementAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// A fully qualified element name, `Class.name`.
///
/// The class part is everything before the first `.`; the name may itself
/// contain dots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ElementName {
    class: String,
    name: String,
}

impl ElementName {
    /// Build a name from its class and element parts.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BadElementName`] if either part is empty.
    pub fn new(class: impl Into<String>, name: impl Into<String>) -> Result<Self, EngineError> {
        let class = class.into();
        let name = name.into();
        if class.is_empty() || name.is_empty() {
            return Err(EngineError::BadElementName(format!("{class}.{name}")));
        }
        Ok(Self { class, name })
    }

    /// The element class, e.g. `Load`.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// The element name within its class.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for ElementName {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((class, name)) => Self::new(class, name),
            None => Err(EngineError::BadElementName(s.to_string())),
        }
    }
}

impl TryFrom<String> for ElementName {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ElementName> for String {
    fn from(value: ElementName) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ElementName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_produces_unique_ids() {
        let mut alloc = ElementAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 2);
        assert_eq!(alloc.count(), 2);
        assert!(!ElementId::INVALID.is_valid());
    }

    #[test]
    fn test_parse_element_name() {
        let name: ElementName = "Load.house_1".parse().unwrap();
        assert_eq!(name.class(), "Load");
        assert_eq!(name.name(), "house_1");
        assert_eq!(name.to_string(), "Load.house_1");
    }

    #[test]
    fn test_name_keeps_inner_dots() {
        let name: ElementName = "Line.feeder.segment_2".parse().unwrap();
        assert_eq!(name.class(), "Line");
        assert_eq!(name.name(), "feeder.segment_2");
    }

    #[test]
    fn test_name_without_class_is_rejected() {
        assert!("house_1".parse::<ElementName>().is_err());
        assert!(".house_1".parse::<ElementName>().is_err());
        assert!("Load.".parse::<ElementName>().is_err());
    }

    #[test]
    fn test_name_serde_as_string() {
        let name: ElementName = serde_json::from_str("\"PVSystem.roof\"").unwrap();
        assert_eq!(name.class(), "PVSystem");
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"PVSystem.roof\"");
        assert!(serde_json::from_str::<ElementName>("\"roof\"").is_err());
    }
}
