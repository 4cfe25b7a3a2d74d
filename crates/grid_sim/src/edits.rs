//! External per-step state edits.

use std::collections::BTreeMap;

use grid_engine::{Engine, EngineError, PropertyValue, TimeStep};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Property writes applied before a step advances, keyed by `Class.name`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepEdits(BTreeMap<String, BTreeMap<String, PropertyValue>>);

/// Edits keyed by the step they precede.
pub type EditSchedule = BTreeMap<TimeStep, StepEdits>;

impl StepEdits {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`StepEdits::insert`].
    #[must_use]
    pub fn set(mut self, element: &str, property: &str, value: impl Into<PropertyValue>) -> Self {
        self.insert(element, property, value);
        self
    }

    pub fn insert(&mut self, element: &str, property: &str, value: impl Into<PropertyValue>) {
        self.0
            .entry(element.to_string())
            .or_default()
            .insert(property.to_string(), value.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }

    /// Number of property writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    /// Check every element and property exists without writing anything.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownElement`] or [`EngineError::UnknownProperty`].
    pub fn validate(&self, engine: &dyn Engine) -> Result<(), EngineError> {
        for (element, properties) in &self.0 {
            let id = engine
                .resolve_element(element)
                .ok_or_else(|| EngineError::UnknownElement(element.clone()))?;
            for property in properties.keys() {
                engine.read_element_property(id, property)?;
            }
        }
        Ok(())
    }

    /// Write every edit into the engine.
    ///
    /// # Errors
    ///
    /// The first failed lookup or write.
    pub fn apply(&self, engine: &mut dyn Engine) -> Result<(), EngineError> {
        for (element, properties) in &self.0 {
            let id = engine
                .resolve_element(element)
                .ok_or_else(|| EngineError::UnknownElement(element.clone()))?;
            for (property, value) in properties {
                debug!(element = %element, property = %property, %value, "applying edit");
                engine.write_element_property(id, property, value.clone())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_engine::{SandboxEngine, SandboxSpec};

    fn engine() -> SandboxEngine {
        SandboxEngine::from_spec(
            &SandboxSpec::default()
                .element("Load.house", &[("kw", 2.0)])
                .element("Switch.s1", &[("closed", 1.0)]),
        )
        .unwrap()
    }

    #[test]
    fn test_apply_writes_every_property() {
        let mut engine = engine();
        let edits = StepEdits::new()
            .set("Load.house", "kw", 7.5)
            .set("Switch.s1", "closed", 0.0);
        assert_eq!(edits.len(), 2);

        edits.validate(&engine).unwrap();
        edits.apply(&mut engine).unwrap();

        let house = engine.resolve_element("Load.house").unwrap();
        assert_eq!(engine.read_f64(house, "kw").unwrap(), 7.5);
        let switch = engine.resolve_element("Switch.s1").unwrap();
        assert_eq!(engine.read_f64(switch, "closed").unwrap(), 0.0);
    }

    #[test]
    fn test_validate_rejects_unknown_targets() {
        let engine = engine();
        let err = StepEdits::new()
            .set("Load.missing", "kw", 1.0)
            .validate(&engine)
            .unwrap_err();
        assert_eq!(err, EngineError::UnknownElement("Load.missing".to_string()));

        let err = StepEdits::new()
            .set("Load.house", "kvar", 1.0)
            .validate(&engine)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownProperty { .. }));
    }

    #[test]
    fn test_schedule_parses_step_keys() {
        let schedule: EditSchedule =
            serde_json::from_str(r#"{"4": {"Load.house": {"kw": 3.0}}, "10": {}}"#).unwrap();
        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule[&TimeStep(4)].len(), 1);
        assert!(schedule[&TimeStep(10)].is_empty());
    }
}
