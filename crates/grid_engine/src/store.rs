//! Element arena.
//!
//! The [`ElementStore`] owns every element record of a network. It is
//! populated once at setup; afterwards only property values change, through
//! [`ElementStore::set`].

use std::collections::{BTreeMap, HashMap};

use crate::element::{ElementAllocator, ElementId, ElementName};
use crate::error::EngineError;
use crate::value::PropertyValue;

/// One element and its named properties.
#[derive(Debug, Clone)]
pub struct ElementRecord {
    pub id: ElementId,
    pub name: ElementName,
    pub properties: BTreeMap<String, PropertyValue>,
}

/// Arena of all network elements, addressed by [`ElementId`] or by name.
#[derive(Debug, Default)]
pub struct ElementStore {
    allocator: ElementAllocator,
    /// Records indexed by `id - 1`.
    records: Vec<ElementRecord>,
    by_name: HashMap<String, ElementId>,
    by_class: BTreeMap<String, Vec<ElementId>>,
}

impl ElementStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element with its initial properties.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DuplicateElement`] if the name is already taken.
    pub fn insert(
        &mut self,
        name: ElementName,
        properties: BTreeMap<String, PropertyValue>,
    ) -> Result<ElementId, EngineError> {
        let key = name.to_string();
        if self.by_name.contains_key(&key) {
            return Err(EngineError::DuplicateElement(key));
        }

        let id = self.allocator.allocate();
        self.by_class
            .entry(name.class().to_string())
            .or_default()
            .push(id);
        self.by_name.insert(key, id);
        self.records.push(ElementRecord {
            id,
            name,
            properties,
        });
        Ok(id)
    }

    /// Look up an element handle by its full `Class.name`.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<ElementId> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn record(&self, id: ElementId) -> Option<&ElementRecord> {
        let index = usize::try_from(id.id()).ok()?.checked_sub(1)?;
        self.records.get(index)
    }

    fn record_mut(&mut self, id: ElementId) -> Result<&mut ElementRecord, EngineError> {
        let index = usize::try_from(id.id())
            .ok()
            .and_then(|i| i.checked_sub(1))
            .ok_or(EngineError::UnknownHandle(id))?;
        self.records
            .get_mut(index)
            .ok_or(EngineError::UnknownHandle(id))
    }

    /// Returns the name of an element.
    #[must_use]
    pub fn name_of(&self, id: ElementId) -> Option<&ElementName> {
        self.record(id).map(|r| &r.name)
    }

    /// Returns the handles of every element of a class, in insertion order.
    #[must_use]
    pub fn ids_in_class(&self, class: &str) -> &[ElementId] {
        self.by_class
            .get(class)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Read a property.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle or the property is unknown.
    pub fn get(&self, id: ElementId, property: &str) -> Result<&PropertyValue, EngineError> {
        let record = self.record(id).ok_or(EngineError::UnknownHandle(id))?;
        record
            .properties
            .get(property)
            .ok_or_else(|| EngineError::UnknownProperty {
                element: record.name.to_string(),
                property: property.to_string(),
            })
    }

    /// Read a numeric property.
    ///
    /// # Errors
    ///
    /// As [`ElementStore::get`], plus [`EngineError::NotNumeric`].
    pub fn get_f64(&self, id: ElementId, property: &str) -> Result<f64, EngineError> {
        let value = self.get(id, property)?;
        value.as_f64().ok_or_else(|| EngineError::NotNumeric {
            element: self
                .name_of(id)
                .map(ToString::to_string)
                .unwrap_or_default(),
            property: property.to_string(),
            found: value.kind(),
        })
    }

    /// Overwrite an existing property. Properties cannot be created after
    /// setup.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle or the property is unknown.
    pub fn set(
        &mut self,
        id: ElementId,
        property: &str,
        value: PropertyValue,
    ) -> Result<(), EngineError> {
        let record = self.record_mut(id)?;
        match record.properties.get_mut(property) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(EngineError::UnknownProperty {
                element: record.name.to_string(),
                property: property.to_string(),
            }),
        }
    }

    /// Iterate over all records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ElementRecord> {
        self.records.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, f64)]) -> BTreeMap<String, PropertyValue> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), PropertyValue::Number(*v)))
            .collect()
    }

    fn name(s: &str) -> ElementName {
        s.parse().unwrap()
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut store = ElementStore::new();
        let load = store.insert(name("Load.a"), props(&[("kw", 5.0)])).unwrap();
        let bus = store.insert(name("Bus.b1"), props(&[("voltage", 1.0)])).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.id_of("Load.a"), Some(load));
        assert_eq!(store.id_of("Bus.b1"), Some(bus));
        assert_eq!(store.id_of("Load.missing"), None);
        assert_eq!(store.name_of(bus).unwrap().to_string(), "Bus.b1");
        assert_eq!(store.get_f64(load, "kw").unwrap(), 5.0);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut store = ElementStore::new();
        store.insert(name("Load.a"), BTreeMap::new()).unwrap();
        let err = store.insert(name("Load.a"), BTreeMap::new()).unwrap_err();
        assert_eq!(err, EngineError::DuplicateElement("Load.a".to_string()));
    }

    #[test]
    fn test_class_index_keeps_insertion_order() {
        let mut store = ElementStore::new();
        let a = store.insert(name("Load.a"), BTreeMap::new()).unwrap();
        store.insert(name("Bus.x"), BTreeMap::new()).unwrap();
        let b = store.insert(name("Load.b"), BTreeMap::new()).unwrap();
        assert_eq!(store.ids_in_class("Load"), &[a, b]);
        assert!(store.ids_in_class("Line").is_empty());
    }

    #[test]
    fn test_set_requires_existing_property() {
        let mut store = ElementStore::new();
        let id = store.insert(name("Load.a"), props(&[("kw", 1.0)])).unwrap();
        store.set(id, "kw", PropertyValue::Number(3.0)).unwrap();
        assert_eq!(store.get_f64(id, "kw").unwrap(), 3.0);
        assert!(matches!(
            store.set(id, "kvar", PropertyValue::Number(1.0)),
            Err(EngineError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn test_unknown_handle_and_non_numeric() {
        let mut store = ElementStore::new();
        let id = store
            .insert(
                name("Switch.s1"),
                [("state".to_string(), PropertyValue::from("open"))].into(),
            )
            .unwrap();
        assert!(matches!(
            store.get(ElementId(99), "state"),
            Err(EngineError::UnknownHandle(_))
        ));
        assert!(matches!(
            store.get(ElementId::INVALID, "state"),
            Err(EngineError::UnknownHandle(_))
        ));
        assert!(matches!(
            store.get_f64(id, "state"),
            Err(EngineError::NotNumeric { found: "text", .. })
        ));
    }
}
