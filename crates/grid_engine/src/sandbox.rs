//! In-memory reference engine.
//!
//! [`SandboxEngine`] is a deterministic stand-in for a real network solver.
//! Its "solve" is a fixed sequence of linear couplings
//! (`target = offset + Σ gain · source`) evaluated in declaration order, and
//! its time series input comes from per-step profiles. It is enough to drive
//! scenarios, the CLI and tests through the full scheduling protocol.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::element::{ElementId, ElementName};
use crate::engine::{Engine, TimeStep};
use crate::error::EngineError;
use crate::store::ElementStore;
use crate::value::PropertyValue;

/// Declarative description of a sandbox network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxSpec {
    pub elements: Vec<ElementSpec>,
    #[serde(default)]
    pub profiles: Vec<ProfileSpec>,
    #[serde(default)]
    pub couplings: Vec<CouplingSpec>,
}

/// One element and its initial property values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSpec {
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

/// A value series written into a property on every advance, cycled by step
/// index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSpec {
    pub element: String,
    pub property: String,
    pub values: Vec<f64>,
}

/// `element.property = offset + Σ gain · source.property`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouplingSpec {
    pub element: String,
    pub property: String,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub terms: Vec<TermSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermSpec {
    pub element: String,
    pub property: String,
    pub gain: f64,
}

impl SandboxSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element with numeric properties.
    #[must_use]
    pub fn element(mut self, name: &str, properties: &[(&str, f64)]) -> Self {
        self.elements.push(ElementSpec {
            name: name.to_string(),
            properties: properties
                .iter()
                .map(|(k, v)| ((*k).to_string(), PropertyValue::Number(*v)))
                .collect(),
        });
        self
    }

    /// Add a per-step profile.
    #[must_use]
    pub fn profile(mut self, element: &str, property: &str, values: &[f64]) -> Self {
        self.profiles.push(ProfileSpec {
            element: element.to_string(),
            property: property.to_string(),
            values: values.to_vec(),
        });
        self
    }

    /// Add a linear coupling. Each term is `(element, property, gain)`.
    #[must_use]
    pub fn coupling(
        mut self,
        element: &str,
        property: &str,
        offset: f64,
        terms: &[(&str, &str, f64)],
    ) -> Self {
        self.couplings.push(CouplingSpec {
            element: element.to_string(),
            property: property.to_string(),
            offset,
            terms: terms
                .iter()
                .map(|(e, p, g)| TermSpec {
                    element: (*e).to_string(),
                    property: (*p).to_string(),
                    gain: *g,
                })
                .collect(),
        });
        self
    }
}

#[derive(Debug, Clone)]
struct Slot {
    element: ElementId,
    property: String,
}

#[derive(Debug, Clone)]
struct Profile {
    target: Slot,
    values: Vec<f64>,
}

#[derive(Debug, Clone)]
struct Coupling {
    target: Slot,
    offset: f64,
    terms: Vec<(Slot, f64)>,
}

/// Deterministic in-memory [`Engine`].
#[derive(Debug)]
pub struct SandboxEngine {
    store: ElementStore,
    profiles: Vec<Profile>,
    couplings: Vec<Coupling>,
    time: Option<TimeStep>,
    epoch: u64,
    advances: u64,
    resolves: u64,
}

impl SandboxEngine {
    /// Build the engine, resolving every name in the spec up front.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed or duplicate element names, references
    /// to unknown elements or properties, non-numeric coupling slots and
    /// empty profiles.
    pub fn from_spec(spec: &SandboxSpec) -> Result<Self, EngineError> {
        let mut store = ElementStore::new();
        for element in &spec.elements {
            let name: ElementName = element.name.parse()?;
            store.insert(name, element.properties.clone())?;
        }

        let slot = |element: &str, property: &str| -> Result<Slot, EngineError> {
            let id = store
                .id_of(element)
                .ok_or_else(|| EngineError::UnknownElement(element.to_string()))?;
            store.get_f64(id, property)?;
            Ok(Slot {
                element: id,
                property: property.to_string(),
            })
        };

        let mut profiles = Vec::with_capacity(spec.profiles.len());
        for p in &spec.profiles {
            if p.values.is_empty() {
                return Err(EngineError::InvalidSpec(format!(
                    "profile for `{}.{}` has no values",
                    p.element, p.property
                )));
            }
            profiles.push(Profile {
                target: slot(&p.element, &p.property)?,
                values: p.values.clone(),
            });
        }

        let mut couplings = Vec::with_capacity(spec.couplings.len());
        for c in &spec.couplings {
            let terms = c
                .terms
                .iter()
                .map(|t| Ok((slot(&t.element, &t.property)?, t.gain)))
                .collect::<Result<Vec<_>, EngineError>>()?;
            couplings.push(Coupling {
                target: slot(&c.element, &c.property)?,
                offset: c.offset,
                terms,
            });
        }

        debug!(
            elements = store.len(),
            profiles = profiles.len(),
            couplings = couplings.len(),
            "sandbox engine built"
        );

        Ok(Self {
            store,
            profiles,
            couplings,
            time: None,
            epoch: 0,
            advances: 0,
            resolves: 0,
        })
    }

    /// The underlying element arena.
    #[must_use]
    pub fn store(&self) -> &ElementStore {
        &self.store
    }

    /// Number of completed advances.
    #[must_use]
    pub fn advance_count(&self) -> u64 {
        self.advances
    }

    /// Number of completed re-solves.
    #[must_use]
    pub fn resolve_count(&self) -> u64 {
        self.resolves
    }

    fn solve(&mut self) -> Result<(), EngineError> {
        for coupling in &self.couplings {
            let mut value = coupling.offset;
            for (source, gain) in &coupling.terms {
                value += gain * self.store.get_f64(source.element, &source.property)?;
            }
            if !value.is_finite() {
                return Err(EngineError::SolveFailed {
                    time: self.time,
                    reason: format!(
                        "non-finite value for `{}.{}`",
                        self.store
                            .name_of(coupling.target.element)
                            .map(ToString::to_string)
                            .unwrap_or_default(),
                        coupling.target.property
                    ),
                });
            }
            self.store.set(
                coupling.target.element,
                &coupling.target.property,
                PropertyValue::Number(value),
            )?;
        }
        self.epoch += 1;
        Ok(())
    }
}

impl Engine for SandboxEngine {
    fn advance_one_step(&mut self) -> Result<TimeStep, EngineError> {
        let next = self.time.map_or(TimeStep(0), TimeStep::next);
        let len_index = usize::try_from(next.index()).unwrap_or(usize::MAX);
        for profile in &self.profiles {
            let value = profile.values[len_index % profile.values.len()];
            self.store.set(
                profile.target.element,
                &profile.target.property,
                PropertyValue::Number(value),
            )?;
        }
        self.time = Some(next);
        self.solve()?;
        self.advances += 1;
        trace!(time = %next, epoch = self.epoch, "sandbox advanced");
        Ok(next)
    }

    fn resolve_at_current_time(&mut self) -> Result<(), EngineError> {
        if self.time.is_none() {
            return Err(EngineError::SolveFailed {
                time: None,
                reason: "engine has not been advanced to a time step".to_string(),
            });
        }
        self.solve()?;
        self.resolves += 1;
        trace!(epoch = self.epoch, "sandbox re-solved");
        Ok(())
    }

    fn read_element_property(
        &self,
        element: ElementId,
        property: &str,
    ) -> Result<PropertyValue, EngineError> {
        self.store.get(element, property).cloned()
    }

    fn write_element_property(
        &mut self,
        element: ElementId,
        property: &str,
        value: PropertyValue,
    ) -> Result<(), EngineError> {
        self.store.set(element, property, value)
    }

    fn current_time(&self) -> Option<TimeStep> {
        self.time
    }

    fn solve_epoch(&self) -> u64 {
        self.epoch
    }

    fn resolve_element(&self, name: &str) -> Option<ElementId> {
        self.store.id_of(name)
    }

    fn element_name(&self, element: ElementId) -> Option<String> {
        self.store.name_of(element).map(ToString::to_string)
    }
}
