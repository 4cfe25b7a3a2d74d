//! Per-step results snapshots and the append-only collector.

use std::collections::BTreeMap;

use grid_control::ControllerState;
use grid_engine::{ElementId, Engine, EngineError, PropertyValue, TimeStep};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::convergence::TierReport;
use crate::export::{ExportArtifact, ExportError, ResultsExporter};

/// Recorded state of one completed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub step: TimeStep,
    /// Exported element properties keyed by `Class.name`.
    pub elements: BTreeMap<String, BTreeMap<String, PropertyValue>>,
    /// Observable controller state keyed by controller label.
    pub controllers: BTreeMap<String, ControllerState>,
    pub tiers: Vec<TierReport>,
}

/// Element properties to record on every step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSpec {
    pub element: String,
    pub properties: Vec<String>,
}

impl ExportSpec {
    pub fn new(element: impl Into<String>, properties: &[&str]) -> Self {
        Self {
            element: element.into(),
            properties: properties.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct ResolvedExport {
    id: ElementId,
    name: String,
    properties: Vec<String>,
}

/// Export specs bound to element handles.
#[derive(Debug, Clone, Default)]
pub struct ExportSelection {
    entries: Vec<ResolvedExport>,
}

impl ExportSelection {
    /// Bind every spec to its element and check each property is readable.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownElement`] or [`EngineError::UnknownProperty`].
    pub fn resolve(specs: &[ExportSpec], engine: &dyn Engine) -> Result<Self, EngineError> {
        let mut entries = Vec::with_capacity(specs.len());
        for spec in specs {
            let id = engine
                .resolve_element(&spec.element)
                .ok_or_else(|| EngineError::UnknownElement(spec.element.clone()))?;
            for property in &spec.properties {
                engine.read_element_property(id, property)?;
            }
            entries.push(ResolvedExport {
                id,
                name: spec.element.clone(),
                properties: spec.properties.clone(),
            });
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read the selected properties from the engine's current state.
    ///
    /// # Errors
    ///
    /// Any engine read failure.
    pub fn capture(
        &self,
        engine: &dyn Engine,
    ) -> Result<BTreeMap<String, BTreeMap<String, PropertyValue>>, EngineError> {
        let mut elements = BTreeMap::new();
        for entry in &self.entries {
            let values: &mut BTreeMap<String, PropertyValue> =
                elements.entry(entry.name.clone()).or_default();
            for property in &entry.properties {
                values.insert(
                    property.clone(),
                    engine.read_element_property(entry.id, property)?,
                );
            }
        }
        Ok(elements)
    }
}

/// Commit contract violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultsError {
    #[error("a snapshot for step {0} was already committed")]
    DuplicateCommit(TimeStep),

    #[error("snapshot for step {step} committed after step {last}")]
    OutOfOrder { step: TimeStep, last: TimeStep },
}

/// Append-only store of step snapshots.
pub struct ResultsCollector {
    snapshots: Vec<Snapshot>,
    /// Snapshots already handed to the exporter.
    exported: usize,
    exporter: Option<Box<dyn ResultsExporter>>,
}

impl std::fmt::Debug for ResultsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultsCollector")
            .field("snapshots", &self.snapshots.len())
            .field("exported", &self.exported)
            .field("has_exporter", &self.exporter.is_some())
            .finish()
    }
}

impl Default for ResultsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultsCollector {
    /// A collector that keeps snapshots in memory only.
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshots: Vec::new(),
            exported: 0,
            exporter: None,
        }
    }

    #[must_use]
    pub fn with_exporter(exporter: Box<dyn ResultsExporter>) -> Self {
        Self {
            exporter: Some(exporter),
            ..Self::new()
        }
    }

    pub fn set_exporter(&mut self, exporter: Box<dyn ResultsExporter>) {
        self.exporter = Some(exporter);
    }

    /// Append the snapshot for one step.
    ///
    /// # Errors
    ///
    /// [`ResultsError::DuplicateCommit`] if the step already has a snapshot,
    /// [`ResultsError::OutOfOrder`] if an earlier step is committed late.
    pub fn commit(&mut self, snapshot: Snapshot) -> Result<(), ResultsError> {
        if let Some(last) = self.snapshots.last().map(|s| s.step) {
            if snapshot.step == last {
                return Err(ResultsError::DuplicateCommit(last));
            }
            if snapshot.step < last {
                // An older step may still be a duplicate.
                if self.snapshots.iter().any(|s| s.step == snapshot.step) {
                    return Err(ResultsError::DuplicateCommit(snapshot.step));
                }
                return Err(ResultsError::OutOfOrder {
                    step: snapshot.step,
                    last,
                });
            }
        }
        self.snapshots.push(snapshot);
        Ok(())
    }

    #[must_use]
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    #[must_use]
    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    /// Snapshots committed since the last export.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.snapshots.len() - self.exported
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Export the full time series.
    ///
    /// Returns `Ok(None)` without touching the exporter when nothing was
    /// committed since the previous call, or when no exporter is attached.
    ///
    /// # Errors
    ///
    /// Any [`ExportError`] from the exporter. Pending snapshots stay pending.
    pub fn finalize(&mut self) -> Result<Option<ExportArtifact>, ExportError> {
        if self.pending() == 0 {
            return Ok(None);
        }
        let Some(exporter) = self.exporter.as_mut() else {
            return Ok(None);
        };
        let artifact = exporter.export(&self.snapshots)?;
        self.exported = self.snapshots.len();
        info!(
            location = %artifact.location,
            snapshots = artifact.snapshots,
            bytes = artifact.bytes,
            "exported results"
        );
        Ok(Some(artifact))
    }
}
