//! Scenario documents.
//!
//! A scenario bundles everything a run needs: options, the sandbox network,
//! named presets, the controller list, the export selection and the edit
//! schedule. [`Scenario::build`] performs every check before the first step.

use std::collections::BTreeMap;

use grid_control::{ControllerFactory, ControllerSettings, ControllerSpec, PresetRegistry};
use grid_engine::{SandboxEngine, SandboxSpec};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{ConfigError, SimulationOptions};
use crate::edits::EditSchedule;
use crate::error::SimError;
use crate::results::ExportSpec;
use crate::simulation::Simulation;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub options: SimulationOptions,
    pub network: SandboxSpec,
    /// Presets registered on top of the built-in ones.
    pub presets: BTreeMap<String, ControllerSettings>,
    pub controllers: Vec<ControllerSpec>,
    pub exports: Vec<ExportSpec>,
    pub edits: EditSchedule,
}

impl Scenario {
    /// Parse a JSON scenario.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] if the document is malformed.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// The preset registry this scenario's controllers resolve against.
    ///
    /// # Errors
    ///
    /// [`SimError::Construction`] if a scenario preset shadows an existing
    /// one.
    pub fn preset_registry(&self) -> Result<PresetRegistry, SimError> {
        let mut presets = PresetRegistry::with_defaults();
        for (name, settings) in &self.presets {
            presets.register(name.clone(), settings.clone())?;
        }
        Ok(presets)
    }

    /// Validate everything and assemble a ready-to-run simulation.
    ///
    /// # Errors
    ///
    /// Any configuration, engine or construction error. Nothing has been
    /// stepped when this fails.
    pub fn build(&self) -> Result<Simulation<SandboxEngine>, SimError> {
        self.options.total_steps()?;
        let engine = SandboxEngine::from_spec(&self.network)?;
        let presets = self.preset_registry()?;
        let controllers =
            ControllerFactory::new(&presets, self.options.tier_count).build(&self.controllers, &engine)?;
        info!(
            elements = engine.store().len(),
            controllers = controllers.len(),
            "scenario loaded"
        );

        Simulation::new(self.options.clone(), engine, controllers)?
            .with_exports(&self.exports)?
            .with_edit_schedule(self.edits.clone())
    }
}

#[cfg(test)]
mod tests {
    use grid_control::ConstructionError;
    use grid_engine::{EngineError, TimeStep};

    use super::*;
    use crate::export::{ExportFormat, MemoryExporter, decode};
    use crate::results::Snapshot;
    use crate::simulation::RunState;

    const FEEDER: &str = include_str!("../../../scenarios/feeder.json");

    fn number(snapshot: &Snapshot, element: &str, property: &str) -> f64 {
        snapshot.elements[element][property].as_f64().unwrap()
    }

    #[test]
    fn test_feeder_scenario_runs_to_completion() {
        let scenario = Scenario::from_json(FEEDER).unwrap();
        let exporter = MemoryExporter::new(ExportFormat::MessagePack);
        let sink = exporter.sink();
        let mut sim = scenario.build().unwrap().with_exporter(Box::new(exporter));

        assert_eq!(sim.total_steps(), 24);
        assert_eq!(sim.controllers().len(), 3);

        let summary = sim.run_simulation().unwrap();
        assert_eq!(summary.state, RunState::Completed);
        assert_eq!(summary.steps_run, 24);
        assert_eq!(summary.stats.exhausted, 0);

        let snapshots = sim.results().snapshots();
        assert_eq!(snapshots.len(), 24);

        // Step 1: the load jumps to 120 kW. The tap rises twice, then the
        // battery shaves the feeder back to its 100 kW limit.
        let step1 = &snapshots[1];
        assert_eq!(step1.tiers[0].resolves, 2);
        assert_eq!(number(step1, "Transformer.sub", "tap"), 3.0);
        assert!((number(step1, "Storage.bess", "kw") - 15.0).abs() < 1e-9);
        assert!((number(step1, "Transformer.sub", "kw") - 100.0).abs() < 1e-9);

        // The scheduled edit at step 12 drops the PV output, so the battery
        // covers 5 kW more on the next peak.
        assert_eq!(number(&snapshots[12], "PVSystem.roof", "kw"), 0.0);
        assert!((number(&snapshots[13], "Storage.bess", "kw") - 20.0).abs() < 1e-9);

        let exported: Vec<Snapshot> = decode(ExportFormat::MessagePack, &sink.borrow()[0]).unwrap();
        assert_eq!(exported.len(), 24);
        assert_eq!(exported[23].step, TimeStep(23));
    }

    #[test]
    fn test_scenario_presets_are_registered() {
        let scenario = Scenario::from_json(FEEDER).unwrap();
        let presets = scenario.preset_registry().unwrap();
        let pv = grid_control::ControllerKind::PvController;
        assert!(presets.is_registered(pv, "tight-volt-var"));
        assert!(presets.is_registered(pv, "cpf"));
    }

    #[test]
    fn test_shadowing_builtin_preset_rejected() {
        let mut scenario = Scenario::from_json(FEEDER).unwrap();
        let settings = scenario.presets["tight-volt-var"].clone();
        scenario.presets.insert("cpf".to_string(), settings);
        assert!(matches!(
            scenario.build(),
            Err(SimError::Construction(ConstructionError::DuplicatePreset { .. }))
        ));
    }

    #[test]
    fn test_unknown_controller_element_fails_before_stepping() {
        let mut scenario = Scenario::from_json(FEEDER).unwrap();
        scenario.controllers[1].element = "Storage.missing".to_string();
        assert!(matches!(
            scenario.build(),
            Err(SimError::Construction(ConstructionError::UnknownElement(_)))
        ));
    }

    #[test]
    fn test_bad_export_and_options_rejected() {
        let mut scenario = Scenario::from_json(FEEDER).unwrap();
        scenario.exports.push(ExportSpec::new("Bus.secondary", &["angle"]));
        assert!(matches!(
            scenario.build(),
            Err(SimError::Engine(EngineError::UnknownProperty { .. }))
        ));

        let mut scenario = Scenario::from_json(FEEDER).unwrap();
        scenario.options.end_day = 0;
        assert!(matches!(
            scenario.build(),
            Err(SimError::Config(ConfigError::EmptyHorizon { .. }))
        ));
    }

    #[test]
    fn test_malformed_document_is_parse_error() {
        assert!(matches!(
            Scenario::from_json(r#"{"options": {"end_day": "soon"}}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_scenario_uses_defaults() {
        let scenario = Scenario::from_json("{}").unwrap();
        let sim = scenario.build().unwrap();
        assert_eq!(sim.total_steps(), 96);
        assert!(sim.controllers().is_empty());
    }
}
