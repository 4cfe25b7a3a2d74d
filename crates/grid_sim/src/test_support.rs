//! Engines and controllers used by the scheduler tests.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use grid_control::{Controller, ControllerState, Priority};
use grid_engine::{ElementId, Engine, EngineError, PropertyValue, TimeStep};

type Hook = Box<dyn FnMut(&mut BTreeMap<(ElementId, String), f64>)>;

/// Engine with scripted solve behaviour and call counters.
pub struct TestEngine {
    names: Vec<String>,
    values: BTreeMap<(ElementId, String), f64>,
    time: Option<TimeStep>,
    epoch: u64,
    pub advances: u64,
    pub resolves: u64,
    on_resolve: Option<Hook>,
    fail_on_resolve: Option<u64>,
    fail_on_advance: Option<u64>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            values: BTreeMap::new(),
            time: None,
            epoch: 0,
            advances: 0,
            resolves: 0,
            on_resolve: None,
            fail_on_resolve: None,
            fail_on_advance: None,
        }
    }

    /// Add an element with numeric properties.
    pub fn element(mut self, name: &str, properties: &[(&str, f64)]) -> Self {
        self.names.push(name.to_string());
        let id = ElementId(self.names.len() as u64);
        for (property, value) in properties {
            self.values.insert((id, (*property).to_string()), *value);
        }
        self
    }

    /// Run `hook` over the property table on every re-solve.
    pub fn on_resolve(
        mut self,
        hook: impl FnMut(&mut BTreeMap<(ElementId, String), f64>) + 'static,
    ) -> Self {
        self.on_resolve = Some(Box::new(hook));
        self
    }

    /// Fail the n-th re-solve (1-based).
    pub fn fail_on_resolve(mut self, n: u64) -> Self {
        self.fail_on_resolve = Some(n);
        self
    }

    /// Fail the n-th advance (1-based).
    pub fn fail_on_advance(mut self, n: u64) -> Self {
        self.fail_on_advance = Some(n);
        self
    }

    pub fn value(&self, name: &str, property: &str) -> f64 {
        let id = self.resolve_element(name).unwrap();
        self.values[&(id, property.to_string())]
    }
}

impl Engine for TestEngine {
    fn advance_one_step(&mut self) -> Result<TimeStep, EngineError> {
        if self.fail_on_advance == Some(self.advances + 1) {
            return Err(EngineError::SolveFailed {
                time: self.time,
                reason: "scripted advance failure".to_string(),
            });
        }
        let next = self.time.map_or(TimeStep(0), TimeStep::next);
        self.time = Some(next);
        self.advances += 1;
        self.epoch += 1;
        Ok(next)
    }

    fn resolve_at_current_time(&mut self) -> Result<(), EngineError> {
        if self.fail_on_resolve == Some(self.resolves + 1) {
            return Err(EngineError::SolveFailed {
                time: self.time,
                reason: "scripted resolve failure".to_string(),
            });
        }
        if let Some(hook) = &mut self.on_resolve {
            hook(&mut self.values);
        }
        self.resolves += 1;
        self.epoch += 1;
        Ok(())
    }

    fn read_element_property(
        &self,
        element: ElementId,
        property: &str,
    ) -> Result<PropertyValue, EngineError> {
        self.values
            .get(&(element, property.to_string()))
            .map(|v| PropertyValue::Number(*v))
            .ok_or_else(|| EngineError::UnknownProperty {
                element: self.element_name(element).unwrap_or_default(),
                property: property.to_string(),
            })
    }

    fn write_element_property(
        &mut self,
        element: ElementId,
        property: &str,
        value: PropertyValue,
    ) -> Result<(), EngineError> {
        let slot = self
            .values
            .get_mut(&(element, property.to_string()))
            .ok_or(EngineError::UnknownHandle(element))?;
        *slot = value.as_f64().unwrap_or(f64::NAN);
        Ok(())
    }

    fn current_time(&self) -> Option<TimeStep> {
        self.time
    }

    fn solve_epoch(&self) -> u64 {
        self.epoch
    }

    fn resolve_element(&self, name: &str) -> Option<ElementId> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| ElementId(i as u64 + 1))
    }

    fn element_name(&self, element: ElementId) -> Option<String> {
        let index = usize::try_from(element.id()).ok()?.checked_sub(1)?;
        self.names.get(index).cloned()
    }
}

/// Shared log of `(controller, tier, step)` invocations.
pub type CallLog = Rc<RefCell<Vec<(String, Priority, TimeStep)>>>;

/// Controller with a scripted error sequence that records every call.
pub struct Scripted {
    name: String,
    priority: Priority,
    errors: Vec<f64>,
    calls: usize,
    log: CallLog,
}

impl Scripted {
    /// The last error in `errors` repeats forever.
    pub fn new(name: &str, priority: u8, errors: &[f64], log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            priority: Priority(priority),
            errors: errors.to_vec(),
            calls: 0,
            log: Rc::clone(log),
        }
    }
}

impl Controller for Scripted {
    fn element_name(&self) -> &str {
        &self.name
    }

    fn element(&self) -> ElementId {
        ElementId::INVALID
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn update(
        &mut self,
        _engine: &mut dyn Engine,
        tier: Priority,
        time: TimeStep,
        _update_results: bool,
    ) -> Result<f64, EngineError> {
        self.log.borrow_mut().push((self.name.clone(), tier, time));
        let index = self.calls.min(self.errors.len().saturating_sub(1));
        self.calls += 1;
        Ok(self.errors.get(index).copied().unwrap_or(0.0))
    }

    fn state(&self) -> ControllerState {
        ControllerState::from([("calls".to_string(), self.calls as f64)])
    }
}

/// Reports `|setpoint - reading|` of its element and writes nothing.
pub struct Tracking {
    name: String,
    element: ElementId,
    priority: Priority,
    last_error: f64,
}

impl Tracking {
    pub fn new(name: &str, priority: u8, engine: &dyn Engine) -> Self {
        Self {
            name: name.to_string(),
            element: engine.resolve_element(name).unwrap(),
            priority: Priority(priority),
            last_error: 0.0,
        }
    }
}

impl Controller for Tracking {
    fn element_name(&self) -> &str {
        &self.name
    }

    fn element(&self) -> ElementId {
        self.element
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn update(
        &mut self,
        engine: &mut dyn Engine,
        _tier: Priority,
        _time: TimeStep,
        _update_results: bool,
    ) -> Result<f64, EngineError> {
        let setpoint = engine.read_f64(self.element, "setpoint")?;
        let reading = engine.read_f64(self.element, "reading")?;
        self.last_error = (setpoint - reading).abs();
        Ok(self.last_error)
    }

    fn state(&self) -> ControllerState {
        ControllerState::from([("error".to_string(), self.last_error)])
    }
}

/// A meter whose reading closes half the gap to its setpoint on every
/// re-solve.
pub fn halving_meter() -> TestEngine {
    TestEngine::new()
        .element("Meter.m", &[("setpoint", 1.0), ("reading", 0.0)])
        .on_resolve(|values| {
            let id = ElementId(1);
            let setpoint = values[&(id, "setpoint".to_string())];
            if let Some(reading) = values.get_mut(&(id, "reading".to_string())) {
                *reading += 0.5 * (setpoint - *reading);
            }
        })
}
