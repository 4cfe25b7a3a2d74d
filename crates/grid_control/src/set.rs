//! Controllers grouped by priority tier.
//!
//! Tiers are processed in increasing priority. Within a tier, controllers
//! keep their insertion order, but the convergence loop must not rely on it.

use std::collections::HashSet;

use crate::controller::{Controller, Priority};
use crate::error::ConstructionError;

/// All controllers of a run, partitioned into a fixed number of tiers.
#[derive(Debug, Clone)]
pub struct ControllerSet<C> {
    tiers: Vec<Vec<C>>,
    /// Element names that already have a controller.
    elements: HashSet<String>,
}

impl<C: Controller> ControllerSet<C> {
    /// Create an empty set with `tier_count` tiers.
    #[must_use]
    pub fn new(tier_count: usize) -> Self {
        Self {
            tiers: (0..tier_count).map(|_| Vec::new()).collect(),
            elements: HashSet::new(),
        }
    }

    /// Add a controller to its declared tier.
    ///
    /// # Errors
    ///
    /// Fails if the tier does not exist or the element already has a
    /// controller.
    pub fn insert(&mut self, controller: C) -> Result<(), ConstructionError> {
        let priority = controller.priority();
        let element = controller.element_name().to_string();
        let tier_count = self.tiers.len();

        let Some(tier) = self.tiers.get_mut(priority.index()) else {
            return Err(ConstructionError::PriorityOutOfRange {
                element,
                priority,
                tier_count,
            });
        };
        if !self.elements.insert(element.clone()) {
            return Err(ConstructionError::DuplicateController(element));
        }
        tier.push(controller);
        Ok(())
    }

    /// Controllers of one tier, in insertion order. Empty for unknown tiers.
    #[must_use]
    pub fn tier(&self, priority: Priority) -> &[C] {
        self.tiers
            .get(priority.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Mutable access to one tier.
    pub fn tier_mut(&mut self, priority: Priority) -> &mut [C] {
        self.tiers
            .get_mut(priority.index())
            .map(Vec::as_mut_slice)
            .unwrap_or_default()
    }

    /// Every tier's priority, in processing order.
    pub fn priorities(&self) -> impl Iterator<Item = Priority> + use<C> {
        (0..self.tiers.len()).map(|i| Priority(u8::try_from(i).unwrap_or(u8::MAX)))
    }

    /// All controllers, tier by tier.
    pub fn iter(&self) -> impl Iterator<Item = &C> {
        self.tiers.iter().flatten()
    }

    #[must_use]
    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// Total number of controllers across tiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use grid_engine::{ElementId, Engine, EngineError, TimeStep};

    use super::*;
    use crate::controller::ControllerState;

    #[derive(Debug)]
    struct Fixed {
        name: String,
        priority: Priority,
    }

    impl Controller for Fixed {
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
            _tier: Priority,
            _time: TimeStep,
            _update_results: bool,
        ) -> Result<f64, EngineError> {
            Ok(0.0)
        }

        fn state(&self) -> ControllerState {
            ControllerState::new()
        }
    }

    fn fixed(name: &str, priority: u8) -> Fixed {
        Fixed {
            name: name.to_string(),
            priority: Priority(priority),
        }
    }

    #[test]
    fn test_groups_by_tier_in_insertion_order() {
        let mut set = ControllerSet::new(3);
        set.insert(fixed("PVSystem.b", 1)).unwrap();
        set.insert(fixed("Storage.a", 0)).unwrap();
        set.insert(fixed("PVSystem.a", 1)).unwrap();

        assert_eq!(set.len(), 3);
        assert_eq!(set.tier(Priority(0)).len(), 1);
        let names: Vec<_> = set.tier(Priority(1)).iter().map(|c| c.element_name()).collect();
        assert_eq!(names, vec!["PVSystem.b", "PVSystem.a"]);
        assert!(set.tier(Priority(2)).is_empty());
        assert!(set.tier(Priority(9)).is_empty());
    }

    #[test]
    fn test_iter_walks_tiers_in_order() {
        let mut set = ControllerSet::new(3);
        set.insert(fixed("Transformer.t", 2)).unwrap();
        set.insert(fixed("Storage.s", 0)).unwrap();
        let order: Vec<_> = set.iter().map(|c| c.element_name()).collect();
        assert_eq!(order, vec!["Storage.s", "Transformer.t"]);
        let priorities: Vec<_> = set.priorities().collect();
        assert_eq!(priorities, vec![Priority(0), Priority(1), Priority(2)]);
    }

    #[test]
    fn test_priority_out_of_range() {
        let mut set = ControllerSet::new(3);
        let err = set.insert(fixed("PVSystem.a", 3)).unwrap_err();
        assert!(matches!(
            err,
            ConstructionError::PriorityOutOfRange { tier_count: 3, .. }
        ));
        assert!(set.is_empty());
    }

    #[test]
    fn test_duplicate_element_rejected() {
        let mut set = ControllerSet::new(3);
        set.insert(fixed("PVSystem.a", 0)).unwrap();
        let err = set.insert(fixed("PVSystem.a", 1)).unwrap_err();
        assert_eq!(
            err,
            ConstructionError::DuplicateController("PVSystem.a".to_string())
        );
        assert_eq!(set.len(), 1);
    }
}
