//! External sources of invariants and predicates.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::cfa::NodeId;
use crate::formula::Formula;
use crate::predicate::abstraction::PredicateAbstractionManager;
use crate::predicate::manager::{AbstractionManager, AbstractionPredicate};
use crate::predicate::storage::AbstractionStorage;
use crate::reference::Region;

/// Facts known to hold at program locations.
pub trait InvariantSupplier {
    /// The invariant at `location` as a region, used while abstracting.
    fn region_invariant(&self, _location: NodeId, _amgr: &AbstractionManager) -> Option<Region> {
        None
    }

    /// The invariant at `location`, uninstantiated, used to strengthen path formulas.
    fn formula_invariant(&self, _location: NodeId) -> Option<Formula> {
        None
    }
}

#[derive(Debug, Default, Copy, Clone)]
pub struct NoInvariants;

impl InvariantSupplier for NoInvariants {}

/// Invariants given as formulas per location.
#[derive(Debug, Default, Clone)]
pub struct LocationInvariants {
    invariants: BTreeMap<NodeId, Formula>,
}

impl LocationInvariants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conjoin `invariant` to what is known at `location`.
    pub fn insert(&mut self, location: NodeId, invariant: Formula) {
        let entry = self.invariants.entry(location).or_insert_with(Formula::mk_true);
        *entry = Formula::and(entry.clone(), invariant);
    }
}

impl InvariantSupplier for LocationInvariants {
    fn region_invariant(&self, location: NodeId, amgr: &AbstractionManager) -> Option<Region> {
        let f = self.invariants.get(&location)?;
        Some(amgr.convert_formula_to_region(f))
    }

    fn formula_invariant(&self, location: NodeId) -> Option<Formula> {
        self.invariants.get(&location).cloned()
    }
}

/// Predicates to use at a location on top of the precision.
pub trait PredicateProvider {
    fn predicates(&self, location: NodeId) -> Vec<AbstractionPredicate>;
}

#[derive(Debug, Default, Copy, Clone)]
pub struct NoPredicates;

impl PredicateProvider for NoPredicates {
    fn predicates(&self, _location: NodeId) -> Vec<AbstractionPredicate> {
        Vec::new()
    }
}

/// The atoms of stored abstractions, offered at the location they were computed at.
pub struct StoredAbstractionPredicates {
    storage: Rc<AbstractionStorage>,
    manager: Rc<PredicateAbstractionManager>,
}

impl StoredAbstractionPredicates {
    pub fn new(storage: Rc<AbstractionStorage>, manager: Rc<PredicateAbstractionManager>) -> Self {
        Self { storage, manager }
    }
}

impl PredicateProvider for StoredAbstractionPredicates {
    fn predicates(&self, location: NodeId) -> Vec<AbstractionPredicate> {
        let mut result = Vec::new();
        for stored in self.storage.abstractions_at(location) {
            for p in self.manager.predicates_for_atoms_of(stored.formula()) {
                if !result.contains(&p) {
                    result.push(p);
                }
            }
        }
        result
    }
}
