//! Counterexample-guided refinement of predicate precisions.
//!
//! A target state found by the exploration is handed to the
//! [`PredicateRefiner`][refiner::PredicateRefiner]. It collects the block
//! formulas of the abstraction states on the path to the target and asks the
//! solver for sequence interpolants. A satisfiable path is a real
//! counterexample. Otherwise the
//! [`strategy`][strategy::PredicateAbstractionRefinementStrategy] turns the
//! interpolants into predicates, computes the new precision and prunes the
//! ARG below the refinement root.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::arg::path::ArgPath;
use crate::arg::StateId;
use crate::solver::Model;

pub mod interpolation;
pub mod refiner;
pub mod strategy;

pub use interpolation::{CounterexampleTraceInfo, InterpolationManager};
pub use refiner::PredicateRefiner;
pub use strategy::{
    PredicateAbstractionRefinementStrategy, PredicateBasis, PredicateSharing, RefinablePrecision, RefinementOptions,
};

/// A path to a target state that could not be ruled out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counterexample {
    path: ArgPath,
    model: Option<Model>,
    precise: bool,
}

impl Counterexample {
    pub fn new(path: ArgPath, model: Option<Model>, precise: bool) -> Self {
        Self { path, model, precise }
    }

    pub fn path(&self) -> &ArgPath {
        &self.path
    }

    /// Variable assignment along the path, if the solver produced one.
    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    /// Whether the path follows the branches the model takes.
    ///
    /// An imprecise path is just some path to the target through the ARG.
    pub fn is_precise(&self) -> bool {
        self.precise
    }

    pub fn target(&self) -> Option<StateId> {
        self.path.last()
    }
}

impl Display for Counterexample {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.path)?;
        if let Some(model) = &self.model {
            write!(f, "{}", model)?;
        }
        if !self.precise {
            write!(f, " (imprecise)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefinementStatistics {
    pub refinements: usize,
    pub spurious: usize,
    pub feasible: usize,
    pub imprecise_counterexamples: usize,
    /// Rounds where no predicate was new and the root was moved up the path.
    pub location_based_cutoffs: usize,
    pub restarts: usize,
    pub predicates_created: usize,
    pub states_removed: usize,
}

impl Display for RefinementStatistics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Number of refinements:                {}", self.refinements)?;
        writeln!(f, "  spurious:                           {}", self.spurious)?;
        writeln!(f, "  feasible:                           {}", self.feasible)?;
        writeln!(f, "  with location-based cutoff:         {}", self.location_based_cutoffs)?;
        writeln!(f, "  with restart:                       {}", self.restarts)?;
        writeln!(f, "Number of predicates created:         {}", self.predicates_created)?;
        writeln!(f, "Number of imprecise counterexamples:  {}", self.imprecise_counterexamples)?;
        write!(f, "Number of removed ARG states:         {}", self.states_removed)
    }
}

/// Counterexamples found so far, keyed by their target state.
///
/// Entries go away when their target is removed from the ARG.
#[derive(Debug, Clone, Default)]
pub struct CounterexampleStore {
    entries: BTreeMap<StateId, Counterexample>,
}

impl CounterexampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: StateId, cex: Counterexample) {
        self.entries.insert(target, cex);
    }

    pub fn get(&self, target: StateId) -> Option<&Counterexample> {
        self.entries.get(&target)
    }

    /// Drop the entries of all `removed` states.
    pub fn evict(&mut self, removed: &[StateId]) {
        for id in removed {
            self.entries.remove(id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
