use std::collections::BTreeMap;

use crate::cfa::NodeId;
use crate::cpa::AbstractState;
use crate::pathformula::PathFormula;
use crate::predicate::abstraction::AbstractionFormula;

/// State of the predicate analysis.
///
/// An abstraction state sits at a block end and carries a fresh abstraction
/// with an empty path formula. A non-abstraction state carries the abstraction
/// of the last block end plus the path formula of everything since.
#[derive(Debug, Clone)]
pub struct PredicateAbstractState {
    location: NodeId,
    target: bool,
    is_abstraction: bool,
    path_formula: PathFormula,
    abstraction: AbstractionFormula,
    /// How often each location was an abstraction point on the path so far.
    abstraction_locations: BTreeMap<NodeId, usize>,
}

impl PredicateAbstractState {
    pub fn abstraction_state(
        location: NodeId,
        target: bool,
        path_formula: PathFormula,
        abstraction: AbstractionFormula,
        abstraction_locations: BTreeMap<NodeId, usize>,
    ) -> Self {
        Self {
            location,
            target,
            is_abstraction: true,
            path_formula,
            abstraction,
            abstraction_locations,
        }
    }

    pub fn non_abstraction_state(
        location: NodeId,
        target: bool,
        path_formula: PathFormula,
        abstraction: AbstractionFormula,
        abstraction_locations: BTreeMap<NodeId, usize>,
    ) -> Self {
        Self {
            location,
            target,
            is_abstraction: false,
            path_formula,
            abstraction,
            abstraction_locations,
        }
    }

    pub fn node(&self) -> NodeId {
        self.location
    }

    pub fn is_abstraction_state(&self) -> bool {
        self.is_abstraction
    }

    pub fn path_formula(&self) -> &PathFormula {
        &self.path_formula
    }

    pub fn abstraction_formula(&self) -> &AbstractionFormula {
        &self.abstraction
    }

    pub fn abstraction_locations_on_path(&self) -> &BTreeMap<NodeId, usize> {
        &self.abstraction_locations
    }

    /// The visit count of this state's own location, for abstraction states.
    pub fn location_instance(&self) -> Option<usize> {
        self.abstraction_locations.get(&self.location).copied()
    }
}

impl AbstractState for PredicateAbstractState {
    fn location(&self) -> Option<NodeId> {
        Some(self.location)
    }

    fn is_target(&self) -> bool {
        self.target
    }

    fn dot_label(&self) -> String {
        if self.is_abstraction {
            format!("{}\n{}", self.abstraction, self.abstraction.as_formula())
        } else {
            String::new()
        }
    }

    fn should_highlight(&self) -> bool {
        self.is_abstraction
    }
}
