//! The operator algebra of a configurable program analysis.
//!
//! An analysis is a bundle of roles over its own state type `S` and precision
//! type `P`. Analyses are composed by wrapping: an outer analysis holds the
//! roles of an inner one behind these traits and delegates to them.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::rc::Rc;

use crate::cfa::NodeId;
use crate::error::CpaResult;

pub trait AbstractState: Clone + Debug {
    /// Program location of the state, if the analysis tracks one.
    fn location(&self) -> Option<NodeId> {
        None
    }

    fn is_target(&self) -> bool {
        false
    }

    /// Label used when the state is exported as part of a graph.
    fn dot_label(&self) -> String {
        String::new()
    }

    fn should_highlight(&self) -> bool {
        false
    }
}

pub trait TransferRelation<S, P> {
    /// All abstract successors of `state`.
    fn successors(&self, state: &S, precision: &P) -> CpaResult<Vec<S>>;
}

pub trait MergeOperator<S, P> {
    /// Merge `state1` into `state2`.
    ///
    /// Returns `None` if `state2` stays as it is, otherwise the state that
    /// replaces `state2` in the reached set.
    fn merge(&self, state1: &S, state2: &S, precision: &P) -> CpaResult<Option<S>>;
}

pub trait StopOperator<S, P> {
    /// Whether `state` is covered by the `reached` states.
    fn stop(&self, state: &S, reached: &[S], precision: &P) -> CpaResult<bool>;

    /// Whether [`stop`][Self::stop] may be forced to succeed by strengthening `state`.
    fn is_forced_covering_possible(&self, _state: &S, _reached: &S, _precision: &P) -> bool {
        false
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    Continue,
    /// Stop exploring after this state has been added.
    Break,
}

#[derive(Debug, Clone)]
pub struct PrecisionAdjustmentResult<S, P> {
    pub state: S,
    pub precision: P,
    pub action: Action,
}

pub trait PrecisionAdjustment<S, P> {
    /// Adjust a freshly computed successor. `None` means the state is bottom
    /// and has to be dropped.
    fn adjust(&self, state: &S, precision: &P) -> CpaResult<Option<PrecisionAdjustmentResult<S, P>>>;
}

/// A program fragment analysed on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub nodes: BTreeSet<NodeId>,
    pub call_node: Option<NodeId>,
    pub return_nodes: BTreeSet<NodeId>,
    /// Variables read or written inside the block.
    pub referenced_variables: BTreeSet<String>,
}

impl Block {
    pub fn references(&self, variable: &str) -> bool {
        self.referenced_variables.contains(variable)
    }
}

/// Conversion between full states and block-local reduced states.
pub trait Reducer<S, P> {
    fn reduce_state(&self, state: &S, block: &Block) -> CpaResult<S>;

    /// Rebuild a full state from the state at block entry and a reduced exit state.
    fn expand_state(&self, root: &S, block: &Block, reduced: &S) -> CpaResult<S>;

    fn reduce_precision(&self, precision: &P, block: &Block) -> P;

    fn expand_precision(&self, root: &P, block: &Block, reduced: &P) -> P;
}

pub trait ConfigurableProgramAnalysis<S, P> {
    fn transfer_relation(&self) -> Rc<dyn TransferRelation<S, P>>;
    fn merge_operator(&self) -> Rc<dyn MergeOperator<S, P>>;
    fn stop_operator(&self) -> Rc<dyn StopOperator<S, P>>;
    fn precision_adjustment(&self) -> Rc<dyn PrecisionAdjustment<S, P>>;

    fn reducer(&self) -> Option<Rc<dyn Reducer<S, P>>> {
        None
    }

    fn initial_state(&self, node: NodeId) -> CpaResult<S>;
    fn initial_precision(&self, node: NodeId) -> P;
}

/// Merge that never joins.
#[derive(Debug, Default, Copy, Clone)]
pub struct MergeSep;

impl<S, P> MergeOperator<S, P> for MergeSep {
    fn merge(&self, _state1: &S, _state2: &S, _precision: &P) -> CpaResult<Option<S>> {
        Ok(None)
    }
}

/// Stop by equality with a reached state.
#[derive(Debug, Default, Copy, Clone)]
pub struct StopEq;

impl<S: PartialEq, P> StopOperator<S, P> for StopEq {
    fn stop(&self, state: &S, reached: &[S], _precision: &P) -> CpaResult<bool> {
        Ok(reached.iter().any(|r| r == state))
    }
}

/// Stop that never covers.
#[derive(Debug, Default, Copy, Clone)]
pub struct StopNever;

impl<S, P> StopOperator<S, P> for StopNever {
    fn stop(&self, _state: &S, _reached: &[S], _precision: &P) -> CpaResult<bool> {
        Ok(false)
    }
}

/// Precision adjustment that leaves everything unchanged.
#[derive(Debug, Default, Copy, Clone)]
pub struct StaticPrecisionAdjustment;

impl<S: Clone, P: Clone> PrecisionAdjustment<S, P> for StaticPrecisionAdjustment {
    fn adjust(&self, state: &S, precision: &P) -> CpaResult<Option<PrecisionAdjustmentResult<S, P>>> {
        Ok(Some(PrecisionAdjustmentResult {
            state: state.clone(),
            precision: precision.clone(),
            action: Action::Continue,
        }))
    }
}
