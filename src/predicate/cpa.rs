//! The predicate analysis as a configurable program analysis.
//!
//! Successors extend the path formula edge by edge. At block ends the
//! precision adjustment replaces the path formula by a fresh abstraction.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use log::debug;

use crate::cfa::{Cfa, NodeId};
use crate::cpa::{
    AbstractState, Action, Block, ConfigurableProgramAnalysis, MergeOperator, PrecisionAdjustment, PrecisionAdjustmentResult,
    Reducer, StopOperator, TransferRelation,
};
use crate::error::CpaResult;
use crate::pathformula::PathFormulaManager;
use crate::predicate::abstraction::PredicateAbstractionManager;
use crate::predicate::manager::AbstractionPredicate;
use crate::predicate::precision::PredicatePrecision;
use crate::predicate::provider::{InvariantSupplier, NoInvariants, NoPredicates, PredicateProvider};
use crate::predicate::state::PredicateAbstractState;
use crate::solver::SolverResult;

/// Where blocks end.
#[derive(Debug, Clone)]
pub struct BlockOptions {
    /// End a block after this many edges; 0 disables the bound.
    pub threshold: usize,
    pub at_loop_heads: bool,
    pub at_function_entries: bool,
    /// Target states must be abstraction states for refinement to work.
    pub at_targets: bool,
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self {
            threshold: 0,
            at_loop_heads: true,
            at_function_entries: true,
            at_targets: true,
        }
    }
}

pub struct BlockOperator {
    cfa: Rc<Cfa>,
    options: BlockOptions,
    block_ends: Cell<usize>,
}

impl BlockOperator {
    pub fn new(cfa: Rc<Cfa>, options: BlockOptions) -> Self {
        Self {
            cfa,
            options,
            block_ends: Cell::new(0),
        }
    }

    /// Whether a block that reached `location` after `length` edges ends there.
    pub fn is_block_end(&self, location: NodeId, length: usize) -> bool {
        let o = &self.options;
        let end = (o.threshold > 0 && length >= o.threshold)
            || (o.at_loop_heads && self.cfa.is_loop_head(location))
            || (o.at_function_entries && self.cfa.is_function_entry(location))
            || (o.at_targets && self.cfa.is_error_location(location));
        if end {
            self.block_ends.set(self.block_ends.get() + 1);
        }
        end
    }

    pub fn num_block_ends(&self) -> usize {
        self.block_ends.get()
    }
}

pub struct PredicateTransferRelation {
    cfa: Rc<Cfa>,
    pfmgr: PathFormulaManager,
}

impl PredicateTransferRelation {
    pub fn new(cfa: Rc<Cfa>) -> Self {
        Self {
            cfa,
            pfmgr: PathFormulaManager::new(),
        }
    }
}

impl TransferRelation<PredicateAbstractState, PredicatePrecision> for PredicateTransferRelation {
    fn successors(
        &self,
        state: &PredicateAbstractState,
        _precision: &PredicatePrecision,
    ) -> CpaResult<Vec<PredicateAbstractState>> {
        Ok(self
            .cfa
            .leaving_edges(state.node())
            .map(|edge| {
                PredicateAbstractState::non_abstraction_state(
                    edge.successor,
                    self.cfa.is_error_location(edge.successor),
                    self.pfmgr.make_and_edge(state.path_formula(), edge),
                    state.abstraction_formula().clone(),
                    state.abstraction_locations_on_path().clone(),
                )
            })
            .collect())
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum PredicateMergeMode {
    Sep,
    /// Join non-abstraction states of the same block.
    #[default]
    Abe,
}

pub struct PredicateMergeOperator {
    mode: PredicateMergeMode,
    pfmgr: PathFormulaManager,
}

impl PredicateMergeOperator {
    pub fn new(mode: PredicateMergeMode) -> Self {
        Self {
            mode,
            pfmgr: PathFormulaManager::new(),
        }
    }
}

impl MergeOperator<PredicateAbstractState, PredicatePrecision> for PredicateMergeOperator {
    fn merge(
        &self,
        state1: &PredicateAbstractState,
        state2: &PredicateAbstractState,
        _precision: &PredicatePrecision,
    ) -> CpaResult<Option<PredicateAbstractState>> {
        if self.mode == PredicateMergeMode::Sep {
            return Ok(None);
        }
        if state1.is_abstraction_state() || state2.is_abstraction_state() {
            return Ok(None);
        }
        if state1.abstraction_formula().id() != state2.abstraction_formula().id()
            || state1.abstraction_locations_on_path() != state2.abstraction_locations_on_path()
        {
            return Ok(None);
        }
        if state1.path_formula() == state2.path_formula() {
            return Ok(None);
        }
        let joined = self.pfmgr.make_or(state2.path_formula(), state1.path_formula());
        debug!("joining path formulas of two states in block {}", state2.abstraction_formula());
        Ok(Some(PredicateAbstractState::non_abstraction_state(
            state2.node(),
            state2.is_target(),
            joined,
            state2.abstraction_formula().clone(),
            state2.abstraction_locations_on_path().clone(),
        )))
    }
}

pub struct PredicateStopOperator {
    pamgr: Rc<PredicateAbstractionManager>,
    symbolic_coverage_check: bool,
}

impl PredicateStopOperator {
    pub fn new(pamgr: Rc<PredicateAbstractionManager>, symbolic_coverage_check: bool) -> Self {
        Self {
            pamgr,
            symbolic_coverage_check,
        }
    }

    fn is_less_or_equal(&self, e1: &PredicateAbstractState, e2: &PredicateAbstractState) -> SolverResult<bool> {
        match (e1.is_abstraction_state(), e2.is_abstraction_state()) {
            (true, true) => Ok(self
                .pamgr
                .check_coverage(e1.abstraction_formula(), e2.abstraction_formula())),
            (false, true) if self.symbolic_coverage_check => self.pamgr.check_coverage_with(
                e1.abstraction_formula(),
                e1.path_formula(),
                e2.abstraction_formula(),
            ),
            (false, true) | (true, false) => Ok(false),
            (false, false) => {
                if e1.abstraction_formula().id() != e2.abstraction_formula().id() {
                    return Ok(false);
                }
                self.pamgr.check_path_coverage(e1.path_formula(), e2.path_formula())
            }
        }
    }
}

impl StopOperator<PredicateAbstractState, PredicatePrecision> for PredicateStopOperator {
    fn stop(
        &self,
        state: &PredicateAbstractState,
        reached: &[PredicateAbstractState],
        _precision: &PredicatePrecision,
    ) -> CpaResult<bool> {
        for r in reached {
            if self.is_less_or_equal(state, r)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PrecisionAdjustmentStatistics {
    pub num_abstractions: usize,
    pub num_abstractions_false: usize,
    pub max_block_size: usize,
}

/// Computes an abstraction wherever a block ends.
pub struct PredicatePrecisionAdjustment {
    cfa: Rc<Cfa>,
    pamgr: Rc<PredicateAbstractionManager>,
    block: BlockOperator,
    invariants: Rc<dyn InvariantSupplier>,
    provider: Rc<dyn PredicateProvider>,
    stats: Cell<PrecisionAdjustmentStatistics>,
}

impl PredicatePrecisionAdjustment {
    pub fn new(
        cfa: Rc<Cfa>,
        pamgr: Rc<PredicateAbstractionManager>,
        block: BlockOperator,
        invariants: Rc<dyn InvariantSupplier>,
        provider: Rc<dyn PredicateProvider>,
    ) -> Self {
        Self {
            cfa,
            pamgr,
            block,
            invariants,
            provider,
            stats: Cell::new(PrecisionAdjustmentStatistics::default()),
        }
    }

    pub fn statistics(&self) -> PrecisionAdjustmentStatistics {
        self.stats.get()
    }

    pub fn block_operator(&self) -> &BlockOperator {
        &self.block
    }

    fn compute_abstraction(
        &self,
        state: &PredicateAbstractState,
        location: NodeId,
        precision: &PredicatePrecision,
    ) -> CpaResult<Option<PredicateAbstractState>> {
        let pfmgr = self.pamgr.path_formula_manager();
        let mut locations = state.abstraction_locations_on_path().clone();
        let instance = locations.get(&location).copied().unwrap_or(0) + 1;

        let mut stats = self.stats.get();
        stats.num_abstractions += 1;
        stats.max_block_size = stats.max_block_size.max(state.path_formula().length);
        self.stats.set(stats);

        let invariant = self.invariants.formula_invariant(location);
        let mut path_formula = state.path_formula().clone();
        if let Some(inv) = &invariant {
            path_formula = pfmgr.make_and(&path_formula, inv.instantiate(&path_formula.ssa));
        }

        let mut predicates: BTreeSet<AbstractionPredicate> =
            precision.predicates(location, self.cfa.function_of(location), instance);
        predicates.extend(self.provider.predicates(location));

        let abstraction =
            self.pamgr
                .build_abstraction(location, state.abstraction_formula(), &path_formula, &predicates)?;
        if abstraction.is_false() {
            let mut stats = self.stats.get();
            stats.num_abstractions_false += 1;
            self.stats.set(stats);
            debug!("abstraction at {} is false", location);
            return Ok(None);
        }

        let mut new_path_formula = pfmgr.make_empty_from(&path_formula);
        if let Some(inv) = invariant {
            new_path_formula = pfmgr.make_and(&new_path_formula, inv.instantiate(&new_path_formula.ssa));
        }
        locations.insert(location, instance);
        Ok(Some(PredicateAbstractState::abstraction_state(
            location,
            state.is_target(),
            new_path_formula,
            abstraction,
            locations,
        )))
    }
}

impl PrecisionAdjustment<PredicateAbstractState, PredicatePrecision> for PredicatePrecisionAdjustment {
    fn adjust(
        &self,
        state: &PredicateAbstractState,
        precision: &PredicatePrecision,
    ) -> CpaResult<Option<PrecisionAdjustmentResult<PredicateAbstractState, PredicatePrecision>>> {
        let location = state.node();
        let state = if !state.is_abstraction_state() && self.block.is_block_end(location, state.path_formula().length) {
            match self.compute_abstraction(state, location, precision)? {
                Some(s) => s,
                None => return Ok(None),
            }
        } else {
            state.clone()
        };
        Ok(Some(PrecisionAdjustmentResult {
            state,
            precision: precision.clone(),
            action: Action::Continue,
        }))
    }
}

/// Reduction to the predicates a block can talk about.
pub struct PredicateReducer {
    pamgr: Rc<PredicateAbstractionManager>,
}

impl PredicateReducer {
    pub fn new(pamgr: Rc<PredicateAbstractionManager>) -> Self {
        Self { pamgr }
    }

    /// A predicate matters inside `block` if it has no variables or mentions
    /// a variable the block references.
    pub fn is_relevant(predicate: &AbstractionPredicate, block: &Block) -> bool {
        let variables = predicate.symbolic_atom().variables();
        variables.is_empty() || variables.iter().any(|v| block.references(v.name()))
    }
}

impl Reducer<PredicateAbstractState, PredicatePrecision> for PredicateReducer {
    fn reduce_state(&self, state: &PredicateAbstractState, block: &Block) -> CpaResult<PredicateAbstractState> {
        if !state.is_abstraction_state() {
            return Ok(state.clone());
        }
        let abstraction = state.abstraction_formula();
        let irrelevant: Vec<AbstractionPredicate> = self
            .pamgr
            .extract_predicates(abstraction.region())
            .into_iter()
            .filter(|p| !Self::is_relevant(p, block))
            .collect();
        let reduced = self
            .pamgr
            .reduce(abstraction, &irrelevant, &state.path_formula().ssa);
        Ok(PredicateAbstractState::abstraction_state(
            state.node(),
            state.is_target(),
            state.path_formula().clone(),
            reduced,
            state.abstraction_locations_on_path().clone(),
        ))
    }

    fn expand_state(
        &self,
        root: &PredicateAbstractState,
        block: &Block,
        reduced: &PredicateAbstractState,
    ) -> CpaResult<PredicateAbstractState> {
        if !reduced.is_abstraction_state() {
            return Ok(reduced.clone());
        }
        let source = root.abstraction_formula().region();
        let relevant: Vec<AbstractionPredicate> = self
            .pamgr
            .extract_predicates(source)
            .into_iter()
            .filter(|p| Self::is_relevant(p, block))
            .collect();
        let expanded = self.pamgr.expand(
            reduced.abstraction_formula().region(),
            source,
            &relevant,
            &reduced.path_formula().ssa,
            reduced.abstraction_formula().block_formula(),
        );
        Ok(PredicateAbstractState::abstraction_state(
            reduced.node(),
            reduced.is_target(),
            reduced.path_formula().clone(),
            expanded,
            reduced.abstraction_locations_on_path().clone(),
        ))
    }

    fn reduce_precision(&self, precision: &PredicatePrecision, block: &Block) -> PredicatePrecision {
        precision.filter(&|p| Self::is_relevant(p, block))
    }

    fn expand_precision(
        &self,
        root: &PredicatePrecision,
        _block: &Block,
        reduced: &PredicatePrecision,
    ) -> PredicatePrecision {
        root.merge_with(reduced)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PredicateCpaOptions {
    pub merge: PredicateMergeMode,
    pub block: BlockOptions,
    /// Let a non-abstraction state be covered by an abstraction state via a solver query.
    pub symbolic_coverage_check: bool,
}

pub struct PredicateCpa {
    cfa: Rc<Cfa>,
    pamgr: Rc<PredicateAbstractionManager>,
    initial_precision: PredicatePrecision,
    transfer: Rc<PredicateTransferRelation>,
    merge: Rc<PredicateMergeOperator>,
    stop: Rc<PredicateStopOperator>,
    precision_adjustment: Rc<PredicatePrecisionAdjustment>,
    reducer: Rc<PredicateReducer>,
}

impl PredicateCpa {
    pub fn new(cfa: Rc<Cfa>, pamgr: Rc<PredicateAbstractionManager>, options: &PredicateCpaOptions) -> Self {
        Self::with_suppliers(cfa, pamgr, options, Rc::new(NoInvariants), Rc::new(NoPredicates))
    }

    pub fn with_suppliers(
        cfa: Rc<Cfa>,
        pamgr: Rc<PredicateAbstractionManager>,
        options: &PredicateCpaOptions,
        invariants: Rc<dyn InvariantSupplier>,
        provider: Rc<dyn PredicateProvider>,
    ) -> Self {
        let block = BlockOperator::new(cfa.clone(), options.block.clone());
        Self {
            transfer: Rc::new(PredicateTransferRelation::new(cfa.clone())),
            merge: Rc::new(PredicateMergeOperator::new(options.merge)),
            stop: Rc::new(PredicateStopOperator::new(pamgr.clone(), options.symbolic_coverage_check)),
            precision_adjustment: Rc::new(PredicatePrecisionAdjustment::new(
                cfa.clone(),
                pamgr.clone(),
                block,
                invariants,
                provider,
            )),
            reducer: Rc::new(PredicateReducer::new(pamgr.clone())),
            initial_precision: PredicatePrecision::empty(),
            cfa,
            pamgr,
        }
    }

    /// Start with `precision` instead of the empty precision.
    pub fn with_initial_precision(mut self, precision: PredicatePrecision) -> Self {
        self.initial_precision = precision;
        self
    }

    pub fn cfa(&self) -> &Rc<Cfa> {
        &self.cfa
    }

    pub fn abstraction_manager(&self) -> &Rc<PredicateAbstractionManager> {
        &self.pamgr
    }

    pub fn precision_adjustment_statistics(&self) -> PrecisionAdjustmentStatistics {
        self.precision_adjustment.statistics()
    }
}

impl ConfigurableProgramAnalysis<PredicateAbstractState, PredicatePrecision> for PredicateCpa {
    fn transfer_relation(&self) -> Rc<dyn TransferRelation<PredicateAbstractState, PredicatePrecision>> {
        self.transfer.clone()
    }

    fn merge_operator(&self) -> Rc<dyn MergeOperator<PredicateAbstractState, PredicatePrecision>> {
        self.merge.clone()
    }

    fn stop_operator(&self) -> Rc<dyn StopOperator<PredicateAbstractState, PredicatePrecision>> {
        self.stop.clone()
    }

    fn precision_adjustment(&self) -> Rc<dyn PrecisionAdjustment<PredicateAbstractState, PredicatePrecision>> {
        self.precision_adjustment.clone()
    }

    fn reducer(&self) -> Option<Rc<dyn Reducer<PredicateAbstractState, PredicatePrecision>>> {
        Some(self.reducer.clone())
    }

    /// An abstraction state with abstraction `true` and an empty path formula.
    fn initial_state(&self, node: NodeId) -> CpaResult<PredicateAbstractState> {
        Ok(PredicateAbstractState::abstraction_state(
            node,
            self.cfa.is_error_location(node),
            self.pamgr.path_formula_manager().make_empty(),
            self.pamgr.make_true_abstraction(None),
            BTreeMap::new(),
        ))
    }

    fn initial_precision(&self, _node: NodeId) -> PredicatePrecision {
        self.initial_precision.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::bdd_solver::BddSolver;
    use crate::cfa::CfaBuilder;
    use crate::cpa::AbstractState;
    use crate::formula::Formula;
    use crate::pathformula::PathFormula;
    use crate::predicate::abstraction::AbstractionOptions;
    use crate::predicate::manager::AbstractionManager;
    use crate::shutdown::ShutdownNotifier;
    use crate::solver::Solver;

    /// entry: x = true; head: loop on [c], exit on [!c] into err.
    fn program() -> (Rc<Cfa>, [NodeId; 5]) {
        let mut b = CfaBuilder::new("main");
        let entry = b.entry();
        let head = b.node();
        let body = b.node();
        let exit = b.node();
        let err = b.node();
        b.assign(entry, head, "x", Formula::mk_true());
        b.branch(head, Formula::var("c"), body, exit);
        b.havoc(body, head, "c");
        b.assume(exit, err, Formula::not(Formula::var("x")), true);
        b.error(err);
        (Rc::new(b.build()), [entry, head, body, exit, err])
    }

    fn cpa_with_options(cfa: &Rc<Cfa>, options: PredicateCpaOptions) -> PredicateCpa {
        cpa(cfa, &options)
    }

    fn cpa(cfa: &Rc<Cfa>, options: &PredicateCpaOptions) -> PredicateCpa {
        let solver: Rc<dyn Solver> = Rc::new(BddSolver::new(ShutdownNotifier::new()));
        let pamgr = PredicateAbstractionManager::new(
            Rc::new(AbstractionManager::default()),
            solver,
            AbstractionOptions::default(),
            ShutdownNotifier::new(),
        );
        PredicateCpa::new(cfa.clone(), Rc::new(pamgr), options)
    }

    fn step(cpa: &PredicateCpa, state: &PredicateAbstractState, precision: &PredicatePrecision) -> Vec<PredicateAbstractState> {
        let mut result = Vec::new();
        for s in cpa.transfer_relation().successors(state, precision).unwrap() {
            if let Some(adjusted) = cpa.precision_adjustment().adjust(&s, precision).unwrap() {
                result.push(adjusted.state);
            }
        }
        result
    }

    #[test]
    fn test_block_operator() {
        let (cfa, [entry, head, body, exit, err]) = program();
        let block = BlockOperator::new(cfa.clone(), BlockOptions::default());
        assert!(block.is_block_end(entry, 0));
        assert!(block.is_block_end(head, 1));
        assert!(!block.is_block_end(body, 5));
        assert!(!block.is_block_end(exit, 1));
        assert!(block.is_block_end(err, 2));
        assert_eq!(block.num_block_ends(), 3);

        let bounded = BlockOperator::new(
            cfa,
            BlockOptions {
                threshold: 2,
                at_loop_heads: false,
                ..BlockOptions::default()
            },
        );
        assert!(!bounded.is_block_end(body, 1));
        assert!(bounded.is_block_end(body, 2));
        assert!(!bounded.is_block_end(head, 1));
    }

    #[test]
    fn test_abstraction_at_loop_head() {
        let (cfa, [entry, head, _, _, _]) = program();
        let cpa = cpa(&cfa, &PredicateCpaOptions::default());
        let amgr = cpa.abstraction_manager().abstraction_manager().clone();
        let x = amgr.make_predicate(&Formula::var("x"));
        let precision = PredicatePrecision::empty().add_local([(head, x.clone())]);

        let root = cpa.initial_state(entry).unwrap();
        assert!(root.is_abstraction_state());
        assert!(root.abstraction_formula().is_true());

        let succ = step(&cpa, &root, &precision);
        assert_eq!(succ.len(), 1);
        let s = &succ[0];
        assert!(s.is_abstraction_state());
        assert_eq!(s.location(), Some(head));
        assert_eq!(s.abstraction_formula().as_formula(), &Formula::var("x"));
        assert!(s.path_formula().is_true());
        assert_eq!(s.path_formula().ssa.get("x"), 2);
        assert_eq!(s.location_instance(), Some(1));
        assert_eq!(s.abstraction_formula().block_formula().length, 1);
        assert_eq!(cpa.precision_adjustment_statistics().num_abstractions, 1);
    }

    #[test]
    fn test_false_abstraction_is_bottom() {
        let (cfa, [entry, head, _, exit, err]) = program();
        let cpa = cpa(&cfa, &PredicateCpaOptions::default());
        let pamgr = cpa.abstraction_manager().clone();
        let x = pamgr.abstraction_manager().make_predicate(&Formula::var("x"));
        let precision = PredicatePrecision::empty()
            .add_local([(head, x)])
            .add_local([(err, pamgr.make_false_predicate())]);

        let root = cpa.initial_state(entry).unwrap();
        let at_head = step(&cpa, &root, &precision).remove(0);
        let successors = step(&cpa, &at_head, &precision);
        let at_exit = successors.iter().find(|s| s.location() == Some(exit)).unwrap();
        assert!(!at_exit.is_abstraction_state());
        // x holds, so [!x] leads nowhere.
        assert!(step(&cpa, at_exit, &precision).is_empty());
        assert_eq!(cpa.precision_adjustment_statistics().num_abstractions_false, 1);
    }

    #[test]
    fn test_merge_and_stop() {
        let (cfa, [entry, _, body, _, _]) = program();
        let cpa = cpa(&cfa, &PredicateCpaOptions::default());
        let precision = PredicatePrecision::empty();
        let root = cpa.initial_state(entry).unwrap();
        let at_head = step(&cpa, &root, &precision).remove(0);
        let at_body = step(&cpa, &at_head, &precision)
            .into_iter()
            .find(|s| s.location() == Some(body))
            .unwrap();

        // A second path into the body, described by x instead of c.
        let other = PredicateAbstractState::non_abstraction_state(
            body,
            false,
            PathFormula {
                formula: Formula::indexed_var("x", 2),
                ..at_body.path_formula().clone()
            },
            at_body.abstraction_formula().clone(),
            at_body.abstraction_locations_on_path().clone(),
        );

        let merged = cpa.merge_operator().merge(&other, &at_body, &precision).unwrap().unwrap();
        assert!(!merged.is_abstraction_state());
        assert_eq!(merged.abstraction_formula().id(), at_body.abstraction_formula().id());

        let stop = cpa.stop_operator();
        assert!(stop.stop(&other, &[merged.clone()], &precision).unwrap());
        assert!(stop.stop(&at_body, &[merged.clone()], &precision).unwrap());
        assert!(!stop.stop(&merged, &[at_body.clone()], &precision).unwrap());
        // Abstraction states are never covered by non-abstraction states.
        assert!(!stop.stop(&at_head, &[at_body.clone()], &precision).unwrap());
        assert!(stop.stop(&at_head, &[at_head.clone()], &precision).unwrap());
        // Without the symbolic check, a path is not covered by an abstraction.
        assert!(!stop.stop(&at_body, &[at_head.clone()], &precision).unwrap());

        assert!(cpa.merge_operator().merge(&at_body, &at_body, &precision).unwrap().is_none());
        assert!(cpa.merge_operator().merge(&at_head, &at_head, &precision).unwrap().is_none());

        let sep = cpa_with_options(
            &cfa,
            PredicateCpaOptions {
                merge: PredicateMergeMode::Sep,
                ..PredicateCpaOptions::default()
            },
        );
        assert!(sep.merge_operator().merge(&other, &at_body, &precision).unwrap().is_none());
    }

    #[test]
    fn test_symbolic_coverage_check() {
        let (cfa, [entry, _, _, _, _]) = program();
        let cpa = cpa_with_options(
            &cfa,
            PredicateCpaOptions {
                symbolic_coverage_check: true,
                ..PredicateCpaOptions::default()
            },
        );
        let precision = PredicatePrecision::empty();
        let root = cpa.initial_state(entry).unwrap();
        let at_head = step(&cpa, &root, &precision).remove(0);
        let succ = cpa.transfer_relation().successors(&at_head, &precision).unwrap();
        assert!(cpa.stop_operator().stop(&succ[0], &[at_head.clone()], &precision).unwrap());
    }

    #[test]
    fn test_reducer() {
        let (cfa, [_, head, _, _, _]) = program();
        let cpa = cpa(&cfa, &PredicateCpaOptions::default());
        let pamgr = cpa.abstraction_manager().clone();
        let empty = pamgr.path_formula_manager().make_empty();
        let abstraction = pamgr.region_abstraction(&Formula::and(Formula::var("x"), Formula::var("y")), &empty);
        let state = PredicateAbstractState::abstraction_state(head, false, empty, abstraction, BTreeMap::new());

        let block = Block {
            nodes: BTreeSet::from([head]),
            referenced_variables: BTreeSet::from(["x".to_string()]),
            ..Block::default()
        };
        let reducer = cpa.reducer().unwrap();
        let reduced = reducer.reduce_state(&state, &block).unwrap();
        assert_eq!(reduced.abstraction_formula().as_formula(), &Formula::var("x"));

        let expanded = reducer.expand_state(&state, &block, &reduced).unwrap();
        assert_eq!(
            expanded.abstraction_formula().region(),
            state.abstraction_formula().region()
        );

        let amgr = pamgr.abstraction_manager();
        let x = amgr.predicate_of_atom(&Formula::var("x")).unwrap();
        let y = amgr.predicate_of_atom(&Formula::var("y")).unwrap();
        let precision = PredicatePrecision::empty().add_global([x.clone(), y]);
        let reduced_precision = reducer.reduce_precision(&precision, &block);
        assert_eq!(reduced_precision, PredicatePrecision::empty().add_global([x]));
        assert_eq!(reducer.expand_precision(&precision, &block, &reduced_precision), precision);
    }
}
