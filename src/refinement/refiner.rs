use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use log::{debug, info, warn};

use crate::arg::path::{path_from_branching_information_to_target, path_to, ArgPath};
use crate::arg::reached::ArgReachedSet;
use crate::arg::{Arg, StateId};
use crate::cfa::Cfa;
use crate::error::{CpaResult, RefinementResult};
use crate::predicate::abstraction::PredicateAbstractionManager;
use crate::predicate::state::PredicateAbstractState;
use crate::refinement::interpolation::{CounterexampleTraceInfo, InterpolationManager};
use crate::refinement::strategy::{PredicateAbstractionRefinementStrategy, RefinablePrecision, RefinementOptions};
use crate::refinement::{Counterexample, CounterexampleStore, RefinementStatistics};
use crate::shutdown::ShutdownNotifier;
use crate::solver::{Model, Solver};

/// Checks abstract counterexamples and refines the precision along spurious ones.
pub struct PredicateRefiner<P> {
    cfa: Rc<Cfa>,
    imgr: InterpolationManager,
    strategy: PredicateAbstractionRefinementStrategy,
    shutdown: ShutdownNotifier,
    last_error_path: Option<Vec<String>>,
    counterexamples: CounterexampleStore,
    _precision: std::marker::PhantomData<P>,
}

impl<P: RefinablePrecision> PredicateRefiner<P> {
    pub fn new(
        cfa: Rc<Cfa>,
        pamgr: Rc<PredicateAbstractionManager>,
        solver: Rc<dyn Solver>,
        options: RefinementOptions,
        shutdown: ShutdownNotifier,
    ) -> Self {
        Self {
            imgr: InterpolationManager::new(solver, shutdown.clone()),
            strategy: PredicateAbstractionRefinementStrategy::new(cfa.clone(), pamgr, options),
            cfa,
            shutdown,
            last_error_path: None,
            counterexamples: CounterexampleStore::new(),
            _precision: std::marker::PhantomData,
        }
    }

    pub fn strategy(&self) -> &PredicateAbstractionRefinementStrategy {
        &self.strategy
    }

    pub fn statistics(&self) -> RefinementStatistics {
        self.strategy.statistics()
    }

    /// Feasible counterexamples whose target is still in the ARG.
    pub fn counterexamples(&self) -> &CounterexampleStore {
        &self.counterexamples
    }

    /// Check the path to `target` and refine if it is spurious.
    ///
    /// # Panics
    ///
    /// Panics if `target` is not an abstraction state.
    pub fn perform_refinement(
        &mut self,
        reached: &mut ArgReachedSet<PredicateAbstractState, P>,
        target: StateId,
    ) -> CpaResult<RefinementResult> {
        self.shutdown.check()?;
        self.strategy.statistics_mut().refinements += 1;
        info!("refining the path to target state {}", target);

        let (path, trace, formulas) = {
            let arg = reached.arg().borrow();
            assert!(
                arg.state(target).is_abstraction_state(),
                "Target state {} is not an abstraction state, targets have to end blocks",
                target
            );
            let path = path_to(&arg, &self.cfa, target);
            let trace = abstraction_trace(&arg, &path);
            let formulas = self.imgr.block_formulas(&arg, &trace);
            (path, trace, formulas)
        };

        let edge_texts = path.edge_texts();
        let repeated = self.last_error_path.as_ref() == Some(&edge_texts);
        self.last_error_path = Some(edge_texts);

        match self.imgr.build_counterexample_trace(&formulas)? {
            CounterexampleTraceInfo::Spurious { interpolants } => {
                debug!("counterexample is spurious, {} interpolants", interpolants.len());
                self.strategy.statistics_mut().spurious += 1;
                let removed = self
                    .strategy
                    .perform_refinement(reached, &trace, &interpolants, repeated)?;
                self.counterexamples.evict(&removed);
                Ok(RefinementResult::Spurious)
            }
            CounterexampleTraceInfo::Feasible { model } => {
                info!("counterexample to {} is feasible", target);
                self.strategy.statistics_mut().feasible += 1;
                let cex = {
                    let arg = reached.arg().borrow();
                    self.precise_counterexample(&arg, path, target, model)
                };
                if !cex.is_precise() {
                    self.strategy.statistics_mut().imprecise_counterexamples += 1;
                }
                self.counterexamples.insert(target, cex.clone());
                Ok(RefinementResult::Feasible(cex))
            }
        }
    }

    /// Follow the branches the model takes; fall back to `imprecise` where the
    /// ARG does not allow that.
    fn precise_counterexample(
        &self,
        arg: &Arg<PredicateAbstractState>,
        imprecise: ArgPath,
        target: StateId,
        model: Model,
    ) -> Counterexample {
        let Some(root) = imprecise.first() else {
            return Counterexample::new(imprecise, Some(model), false);
        };
        let allowed = arg.all_states_on_paths_to([target]);
        let directions = self.branching_directions(arg, &allowed, &model);
        match path_from_branching_information_to_target(arg, &self.cfa, root, target, &allowed, &directions) {
            Ok(path) => Counterexample::new(path, Some(model), true),
            Err(e) => {
                warn!("could not build a precise error path: {}", e);
                Counterexample::new(imprecise, Some(model), false)
            }
        }
    }

    /// For every state at a branching location, the value of the branch
    /// condition under `model`.
    fn branching_directions(
        &self,
        arg: &Arg<PredicateAbstractState>,
        states: &BTreeSet<StateId>,
        model: &Model,
    ) -> BTreeMap<StateId, bool> {
        let mut directions = BTreeMap::new();
        for &id in states {
            let state = arg.state(id);
            let mut leaving = self.cfa.leaving_edges(state.node()).peekable();
            if leaving.peek().is_none() {
                continue;
            }
            let mut condition = None;
            let mut all_assume = true;
            for edge in leaving {
                match edge.assumption() {
                    Some((c, _)) => condition = condition.or(Some(c)),
                    None => all_assume = false,
                }
            }
            if let (true, Some(c)) = (all_assume, condition) {
                let value = model.evaluate(&c.instantiate(&state.path_formula().ssa));
                directions.insert(id, value);
            }
        }
        directions
    }
}

/// The abstraction states on `path` after its first state.
fn abstraction_trace(arg: &Arg<PredicateAbstractState>, path: &ArgPath) -> Vec<StateId> {
    path.states()
        .iter()
        .skip(1)
        .copied()
        .filter(|&s| arg.state(s).is_abstraction_state())
        .collect()
}
