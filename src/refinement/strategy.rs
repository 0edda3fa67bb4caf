//! Turning interpolants into a new precision.
//!
//! One refinement walks through the phases
//! `Idle -> PerInterpolationPoint -> ComputePrecision -> PruneArg -> Idle`.
//! The working set of new predicates lives exactly as long as one such walk.

use std::collections::BTreeSet;
use std::rc::Rc;

use log::{debug, info};

use crate::arg::reached::ArgReachedSet;
use crate::arg::StateId;
use crate::cfa::{Cfa, NodeId};
use crate::cpa::AbstractState;
use crate::error::{CpaError, CpaResult};
use crate::formula::Formula;
use crate::predicate::abstraction::PredicateAbstractionManager;
use crate::predicate::manager::AbstractionPredicate;
use crate::predicate::precision::PredicatePrecision;
use crate::predicate::state::PredicateAbstractState;
use crate::refinement::RefinementStatistics;

/// Where new predicates are attached.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum PredicateSharing {
    Global,
    /// Predicates over qualified variables (`function::name`) stay at their
    /// location, all others become global.
    Scope,
    Function,
    #[default]
    Location,
    LocationInstance,
}

/// Which old predicates the new precision starts from.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum PredicateBasis {
    /// The predicates of every uncovered state below the refinement root.
    All,
    /// The precision of the target state.
    #[default]
    Target,
    /// The precision of the refinement root.
    Cutpoint,
}

#[derive(Debug, Clone)]
pub struct RefinementOptions {
    pub sharing: PredicateSharing,
    pub basis: PredicateBasis,
    /// Prune at the children of the ARG root every that many refinements; 0 disables.
    pub restart_after_refinements: usize,
    /// Add the new predicates to every state in the reached set.
    pub share_predicates: bool,
    /// Split interpolants into their atoms instead of using them whole.
    pub atomic_predicates: bool,
    /// Log the predicates of every round.
    pub dump_predicates: bool,
}

impl Default for RefinementOptions {
    fn default() -> Self {
        Self {
            sharing: PredicateSharing::default(),
            basis: PredicateBasis::default(),
            restart_after_refinements: 0,
            share_predicates: false,
            atomic_predicates: true,
            dump_predicates: false,
        }
    }
}

/// A precision that carries a predicate precision, possibly next to others.
pub trait RefinablePrecision: Clone {
    fn predicate_precision(&self) -> &PredicatePrecision;

    fn with_predicate_precision(&self, precision: PredicatePrecision) -> Self;

    /// Join the non-predicate parts of `others` into `self`.
    fn join_others(&self, _others: &[Self]) -> Self {
        self.clone()
    }
}

impl RefinablePrecision for PredicatePrecision {
    fn predicate_precision(&self) -> &PredicatePrecision {
        self
    }

    fn with_predicate_precision(&self, precision: PredicatePrecision) -> Self {
        precision
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RefinementPhase {
    Idle,
    PerInterpolationPoint,
    ComputePrecision,
    PruneArg,
}

type NewPredicate = ((NodeId, usize), AbstractionPredicate);

pub struct PredicateAbstractionRefinementStrategy {
    options: RefinementOptions,
    pamgr: Rc<PredicateAbstractionManager>,
    cfa: Rc<Cfa>,
    refinement_count: usize,
    new_predicates: Option<Vec<NewPredicate>>,
    phase: RefinementPhase,
    stats: RefinementStatistics,
    last_round: Vec<NewPredicate>,
}

impl PredicateAbstractionRefinementStrategy {
    pub fn new(cfa: Rc<Cfa>, pamgr: Rc<PredicateAbstractionManager>, options: RefinementOptions) -> Self {
        Self {
            options,
            pamgr,
            cfa,
            refinement_count: 0,
            new_predicates: None,
            phase: RefinementPhase::Idle,
            stats: RefinementStatistics::default(),
            last_round: Vec::new(),
        }
    }

    pub fn options(&self) -> &RefinementOptions {
        &self.options
    }

    pub fn phase(&self) -> RefinementPhase {
        self.phase
    }

    pub fn statistics(&self) -> RefinementStatistics {
        self.stats
    }

    pub(crate) fn statistics_mut(&mut self) -> &mut RefinementStatistics {
        &mut self.stats
    }

    /// The predicates found in the last finished round, by location instance.
    pub fn last_round_predicates(&self) -> &[NewPredicate] {
        &self.last_round
    }

    /// Refine along `trace`, the abstraction states from the first block end
    /// to the target, given one interpolant per state but the last.
    ///
    /// Returns the ids of all states removed from the ARG.
    pub fn perform_refinement<P: RefinablePrecision>(
        &mut self,
        reached: &mut ArgReachedSet<PredicateAbstractState, P>,
        trace: &[StateId],
        interpolants: &[Formula],
        repeated_counterexample: bool,
    ) -> CpaResult<Vec<StateId>> {
        assert!(!trace.is_empty(), "Refinement needs at least the target state");
        assert_eq!(
            interpolants.len() + 1,
            trace.len(),
            "Expected one interpolant per block boundary"
        );
        let target = trace[trace.len() - 1];

        self.start_refinement_of_path();
        let mut affected = Vec::new();
        let mut unreachable = target;
        for (itp, &state) in interpolants.iter().zip(trace) {
            if itp.is_true() {
                continue;
            }
            if itp.is_false() {
                unreachable = state;
                break;
            }
            let arg = reached.arg().borrow();
            self.perform_refinement_for_state(itp, arg.state(state));
            affected.push(state);
        }
        let result = self.finish_refinement_of_path(reached, unreachable, target, affected, repeated_counterexample);
        // The working set never outlives one refinement, not even a failed one.
        self.new_predicates = None;
        self.phase = RefinementPhase::Idle;
        result
    }

    pub fn start_refinement_of_path(&mut self) {
        assert!(
            self.new_predicates.is_none(),
            "Refinement of a path started while another one is in progress"
        );
        self.new_predicates = Some(Vec::new());
        self.phase = RefinementPhase::PerInterpolationPoint;
    }

    /// Record the predicates of `interpolant` at the location instance of `state`.
    ///
    /// # Panics
    ///
    /// Panics if `interpolant` is `true`, if no path refinement is in progress,
    /// or if `state` is not an abstraction state.
    pub fn perform_refinement_for_state(&mut self, interpolant: &Formula, state: &PredicateAbstractState) {
        assert!(!interpolant.is_true(), "Interpolant true does not refine anything");
        assert_eq!(self.phase, RefinementPhase::PerInterpolationPoint);
        let key = location_instance(state);

        let predicates = if self.options.atomic_predicates {
            self.pamgr.predicates_for_atoms_of(interpolant)
        } else {
            vec![self.pamgr.predicate_for(interpolant)]
        };
        assert!(!predicates.is_empty(), "Interpolant {} without predicates", interpolant);
        debug!("interpolant {} at {:?} gives {} predicates", interpolant, key, predicates.len());

        if let Some(new_predicates) = self.new_predicates.as_mut() {
            new_predicates.extend(predicates.into_iter().map(|p| (key, p)));
        }
    }

    /// Compute the new precision and prune the ARG.
    pub fn finish_refinement_of_path<P: RefinablePrecision>(
        &mut self,
        reached: &mut ArgReachedSet<PredicateAbstractState, P>,
        unreachable: StateId,
        target: StateId,
        mut affected: Vec<StateId>,
        repeated_counterexample: bool,
    ) -> CpaResult<Vec<StateId>> {
        assert_eq!(self.phase, RefinementPhase::PerInterpolationPoint);
        self.phase = RefinementPhase::ComputePrecision;

        let (new_precision, roots) = self.compute_new_precision(
            reached,
            unreachable,
            target,
            &mut affected,
            repeated_counterexample,
        )?;

        self.phase = RefinementPhase::PruneArg;
        let removed = self.update_arg(reached, &new_precision, &roots);
        self.stats.states_removed += removed.len();
        self.last_round = self.new_predicates.take().unwrap_or_default();
        self.phase = RefinementPhase::Idle;
        Ok(removed)
    }

    fn compute_new_precision<P: RefinablePrecision>(
        &mut self,
        reached: &ArgReachedSet<PredicateAbstractState, P>,
        unreachable: StateId,
        target: StateId,
        affected: &mut Vec<StateId>,
        repeated_counterexample: bool,
    ) -> CpaResult<(PredicatePrecision, Vec<StateId>)> {
        {
            let arg = reached.arg().borrow();
            let key = location_instance(arg.state(unreachable));
            let false_predicate = self.pamgr.make_false_predicate();
            if let Some(new_predicates) = self.new_predicates.as_mut() {
                new_predicates.push((key, false_predicate));
            }
            affected.push(unreachable);
        }

        let target_precision = reached
            .precision_of(target)
            .unwrap_or_else(|| panic!("Could not find the precision of target state {}", target))
            .predicate_precision()
            .clone();

        let root = self.refinement_root(reached, &affected[..], &target_precision, repeated_counterexample)?;
        debug!("removing everything below {} from the ARG", root);
        let mut roots = vec![root];

        self.refinement_count += 1;
        if self.options.restart_after_refinements > 0 && self.refinement_count >= self.options.restart_after_refinements
        {
            let arg = reached.arg().borrow();
            roots = arg
                .roots()
                .flat_map(|r| arg.node(r).children().to_vec())
                .collect();
            info!(
                "restarting analysis after {} refinements by clearing the ARG",
                self.refinement_count
            );
            self.refinement_count = 0;
            self.stats.restarts += 1;
        }

        let base = match self.options.basis {
            PredicateBasis::All => {
                let mut base = PredicatePrecision::empty();
                for p in subgraph_precisions(reached, &roots) {
                    base = base.merge_with(p.predicate_precision());
                }
                base
            }
            PredicateBasis::Target => target_precision.clone(),
            PredicateBasis::Cutpoint => reached
                .precision_of(roots[0])
                .map(|p| p.predicate_precision().clone())
                .unwrap_or_default(),
        };

        let new_predicates = self.new_predicates.clone().unwrap_or_default();
        let predicates = new_predicates.iter().map(|(_, p)| p.clone());
        let new_precision = match self.options.sharing {
            PredicateSharing::Global => base.add_global(predicates),
            PredicateSharing::Scope => {
                let (local, global): (Vec<_>, Vec<_>) = new_predicates
                    .iter()
                    .cloned()
                    .partition(|(_, p)| p.symbolic_atom().to_string().contains("::"));
                base.add_global(global.into_iter().map(|(_, p)| p))
                    .add_local(local.into_iter().map(|((loc, _), p)| (loc, p)))
            }
            PredicateSharing::Function => base.add_function(
                new_predicates
                    .iter()
                    .map(|((loc, _), p)| (self.cfa.function_of(*loc).to_string(), p.clone())),
            ),
            PredicateSharing::Location => base.add_local(new_predicates.iter().map(|((loc, _), p)| (*loc, p.clone()))),
            PredicateSharing::LocationInstance => base.add_location_instance(new_predicates.iter().cloned()),
        };
        debug!("predicate precision is now {}", new_precision);

        assert_eq!(
            base.calculate_difference_to(&new_precision),
            0,
            "We forgot predicates during refinement!"
        );
        assert_eq!(
            target_precision.calculate_difference_to(&new_precision),
            0,
            "We forgot predicates during refinement!"
        );

        self.stats.predicates_created += new_predicates.len();
        if self.options.dump_predicates {
            for ((loc, instance), p) in &new_predicates {
                info!("new predicate at {} (instance {}): {}", loc, instance, p);
            }
        }
        Ok((new_precision, roots))
    }

    /// The first interpolation point, unless the round found nothing new.
    ///
    /// Then the highest abstraction state above it at the same location is
    /// used, or the refinement fails if this path was seen before.
    fn refinement_root<P: RefinablePrecision>(
        &mut self,
        reached: &ArgReachedSet<PredicateAbstractState, P>,
        affected: &[StateId],
        target_precision: &PredicatePrecision,
        repeated_counterexample: bool,
    ) -> CpaResult<StateId> {
        let first = affected[0];
        let new_predicates = self.new_predicates.as_deref().unwrap_or_default();
        let found_new = new_predicates.iter().any(|((loc, instance), p)| {
            !target_precision
                .predicates(*loc, self.cfa.function_of(*loc), *instance)
                .contains(p)
        });
        if found_new {
            return Ok(first);
        }
        if repeated_counterexample {
            return Err(CpaError::RepeatedCounterexample);
        }

        self.stats.location_based_cutoffs += 1;
        let arg = reached.arg().borrow();
        let location = arg.state(first).node();
        debug!("no new predicates, removing everything below the first visit of {}", location);
        let mut root = first;
        let mut current = first;
        while let Some(&parent) = arg.node(current).parents().first() {
            current = parent;
            let state = arg.state(current);
            // The ARG root itself can never be pruned.
            if state.is_abstraction_state() && state.node() == location && !arg.node(current).parents().is_empty() {
                root = current;
            }
        }
        Ok(root)
    }

    fn update_arg<P: RefinablePrecision>(
        &self,
        reached: &mut ArgReachedSet<PredicateAbstractState, P>,
        new_precision: &PredicatePrecision,
        roots: &[StateId],
    ) -> Vec<StateId> {
        let mut removed = Vec::new();
        for &root in roots {
            if !reached.arg().borrow().contains(root) {
                continue;
            }
            let others = subgraph_precisions(reached, &[root]);
            let adapt = |old: &P| {
                old.with_predicate_precision(old.predicate_precision().merge_with(new_precision))
                    .join_others(&others)
            };
            removed.extend(reached.remove_subtree(root, &adapt));
        }
        if self.options.share_predicates {
            reached.update_precision_globally(&|old: &P| {
                old.with_predicate_precision(old.predicate_precision().merge_with(new_precision))
            });
        }
        removed
    }
}

/// Location and visit count of an abstraction state.
fn location_instance(state: &PredicateAbstractState) -> (NodeId, usize) {
    let location = state.node();
    let instance = state
        .location_instance()
        .unwrap_or_else(|| panic!("{:?} is not an abstraction state at {}", state.location(), location));
    (location, instance)
}

/// Precisions of the uncovered reached states below `roots`.
fn subgraph_precisions<P: RefinablePrecision>(
    reached: &ArgReachedSet<PredicateAbstractState, P>,
    roots: &[StateId],
) -> Vec<P> {
    let arg = reached.arg().borrow();
    let states: BTreeSet<StateId> = roots
        .iter()
        .filter(|&&r| arg.contains(r))
        .flat_map(|&r| arg.subgraph(r))
        .collect();
    states
        .into_iter()
        .filter(|&s| !arg.node(s).is_covered())
        .filter_map(|s| reached.precision_of(s).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use test_log::test;

    use crate::arg::reached::WaitlistOrder;
    use crate::arg::Arg;
    use crate::bdd_solver::BddSolver;
    use crate::cfa::CfaBuilder;
    use crate::pathformula::PathFormulaManager;
    use crate::predicate::abstraction::AbstractionOptions;
    use crate::predicate::manager::AbstractionManager;
    use crate::shutdown::ShutdownNotifier;

    struct Fixture {
        cfa: Rc<Cfa>,
        pamgr: Rc<PredicateAbstractionManager>,
        reached: ArgReachedSet<PredicateAbstractState, PredicatePrecision>,
        /// root, first abstraction state at `head`, second one at `head`, target
        states: [StateId; 4],
        nodes: [NodeId; 3],
    }

    /// An ARG root at `entry`, two abstraction states at the loop head `head`
    /// and an abstraction state at the error location `err`, in one chain.
    fn fixture() -> Fixture {
        let mut b = CfaBuilder::new("main");
        let entry = b.entry();
        let head = b.node();
        let body = b.node();
        let err = b.node();
        b.assign(entry, head, "x", Formula::mk_true());
        b.branch(head, Formula::var("c"), body, err);
        b.havoc(body, head, "c");
        b.error(err);
        let cfa = Rc::new(b.build());

        let pamgr = Rc::new(PredicateAbstractionManager::new(
            Rc::new(AbstractionManager::default()),
            Rc::new(BddSolver::new(ShutdownNotifier::new())),
            AbstractionOptions::default(),
            ShutdownNotifier::new(),
        ));
        let pfmgr = PathFormulaManager::new();
        let abstraction_at = |loc: NodeId, target: bool, locations: &[(NodeId, usize)]| {
            PredicateAbstractState::abstraction_state(
                loc,
                target,
                pfmgr.make_empty(),
                pamgr.make_true_abstraction(None),
                locations.iter().copied().collect::<BTreeMap<_, _>>(),
            )
        };

        let arg = Arg::shared();
        let states = {
            let mut g = arg.borrow_mut();
            let root = g.create_root(abstraction_at(entry, false, &[]));
            let h1 = g.create_successor(root, abstraction_at(head, false, &[(head, 1)]));
            let h2 = g.create_successor(h1, abstraction_at(head, false, &[(head, 2)]));
            let t = g.create_successor(h2, abstraction_at(err, true, &[(head, 2), (err, 1)]));
            [root, h1, h2, t]
        };
        let mut reached = ArgReachedSet::new(arg, WaitlistOrder::Bfs);
        for &s in &states {
            let handle = reached.handle(s);
            reached.reached_mut().add(handle, PredicatePrecision::empty());
        }
        while reached.reached_mut().pop_from_waitlist().is_some() {}

        Fixture {
            cfa,
            pamgr,
            reached,
            states,
            nodes: [entry, head, err],
        }
    }

    fn strategy(f: &Fixture, options: RefinementOptions) -> PredicateAbstractionRefinementStrategy {
        PredicateAbstractionRefinementStrategy::new(f.cfa.clone(), f.pamgr.clone(), options)
    }

    #[test]
    fn test_location_instance_sharing() {
        let mut f = fixture();
        let [_, h1, h2, t] = f.states;
        let [_, head, err] = f.nodes;
        let mut strategy = strategy(
            &f,
            RefinementOptions {
                sharing: PredicateSharing::LocationInstance,
                ..RefinementOptions::default()
            },
        );
        let itps = [Formula::indexed_var("x", 2), Formula::indexed_var("y", 3)];
        let removed = strategy
            .perform_refinement(&mut f.reached, &[h1, h2, t], &itps, false)
            .unwrap();

        // Pruned at the first interpolation point.
        assert_eq!(removed.len(), 3);
        assert!(!f.reached.contains(h1));
        assert_eq!(strategy.phase(), RefinementPhase::Idle);

        let amgr = f.pamgr.abstraction_manager();
        let x = amgr.predicate_of_atom(&Formula::var("x")).unwrap();
        let y = amgr.predicate_of_atom(&Formula::var("y")).unwrap();
        let root = f.states[0];
        let precision = f.reached.precision_of(root).unwrap();
        let instances = precision.location_instance_predicates();
        assert_eq!(instances.get(&(head, 1)), Some(&BTreeSet::from([x.clone()])));
        assert_eq!(instances.get(&(head, 2)), Some(&BTreeSet::from([y.clone()])));
        assert!(instances.get(&(err, 1)).unwrap().contains(&f.pamgr.make_false_predicate()));
        assert!(precision.local_predicates().is_empty());
        assert!(!precision.predicates(head, "main", 1).contains(&y));
        assert!(f.reached.reached().is_waiting(&f.reached.handle(root)));
        assert_eq!(strategy.last_round_predicates().len(), 3);
        f.reached.check_consistency();
    }

    #[test]
    fn test_location_sharing_is_monotone() {
        let mut f = fixture();
        let [root, h1, h2, t] = f.states;
        let [entry, head, _] = f.nodes;
        let old_predicate = f.pamgr.abstraction_manager().make_predicate(&Formula::var("z"));
        let old = PredicatePrecision::empty().add_local([(entry, old_predicate.clone())]);
        for s in [root, h1, h2, t] {
            let handle = f.reached.handle(s);
            f.reached.reached_mut().update_precision(&handle, old.clone());
        }

        let mut strategy = strategy(&f, RefinementOptions::default());
        let itps = [Formula::indexed_var("x", 2), Formula::mk_true()];
        strategy
            .perform_refinement(&mut f.reached, &[h1, h2, t], &itps, false)
            .unwrap();

        let new = f.reached.precision_of(root).unwrap();
        assert_eq!(old.calculate_difference_to(new), 0);
        let x = f.pamgr.abstraction_manager().predicate_of_atom(&Formula::var("x")).unwrap();
        assert!(new.predicates(head, "main", 7).contains(&x));
        assert!(new.predicates(entry, "main", 1).contains(&old_predicate));
    }

    #[test]
    fn test_global_and_function_sharing() {
        for sharing in [PredicateSharing::Global, PredicateSharing::Function] {
            let mut f = fixture();
            let [root, h1, h2, t] = f.states;
            let mut strategy = strategy(
                &f,
                RefinementOptions {
                    sharing,
                    ..RefinementOptions::default()
                },
            );
            let itps = [Formula::indexed_var("x", 2), Formula::mk_true()];
            strategy
                .perform_refinement(&mut f.reached, &[h1, h2, t], &itps, false)
                .unwrap();
            let precision = f.reached.precision_of(root).unwrap();
            let x = f.pamgr.abstraction_manager().predicate_of_atom(&Formula::var("x")).unwrap();
            match sharing {
                PredicateSharing::Global => assert!(precision.global_predicates().contains(&x)),
                _ => assert!(precision.function_predicates()["main"].contains(&x)),
            }
        }
    }

    #[test]
    fn test_scope_sharing() {
        let mut f = fixture();
        let [root, h1, h2, t] = f.states;
        let [_, head, _] = f.nodes;
        let mut strategy = strategy(
            &f,
            RefinementOptions {
                sharing: PredicateSharing::Scope,
                ..RefinementOptions::default()
            },
        );
        let itps = [
            Formula::and(Formula::indexed_var("g", 1), Formula::indexed_var("main::l", 1)),
            Formula::mk_true(),
        ];
        strategy
            .perform_refinement(&mut f.reached, &[h1, h2, t], &itps, false)
            .unwrap();
        let precision = f.reached.precision_of(root).unwrap();
        let amgr = f.pamgr.abstraction_manager();
        let g = amgr.predicate_of_atom(&Formula::var("g")).unwrap();
        let l = amgr.predicate_of_atom(&Formula::var("main::l")).unwrap();
        assert!(precision.global_predicates().contains(&g));
        assert!(precision.local_predicates()[&head].contains(&l));
    }

    #[test]
    fn test_false_interpolant_marks_unreachable_state() {
        let mut f = fixture();
        let [root, h1, h2, t] = f.states;
        let [_, head, _] = f.nodes;
        let mut strategy = strategy(&f, RefinementOptions::default());
        let itps = [Formula::indexed_var("x", 2), Formula::mk_false()];
        strategy
            .perform_refinement(&mut f.reached, &[h1, h2, t], &itps, false)
            .unwrap();
        let precision = f.reached.precision_of(root).unwrap();
        assert!(precision.local_predicates()[&head].contains(&f.pamgr.make_false_predicate()));
    }

    #[test]
    fn test_repeated_counterexample() {
        let mut f = fixture();
        let [root, h1, h2, t] = f.states;
        let [_, head, err] = f.nodes;
        let amgr = f.pamgr.abstraction_manager();
        let x = amgr.make_predicate(&Formula::var("x"));
        let known = PredicatePrecision::empty()
            .add_local([(head, x)])
            .add_local([(err, f.pamgr.make_false_predicate())]);
        for s in [root, h1, h2, t] {
            let handle = f.reached.handle(s);
            f.reached.reached_mut().update_precision(&handle, known.clone());
        }

        let mut strategy = strategy(&f, RefinementOptions::default());
        let itps = [Formula::indexed_var("x", 2), Formula::mk_true()];
        let err = strategy
            .perform_refinement(&mut f.reached, &[h1, h2, t], &itps, true)
            .unwrap_err();
        assert_eq!(err, CpaError::RepeatedCounterexample);
        assert_eq!(strategy.phase(), RefinementPhase::Idle);
        assert!(f.reached.contains(t));

        // Not repeated: the root moves up to the first visit of the location.
        let itps = [Formula::mk_true(), Formula::indexed_var("x", 3)];
        let removed = strategy
            .perform_refinement(&mut f.reached, &[h1, h2, t], &itps, false)
            .unwrap();
        assert!(removed.contains(&h1));
        assert_eq!(strategy.statistics().location_based_cutoffs, 1);
    }

    #[test]
    fn test_restart() {
        let mut f = fixture();
        let [root, _, h2, t] = f.states;
        let mut strategy = strategy(
            &f,
            RefinementOptions {
                restart_after_refinements: 1,
                ..RefinementOptions::default()
            },
        );
        let itps = [Formula::indexed_var("y", 1)];
        let removed = strategy
            .perform_refinement(&mut f.reached, &[h2, t], &itps, false)
            .unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(f.reached.reached().len(), 1);
        assert!(f.reached.contains(root));
        assert_eq!(strategy.statistics().restarts, 1);
    }

    #[test]
    #[should_panic(expected = "Interpolant true does not refine anything")]
    fn test_true_interpolant_panics() {
        let f = fixture();
        let mut strategy = strategy(&f, RefinementOptions::default());
        strategy.start_refinement_of_path();
        let arg = f.reached.arg().borrow();
        strategy.perform_refinement_for_state(&Formula::mk_true(), arg.state(f.states[1]));
    }
}
