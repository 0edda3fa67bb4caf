use std::fmt::{Display, Formatter};
use std::rc::Rc;

use log::{debug, info};

use crate::algorithm::cpa::{AlgorithmStatus, CpaAlgorithm, CpaAlgorithmOptions, CpaAlgorithmStatistics};
use crate::arg::cpa::{ArgCpa, ArgOptions};
use crate::arg::reached::ArgReachedSet;
use crate::arg::{ArgState, StateId};
use crate::cfa::Cfa;
use crate::cpa::{AbstractState, ConfigurableProgramAnalysis};
use crate::error::{CpaResult, RefinementResult, Verdict};
use crate::predicate::abstraction::{AbstractionOptions, AbstractionStatistics, PredicateAbstractionManager};
use crate::predicate::cpa::{PrecisionAdjustmentStatistics, PredicateCpa, PredicateCpaOptions};
use crate::predicate::manager::AbstractionManager;
use crate::predicate::precision::PredicatePrecision;
use crate::predicate::state::PredicateAbstractState;
use crate::refinement::{PredicateRefiner, RefinementOptions, RefinementStatistics};
use crate::shutdown::ShutdownNotifier;
use crate::solver::Solver;

pub type PredicateReachedSet = ArgReachedSet<PredicateAbstractState, PredicatePrecision>;

#[derive(Debug, Clone, Default)]
pub struct CegarOptions {
    pub abstraction: AbstractionOptions,
    pub predicate: PredicateCpaOptions,
    pub arg: ArgOptions,
    pub refinement: RefinementOptions,
    pub algorithm: CpaAlgorithmOptions,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CegarStatistics {
    pub rounds: usize,
    pub exploration: CpaAlgorithmStatistics,
    pub refinement: RefinementStatistics,
    pub precision_adjustment: PrecisionAdjustmentStatistics,
    pub abstraction: AbstractionStatistics,
}

impl Display for CegarStatistics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Number of CEGAR rounds:        {}", self.rounds)?;
        writeln!(f, "{}", self.exploration)?;
        writeln!(f, "{}", self.refinement)?;
        writeln!(
            f,
            "Number of abstractions:        {} ({} false)",
            self.precision_adjustment.num_abstractions, self.precision_adjustment.num_abstractions_false
        )?;
        writeln!(f, "  max block size:              {}", self.precision_adjustment.max_block_size)?;
        write!(f, "  computed by the solver:      {}", self.abstraction.num_calls)
    }
}

/// Predicate analysis with lazy abstraction refinement.
///
/// Explores until a target state shows up, checks the path to it, and either
/// reports it or refines the precision and continues on the pruned ARG.
pub struct CegarAlgorithm {
    algorithm: CpaAlgorithm<ArgState<PredicateAbstractState>, PredicatePrecision>,
    refiner: PredicateRefiner<PredicatePrecision>,
    predicate_cpa: Rc<PredicateCpa>,
    shutdown: ShutdownNotifier,
    rounds: usize,
}

impl CegarAlgorithm {
    /// Set up the predicate analysis of `cfa` and a reached set holding its initial state.
    pub fn predicate_analysis(
        cfa: Rc<Cfa>,
        solver: Rc<dyn Solver>,
        options: &CegarOptions,
        shutdown: ShutdownNotifier,
    ) -> CpaResult<(Self, PredicateReachedSet)> {
        let amgr = Rc::new(AbstractionManager::default());
        let pamgr = Rc::new(PredicateAbstractionManager::new(
            amgr,
            solver.clone(),
            options.abstraction.clone(),
            shutdown.clone(),
        ));
        let predicate_cpa = Rc::new(PredicateCpa::new(cfa.clone(), pamgr.clone(), &options.predicate));
        let inner: Rc<dyn ConfigurableProgramAnalysis<PredicateAbstractState, PredicatePrecision>> = predicate_cpa.clone();
        let arg_cpa = ArgCpa::new(inner, &options.arg);

        let entry = cfa.entry();
        let mut reached = ArgReachedSet::new(arg_cpa.arg().clone(), options.algorithm.waitlist_order);
        let root = arg_cpa.initial_state(entry)?;
        reached.reached_mut().add(root, arg_cpa.initial_precision(entry));

        let arg_cpa: Rc<dyn ConfigurableProgramAnalysis<ArgState<PredicateAbstractState>, PredicatePrecision>> =
            Rc::new(arg_cpa);
        let algorithm = CpaAlgorithm::new(arg_cpa, options.algorithm.clone(), shutdown.clone());
        let refiner = PredicateRefiner::new(cfa, pamgr, solver, options.refinement.clone(), shutdown.clone());
        let cegar = Self {
            algorithm,
            refiner,
            predicate_cpa,
            shutdown,
            rounds: 0,
        };
        Ok((cegar, reached))
    }

    pub fn refiner(&self) -> &PredicateRefiner<PredicatePrecision> {
        &self.refiner
    }

    pub fn statistics(&self) -> CegarStatistics {
        CegarStatistics {
            rounds: self.rounds,
            exploration: self.algorithm.statistics(),
            refinement: self.refiner.statistics(),
            precision_adjustment: self.predicate_cpa.precision_adjustment_statistics(),
            abstraction: self.predicate_cpa.abstraction_manager().statistics(),
        }
    }

    pub fn run(&mut self, reached: &mut PredicateReachedSet) -> CpaResult<Verdict> {
        loop {
            self.shutdown.check()?;
            let target = match self.algorithm.run(reached.reached_mut())? {
                AlgorithmStatus::TargetFound(t) => t.id(),
                AlgorithmStatus::Paused => continue,
                AlgorithmStatus::Finished => match first_target(reached) {
                    Some(t) => t,
                    None => {
                        info!("no target state reachable after {} refinements", self.rounds);
                        return Ok(Verdict::Safe);
                    }
                },
            };

            self.rounds += 1;
            info!("CEGAR round {}: target state {}", self.rounds, target);
            match self.refiner.perform_refinement(reached, target)? {
                RefinementResult::Feasible(cex) => {
                    info!("target state {} is reachable", target);
                    return Ok(Verdict::Unsafe(cex));
                }
                RefinementResult::Spurious => {
                    debug!("{} states left after refinement", reached.reached().len());
                }
            }
        }
    }
}

fn first_target(reached: &PredicateReachedSet) -> Option<StateId> {
    reached.reached().states().iter().find(|s| s.is_target()).map(|s| s.id())
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::bdd_solver::BddSolver;
    use crate::cfa::CfaBuilder;
    use crate::error::CpaError;
    use crate::formula::Formula;
    use crate::refinement::PredicateSharing;

    fn analyse(cfa: Cfa, options: &CegarOptions) -> (CegarAlgorithm, PredicateReachedSet, CpaResult<Verdict>) {
        let shutdown = ShutdownNotifier::new();
        let solver = Rc::new(BddSolver::new(shutdown.clone()));
        let (mut cegar, mut reached) =
            CegarAlgorithm::predicate_analysis(Rc::new(cfa), solver, options, shutdown).unwrap();
        let verdict = cegar.run(&mut reached);
        (cegar, reached, verdict)
    }

    #[test]
    fn test_spurious_error_is_refuted() {
        // x = true; if (!x) ERROR
        let mut b = CfaBuilder::new("main");
        let n0 = b.entry();
        let n1 = b.node();
        let n2 = b.node();
        let n3 = b.node();
        b.assign(n0, n1, "x", Formula::mk_true());
        b.branch(n1, Formula::var("x"), n2, n3);
        b.error(n3);

        let (cegar, reached, verdict) = analyse(b.build(), &CegarOptions::default());
        assert!(verdict.unwrap().is_safe());
        assert_eq!(cegar.statistics().rounds, 1);
        assert_eq!(cegar.statistics().refinement.spurious, 1);
        assert!(!reached.reached().has_waiting_state());
        reached.check_consistency();
    }

    #[test]
    fn test_feasible_error_is_reported() {
        // x = nondet(); if (x) ERROR
        let mut b = CfaBuilder::new("main");
        let n0 = b.entry();
        let n1 = b.node();
        let n2 = b.node();
        let n3 = b.node();
        b.havoc(n0, n1, "x");
        b.branch(n1, Formula::var("x"), n2, n3);
        b.error(n2);

        let (cegar, _, verdict) = analyse(b.build(), &CegarOptions::default());
        let Verdict::Unsafe(cex) = verdict.unwrap() else {
            panic!("expected a counterexample");
        };
        assert!(cex.is_precise());
        assert_eq!(cex.path().edge_texts(), vec!["x = __nondet();", "[x]"]);
        assert_eq!(cegar.statistics().refinement.feasible, 1);
        assert_eq!(cegar.statistics().refinement.spurious, 0);
    }

    /// l = false; while (c) { l = true; l = false; c = nondet(); } if (l) ERROR
    fn lock_program() -> Cfa {
        let mut b = CfaBuilder::new("main");
        let entry = b.entry();
        let head = b.node();
        let body = b.node();
        let locked = b.node();
        let unlocked = b.node();
        let exit = b.node();
        let err = b.node();
        let end = b.node();
        b.assign(entry, head, "l", Formula::mk_false());
        b.branch(head, Formula::var("c"), body, exit);
        b.assign(body, locked, "l", Formula::mk_true());
        b.assign(locked, unlocked, "l", Formula::mk_false());
        b.havoc(unlocked, head, "c");
        b.branch(exit, Formula::var("l"), err, end);
        b.error(err);
        b.build()
    }

    #[test]
    fn test_loop_with_location_sharing() {
        let (cegar, reached, verdict) = analyse(lock_program(), &CegarOptions::default());
        assert!(verdict.unwrap().is_safe());
        assert!(cegar.statistics().refinement.spurious >= 1);
        assert!(cegar.statistics().refinement.predicates_created >= 1);
        assert!(first_target(&reached).is_none());
    }

    #[test]
    fn test_loop_with_global_sharing_and_dfs() {
        let mut options = CegarOptions::default();
        options.refinement.sharing = PredicateSharing::Global;
        options.algorithm.waitlist_order = crate::arg::reached::WaitlistOrder::Dfs;
        let (_, _, verdict) = analyse(lock_program(), &options);
        assert!(verdict.unwrap().is_safe());
    }

    #[test]
    fn test_diamond_is_joined() {
        // x = nondet(); if (x) y = true; else y = false; if (y) ERROR
        let mut b = CfaBuilder::new("main");
        let n0 = b.entry();
        let n1 = b.node();
        let then = b.node();
        let other = b.node();
        let join = b.node();
        let err = b.node();
        let end = b.node();
        b.havoc(n0, n1, "x");
        b.branch(n1, Formula::var("x"), then, other);
        b.assign(then, join, "y", Formula::mk_true());
        b.assign(other, join, "y", Formula::mk_false());
        b.branch(join, Formula::var("y"), err, end);
        b.error(err);

        let (cegar, reached, verdict) = analyse(b.build(), &CegarOptions::default());
        let Verdict::Unsafe(cex) = verdict.unwrap() else {
            panic!("expected a counterexample");
        };
        assert_eq!(cegar.statistics().exploration.merges, 1);
        assert_eq!(reached.arg().borrow().statistics().merged, 1);
        // The precise path follows the branch the model takes through the joined state.
        assert!(cex.is_precise());
        assert_eq!(
            cex.path().edge_texts(),
            vec!["x = __nondet();", "[x]", "y = true;", "[y]"]
        );
        assert!(cex.model().unwrap().evaluate(&Formula::indexed_var("x", 2)));
    }

    #[test]
    fn test_interrupted_before_exploration() {
        let mut b = CfaBuilder::new("main");
        let n0 = b.entry();
        let n1 = b.node();
        b.havoc(n0, n1, "x");
        b.error(n1);

        let shutdown = ShutdownNotifier::new();
        let solver = Rc::new(BddSolver::new(shutdown.clone()));
        let (mut cegar, mut reached) =
            CegarAlgorithm::predicate_analysis(Rc::new(b.build()), solver, &CegarOptions::default(), shutdown.clone())
                .unwrap();
        shutdown.request_shutdown();
        assert_eq!(cegar.run(&mut reached).unwrap_err(), CpaError::Interrupted);
    }
}
