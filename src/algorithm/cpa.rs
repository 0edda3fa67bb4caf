use std::fmt::{Display, Formatter};
use std::rc::Rc;

use log::debug;

use crate::arg::reached::{ReachedSet, WaitlistOrder};
use crate::cpa::{AbstractState, Action, ConfigurableProgramAnalysis};
use crate::error::CpaResult;
use crate::shutdown::ShutdownNotifier;

#[derive(Debug, Clone)]
pub struct CpaAlgorithmOptions {
    pub waitlist_order: WaitlistOrder,
    /// Return as soon as a target state has been added.
    pub stop_after_error: bool,
}

impl Default for CpaAlgorithmOptions {
    fn default() -> Self {
        Self {
            waitlist_order: WaitlistOrder::Bfs,
            stop_after_error: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpaAlgorithmStatistics {
    pub iterations: usize,
    pub successors: usize,
    pub bottom: usize,
    pub merges: usize,
    pub stops: usize,
    pub max_waitlist: usize,
}

impl Display for CpaAlgorithmStatistics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Number of iterations:          {}", self.iterations)?;
        writeln!(f, "Number of successors:          {}", self.successors)?;
        writeln!(f, "  bottom after adjustment:     {}", self.bottom)?;
        writeln!(f, "  merged into reached states:  {}", self.merges)?;
        writeln!(f, "  covered by reached states:   {}", self.stops)?;
        write!(f, "Max waitlist size:             {}", self.max_waitlist)
    }
}

/// Why [`CpaAlgorithm::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlgorithmStatus<S> {
    /// The waitlist is empty.
    Finished,
    /// A target state was added to the reached set.
    TargetFound(S),
    /// The precision adjustment asked to stop. The waitlist may still hold states.
    Paused,
}

/// Worklist exploration of a configurable program analysis.
pub struct CpaAlgorithm<S, P> {
    cpa: Rc<dyn ConfigurableProgramAnalysis<S, P>>,
    options: CpaAlgorithmOptions,
    shutdown: ShutdownNotifier,
    stats: CpaAlgorithmStatistics,
}

impl<S, P> CpaAlgorithm<S, P>
where
    S: AbstractState + Ord,
    P: Clone,
{
    pub fn new(
        cpa: Rc<dyn ConfigurableProgramAnalysis<S, P>>,
        options: CpaAlgorithmOptions,
        shutdown: ShutdownNotifier,
    ) -> Self {
        Self {
            cpa,
            options,
            shutdown,
            stats: CpaAlgorithmStatistics::default(),
        }
    }

    pub fn options(&self) -> &CpaAlgorithmOptions {
        &self.options
    }

    pub fn statistics(&self) -> CpaAlgorithmStatistics {
        self.stats
    }

    /// Expand waiting states until the waitlist is empty, a target is found
    /// or the precision adjustment breaks.
    ///
    /// All successors of the expanded state are handled before a target is
    /// reported, so the reached set never holds half an expansion.
    pub fn run(&mut self, reached: &mut ReachedSet<S, P>) -> CpaResult<AlgorithmStatus<S>> {
        let transfer = self.cpa.transfer_relation();
        let merge = self.cpa.merge_operator();
        let stop = self.cpa.stop_operator();
        let adjustment = self.cpa.precision_adjustment();

        while let Some(state) = reached.pop_from_waitlist() {
            self.shutdown.check()?;
            self.stats.iterations += 1;
            self.stats.max_waitlist = self.stats.max_waitlist.max(reached.waitlist_len() + 1);

            let precision = match reached.precision(&state) {
                Some(p) => p.clone(),
                None => panic!("Waiting state {:?} has no precision", state),
            };
            let successors = transfer.successors(&state, &precision)?;
            debug!("{:?} has {} successors", state, successors.len());

            let mut target = None;
            let mut paused = false;
            for successor in successors {
                self.stats.successors += 1;
                let Some(adjusted) = adjustment.adjust(&successor, &precision)? else {
                    self.stats.bottom += 1;
                    continue;
                };
                let successor = adjusted.state;
                let precision = adjusted.precision;

                let mut to_remove = Vec::new();
                let mut to_add = Vec::new();
                for r in reached.reached(&successor).to_vec() {
                    if let Some(merged) = merge.merge(&successor, &r, &precision)? {
                        if merged != r {
                            debug!("{:?} merged with {:?} into {:?}", successor, r, merged);
                            self.stats.merges += 1;
                            to_remove.push(r);
                            to_add.push(merged);
                        }
                    }
                }
                reached.remove_all(&to_remove);
                for m in to_add {
                    reached.add(m, precision.clone());
                }

                if stop.stop(&successor, reached.reached(&successor), &precision)? {
                    debug!("{:?} is covered", successor);
                    self.stats.stops += 1;
                    continue;
                }

                let is_target = successor.is_target();
                reached.add(successor.clone(), precision);
                if is_target && self.options.stop_after_error && target.is_none() {
                    target = Some(successor);
                }
                if adjusted.action == Action::Break {
                    paused = true;
                }
            }

            if let Some(t) = target {
                debug!("found target state {:?}", t);
                return Ok(AlgorithmStatus::TargetFound(t));
            }
            if paused {
                return Ok(AlgorithmStatus::Paused);
            }
        }
        Ok(AlgorithmStatus::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::cfa::{Cfa, CfaBuilder, NodeId};
    use crate::cpa::testing::{LocationCpa, LocationState};
    use crate::cpa::{
        MergeOperator, PrecisionAdjustment, PrecisionAdjustmentResult, StaticPrecisionAdjustment, StopOperator,
        TransferRelation,
    };
    use crate::error::CpaError;
    use crate::formula::Formula;

    /// entry -> head; head -> body | exit; body -> head; exit -> err
    fn looping_program() -> (Rc<Cfa>, NodeId, NodeId) {
        let mut b = CfaBuilder::new("main");
        let entry = b.entry();
        let head = b.node();
        let body = b.node();
        let exit = b.node();
        let err = b.node();
        b.havoc(entry, head, "c");
        b.branch(head, Formula::var("c"), body, exit);
        b.havoc(body, head, "c");
        b.blank(exit, err, "reach_error();");
        b.error(err);
        (Rc::new(b.build()), exit, err)
    }

    fn start(cpa: &dyn ConfigurableProgramAnalysis<LocationState, ()>, cfa: &Cfa) -> ReachedSet<LocationState, ()> {
        let mut reached = ReachedSet::new(WaitlistOrder::Bfs);
        reached.add(cpa.initial_state(cfa.entry()).unwrap(), ());
        reached
    }

    #[test]
    fn test_explores_every_location_once() {
        let (cfa, _, err) = looping_program();
        let cpa: Rc<dyn ConfigurableProgramAnalysis<LocationState, ()>> = Rc::new(LocationCpa { cfa: cfa.clone() });
        let mut reached = start(cpa.as_ref(), &cfa);
        let options = CpaAlgorithmOptions {
            stop_after_error: false,
            ..CpaAlgorithmOptions::default()
        };
        let mut algorithm = CpaAlgorithm::new(cpa, options, ShutdownNotifier::new());

        assert_eq!(algorithm.run(&mut reached).unwrap(), AlgorithmStatus::Finished);
        assert_eq!(reached.len(), 5);
        assert!(reached.states().iter().any(|s| s.node == err && s.is_target()));
        // The loop back edge leads to a state that is already reached.
        assert_eq!(algorithm.statistics().stops, 1);
        assert_eq!(algorithm.statistics().iterations, 5);
    }

    #[test]
    fn test_stops_at_target() {
        let (cfa, _, err) = looping_program();
        let cpa: Rc<dyn ConfigurableProgramAnalysis<LocationState, ()>> = Rc::new(LocationCpa { cfa: cfa.clone() });
        let mut reached = start(cpa.as_ref(), &cfa);
        let mut algorithm = CpaAlgorithm::new(cpa, CpaAlgorithmOptions::default(), ShutdownNotifier::new());

        let status = algorithm.run(&mut reached).unwrap();
        assert_eq!(status, AlgorithmStatus::TargetFound(LocationState { node: err, target: true }));
        assert_eq!(reached.waitlist_len(), 1);

        // Resuming expands the target, which has no successors.
        assert_eq!(algorithm.run(&mut reached).unwrap(), AlgorithmStatus::Finished);
    }

    #[test]
    fn test_interrupted() {
        let (cfa, _, _) = looping_program();
        let cpa: Rc<dyn ConfigurableProgramAnalysis<LocationState, ()>> = Rc::new(LocationCpa { cfa: cfa.clone() });
        let mut reached = start(cpa.as_ref(), &cfa);
        let shutdown = ShutdownNotifier::new();
        let mut algorithm = CpaAlgorithm::new(cpa, CpaAlgorithmOptions::default(), shutdown.clone());
        shutdown.request_shutdown();
        assert_eq!(algorithm.run(&mut reached).unwrap_err(), CpaError::Interrupted);
    }

    /// Location analysis whose adjustment breaks at one location.
    struct Pausing {
        inner: LocationCpa,
        pause_at: NodeId,
    }

    struct PauseAdjustment(NodeId);

    impl PrecisionAdjustment<LocationState, ()> for PauseAdjustment {
        fn adjust(
            &self,
            state: &LocationState,
            precision: &(),
        ) -> CpaResult<Option<PrecisionAdjustmentResult<LocationState, ()>>> {
            let mut result = StaticPrecisionAdjustment.adjust(state, precision)?;
            if let Some(r) = result.as_mut() {
                if state.node == self.0 {
                    r.action = Action::Break;
                }
            }
            Ok(result)
        }
    }

    impl ConfigurableProgramAnalysis<LocationState, ()> for Pausing {
        fn transfer_relation(&self) -> Rc<dyn TransferRelation<LocationState, ()>> {
            self.inner.transfer_relation()
        }
        fn merge_operator(&self) -> Rc<dyn MergeOperator<LocationState, ()>> {
            self.inner.merge_operator()
        }
        fn stop_operator(&self) -> Rc<dyn StopOperator<LocationState, ()>> {
            self.inner.stop_operator()
        }
        fn precision_adjustment(&self) -> Rc<dyn PrecisionAdjustment<LocationState, ()>> {
            Rc::new(PauseAdjustment(self.pause_at))
        }
        fn initial_state(&self, node: NodeId) -> CpaResult<LocationState> {
            self.inner.initial_state(node)
        }
        fn initial_precision(&self, node: NodeId) {
            self.inner.initial_precision(node)
        }
    }

    #[test]
    fn test_break_pauses_exploration() {
        let (cfa, exit, _) = looping_program();
        let cpa: Rc<dyn ConfigurableProgramAnalysis<LocationState, ()>> = Rc::new(Pausing {
            inner: LocationCpa { cfa: cfa.clone() },
            pause_at: exit,
        });
        let mut reached = start(cpa.as_ref(), &cfa);
        let options = CpaAlgorithmOptions {
            stop_after_error: false,
            ..CpaAlgorithmOptions::default()
        };
        let mut algorithm = CpaAlgorithm::new(cpa, options, ShutdownNotifier::new());

        assert_eq!(algorithm.run(&mut reached).unwrap(), AlgorithmStatus::Paused);
        assert!(reached.states().iter().any(|s| s.node == exit));
        assert!(reached.has_waiting_state());
        assert_eq!(algorithm.run(&mut reached).unwrap(), AlgorithmStatus::Finished);
        assert_eq!(reached.len(), 5);
    }
}
