use std::rc::Rc;

use log::debug;

use crate::arg::{Arg, StateId};
use crate::formula::Formula;
use crate::predicate::state::PredicateAbstractState;
use crate::shutdown::ShutdownNotifier;
use crate::solver::{Interpolation, Model, Solver, SolverResult};

/// Outcome of checking an abstract counterexample.
#[derive(Debug, Clone)]
pub enum CounterexampleTraceInfo {
    /// The path is infeasible. One interpolant per block boundary: the
    /// `i`-th holds after the first `i + 1` blocks and rules out the rest.
    Spurious { interpolants: Vec<Formula> },
    /// The path is feasible under `model`.
    Feasible { model: Model },
}

impl CounterexampleTraceInfo {
    pub fn is_spurious(&self) -> bool {
        matches!(self, CounterexampleTraceInfo::Spurious { .. })
    }
}

pub struct InterpolationManager {
    solver: Rc<dyn Solver>,
    shutdown: ShutdownNotifier,
}

impl InterpolationManager {
    pub fn new(solver: Rc<dyn Solver>, shutdown: ShutdownNotifier) -> Self {
        Self { solver, shutdown }
    }

    /// The block formula of every state in `trace`.
    ///
    /// # Panics
    ///
    /// Panics if a state of `trace` is not an abstraction state.
    pub fn block_formulas(&self, arg: &Arg<PredicateAbstractState>, trace: &[StateId]) -> Vec<Formula> {
        trace
            .iter()
            .map(|&id| {
                let state = arg.state(id);
                assert!(
                    state.is_abstraction_state(),
                    "State {} on the refinement trace is not an abstraction state",
                    id
                );
                state.abstraction_formula().block_formula().formula.clone()
            })
            .collect()
    }

    pub fn build_counterexample_trace(&self, formulas: &[Formula]) -> SolverResult<CounterexampleTraceInfo> {
        self.shutdown.check()?;
        debug!("checking counterexample with {} blocks", formulas.len());
        let info = match self.solver.interpolate(formulas)? {
            Interpolation::Unsat(interpolants) => CounterexampleTraceInfo::Spurious { interpolants },
            Interpolation::Sat(model) => CounterexampleTraceInfo::Feasible { model },
        };
        Ok(info)
    }
}
