//! Theorem-prover interface.
//!
//! The analysis talks to its decision procedure only through [`Solver`] and
//! the scoped [`ProverEnvironment`]s it hands out. Dropping a prover discards
//! everything pushed on it, so a failed or interrupted query never leaks
//! assertions into later ones.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::error::SolverError;
use crate::formula::Formula;
use crate::pathformula::SsaMap;

pub type SolverResult<T> = Result<T, SolverError>;

/// Truth values of atoms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    values: BTreeMap<Formula, bool>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, atom: Formula, value: bool) {
        self.values.insert(atom, value);
    }

    pub fn value(&self, atom: &Formula) -> Option<bool> {
        self.values.get(atom).copied()
    }

    /// Evaluate `f`; atoms without a value count as false.
    pub fn evaluate(&self, f: &Formula) -> bool {
        f.eval(&|atom| self.value(atom).unwrap_or(false))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Formula, bool)> {
        self.values.iter().map(|(k, &v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Display for Model {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, (atom, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", atom, value)?;
        }
        Ok(())
    }
}

/// Result of a sequence-interpolation query over `n` formulas.
#[derive(Debug, Clone)]
pub enum Interpolation {
    /// The conjunction is unsatisfiable; `n - 1` interpolants, where the
    /// `i`-th separates the first `i + 1` formulas from the rest.
    Unsat(Vec<Formula>),
    /// The conjunction is satisfiable.
    Sat(Model),
}

/// Receives the partial assignments enumerated by [`ProverEnvironment::all_sat`].
pub trait AllSatCallback {
    /// One satisfying assignment of the important atoms, as `(atom, value)`
    /// literals. Atoms that are not mentioned may take either value.
    fn apply(&mut self, literals: &[(Formula, bool)]);
}

pub trait ProverEnvironment {
    fn push(&mut self, f: Formula);

    fn pop(&mut self);

    /// Number of pushed formulas.
    fn size(&self) -> usize;

    fn is_unsat(&mut self) -> SolverResult<bool>;

    /// A model of the pushed formulas. Fails if they are unsatisfiable.
    fn model(&mut self) -> SolverResult<Model>;

    /// Enumerate all satisfying assignments of the pushed formulas projected
    /// onto the `important` atoms.
    fn all_sat(&mut self, important: &[Formula], callback: &mut dyn AllSatCallback) -> SolverResult<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolverStatistics {
    pub sat_checks: usize,
    pub trivial_sat_checks: usize,
    pub cached_sat_checks: usize,
    pub interpolation_queries: usize,
    pub all_sat_models: usize,
}

pub trait Solver {
    fn new_prover(&self) -> Box<dyn ProverEnvironment + '_>;

    fn is_unsat(&self, f: &Formula) -> SolverResult<bool> {
        let mut prover = self.new_prover();
        prover.push(f.clone());
        prover.is_unsat()
    }

    /// Whether `a` implies `b`.
    fn implies(&self, a: &Formula, b: &Formula) -> SolverResult<bool> {
        self.is_unsat(&Formula::and(a.clone(), Formula::not(b.clone())))
    }

    fn interpolate(&self, formulas: &[Formula]) -> SolverResult<Interpolation>;

    /// Existentially quantify every instantiated variable of `f` whose index
    /// is not the current one in `ssa`.
    fn eliminate_dead_variables(&self, f: &Formula, ssa: &SsaMap) -> SolverResult<Formula>;

    /// Remember that `f` is unsatisfiable.
    fn add_unsatisfiable_formula_to_cache(&self, _f: &Formula) {}

    fn statistics(&self) -> SolverStatistics {
        SolverStatistics::default()
    }
}
