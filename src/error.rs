//! Error types.

use thiserror::Error;

use crate::refinement::Counterexample;

/// Result type for analysis operations.
pub type CpaResult<T> = Result<T, CpaError>;

/// Failures reported by a [`Solver`][crate::solver::Solver] backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// The backend gave up or hit an internal error.
    #[error("Solver failure: {0}")]
    Backend(String),

    /// A shutdown was requested while the solver was working.
    #[error("Solver interrupted")]
    Interrupted,

    /// A model was requested but the last check was not satisfiable.
    #[error("No model available: {0}")]
    NoModel(String),
}

/// Errors found while reconstructing a path through the ARG.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("ARG target path terminates without reaching target state!")]
    NoTarget,

    #[error("ARG branches where there is no AssumeEdge!")]
    NoAssumeEdge,

    #[error("ARG branches with non-complementary AssumeEdges!")]
    NonComplementaryAssumeEdges,

    #[error("ARG branches without direction information!")]
    MissingDirection,

    #[error("ARG splits with more than two branches!")]
    TooManyBranches,

    #[error("ARG and direction information from solver disagree!")]
    DirectionDisagrees,

    #[error("ARG target path reached the wrong target state!")]
    WrongTarget,
}

/// The single recoverable error kind of the analysis.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CpaError {
    #[error(transparent)]
    Solver(SolverError),

    #[error("Analysis interrupted")]
    Interrupted,

    /// Refinement found nothing new on a path that was already refined once.
    #[error("Counterexample could not be ruled out and was found again")]
    RepeatedCounterexample,

    #[error("Malformed path: {0}")]
    MalformedPath(#[from] PathError),

    #[error("Transfer error: {0}")]
    Transfer(String),
}

impl From<SolverError> for CpaError {
    fn from(e: SolverError) -> Self {
        match e {
            SolverError::Interrupted => CpaError::Interrupted,
            other => CpaError::Solver(other),
        }
    }
}

impl From<crate::shutdown::Interrupted> for CpaError {
    fn from(_: crate::shutdown::Interrupted) -> Self {
        CpaError::Interrupted
    }
}

impl From<crate::shutdown::Interrupted> for SolverError {
    fn from(_: crate::shutdown::Interrupted) -> Self {
        SolverError::Interrupted
    }
}

/// Outcome of one refinement attempt.
#[derive(Debug, Clone)]
pub enum RefinementResult {
    /// The counterexample is real.
    Feasible(Counterexample),
    /// The counterexample was ruled out and the ARG was pruned.
    Spurious,
}

impl RefinementResult {
    pub fn is_spurious(&self) -> bool {
        matches!(self, RefinementResult::Spurious)
    }
}

/// Final answer of a CEGAR run.
#[derive(Debug, Clone)]
pub enum Verdict {
    /// No target state is reachable.
    Safe,
    /// A target state is reachable along the given path.
    Unsafe(Counterexample),
}

impl Verdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, Verdict::Safe)
    }
}
