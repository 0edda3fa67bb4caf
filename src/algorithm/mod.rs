//! Exploration and the refinement loop around it.
//!
//! [`CpaAlgorithm`][cpa::CpaAlgorithm] is the plain worklist algorithm over
//! any configurable program analysis. [`CegarAlgorithm`][cegar::CegarAlgorithm]
//! runs it on the predicate analysis wrapped in an ARG and calls the refiner
//! whenever a target state shows up.

pub mod cegar;
pub mod cpa;

pub use cegar::{CegarAlgorithm, CegarOptions, CegarStatistics, PredicateReachedSet};
pub use cpa::{AlgorithmStatus, CpaAlgorithm, CpaAlgorithmOptions, CpaAlgorithmStatistics};
