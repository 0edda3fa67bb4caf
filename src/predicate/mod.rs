//! Predicate abstraction.
//!
//! Program states are tracked as a boolean combination of predicates (the
//! abstraction, kept as a [`Region`][crate::reference::Region]) together with
//! the exact path formula of the edges taken since the last block end. When a
//! block ends, the path formula is folded into a fresh abstraction over the
//! predicates of the current precision.
//!
//! - [`manager`]: the mapping between predicates, atoms and region variables.
//! - [`abstraction`]: computing, caching and comparing abstractions.
//! - [`cpa`]: the predicate analysis with its operators.

pub mod abstraction;
pub mod cpa;
pub mod manager;
pub mod precision;
pub mod provider;
pub mod state;
pub mod storage;

pub use abstraction::{AbstractionFormula, AbstractionOptions, AbstractionType, PredicateAbstractionManager};
pub use cpa::{BlockOptions, PredicateCpa, PredicateCpaOptions, PredicateMergeMode};
pub use manager::{AbstractionManager, AbstractionPredicate};
pub use precision::PredicatePrecision;
pub use state::PredicateAbstractState;
