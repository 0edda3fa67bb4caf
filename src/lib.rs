//! # cegar-rs: Predicate Abstraction with Lazy Refinement
//!
//! **`cegar-rs`** checks whether an error location of a boolean program is reachable.
//! It explores the program as an **abstract reachability graph (ARG)** over predicate
//! abstractions and refines the abstraction whenever it runs into an error path that
//! the concrete program cannot take (counterexample-guided abstraction refinement).
//!
//! ## How it works
//!
//! - The program is a control-flow automaton ([`Cfa`][crate::cfa::Cfa]) built with [`CfaBuilder`][crate::cfa::CfaBuilder].
//! - The analysis is a stack of **configurable program analyses**: the predicate analysis computes
//!   abstractions at block ends, the ARG layer records the graph around it.
//! - When exploration reaches an error location, the path to it is checked with sequence
//!   interpolation. A feasible path is reported. An infeasible one yields new predicates,
//!   and the part of the ARG explored with the old precision is removed and re-explored.
//! - Abstractions are **decision-diagram regions** over one variable per predicate, kept by the
//!   crate's own [`RegionManager`][crate::region::RegionManager].
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use cegar_rs::algorithm::{CegarAlgorithm, CegarOptions};
//! use cegar_rs::bdd_solver::BddSolver;
//! use cegar_rs::cfa::CfaBuilder;
//! use cegar_rs::formula::Formula;
//! use cegar_rs::shutdown::ShutdownNotifier;
//!
//! // x = true; if (x) {} else { ERROR }
//! let mut b = CfaBuilder::new("main");
//! let n0 = b.entry();
//! let n1 = b.node();
//! let n2 = b.node();
//! let n3 = b.node();
//! b.assign(n0, n1, "x", Formula::mk_true());
//! b.branch(n1, Formula::var("x"), n2, n3);
//! b.error(n3);
//!
//! let shutdown = ShutdownNotifier::new();
//! let solver = Rc::new(BddSolver::new(shutdown.clone()));
//! let (mut cegar, mut reached) =
//!     CegarAlgorithm::predicate_analysis(Rc::new(b.build()), solver, &CegarOptions::default(), shutdown).unwrap();
//!
//! // The only error path is spurious.
//! assert!(cegar.run(&mut reached).unwrap().is_safe());
//! ```
//!
//! ## Core Components
//!
//! - **[`arg`]**: The ARG arena, its analysis wrappers, reached sets and path reconstruction.
//! - **[`predicate`]**: Predicate abstraction and the predicate analysis.
//! - **[`refinement`]**: Interpolation-based refinement and ARG pruning.
//! - **[`algorithm`]**: The worklist algorithm and the CEGAR loop.
//! - **[`region`]**, **[`formula`]**, **[`solver`]**: The symbolic layer underneath.

pub mod algorithm;
pub mod arg;
pub mod bdd_solver;
pub mod cache;
pub mod cfa;
pub mod cpa;
pub mod error;
pub mod formula;
pub mod pathformula;
pub mod predicate;
pub mod reference;
pub mod refinement;
pub mod region;
pub mod shutdown;
pub mod solver;
