//! A propositional [`Solver`] on top of the region manager.
//!
//! Every atom (boolean variable or relation application, with its SSA index)
//! becomes one decision variable. Satisfiability is decided by building the
//! decision diagram of the query; interpolants are obtained by projecting
//! prefixes onto the variables they share with the suffix.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap, HashSet};

use log::debug;

use crate::error::SolverError;
use crate::formula::Formula;
use crate::pathformula::SsaMap;
use crate::reference::Region;
use crate::region::RegionManager;
use crate::shutdown::ShutdownNotifier;
use crate::solver::{
    AllSatCallback, Interpolation, Model, ProverEnvironment, Solver, SolverResult, SolverStatistics,
};

#[derive(Debug)]
pub struct BddSolver {
    manager: RegionManager,
    atoms: RefCell<Vec<Formula>>,
    vars: RefCell<HashMap<Formula, u32>>,
    unsat_cache: RefCell<HashSet<Formula>>,
    shutdown: ShutdownNotifier,
    stats: Cell<SolverStatistics>,
}

impl BddSolver {
    pub fn new(shutdown: ShutdownNotifier) -> Self {
        Self {
            manager: RegionManager::default(),
            atoms: RefCell::new(Vec::new()),
            vars: RefCell::new(HashMap::new()),
            unsat_cache: RefCell::new(HashSet::new()),
            shutdown,
            stats: Cell::new(SolverStatistics::default()),
        }
    }

    fn update_stats(&self, f: impl FnOnce(&mut SolverStatistics)) {
        let mut s = self.stats.get();
        f(&mut s);
        self.stats.set(s);
    }

    fn var_of(&self, atom: &Formula) -> u32 {
        if let Some(&v) = self.vars.borrow().get(atom) {
            return v;
        }
        let mut atoms = self.atoms.borrow_mut();
        atoms.push(atom.clone());
        let v = atoms.len() as u32;
        self.vars.borrow_mut().insert(atom.clone(), v);
        v
    }

    fn atom_of(&self, v: u32) -> Formula {
        self.atoms.borrow()[v as usize - 1].clone()
    }

    fn region_of(&self, f: &Formula) -> Region {
        self.manager.from_formula(f, &mut |atom| self.manager.var(self.var_of(atom)))
    }

    fn formula_of(&self, r: Region) -> Formula {
        self.manager.to_formula(r, &|v| self.atom_of(v))
    }

    fn model_of(&self, r: Region) -> SolverResult<Model> {
        let cube = self
            .manager
            .cubes(r)
            .next()
            .ok_or_else(|| SolverError::NoModel("formula is unsatisfiable".into()))?;
        let mut model = Model::new();
        for v in self.manager.support(r) {
            model.assign(self.atom_of(v), false);
        }
        for (v, value) in cube {
            model.assign(self.atom_of(v), value);
        }
        Ok(model)
    }
}

impl Solver for BddSolver {
    fn new_prover(&self) -> Box<dyn ProverEnvironment + '_> {
        Box::new(BddProver {
            solver: self,
            stack: Vec::new(),
        })
    }

    fn is_unsat(&self, f: &Formula) -> SolverResult<bool> {
        if f.is_true() || f.is_false() {
            self.update_stats(|s| s.trivial_sat_checks += 1);
            return Ok(f.is_false());
        }
        if self.unsat_cache.borrow().contains(f) {
            self.update_stats(|s| s.cached_sat_checks += 1);
            return Ok(true);
        }
        self.shutdown.check()?;
        self.update_stats(|s| s.sat_checks += 1);
        let unsat = self.manager.is_zero(self.region_of(f));
        if unsat {
            self.add_unsatisfiable_formula_to_cache(f);
        }
        Ok(unsat)
    }

    fn interpolate(&self, formulas: &[Formula]) -> SolverResult<Interpolation> {
        self.shutdown.check()?;
        self.update_stats(|s| s.interpolation_queries += 1);

        let regions: Vec<Region> = formulas.iter().map(|f| self.region_of(f)).collect();
        let conjunction = self.manager.and_many(regions.iter().copied());
        if !self.manager.is_zero(conjunction) {
            debug!("interpolation query is satisfiable");
            return Ok(Interpolation::Sat(self.model_of(conjunction)?));
        }

        let supports: Vec<BTreeSet<u32>> = regions.iter().map(|&r| self.manager.support(r)).collect();
        let mut interpolants = Vec::with_capacity(formulas.len().saturating_sub(1));
        let mut prefix = self.manager.one();
        for i in 0..formulas.len().saturating_sub(1) {
            self.shutdown.check()?;
            prefix = self.manager.and(prefix, regions[i]);
            let suffix_vars: BTreeSet<u32> = supports[i + 1..].iter().flatten().copied().collect();
            let local: BTreeSet<u32> = self
                .manager
                .support(prefix)
                .into_iter()
                .filter(|v| !suffix_vars.contains(v))
                .collect();
            let itp = self.manager.exists_many(prefix, &local);
            interpolants.push(self.formula_of(itp));
        }
        Ok(Interpolation::Unsat(interpolants))
    }

    fn eliminate_dead_variables(&self, f: &Formula, ssa: &SsaMap) -> SolverResult<Formula> {
        self.shutdown.check()?;
        let r = self.region_of(f);
        let dead: BTreeSet<u32> = self
            .manager
            .support(r)
            .into_iter()
            .filter(|&v| {
                self.atom_of(v)
                    .variables()
                    .iter()
                    .any(|x| matches!(x.index(), Some(i) if i != ssa.get(x.name())))
            })
            .collect();
        Ok(self.formula_of(self.manager.exists_many(r, &dead)))
    }

    fn add_unsatisfiable_formula_to_cache(&self, f: &Formula) {
        self.unsat_cache.borrow_mut().insert(f.clone());
    }

    fn statistics(&self) -> SolverStatistics {
        self.stats.get()
    }
}

struct BddProver<'a> {
    solver: &'a BddSolver,
    // Conjunction of everything pushed up to each level.
    stack: Vec<Region>,
}

impl BddProver<'_> {
    fn current(&self) -> Region {
        self.stack.last().copied().unwrap_or(self.solver.manager.one())
    }
}

impl ProverEnvironment for BddProver<'_> {
    fn push(&mut self, f: Formula) {
        let r = self.solver.region_of(&f);
        let top = self.solver.manager.and(self.current(), r);
        self.stack.push(top);
    }

    fn pop(&mut self) {
        assert!(self.stack.pop().is_some(), "pop on an empty prover stack");
    }

    fn size(&self) -> usize {
        self.stack.len()
    }

    fn is_unsat(&mut self) -> SolverResult<bool> {
        self.solver.shutdown.check()?;
        self.solver.update_stats(|s| s.sat_checks += 1);
        Ok(self.solver.manager.is_zero(self.current()))
    }

    fn model(&mut self) -> SolverResult<Model> {
        self.solver.model_of(self.current())
    }

    fn all_sat(&mut self, important: &[Formula], callback: &mut dyn AllSatCallback) -> SolverResult<()> {
        let manager = &self.solver.manager;
        let important: BTreeSet<u32> = important.iter().map(|a| self.solver.var_of(a)).collect();
        let current = self.current();
        let hidden: BTreeSet<u32> = manager
            .support(current)
            .into_iter()
            .filter(|v| !important.contains(v))
            .collect();
        let projected = manager.exists_many(current, &hidden);
        for cube in manager.cubes(projected) {
            self.solver.shutdown.check()?;
            self.solver.update_stats(|s| s.all_sat_models += 1);
            let literals: Vec<(Formula, bool)> = cube
                .into_iter()
                .map(|(v, value)| (self.solver.atom_of(v), value))
                .collect();
            callback.apply(&literals);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    fn solver() -> BddSolver {
        BddSolver::new(ShutdownNotifier::new())
    }

    #[test]
    fn test_is_unsat() {
        let s = solver();
        let x = Formula::indexed_var("x", 1);
        let y = Formula::indexed_var("y", 1);
        assert!(!s.is_unsat(&Formula::and(x.clone(), y.clone())).unwrap());
        assert!(s.is_unsat(&Formula::and_all([x.clone(), Formula::iff(x.clone(), y.clone()), Formula::not(y.clone())])).unwrap());
        assert!(s.implies(&Formula::and(x.clone(), y.clone()), &x).unwrap());
        assert!(!s.implies(&x, &y).unwrap());
    }

    #[test]
    fn test_unsat_cache_avoids_solver_calls() {
        let s = solver();
        let x = Formula::indexed_var("x", 1);
        let f = Formula::and_all([Formula::or(x.clone(), Formula::var("z")), Formula::not(x.clone()), Formula::not(Formula::var("z"))]);
        assert!(s.is_unsat(&f).unwrap());
        let checks = s.statistics().sat_checks;
        assert!(s.is_unsat(&f).unwrap());
        assert_eq!(s.statistics().sat_checks, checks);
        assert_eq!(s.statistics().cached_sat_checks, 1);
    }

    #[test]
    fn test_prover_push_pop() {
        let s = solver();
        let x = Formula::var("x");
        let mut prover = s.new_prover();
        prover.push(x.clone());
        assert!(!prover.is_unsat().unwrap());
        prover.push(Formula::not(x.clone()));
        assert!(prover.is_unsat().unwrap());
        assert!(prover.model().is_err());
        prover.pop();
        assert!(!prover.is_unsat().unwrap());
        assert_eq!(prover.model().unwrap().value(&x), Some(true));
        assert_eq!(prover.size(), 1);
    }

    #[test]
    fn test_sequence_interpolants() {
        let s = solver();
        let x1 = Formula::indexed_var("x", 1);
        let x2 = Formula::indexed_var("x", 2);
        // x@1 ; x@2 <-> x@1 ; !x@2
        let formulas = [x1.clone(), Formula::iff(x2.clone(), x1.clone()), Formula::not(x2.clone())];
        match s.interpolate(&formulas).unwrap() {
            Interpolation::Unsat(itps) => {
                assert_eq!(itps, vec![x1, x2]);
            }
            Interpolation::Sat(_) => panic!("expected unsat"),
        }
    }

    #[test]
    fn test_interpolation_of_satisfiable_query() {
        let s = solver();
        let x = Formula::indexed_var("x", 1);
        let y = Formula::indexed_var("y", 1);
        match s.interpolate(&[x.clone(), Formula::not(y.clone())]).unwrap() {
            Interpolation::Sat(model) => {
                assert_eq!(model.value(&x), Some(true));
                assert_eq!(model.value(&y), Some(false));
            }
            Interpolation::Unsat(_) => panic!("expected sat"),
        }
    }

    #[test]
    fn test_all_sat_projects_onto_important_atoms() {
        struct Collect(Vec<Vec<(Formula, bool)>>);
        impl AllSatCallback for Collect {
            fn apply(&mut self, literals: &[(Formula, bool)]) {
                self.0.push(literals.to_vec());
            }
        }

        let s = solver();
        let x = Formula::var("x");
        let y = Formula::var("y");
        let z = Formula::var("z");
        let mut prover = s.new_prover();
        prover.push(Formula::and(Formula::iff(x.clone(), z.clone()), Formula::or(y.clone(), z.clone())));
        let mut collect = Collect(Vec::new());
        prover.all_sat(&[x.clone()], &mut collect).unwrap();
        // Both values of x are possible.
        assert_eq!(collect.0.len(), 1);
        assert!(collect.0[0].is_empty());
    }

    #[test]
    fn test_eliminate_dead_variables() {
        let s = solver();
        let mut ssa = SsaMap::default();
        ssa.set("x", 2);
        let f = Formula::and(Formula::indexed_var("x", 1), Formula::iff(Formula::indexed_var("x", 2), Formula::indexed_var("x", 1)));
        let g = s.eliminate_dead_variables(&f, &ssa).unwrap();
        assert_eq!(g, Formula::indexed_var("x", 2));
    }

    #[test]
    fn test_interrupted() {
        let shutdown = ShutdownNotifier::new();
        let s = BddSolver::new(shutdown.clone());
        shutdown.request_shutdown();
        assert_eq!(s.is_unsat(&Formula::var("x")), Err(SolverError::Interrupted));
    }
}
