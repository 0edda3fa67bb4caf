//! Predicate abstraction of path formulas.
//!
//! An abstraction is the strongest boolean combination of predicates implied
//! by the previous abstraction and the path formula of the current block. How
//! it is computed depends on [`AbstractionType`]:
//!
//! - cartesian: every predicate is decided on its own with two implication
//!   checks, the result is a conjunction of literals;
//! - boolean: all satisfying assignments of the predicates are enumerated,
//!   the result is an arbitrary boolean combination;
//! - combined: cartesian first, boolean for the predicates left undecided;
//! - elimination: no predicates at all, the variables that are dead at the
//!   end of the block are quantified away.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::{Display, Formatter};
use std::rc::Rc;

use log::{debug, warn};

use crate::cfa::NodeId;
use crate::formula::Formula;
use crate::pathformula::{PathFormula, PathFormulaManager, SsaMap};
use crate::predicate::manager::{AbstractionManager, AbstractionPredicate};
use crate::predicate::provider::InvariantSupplier;
use crate::predicate::storage::AbstractionStorage;
use crate::reference::Region;
use crate::region::RegionBuilder;
use crate::shutdown::ShutdownNotifier;
use crate::solver::{AllSatCallback, ProverEnvironment, Solver, SolverResult};

/// Result of an abstraction computation.
#[derive(Debug, Clone)]
pub struct AbstractionFormula {
    id: usize,
    region: Region,
    /// Uninstantiated formula of the region.
    formula: Formula,
    /// `formula` with the SSA indices of the end of the block.
    instantiated: Formula,
    /// Path formula of the block this abstraction was computed for.
    block_formula: PathFormula,
    /// Ids of stored abstractions this one was taken from.
    reused_ids: BTreeSet<usize>,
}

impl AbstractionFormula {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn as_formula(&self) -> &Formula {
        &self.formula
    }

    pub fn instantiated_formula(&self) -> &Formula {
        &self.instantiated
    }

    pub fn block_formula(&self) -> &PathFormula {
        &self.block_formula
    }

    pub fn reused_ids(&self) -> &BTreeSet<usize> {
        &self.reused_ids
    }

    pub fn is_reused_from_storage(&self) -> bool {
        !self.reused_ids.is_empty()
    }

    pub fn is_true(&self) -> bool {
        self.formula.is_true()
    }

    pub fn is_false(&self) -> bool {
        self.formula.is_false()
    }
}

impl Display for AbstractionFormula {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ABS{}", self.id)?;
        if self.is_true() {
            write!(f, ": true")?;
        } else if self.is_false() {
            write!(f, ": false")?;
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum AbstractionType {
    Cartesian,
    #[default]
    Boolean,
    Combined,
    Elimination,
}

#[derive(Debug, Clone)]
pub struct AbstractionOptions {
    pub abstraction_type: AbstractionType,
    /// Cache abstractions by (formula, predicates), and remember unsatisfiable formulas.
    pub use_cache: bool,
    /// Decide predicates over variables untouched by the block from the
    /// previous abstraction alone.
    pub identify_trivial_predicates: bool,
    /// How many levels of the storage tree are scanned when looking for a
    /// reusable abstraction.
    pub max_abstraction_reuse_prescan: usize,
}

impl Default for AbstractionOptions {
    fn default() -> Self {
        Self {
            abstraction_type: AbstractionType::default(),
            use_cache: true,
            identify_trivial_predicates: false,
            max_abstraction_reuse_prescan: 1,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct AbstractionStatistics {
    pub num_calls: usize,
    /// Abstractions that were `true` without asking the solver.
    pub num_symbolic: usize,
    pub num_cache_hits: usize,
    pub num_unsat_cache_hits: usize,
    pub num_reuses: usize,
    pub num_sat_checks: usize,
    pub num_total_predicates: usize,
    pub max_predicates: usize,
    pub num_irrelevant_predicates: usize,
    pub num_trivial_predicates: usize,
    pub num_invariant_predicates: usize,
    pub num_cartesian_cache_hits: usize,
    pub num_boolean_predicates: usize,
    pub num_all_sat_models: usize,
    pub max_all_sat_models: usize,
    pub num_false: usize,
}

/// Three-valued outcome of deciding one predicate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum PredicateValue {
    False,
    Unknown,
    True,
}

pub struct PredicateAbstractionManager {
    amgr: Rc<AbstractionManager>,
    solver: Rc<dyn Solver>,
    pfmgr: PathFormulaManager,
    options: AbstractionOptions,
    shutdown: ShutdownNotifier,
    storage: Option<Rc<AbstractionStorage>>,
    invariants: Option<Rc<dyn InvariantSupplier>>,

    abstraction_cache: RefCell<HashMap<(Formula, BTreeSet<AbstractionPredicate>), AbstractionFormula>>,
    unsat_cache: RefCell<HashSet<Formula>>,
    cartesian_cache: RefCell<HashMap<(Formula, AbstractionPredicate), PredicateValue>>,

    reuse_disabled: Cell<bool>,
    warned_non_conjunctive: Cell<bool>,
    next_id: Cell<usize>,
    stats: Cell<AbstractionStatistics>,
}

impl PredicateAbstractionManager {
    pub fn new(
        amgr: Rc<AbstractionManager>,
        solver: Rc<dyn Solver>,
        options: AbstractionOptions,
        shutdown: ShutdownNotifier,
    ) -> Self {
        Self {
            amgr,
            solver,
            pfmgr: PathFormulaManager::new(),
            options,
            shutdown,
            storage: None,
            invariants: None,
            abstraction_cache: RefCell::new(HashMap::new()),
            unsat_cache: RefCell::new(HashSet::new()),
            cartesian_cache: RefCell::new(HashMap::new()),
            reuse_disabled: Cell::new(false),
            warned_non_conjunctive: Cell::new(false),
            next_id: Cell::new(0),
            stats: Cell::new(AbstractionStatistics::default()),
        }
    }

    /// Try to take abstractions from `storage` before computing them.
    pub fn with_storage(mut self, storage: Rc<AbstractionStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_invariants(mut self, invariants: Rc<dyn InvariantSupplier>) -> Self {
        self.invariants = Some(invariants);
        self
    }

    pub fn abstraction_manager(&self) -> &Rc<AbstractionManager> {
        &self.amgr
    }

    pub fn solver(&self) -> &Rc<dyn Solver> {
        &self.solver
    }

    pub fn path_formula_manager(&self) -> &PathFormulaManager {
        &self.pfmgr
    }

    pub fn options(&self) -> &AbstractionOptions {
        &self.options
    }

    pub fn statistics(&self) -> AbstractionStatistics {
        self.stats.get()
    }

    /// Whether reuse was switched off after an ambiguous storage lookup.
    pub fn is_reuse_disabled(&self) -> bool {
        self.reuse_disabled.get()
    }

    fn update_stats(&self, f: impl FnOnce(&mut AbstractionStatistics)) {
        let mut s = self.stats.get();
        f(&mut s);
        self.stats.set(s);
    }

    fn fresh_id(&self) -> usize {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    /// Abstract the conjunction of `old` and `path_formula` with `predicates`.
    ///
    /// The result is expressed over the SSA indices at the end of `path_formula`.
    pub fn build_abstraction(
        &self,
        location: NodeId,
        old: &AbstractionFormula,
        path_formula: &PathFormula,
        predicates: &BTreeSet<AbstractionPredicate>,
    ) -> SolverResult<AbstractionFormula> {
        self.update_stats(|s| s.num_calls += 1);
        debug!(
            "computing abstraction at {} with {} predicates",
            location,
            predicates.len()
        );

        let f = Formula::and(old.instantiated_formula().clone(), path_formula.formula.clone());
        let ssa = &path_formula.ssa;

        if let Some(storage) = self.storage.as_ref().filter(|_| !self.reuse_disabled.get()) {
            if let Some(reused) = self.reuse_abstraction(storage, old, path_formula, &f, location)? {
                return Ok(reused);
            }
        }

        let elimination = self.options.abstraction_type == AbstractionType::Elimination;
        if predicates.is_empty() && !elimination {
            self.update_stats(|s| s.num_symbolic += 1);
            return Ok(self.make_true_abstraction(Some(path_formula)));
        }

        let mut remaining = self.relevant_predicates(predicates, &f, ssa);

        let key = (f.clone(), remaining.clone());
        if self.options.use_cache {
            let cached = self.abstraction_cache.borrow().get(&key).cloned();
            if let Some(cached) = cached {
                self.update_stats(|s| s.num_cache_hits += 1);
                return Ok(AbstractionFormula {
                    id: self.fresh_id(),
                    region: cached.region,
                    instantiated: cached.formula.instantiate(ssa),
                    formula: cached.formula,
                    block_formula: path_formula.clone(),
                    reused_ids: cached.reused_ids,
                });
            }
            let unsat_cache = self.unsat_cache.borrow();
            if unsat_cache.contains(&path_formula.formula) || unsat_cache.contains(&f) {
                drop(unsat_cache);
                self.update_stats(|s| s.num_unsat_cache_hits += 1);
                return Ok(self.make_false_abstraction(path_formula));
            }
        }

        let irrelevant = predicates.len() - remaining.len();
        self.update_stats(|s| {
            s.num_total_predicates += predicates.len();
            s.max_predicates = s.max_predicates.max(predicates.len());
            s.num_irrelevant_predicates += irrelevant;
        });

        let rmgr = self.amgr.region_manager();
        let mut abs = rmgr.one();

        if self.options.identify_trivial_predicates {
            abs = self.handle_trivial_predicates(&mut remaining, old, path_formula);
        }

        if let Some(invariant) = self
            .invariants
            .as_ref()
            .and_then(|i| i.region_invariant(location, &self.amgr))
        {
            abs = rmgr.and(abs, invariant);
            let known = self.amgr.extract_predicates(invariant);
            let before = remaining.len();
            remaining.retain(|p| !known.contains(p));
            let removed = before - remaining.len();
            self.update_stats(|s| s.num_invariant_predicates += removed);
        }

        {
            let mut prover = self.solver.new_prover();
            prover.push(f.clone());

            if remaining.is_empty() && !elimination {
                self.update_stats(|s| s.num_sat_checks += 1);
                if prover.is_unsat()? {
                    abs = rmgr.zero();
                }
            } else if elimination {
                let eliminated = self.solver.eliminate_dead_variables(&f, ssa)?.uninstantiate();
                abs = rmgr.and(abs, self.amgr.convert_formula_to_region(&eliminated));
            } else {
                let kind = self.options.abstraction_type;
                if kind != AbstractionType::Boolean {
                    let cartesian = self.build_cartesian_abstraction(&f, ssa, &mut *prover, &mut remaining)?;
                    abs = rmgr.and(abs, cartesian);
                }
                if kind != AbstractionType::Cartesian && !remaining.is_empty() {
                    let n = remaining.len();
                    self.update_stats(|s| s.num_boolean_predicates += n);
                    let boolean = self.build_boolean_abstraction(ssa, &mut *prover, &mut remaining)?;
                    abs = rmgr.and(abs, boolean);
                }
            }
        }

        let result = self.make_abstraction_formula(abs, ssa, path_formula, BTreeSet::new());
        if result.is_false() {
            self.update_stats(|s| s.num_false += 1);
        }
        if self.options.use_cache {
            self.abstraction_cache.borrow_mut().insert(key, result.clone());
            if result.is_false() {
                self.unsat_cache.borrow_mut().insert(f);
            }
        }
        Ok(result)
    }

    /// Abstract a single instantiated formula `f`, taking the SSA indices
    /// from `block_formula`. The result records `block_formula` as its block.
    pub fn build_abstraction_of(
        &self,
        location: NodeId,
        f: &Formula,
        block_formula: &PathFormula,
        predicates: &BTreeSet<AbstractionPredicate>,
    ) -> SolverResult<AbstractionFormula> {
        let pf = PathFormula {
            formula: f.clone(),
            ssa: block_formula.ssa.clone(),
            length: 0,
        };
        let empty = self.make_true_abstraction(None);
        let mut result = self.build_abstraction(location, &empty, &pf, predicates)?;
        result.block_formula = block_formula.clone();
        Ok(result)
    }

    /// The abstraction whose region is exactly that of the uninstantiated `f`.
    pub fn region_abstraction(&self, f: &Formula, block_formula: &PathFormula) -> AbstractionFormula {
        let region = self.amgr.convert_formula_to_region(f);
        self.make_abstraction_formula(region, &block_formula.ssa, block_formula, BTreeSet::new())
    }

    fn relevant_predicates(
        &self,
        predicates: &BTreeSet<AbstractionPredicate>,
        f: &Formula,
        ssa: &SsaMap,
    ) -> BTreeSet<AbstractionPredicate> {
        let variables = f.variable_names();
        predicates
            .iter()
            .filter(|p| {
                if p.symbolic_atom().is_false() {
                    return false;
                }
                let own = p.symbolic_atom().instantiate(ssa).variable_names();
                let relevant = own.is_empty() || !own.is_disjoint(&variables);
                if !relevant {
                    debug!("predicate {} is irrelevant", p);
                }
                relevant
            })
            .cloned()
            .collect()
    }

    /// Decide predicates whose variables the block does not touch from the
    /// previous abstraction. Decided predicates leave `remaining`.
    fn handle_trivial_predicates(
        &self,
        remaining: &mut BTreeSet<AbstractionPredicate>,
        old: &AbstractionFormula,
        block: &PathFormula,
    ) -> Region {
        let rmgr = self.amgr.region_manager();
        let block_variables = block.formula.variable_names();
        let mut region = rmgr.one();
        remaining.retain(|p| {
            let own = p.symbolic_atom().instantiate(&block.ssa).variable_names();
            if !own.is_disjoint(&block_variables) {
                return true;
            }
            let v = p.abstract_variable();
            let literal = if self.amgr.entails(old.region(), v) {
                v
            } else if self.amgr.entails(old.region(), rmgr.not(v)) {
                rmgr.not(v)
            } else {
                return true;
            };
            region = rmgr.and(region, literal);
            self.update_stats(|s| s.num_trivial_predicates += 1);
            false
        });
        debug_assert!(self.amgr.entails(old.region(), region));
        region
    }

    fn build_cartesian_abstraction(
        &self,
        f: &Formula,
        ssa: &SsaMap,
        prover: &mut dyn ProverEnvironment,
        remaining: &mut BTreeSet<AbstractionPredicate>,
    ) -> SolverResult<Region> {
        let rmgr = self.amgr.region_manager();
        self.update_stats(|s| s.num_sat_checks += 1);
        if prover.is_unsat()? {
            return Ok(rmgr.zero());
        }
        if !self.warned_non_conjunctive.get() && !f.is_purely_conjunctive() {
            warn!("Using cartesian abstraction when formulas contain disjunctions may be imprecise");
            self.warned_non_conjunctive.set(true);
        }

        let mut abs = rmgr.one();
        let mut decided = Vec::new();
        for p in remaining.iter() {
            self.shutdown.check()?;
            let key = (f.clone(), p.clone());
            let cached = if self.options.use_cache {
                self.cartesian_cache.borrow().get(&key).copied()
            } else {
                None
            };
            let value = match cached {
                Some(v) => {
                    self.update_stats(|s| s.num_cartesian_cache_hits += 1);
                    v
                }
                None => {
                    let value = decide_predicate(prover, &p.symbolic_atom().instantiate(ssa))?;
                    if self.options.use_cache {
                        self.cartesian_cache.borrow_mut().insert(key, value);
                    }
                    value
                }
            };
            let v = p.abstract_variable();
            match value {
                PredicateValue::True => abs = rmgr.and(abs, v),
                PredicateValue::False => abs = rmgr.and(abs, rmgr.not(v)),
                PredicateValue::Unknown => continue,
            }
            decided.push(p.clone());
        }
        for p in decided {
            remaining.remove(&p);
        }
        Ok(abs)
    }

    fn build_boolean_abstraction(
        &self,
        ssa: &SsaMap,
        prover: &mut dyn ProverEnvironment,
        remaining: &mut BTreeSet<AbstractionPredicate>,
    ) -> SolverResult<Region> {
        let mut definitions = Vec::with_capacity(remaining.len());
        let mut important = Vec::with_capacity(remaining.len());
        for p in remaining.iter() {
            assert!(!p.symbolic_atom().is_false());
            definitions.push(Formula::iff(
                p.symbolic_variable().clone(),
                p.symbolic_atom().instantiate(ssa),
            ));
            important.push(p.symbolic_variable().clone());
        }
        prover.push(Formula::and_all(definitions));

        let mut callback = RegionCollector {
            amgr: &self.amgr,
            builder: self.amgr.region_manager().builder(),
            models: 0,
        };
        prover.all_sat(&important, &mut callback)?;
        prover.pop();

        let models = callback.models;
        self.update_stats(|s| {
            s.num_all_sat_models += models;
            s.max_all_sat_models = s.max_all_sat_models.max(models);
        });
        remaining.clear();
        Ok(callback.builder.result())
    }

    /// Look for a stored successor of the abstractions `old` was taken from
    /// that is implied by `f`.
    fn reuse_abstraction(
        &self,
        storage: &AbstractionStorage,
        old: &AbstractionFormula,
        path_formula: &PathFormula,
        f: &Formula,
        location: NodeId,
    ) -> SolverResult<Option<AbstractionFormula>> {
        let mut prover = self.solver.new_prover();
        prover.push(f.clone());

        let mut queue: VecDeque<(usize, usize)> = old.reused_ids().iter().map(|&id| (id, 0)).collect();
        if queue.is_empty() {
            queue.extend(storage.root_id().map(|root| (root, 0)));
        }

        while let Some((based_on, level)) = queue.pop_front() {
            self.shutdown.check()?;
            if level > self.options.max_abstraction_reuse_prescan {
                continue;
            }

            let mut candidates = Vec::new();
            for stored in storage.successors(based_on) {
                queue.push_back((stored.id(), level + 1));
                if stored.formula().is_true() {
                    continue;
                }
                if stored.location().is_some_and(|l| l != location) {
                    continue;
                }
                candidates.push(stored);
            }

            if candidates.len() > 1 {
                warn!(
                    "Too many abstraction candidates on location {} for abstraction {}. Disabling abstraction reuse!",
                    location, based_on
                );
                self.reuse_disabled.set(true);
                queue.clear();
                continue;
            }
            let Some(candidate) = candidates.pop() else {
                continue;
            };

            storage.mark_reused(candidate.id());
            let reuse_formula = candidate.formula().clone();
            let instantiated = reuse_formula.instantiate(&path_formula.ssa);

            prover.push(Formula::not(instantiated.clone()));
            let implied = prover.is_unsat();
            prover.pop();
            if implied? {
                debug!("reusing stored abstraction {} at {}", candidate.id(), location);
                self.update_stats(|s| s.num_reuses += 1);
                return Ok(Some(AbstractionFormula {
                    id: self.fresh_id(),
                    region: self.amgr.convert_formula_to_region(&reuse_formula),
                    formula: reuse_formula,
                    instantiated,
                    block_formula: path_formula.clone(),
                    reused_ids: BTreeSet::from([candidate.id()]),
                }));
            }
        }
        Ok(None)
    }

    fn make_abstraction_formula(
        &self,
        region: Region,
        ssa: &SsaMap,
        block_formula: &PathFormula,
        reused_ids: BTreeSet<usize>,
    ) -> AbstractionFormula {
        let formula = self.amgr.convert_region_to_formula(region);
        AbstractionFormula {
            id: self.fresh_id(),
            region,
            instantiated: formula.instantiate(ssa),
            formula,
            block_formula: block_formula.clone(),
            reused_ids,
        }
    }

    fn make_false_abstraction(&self, block_formula: &PathFormula) -> AbstractionFormula {
        AbstractionFormula {
            id: self.fresh_id(),
            region: self.amgr.region_manager().zero(),
            formula: Formula::mk_false(),
            instantiated: Formula::mk_false(),
            block_formula: block_formula.clone(),
            reused_ids: BTreeSet::new(),
        }
    }

    /// The abstraction `true`. Without a block it records an empty one.
    pub fn make_true_abstraction(&self, previous_block: Option<&PathFormula>) -> AbstractionFormula {
        AbstractionFormula {
            id: self.fresh_id(),
            region: self.amgr.region_manager().one(),
            formula: Formula::mk_true(),
            instantiated: Formula::mk_true(),
            block_formula: previous_block.cloned().unwrap_or_else(|| self.pfmgr.make_empty()),
            reused_ids: BTreeSet::new(),
        }
    }

    /// Conjunction of two abstractions of the same block.
    pub fn make_and(&self, a1: &AbstractionFormula, a2: &AbstractionFormula) -> AbstractionFormula {
        assert_eq!(
            a1.block_formula, a2.block_formula,
            "Only abstractions of the same block can be conjoined"
        );
        let region = self.amgr.region_manager().and(a1.region, a2.region);
        AbstractionFormula {
            id: self.fresh_id(),
            region,
            formula: Formula::and(a1.formula.clone(), a2.formula.clone()),
            instantiated: Formula::and(a1.instantiated.clone(), a2.instantiated.clone()),
            block_formula: a1.block_formula.clone(),
            reused_ids: BTreeSet::new(),
        }
    }

    /// Whether `a1` implies `a2`.
    pub fn check_coverage(&self, a1: &AbstractionFormula, a2: &AbstractionFormula) -> bool {
        self.amgr.entails(a1.region, a2.region)
    }

    /// Whether `a1` together with `p1` implies `a2`, instantiated at the end of `p1`.
    pub fn check_coverage_with(
        &self,
        a1: &AbstractionFormula,
        p1: &PathFormula,
        a2: &AbstractionFormula,
    ) -> SolverResult<bool> {
        let lhs = Formula::and(a1.instantiated.clone(), p1.formula.clone());
        let rhs = a2.formula.instantiate(&p1.ssa);
        self.solver.implies(&lhs, &rhs)
    }

    /// Whether every path described by `p1` is also described by `p2`.
    ///
    /// Only decided when no variable is further ahead in `p1` than in `p2`;
    /// `p1` is then padded to the numbering of `p2`.
    pub fn check_path_coverage(&self, p1: &PathFormula, p2: &PathFormula) -> SolverResult<bool> {
        if p1.formula == p2.formula && p1.ssa == p2.ssa {
            return Ok(true);
        }
        if p1.ssa.iter().any(|(name, index)| index > p2.ssa.get(name)) {
            return Ok(false);
        }
        let padded = self.pfmgr.pad_to(p1, &p2.ssa);
        self.solver.implies(&padded, &p2.formula)
    }

    /// Whether the conjunction of `abstraction` and `path_formula` is unsatisfiable.
    pub fn unsat(&self, abstraction: &AbstractionFormula, path_formula: &PathFormula) -> SolverResult<bool> {
        let f = Formula::and(abstraction.instantiated.clone(), path_formula.formula.clone());
        self.solver.is_unsat(&f)
    }

    /// Quantify the variables of `remove` out of `old`.
    pub fn reduce<'a>(
        &self,
        old: &AbstractionFormula,
        remove: impl IntoIterator<Item = &'a AbstractionPredicate>,
        ssa: &SsaMap,
    ) -> AbstractionFormula {
        let rmgr = self.amgr.region_manager();
        let vars: BTreeSet<u32> = remove
            .into_iter()
            .map(|p| rmgr.variable(p.abstract_variable()))
            .collect();
        let region = rmgr.exists_many(old.region, &vars);
        self.make_abstraction_formula(region, ssa, &old.block_formula, BTreeSet::new())
    }

    /// Rebuild a full abstraction from a reduced one: the parts of `source`
    /// that do not depend on `relevant` are added back.
    pub fn expand<'a>(
        &self,
        reduced: Region,
        source: Region,
        relevant: impl IntoIterator<Item = &'a AbstractionPredicate>,
        ssa: &SsaMap,
        block_formula: &PathFormula,
    ) -> AbstractionFormula {
        let rmgr = self.amgr.region_manager();
        let vars: BTreeSet<u32> = relevant
            .into_iter()
            .map(|p| rmgr.variable(p.abstract_variable()))
            .collect();
        let irrelevant_part = rmgr.exists_many(source, &vars);
        let region = rmgr.and(reduced, irrelevant_part);
        self.make_abstraction_formula(region, ssa, block_formula, BTreeSet::new())
    }

    /// One predicate per atom of `f`, uninstantiated. The atoms of `false`
    /// yield the false predicate.
    pub fn predicates_for_atoms_of(&self, f: &Formula) -> Vec<AbstractionPredicate> {
        if f.is_false() {
            return vec![self.amgr.make_false_predicate()];
        }
        f.atoms()
            .into_iter()
            .map(|atom| self.amgr.make_predicate(&atom.uninstantiate()))
            .collect()
    }

    /// `f` as a single predicate.
    ///
    /// # Panics
    ///
    /// Panics if `f` is `true`.
    pub fn predicate_for(&self, f: &Formula) -> AbstractionPredicate {
        assert!(!f.is_true(), "Predicate true is useless");
        self.amgr.make_predicate(&f.uninstantiate())
    }

    pub fn make_false_predicate(&self) -> AbstractionPredicate {
        self.amgr.make_false_predicate()
    }

    pub fn extract_predicates(&self, region: Region) -> BTreeSet<AbstractionPredicate> {
        self.amgr.extract_predicates(region)
    }
}

/// Decide `predicate` under the formula already on the prover stack.
fn decide_predicate(prover: &mut dyn ProverEnvironment, predicate: &Formula) -> SolverResult<PredicateValue> {
    prover.push(Formula::not(predicate.clone()));
    let is_true = prover.is_unsat();
    prover.pop();
    if is_true? {
        return Ok(PredicateValue::True);
    }
    prover.push(predicate.clone());
    let is_false = prover.is_unsat();
    prover.pop();
    if is_false? {
        return Ok(PredicateValue::False);
    }
    Ok(PredicateValue::Unknown)
}

/// Turns enumerated models over symbolic variables into a region.
struct RegionCollector<'a> {
    amgr: &'a AbstractionManager,
    builder: RegionBuilder<'a>,
    models: usize,
}

impl AllSatCallback for RegionCollector<'_> {
    fn apply(&mut self, literals: &[(Formula, bool)]) {
        self.builder.start_new_conjunction();
        for (variable, value) in literals {
            let Some(p) = self.amgr.predicate_of_symbolic_variable(variable) else {
                continue;
            };
            if *value {
                self.builder.add_positive(p.abstract_variable());
            } else {
                self.builder.add_negative(p.abstract_variable());
            }
        }
        self.builder.finish_conjunction();
        self.models += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::bdd_solver::BddSolver;
    use crate::solver::Solver;

    fn manager(options: AbstractionOptions) -> PredicateAbstractionManager {
        let solver: Rc<dyn Solver> = Rc::new(BddSolver::new(ShutdownNotifier::new()));
        PredicateAbstractionManager::new(
            Rc::new(AbstractionManager::default()),
            solver,
            options,
            ShutdownNotifier::new(),
        )
    }

    fn with_type(abstraction_type: AbstractionType) -> AbstractionOptions {
        AbstractionOptions {
            abstraction_type,
            ..AbstractionOptions::default()
        }
    }

    /// x@2 <-> true, y untouched.
    fn block() -> PathFormula {
        let mut ssa = SsaMap::default();
        ssa.set("x", 2);
        PathFormula {
            formula: Formula::iff(Formula::indexed_var("x", 2), Formula::mk_true()),
            ssa,
            length: 1,
        }
    }

    #[test]
    fn test_empty_precision_is_symbolic() {
        let pamgr = manager(AbstractionOptions::default());
        let old = pamgr.make_true_abstraction(None);
        let abs = pamgr.build_abstraction(NodeId(1), &old, &block(), &BTreeSet::new()).unwrap();
        assert!(abs.is_true());
        assert_eq!(abs.block_formula(), &block());
        assert_eq!(pamgr.statistics().num_symbolic, 1);
        assert_eq!(pamgr.solver().statistics().sat_checks, 0);
    }

    #[test]
    fn test_boolean_abstraction() {
        let pamgr = manager(with_type(AbstractionType::Boolean));
        let amgr = pamgr.abstraction_manager().clone();
        let x = amgr.make_predicate(&Formula::var("x"));
        let y = amgr.make_predicate(&Formula::var("y"));
        let old = pamgr.make_true_abstraction(None);

        let abs = pamgr
            .build_abstraction(NodeId(1), &old, &block(), &BTreeSet::from([x.clone(), y]))
            .unwrap();
        // y does not occur in the block and is irrelevant.
        assert_eq!(abs.as_formula(), &Formula::var("x"));
        assert_eq!(abs.instantiated_formula(), &Formula::indexed_var("x", 2));
        assert_eq!(abs.to_string(), format!("ABS{}", abs.id()));
        assert_eq!(pamgr.statistics().num_irrelevant_predicates, 1);
        assert!(pamgr.statistics().num_all_sat_models >= 1);
    }

    #[test]
    fn test_boolean_abstraction_keeps_disjunctions() {
        let pamgr = manager(with_type(AbstractionType::Boolean));
        let amgr = pamgr.abstraction_manager().clone();
        let x = amgr.make_predicate(&Formula::var("x"));
        let y = amgr.make_predicate(&Formula::var("y"));
        let pf = PathFormula {
            formula: Formula::or(Formula::indexed_var("x", 1), Formula::indexed_var("y", 1)),
            ssa: SsaMap::default(),
            length: 1,
        };
        let old = pamgr.make_true_abstraction(None);
        let abs = pamgr
            .build_abstraction(NodeId(1), &old, &pf, &BTreeSet::from([x.clone(), y.clone()]))
            .unwrap();
        let rmgr = amgr.region_manager();
        assert_eq!(abs.region(), rmgr.or(x.abstract_variable(), y.abstract_variable()));

        // Cartesian abstraction can only say true here.
        let cartesian = manager(with_type(AbstractionType::Cartesian));
        let amgr = cartesian.abstraction_manager().clone();
        let preds = BTreeSet::from([amgr.make_predicate(&Formula::var("x")), amgr.make_predicate(&Formula::var("y"))]);
        let old = cartesian.make_true_abstraction(None);
        let abs = cartesian.build_abstraction(NodeId(1), &old, &pf, &preds).unwrap();
        assert!(abs.is_true());
    }

    #[test]
    fn test_cartesian_abstraction() {
        let pamgr = manager(with_type(AbstractionType::Cartesian));
        let amgr = pamgr.abstraction_manager().clone();
        let x = amgr.make_predicate(&Formula::var("x"));
        let y = amgr.make_predicate(&Formula::var("y"));
        let pf = PathFormula {
            formula: Formula::and(Formula::indexed_var("x", 1), Formula::not(Formula::indexed_var("y", 1))),
            ssa: SsaMap::default(),
            length: 1,
        };
        let old = pamgr.make_true_abstraction(None);
        let abs = pamgr
            .build_abstraction(NodeId(1), &old, &pf, &BTreeSet::from([x.clone(), y.clone()]))
            .unwrap();
        let rmgr = amgr.region_manager();
        assert_eq!(
            abs.region(),
            rmgr.and(x.abstract_variable(), rmgr.not(y.abstract_variable()))
        );
    }

    #[test]
    fn test_cartesian_cache() {
        let options = AbstractionOptions {
            abstraction_type: AbstractionType::Combined,
            ..AbstractionOptions::default()
        };
        let pamgr = manager(options);
        let amgr = pamgr.abstraction_manager().clone();
        let x = amgr.make_predicate(&Formula::var("x"));
        let pf = PathFormula {
            formula: Formula::and(Formula::indexed_var("x", 1), Formula::indexed_var("y", 1)),
            ssa: SsaMap::default(),
            length: 1,
        };
        let old = pamgr.make_true_abstraction(None);
        let preds = BTreeSet::from([x.clone()]);
        let first = pamgr.build_abstraction(NodeId(1), &old, &pf, &preds).unwrap();
        assert_eq!(first.region(), x.abstract_variable());

        // Same formula, other predicate set: the answer for x comes from the cache.
        let y = amgr.make_predicate(&Formula::var("y"));
        let second = pamgr
            .build_abstraction(NodeId(1), &old, &pf, &BTreeSet::from([x.clone(), y.clone()]))
            .unwrap();
        let rmgr = amgr.region_manager();
        assert_eq!(second.region(), rmgr.and(x.abstract_variable(), y.abstract_variable()));
        assert_eq!(pamgr.statistics().num_cartesian_cache_hits, 1);
    }

    #[test]
    fn test_abstraction_cache_hit() {
        let pamgr = manager(AbstractionOptions::default());
        let amgr = pamgr.abstraction_manager().clone();
        let x = amgr.make_predicate(&Formula::var("x"));
        let old = pamgr.make_true_abstraction(None);
        let preds = BTreeSet::from([x]);

        let first = pamgr.build_abstraction(NodeId(1), &old, &block(), &preds).unwrap();
        let checks = pamgr.solver().statistics().sat_checks;
        let second = pamgr.build_abstraction(NodeId(1), &old, &block(), &preds).unwrap();
        assert_eq!(pamgr.solver().statistics().sat_checks, checks);
        assert_eq!(pamgr.statistics().num_cache_hits, 1);
        assert_ne!(first.id(), second.id());
        assert_eq!(first.region(), second.region());
    }

    #[test]
    fn test_unsat_cache_yields_false_without_solving() {
        let pamgr = manager(AbstractionOptions::default());
        let amgr = pamgr.abstraction_manager().clone();
        let x = amgr.make_predicate(&Formula::var("x"));
        let y = amgr.make_predicate(&Formula::var("y"));
        let x1 = Formula::indexed_var("x", 1);
        let y1 = Formula::indexed_var("y", 1);
        let contradiction = PathFormula {
            formula: Formula::and_all([
                Formula::or(x1.clone(), y1.clone()),
                Formula::not(x1),
                Formula::not(y1),
            ]),
            ssa: SsaMap::default(),
            length: 3,
        };
        assert!(!contradiction.formula.is_false());
        let old = pamgr.make_true_abstraction(None);

        let first = pamgr
            .build_abstraction(NodeId(1), &old, &contradiction, &BTreeSet::from([x.clone()]))
            .unwrap();
        assert!(first.is_false());
        assert_eq!(first.to_string(), format!("ABS{}: false", first.id()));

        let checks = pamgr.solver().statistics().sat_checks;
        let second = pamgr
            .build_abstraction(NodeId(1), &old, &contradiction, &BTreeSet::from([x, y]))
            .unwrap();
        assert!(second.is_false());
        assert_eq!(pamgr.solver().statistics().sat_checks, checks);
        assert_eq!(pamgr.statistics().num_unsat_cache_hits, 1);
    }

    #[test]
    fn test_only_false_predicate_checks_satisfiability() {
        let pamgr = manager(AbstractionOptions::default());
        let f = pamgr.make_false_predicate();
        let old = pamgr.make_true_abstraction(None);
        let abs = pamgr
            .build_abstraction(NodeId(1), &old, &block(), &BTreeSet::from([f]))
            .unwrap();
        assert!(abs.is_true());
        assert_eq!(pamgr.statistics().num_sat_checks, 1);
    }

    #[test]
    fn test_elimination() {
        let pamgr = manager(with_type(AbstractionType::Elimination));
        let mut ssa = SsaMap::default();
        ssa.set("x", 2);
        // x@1 is dead at the end of the block, x@2 and y@1 are live.
        let pf = PathFormula {
            formula: Formula::and_all([
                Formula::indexed_var("x", 1),
                Formula::iff(Formula::indexed_var("x", 2), Formula::indexed_var("x", 1)),
                Formula::indexed_var("y", 1),
            ]),
            ssa,
            length: 2,
        };
        let old = pamgr.make_true_abstraction(None);
        let abs = pamgr.build_abstraction(NodeId(1), &old, &pf, &BTreeSet::new()).unwrap();
        let amgr = pamgr.abstraction_manager();
        let x = amgr.predicate_of_atom(&Formula::var("x")).unwrap();
        let y = amgr.predicate_of_atom(&Formula::var("y")).unwrap();
        assert_eq!(
            abs.region(),
            amgr.region_manager().and(x.abstract_variable(), y.abstract_variable())
        );
    }

    #[test]
    fn test_trivial_predicates_come_from_old_abstraction() {
        let options = AbstractionOptions {
            identify_trivial_predicates: true,
            ..AbstractionOptions::default()
        };
        let pamgr = manager(options);
        let amgr = pamgr.abstraction_manager().clone();
        let x = amgr.make_predicate(&Formula::var("x"));
        let y = amgr.make_predicate(&Formula::var("y"));
        let old = pamgr.region_abstraction(&Formula::var("y"), &pamgr.path_formula_manager().make_empty());

        let abs = pamgr
            .build_abstraction(NodeId(1), &old, &block(), &BTreeSet::from([x.clone(), y.clone()]))
            .unwrap();
        let rmgr = amgr.region_manager();
        assert_eq!(abs.region(), rmgr.and(x.abstract_variable(), y.abstract_variable()));
        assert_eq!(pamgr.statistics().num_trivial_predicates, 1);
    }

    #[test]
    fn test_coverage_checks() {
        let pamgr = manager(AbstractionOptions::default());
        let empty = pamgr.path_formula_manager().make_empty();
        let xy = pamgr.region_abstraction(&Formula::and(Formula::var("x"), Formula::var("y")), &empty);
        let x = pamgr.region_abstraction(&Formula::var("x"), &empty);
        assert!(pamgr.check_coverage(&xy, &x));
        assert!(!pamgr.check_coverage(&x, &xy));

        // true && (x@1) covers x.
        let top = pamgr.make_true_abstraction(None);
        let pf = PathFormula {
            formula: Formula::indexed_var("x", 1),
            ssa: SsaMap::default(),
            length: 1,
        };
        assert!(pamgr.check_coverage_with(&top, &pf, &x).unwrap());
        assert!(!pamgr.check_coverage_with(&top, &pf, &xy).unwrap());
        assert!(!pamgr.unsat(&x, &pf).unwrap());
    }

    #[test]
    fn test_path_coverage() {
        let pamgr = manager(AbstractionOptions::default());
        let pfmgr = pamgr.path_formula_manager();
        let mut ssa = SsaMap::default();
        ssa.set("x", 2);
        let a = PathFormula {
            formula: Formula::iff(Formula::indexed_var("x", 2), Formula::mk_true()),
            ssa: ssa.clone(),
            length: 1,
        };
        let b = PathFormula {
            formula: Formula::indexed_var("y", 1),
            ssa: SsaMap::default(),
            length: 1,
        };
        let joined = pfmgr.make_or(&a, &b);
        assert!(pamgr.check_path_coverage(&a, &joined).unwrap());
        assert!(pamgr.check_path_coverage(&b, &joined).unwrap());
        assert!(!pamgr.check_path_coverage(&joined, &b).unwrap());
    }

    #[test]
    fn test_reduce_and_expand() {
        let pamgr = manager(AbstractionOptions::default());
        let amgr = pamgr.abstraction_manager().clone();
        let empty = pamgr.path_formula_manager().make_empty();
        let full = pamgr.region_abstraction(&Formula::and(Formula::var("x"), Formula::var("y")), &empty);
        let y = amgr.predicate_of_atom(&Formula::var("y")).unwrap();
        let x = amgr.predicate_of_atom(&Formula::var("x")).unwrap();

        let reduced = pamgr.reduce(&full, [&y], &SsaMap::default());
        assert_eq!(reduced.region(), x.abstract_variable());

        let expanded = pamgr.expand(reduced.region(), full.region(), [&x], &SsaMap::default(), &empty);
        assert_eq!(expanded.region(), full.region());
    }

    #[test]
    fn test_predicate_extraction() {
        let pamgr = manager(AbstractionOptions::default());
        let itp = Formula::and(Formula::indexed_var("x", 3), Formula::not(Formula::indexed_var("y", 2)));
        let preds = pamgr.predicates_for_atoms_of(&itp);
        assert_eq!(preds.len(), 2);
        assert_eq!(preds[0].symbolic_atom(), &Formula::var("x"));
        assert_eq!(preds[1].symbolic_atom(), &Formula::var("y"));

        let falses = pamgr.predicates_for_atoms_of(&Formula::mk_false());
        assert_eq!(falses, vec![pamgr.make_false_predicate()]);

        let whole = pamgr.predicate_for(&itp);
        assert_eq!(whole.symbolic_atom(), &itp.uninstantiate());
    }

    #[test]
    #[should_panic(expected = "Predicate true is useless")]
    fn test_true_is_not_a_predicate() {
        let pamgr = manager(AbstractionOptions::default());
        pamgr.predicate_for(&Formula::mk_true());
    }

    fn storage_with(candidates: &[(usize, Formula)]) -> Rc<AbstractionStorage> {
        let mut storage = AbstractionStorage::new();
        storage.add(0, Formula::mk_true(), None);
        storage.set_root(0);
        for (id, f) in candidates {
            storage.add(*id, f.clone(), Some(NodeId(1)));
            storage.add_successor(0, *id);
        }
        Rc::new(storage)
    }

    #[test]
    fn test_reuse_of_stored_abstraction() {
        let storage = storage_with(&[(1, Formula::var("x"))]);
        let pamgr = manager(AbstractionOptions::default()).with_storage(storage.clone());
        let old = pamgr.make_true_abstraction(None);

        let abs = pamgr.build_abstraction(NodeId(1), &old, &block(), &BTreeSet::new()).unwrap();
        assert_eq!(abs.as_formula(), &Formula::var("x"));
        assert_eq!(abs.instantiated_formula(), &Formula::indexed_var("x", 2));
        assert_eq!(abs.reused_ids(), &BTreeSet::from([1]));
        assert_eq!(storage.reused_ids(), BTreeSet::from([1]));
        assert_eq!(pamgr.statistics().num_reuses, 1);
        assert!(!pamgr.is_reuse_disabled());
    }

    #[test]
    fn test_ambiguous_reuse_disables_reuse() {
        let storage = storage_with(&[(1, Formula::var("x")), (2, Formula::var("y"))]);
        let pamgr = manager(AbstractionOptions::default()).with_storage(storage.clone());
        let old = pamgr.make_true_abstraction(None);

        let abs = pamgr.build_abstraction(NodeId(1), &old, &block(), &BTreeSet::new()).unwrap();
        assert!(abs.is_true());
        assert!(pamgr.is_reuse_disabled());
        assert!(storage.reused_ids().is_empty());
        assert_eq!(pamgr.statistics().num_reuses, 0);
    }

    #[test]
    fn test_invariant_predicates_are_not_recomputed() {
        use crate::predicate::provider::LocationInvariants;

        let mut invariants = LocationInvariants::new();
        invariants.insert(NodeId(1), Formula::var("y"));
        let pamgr = manager(AbstractionOptions::default()).with_invariants(Rc::new(invariants));
        let amgr = pamgr.abstraction_manager().clone();
        let x = amgr.make_predicate(&Formula::var("x"));
        let y = amgr.make_predicate(&Formula::var("y"));
        let old = pamgr.make_true_abstraction(None);
        let pf = PathFormula {
            formula: Formula::and(Formula::indexed_var("x", 1), Formula::indexed_var("y", 1)),
            ssa: SsaMap::default(),
            length: 1,
        };
        let abs = pamgr
            .build_abstraction(NodeId(1), &old, &pf, &BTreeSet::from([x.clone(), y.clone()]))
            .unwrap();
        let rmgr = amgr.region_manager();
        assert_eq!(abs.region(), rmgr.and(x.abstract_variable(), y.abstract_variable()));
        assert_eq!(pamgr.statistics().num_invariant_predicates, 1);
    }
}
