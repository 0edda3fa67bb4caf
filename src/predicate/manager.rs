//! Registry of abstraction predicates.
//!
//! Every predicate owns one decision variable of the region manager and one
//! symbolic variable `PRED<n>` used to project solver models onto it.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use log::debug;

use crate::formula::Formula;
use crate::reference::Region;
use crate::region::RegionManager;

/// A named atomic fact over uninstantiated program variables.
#[derive(Debug, Clone)]
pub struct AbstractionPredicate(Rc<PredicateData>);

#[derive(Debug)]
struct PredicateData {
    id: usize,
    symbolic_variable: Formula,
    symbolic_atom: Formula,
    abstract_variable: Region,
}

impl AbstractionPredicate {
    pub fn id(&self) -> usize {
        self.0.id
    }

    /// The propositional stand-in `PRED<id>`.
    pub fn symbolic_variable(&self) -> &Formula {
        &self.0.symbolic_variable
    }

    /// The predicate itself, uninstantiated.
    pub fn symbolic_atom(&self) -> &Formula {
        &self.0.symbolic_atom
    }

    /// The decision variable of the predicate.
    pub fn abstract_variable(&self) -> Region {
        self.0.abstract_variable
    }
}

impl PartialEq for AbstractionPredicate {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for AbstractionPredicate {}

impl Hash for AbstractionPredicate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl PartialOrd for AbstractionPredicate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AbstractionPredicate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id().cmp(&other.id())
    }
}

impl Display for AbstractionPredicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbolic_atom())
    }
}

/// Owns the region manager and the bijection between predicates, their
/// decision variables and their symbolic variables.
#[derive(Debug)]
pub struct AbstractionManager {
    rmgr: RegionManager,
    predicates: RefCell<Vec<AbstractionPredicate>>,
    by_atom: RefCell<HashMap<Formula, usize>>,
    by_region_var: RefCell<HashMap<u32, usize>>,
    by_symbolic_variable: RefCell<HashMap<Formula, usize>>,
}

impl Default for AbstractionManager {
    fn default() -> Self {
        Self::new(RegionManager::default())
    }
}

impl AbstractionManager {
    pub fn new(rmgr: RegionManager) -> Self {
        Self {
            rmgr,
            predicates: RefCell::new(Vec::new()),
            by_atom: RefCell::new(HashMap::new()),
            by_region_var: RefCell::new(HashMap::new()),
            by_symbolic_variable: RefCell::new(HashMap::new()),
        }
    }

    pub fn region_manager(&self) -> &RegionManager {
        &self.rmgr
    }

    pub fn num_predicates(&self) -> usize {
        self.predicates.borrow().len()
    }

    pub fn predicates(&self) -> Vec<AbstractionPredicate> {
        self.predicates.borrow().clone()
    }

    /// The predicate for `atom`, created on first use.
    ///
    /// `atom` must be uninstantiated.
    pub fn make_predicate(&self, atom: &Formula) -> AbstractionPredicate {
        if let Some(&i) = self.by_atom.borrow().get(atom) {
            return self.predicates.borrow()[i].clone();
        }
        let id = self.num_predicates();
        let abstract_variable = self.rmgr.new_variable();
        let symbolic_variable = Formula::var(format!("PRED{}", id));
        let predicate = AbstractionPredicate(Rc::new(PredicateData {
            id,
            symbolic_variable: symbolic_variable.clone(),
            symbolic_atom: atom.clone(),
            abstract_variable,
        }));
        debug!("new predicate {} for {}", symbolic_variable, atom);

        self.predicates.borrow_mut().push(predicate.clone());
        self.by_atom.borrow_mut().insert(atom.clone(), id);
        self.by_region_var
            .borrow_mut()
            .insert(self.rmgr.variable(abstract_variable), id);
        self.by_symbolic_variable.borrow_mut().insert(symbolic_variable, id);
        predicate
    }

    /// The predicate `false`, marking a location as unreachable.
    pub fn make_false_predicate(&self) -> AbstractionPredicate {
        self.make_predicate(&Formula::mk_false())
    }

    pub fn predicate_of_atom(&self, atom: &Formula) -> Option<AbstractionPredicate> {
        let i = *self.by_atom.borrow().get(atom)?;
        Some(self.predicates.borrow()[i].clone())
    }

    pub fn predicate_of_variable(&self, v: u32) -> Option<AbstractionPredicate> {
        let i = *self.by_region_var.borrow().get(&v)?;
        Some(self.predicates.borrow()[i].clone())
    }

    pub fn predicate_of_symbolic_variable(&self, var: &Formula) -> Option<AbstractionPredicate> {
        let i = *self.by_symbolic_variable.borrow().get(var)?;
        Some(self.predicates.borrow()[i].clone())
    }

    /// The uninstantiated formula denoted by `r`.
    ///
    /// # Panics
    ///
    /// Panics if `r` mentions a decision variable that belongs to no predicate.
    pub fn convert_region_to_formula(&self, r: Region) -> Formula {
        self.rmgr.to_formula(r, &|v| match self.predicate_of_variable(v) {
            Some(p) => p.symbolic_atom().clone(),
            None => panic!("Region variable {} does not belong to a predicate", v),
        })
    }

    /// The region of an uninstantiated formula. Atoms without a predicate get one.
    pub fn convert_formula_to_region(&self, f: &Formula) -> Region {
        self.rmgr
            .from_formula(f, &mut |atom| self.make_predicate(atom).abstract_variable())
    }

    /// Predicates whose variables occur in `r`.
    pub fn extract_predicates(&self, r: Region) -> BTreeSet<AbstractionPredicate> {
        self.rmgr
            .support(r)
            .into_iter()
            .filter_map(|v| self.predicate_of_variable(v))
            .collect()
    }

    pub fn entails(&self, f: Region, g: Region) -> bool {
        self.rmgr.entails(f, g)
    }
}
