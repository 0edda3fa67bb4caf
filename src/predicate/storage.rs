//! Abstractions kept from an earlier run, for reuse.
//!
//! The stored abstractions form a tree: the successors of an abstraction are
//! the abstractions computed at the next block ends below it.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::arg::{Arg, StateId};
use crate::cfa::NodeId;
use crate::cpa::AbstractState;
use crate::formula::Formula;
use crate::predicate::state::PredicateAbstractState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAbstraction {
    id: usize,
    formula: Formula,
    location: Option<NodeId>,
}

impl StoredAbstraction {
    pub fn id(&self) -> usize {
        self.id
    }

    /// The abstraction, uninstantiated.
    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    /// Where the abstraction was computed, if known.
    pub fn location(&self) -> Option<NodeId> {
        self.location
    }
}

#[derive(Debug, Default)]
pub struct AbstractionStorage {
    root: Option<usize>,
    abstractions: BTreeMap<usize, StoredAbstraction>,
    tree: BTreeMap<usize, Vec<usize>>,
    reused: RefCell<BTreeSet<usize>>,
}

impl AbstractionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the abstraction states of `arg`, linking each one to the
    /// abstraction states reached from it without passing another one.
    pub fn from_arg(arg: &Arg<PredicateAbstractState>) -> Self {
        let mut storage = Self::new();
        let is_abstraction = |id: StateId| arg.state(id).is_abstraction_state();

        for id in arg.ids().filter(|&id| is_abstraction(id)) {
            let state = arg.state(id);
            storage.add(
                id.id() as usize,
                state.abstraction_formula().as_formula().clone(),
                state.location(),
            );
        }
        for id in arg.ids().filter(|&id| is_abstraction(id)) {
            let mut stack: Vec<StateId> = arg.node(id).children().to_vec();
            let mut seen = BTreeSet::new();
            while let Some(c) = stack.pop() {
                if !seen.insert(c) {
                    continue;
                }
                if is_abstraction(c) {
                    storage.add_successor(id.id() as usize, c.id() as usize);
                } else {
                    stack.extend(arg.node(c).children().iter().copied());
                }
            }
        }
        if let Some(root) = arg.roots().find(|&r| is_abstraction(r)) {
            storage.set_root(root.id() as usize);
        }
        debug!("stored {} abstractions", storage.len());
        storage
    }

    /// Store an abstraction. An id is stored at most once.
    pub fn add(&mut self, id: usize, formula: Formula, location: Option<NodeId>) {
        assert!(!self.abstractions.contains_key(&id), "Abstraction {} is already stored", id);
        self.abstractions.insert(id, StoredAbstraction { id, formula, location });
    }

    pub fn add_successor(&mut self, parent: usize, child: usize) {
        let successors = self.tree.entry(parent).or_default();
        if !successors.contains(&child) {
            successors.push(child);
        }
    }

    pub fn set_root(&mut self, id: usize) {
        self.root = Some(id);
    }

    pub fn root_id(&self) -> Option<usize> {
        self.root
    }

    pub fn get(&self, id: usize) -> Option<&StoredAbstraction> {
        self.abstractions.get(&id)
    }

    /// The stored successors of `id`, in insertion order.
    pub fn successors(&self, id: usize) -> Vec<&StoredAbstraction> {
        self.tree
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|c| self.abstractions.get(c))
            .collect()
    }

    /// All stored abstractions computed at `location`.
    pub fn abstractions_at(&self, location: NodeId) -> impl Iterator<Item = &StoredAbstraction> {
        self.abstractions.values().filter(move |a| a.location == Some(location))
    }

    pub fn mark_reused(&self, id: usize) {
        self.reused.borrow_mut().insert(id);
    }

    pub fn reused_ids(&self) -> BTreeSet<usize> {
        self.reused.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.abstractions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abstractions.is_empty()
    }
}
