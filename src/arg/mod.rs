//! Abstract reachability graphs.
//!
//! The ARG records the explored state space: every node owns one inner
//! abstract state and knows its parents, its children and its coverage
//! relation. Nodes live in an arena and refer to each other by [`StateId`];
//! a removed node leaves a tombstone behind, so a stale id can never alias a
//! newer node.
//!
//! Invariant violations (covering a covered node, touching a removed node)
//! are programming errors and panic.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use log::debug;

use crate::cfa::NodeId;
use crate::cpa::AbstractState;

pub mod automaton;
pub mod counter;
pub mod cpa;
pub mod dot;
pub mod merge;
pub mod path;
pub mod precision;
pub mod reached;
pub mod stop;
pub mod transfer;

pub use counter::PathCounter;

/// Identifier of an ARG node. Ids grow with creation order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StateId(u32);

impl StateId {
    pub fn id(self) -> u32 {
        self.0
    }

    pub fn is_older_than(self, other: StateId) -> bool {
        self.0 < other.0
    }
}

impl Display for StateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArgStatistics {
    pub created: usize,
    pub covered: usize,
    pub merged: usize,
    pub trimmed: usize,
    pub destroyed: usize,
}

#[derive(Debug, Clone)]
pub struct ArgNode<S> {
    id: StateId,
    state: S,
    parents: Vec<StateId>,
    children: Vec<StateId>,
    covered_by: Option<StateId>,
    covers: Option<BTreeSet<StateId>>,
    may_cover: bool,
    has_covered_parent: bool,
    was_expanded: bool,
    merged_with: Option<StateId>,
    // Whether some child was already attached to this node.
    has_inherited: bool,
}

impl<S> ArgNode<S> {
    fn new(id: StateId, state: S) -> Self {
        Self {
            id,
            state,
            parents: Vec::new(),
            children: Vec::new(),
            covered_by: None,
            covers: None,
            may_cover: true,
            has_covered_parent: false,
            was_expanded: false,
            merged_with: None,
            has_inherited: false,
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }
    pub fn state(&self) -> &S {
        &self.state
    }
    pub fn parents(&self) -> &[StateId] {
        &self.parents
    }
    pub fn children(&self) -> &[StateId] {
        &self.children
    }
    pub fn covered_by(&self) -> Option<StateId> {
        self.covered_by
    }
    pub fn is_covered(&self) -> bool {
        self.covered_by.is_some()
    }

    /// States covered by this one.
    pub fn covered_states(&self) -> impl Iterator<Item = StateId> + '_ {
        self.covers.iter().flatten().copied()
    }

    /// Whether this state may be used to cover others.
    pub fn may_cover(&self) -> bool {
        self.may_cover && !self.has_covered_parent && !self.is_covered()
    }
    pub fn has_covered_parent(&self) -> bool {
        self.has_covered_parent
    }
    pub fn was_expanded(&self) -> bool {
        self.was_expanded
    }
    pub fn merged_with(&self) -> Option<StateId> {
        self.merged_with
    }
}

impl<S: AbstractState> ArgNode<S> {
    /// A node is a target only while neither it nor an ancestor is covered.
    pub fn is_target(&self) -> bool {
        !self.has_covered_parent && !self.is_covered() && self.state.is_target()
    }
}

impl<S: Debug> Display for ArgNode<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_covered() {
            write!(f, "Covered ")?;
        }
        write!(f, "ARG State (Id: {}, Parents: {:?}, Children: {:?}", self.id, self.parents, self.children)?;
        match self.covered_by {
            Some(c) => write!(f, ", Covered by: {}", c)?,
            None => write!(f, ", Covering: {:?}", self.covered_states().collect::<Vec<_>>())?,
        }
        write!(f, ") {:?}", self.state)
    }
}

/// Arena of ARG nodes together with the per-run path counter.
#[derive(Debug)]
pub struct Arg<S> {
    nodes: Vec<Option<ArgNode<S>>>,
    roots: Vec<StateId>,
    counter: PathCounter,
    stats: ArgStatistics,
}

impl<S> Default for Arg<S> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            counter: PathCounter::new(),
            stats: ArgStatistics::default(),
        }
    }
}

pub type SharedArg<S> = Rc<RefCell<Arg<S>>>;

impl<S> Arg<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedArg<S> {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn counter(&self) -> &PathCounter {
        &self.counter
    }

    pub fn counter_mut(&mut self) -> &mut PathCounter {
        &mut self.counter
    }

    pub fn statistics(&self) -> ArgStatistics {
        self.stats
    }

    pub(crate) fn statistics_mut(&mut self) -> &mut ArgStatistics {
        &mut self.stats
    }

    /// Number of nodes that are not removed.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nodes created without a parent, in creation order.
    pub fn roots(&self) -> impl Iterator<Item = StateId> + '_ {
        self.roots.iter().copied().filter(|&r| self.contains(r))
    }

    pub fn ids(&self) -> impl Iterator<Item = StateId> + '_ {
        self.nodes.iter().flatten().map(|n| n.id)
    }

    pub fn contains(&self, id: StateId) -> bool {
        matches!(self.nodes.get(id.0 as usize), Some(Some(_)))
    }

    pub fn get(&self, id: StateId) -> Option<&ArgNode<S>> {
        self.nodes.get(id.0 as usize).and_then(|n| n.as_ref())
    }

    pub fn node(&self, id: StateId) -> &ArgNode<S> {
        match self.get(id) {
            Some(n) => n,
            None => panic!("Don't use destroyed ARG state {}", id),
        }
    }

    fn node_mut(&mut self, id: StateId) -> &mut ArgNode<S> {
        match self.nodes.get_mut(id.0 as usize).and_then(|n| n.as_mut()) {
            Some(n) => n,
            None => panic!("Don't use destroyed ARG state {}", id),
        }
    }

    pub fn state(&self, id: StateId) -> &S {
        &self.node(id).state
    }

    /// Replace the inner state of `id`, keeping all graph relations.
    pub fn replace_state(&mut self, id: StateId, state: S) {
        self.node_mut(id).state = state;
    }

    fn alloc(&mut self, state: S) -> StateId {
        let id = StateId(self.nodes.len() as u32);
        self.nodes.push(Some(ArgNode::new(id, state)));
        self.stats.created += 1;
        id
    }

    /// Create a node without a parent. Opens a new path.
    pub fn create_root(&mut self, state: S) -> StateId {
        let id = self.alloc(state);
        self.roots.push(id);
        self.counter.inc();
        debug!("created ARG root {}", id);
        id
    }

    /// Create a node outside of every path, e.g. a block-local reduced state.
    pub fn create_detached(&mut self, state: S) -> StateId {
        self.alloc(state)
    }

    /// Create a child of `parent`.
    ///
    /// The first child of a parent continues the parent's path; every further
    /// child opens a new one.
    pub fn create_successor(&mut self, parent: StateId, state: S) -> StateId {
        let p = self.node_mut(parent);
        if p.has_inherited {
            self.counter.inc();
        } else {
            p.has_inherited = true;
        }
        let id = self.alloc(state);
        self.add_parent(id, parent);
        id
    }

    /// Link `child` below `parent`. Linking twice has no effect.
    pub fn add_parent(&mut self, child: StateId, parent: StateId) {
        let already = self.node(child).parents.contains(&parent);
        assert_eq!(
            already,
            self.node(parent).children.contains(&child),
            "Inconsistent ARG between {} and {}",
            parent,
            child
        );
        if !already {
            self.node_mut(child).parents.push(parent);
            self.node_mut(parent).children.push(child);
        }
    }

    /// Unlink `child` from `parent`.
    pub fn delete_child(&mut self, parent: StateId, child: StateId) {
        let p = self.node_mut(parent);
        let before = p.children.len();
        p.children.retain(|&c| c != child);
        assert_ne!(before, p.children.len(), "{} is not a child of {}", child, parent);
        self.node_mut(child).parents.retain(|&x| x != parent);
    }

    pub fn mark_expanded(&mut self, id: StateId) {
        self.node_mut(id).was_expanded = true;
    }

    /// Forbid `id` from covering other states.
    pub fn set_not_covering(&mut self, id: StateId) {
        self.node_mut(id).may_cover = false;
    }

    /// Record that `a` is covered by `b`. Closes one path.
    pub fn cover(&mut self, a: StateId, b: StateId) {
        assert!(!self.node(a).is_covered(), "Cannot cover already covered element {}", a);
        assert!(self.node(b).may_cover(), "Trying to cover with non-covering element {}", b);
        assert_ne!(a, b, "A state cannot cover itself");

        self.node_mut(a).covered_by = Some(b);
        self.node_mut(b).covers.get_or_insert_with(BTreeSet::new).insert(a);
        for child in self.subgraph(a).into_iter().filter(|&c| c != a) {
            self.node_mut(child).has_covered_parent = true;
        }
        self.counter.dec(1);
        self.stats.covered += 1;
        debug!("{} is covered by {}", a, b);
    }

    /// Undo the coverage of `a`.
    pub fn uncover(&mut self, a: StateId) {
        let Some(b) = self.node(a).covered_by else {
            panic!("Cannot uncover {} which is not covered", a);
        };
        if let Some(covers) = self.node_mut(b).covers.as_mut() {
            covers.remove(&a);
        }
        self.node_mut(a).covered_by = None;
    }

    fn clear_coverage(&mut self, id: StateId) {
        if self.node(id).is_covered() {
            self.uncover(id);
        }
        if let Some(covers) = self.node_mut(id).covers.take() {
            for c in covers {
                if let Some(Some(n)) = self.nodes.get_mut(c.0 as usize) {
                    n.covered_by = None;
                }
            }
        }
    }

    fn detach(&mut self, id: StateId) {
        let node = self.node_mut(id);
        let children = std::mem::take(&mut node.children);
        let parents = std::mem::take(&mut node.parents);
        for c in children {
            self.node_mut(c).parents.retain(|&x| x != id);
        }
        for p in parents {
            self.node_mut(p).children.retain(|&x| x != id);
        }
    }

    /// Detach `id` from the graph, drop its coverage relations and destroy it.
    ///
    /// Children that have no other parent become unreachable but stay alive
    /// until they are removed themselves.
    pub fn remove(&mut self, id: StateId) -> S {
        self.detach(id);
        self.clear_coverage(id);
        self.stats.destroyed += 1;
        match self.nodes[id.0 as usize].take() {
            Some(n) => n.state,
            None => panic!("Don't use destroyed ARG state {}", id),
        }
    }

    /// Destroy `old`, moving all its parents, children and covered states to `replacement`.
    pub fn replace_with(&mut self, old: StateId, replacement: StateId) {
        assert!(!self.node(old).is_covered(), "Not implemented: Replacement of covered element {}", old);
        assert!(
            !self.node(replacement).is_covered(),
            "Cannot replace with covered element {}",
            replacement
        );

        let node = self.node_mut(old);
        let children = std::mem::take(&mut node.children);
        let parents = std::mem::take(&mut node.parents);
        let covers = node.covers.take();
        for c in children {
            self.node_mut(c).parents.retain(|&x| x != old);
            self.add_parent(c, replacement);
        }
        for p in parents {
            self.node_mut(p).children.retain(|&x| x != old);
            self.add_parent(replacement, p);
        }
        for c in covers.into_iter().flatten() {
            self.node_mut(c).covered_by = Some(replacement);
            self.node_mut(replacement).covers.get_or_insert_with(BTreeSet::new).insert(c);
        }
        self.nodes[old.0 as usize] = None;
        self.stats.destroyed += 1;
    }

    /// Join `a` into `b`: a fresh node holding `joined` takes `b`'s place
    /// and additionally inherits `a`'s parents. `a` stays in the graph,
    /// marked as merged, until the stop operator removes it.
    pub fn merge(&mut self, a: StateId, b: StateId, joined: S) -> StateId {
        assert!(
            self.node(a).merged_with.is_none(),
            "Second merging of element {}",
            a
        );
        let merged = self.alloc(joined);
        self.counter.inc();
        self.replace_with(b, merged);
        let parents = self.node(a).parents.clone();
        for p in parents {
            self.add_parent(merged, p);
        }
        self.node_mut(a).merged_with = Some(merged);
        self.stats.merged += 1;
        debug!("merged {} into {}, replaced by {}", a, b, merged);
        merged
    }

    /// All nodes reachable from `root` through child links, including `root`.
    pub fn subgraph(&self, root: StateId) -> BTreeSet<StateId> {
        let mut result = BTreeSet::new();
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            if result.insert(id) {
                queue.extend(self.node(id).children.iter().copied());
            }
        }
        result
    }

    /// Children of `id`, with covered children replaced by their coverer.
    pub fn uncovered_children(&self, id: StateId) -> Vec<StateId> {
        let mut result = Vec::new();
        for &c in &self.node(id).children {
            let c = self.node(c).covered_by.unwrap_or(c);
            if !result.contains(&c) {
                result.push(c);
            }
        }
        result
    }

    /// All nodes lying on some path from a root to one of `targets`.
    pub fn all_states_on_paths_to(&self, targets: impl IntoIterator<Item = StateId>) -> BTreeSet<StateId> {
        let mut result = BTreeSet::new();
        let mut stack: Vec<StateId> = targets.into_iter().collect();
        while let Some(id) = stack.pop() {
            if result.insert(id) {
                stack.extend(self.node(id).parents.iter().copied());
            }
        }
        result
    }
}

impl<S: AbstractState> Arg<S> {
    pub fn is_target(&self, id: StateId) -> bool {
        self.node(id).is_target()
    }

    pub fn location(&self, id: StateId) -> Option<NodeId> {
        self.node(id).state.location()
    }

    pub fn targets(&self) -> Vec<StateId> {
        self.nodes.iter().flatten().filter(|n| n.is_target()).map(|n| n.id).collect()
    }
}

/// Handle to an ARG node that carries the arena it lives in.
///
/// Handles compare, order and hash by id alone.
pub struct ArgState<S> {
    id: StateId,
    arg: SharedArg<S>,
}

impl<S> ArgState<S> {
    pub fn new(id: StateId, arg: SharedArg<S>) -> Self {
        Self { id, arg }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn arg(&self) -> &SharedArg<S> {
        &self.arg
    }

    /// A handle to another node of the same arena.
    pub fn sibling(&self, id: StateId) -> Self {
        Self::new(id, self.arg.clone())
    }

    pub fn is_destroyed(&self) -> bool {
        !self.arg.borrow().contains(self.id)
    }

    pub fn is_covered(&self) -> bool {
        self.arg.borrow().node(self.id).is_covered()
    }

    pub fn was_expanded(&self) -> bool {
        self.arg.borrow().node(self.id).was_expanded()
    }

    pub fn parents(&self) -> Vec<StateId> {
        self.arg.borrow().node(self.id).parents().to_vec()
    }

    pub fn children(&self) -> Vec<StateId> {
        self.arg.borrow().node(self.id).children().to_vec()
    }
}

impl<S: Clone> ArgState<S> {
    /// A copy of the wrapped state.
    pub fn wrapped(&self) -> S {
        self.arg.borrow().state(self.id).clone()
    }
}

impl<S> Clone for ArgState<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            arg: self.arg.clone(),
        }
    }
}

impl<S> PartialEq for ArgState<S> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<S> Eq for ArgState<S> {}

impl<S> PartialOrd for ArgState<S> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<S> Ord for ArgState<S> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl<S> Hash for ArgState<S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<S> Debug for ArgState<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ARG{}", self.id)
    }
}

impl<S: AbstractState> AbstractState for ArgState<S> {
    fn location(&self) -> Option<NodeId> {
        self.arg.borrow().location(self.id)
    }

    fn is_target(&self) -> bool {
        self.arg.borrow().is_target(self.id)
    }

    fn dot_label(&self) -> String {
        self.arg.borrow().state(self.id).dot_label()
    }

    fn should_highlight(&self) -> bool {
        self.arg.borrow().state(self.id).should_highlight()
    }
}
