//! Reached sets and their ARG-aware wrapper.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::debug;

use crate::arg::{ArgState, SharedArg, StateId};
use crate::cfa::NodeId;
use crate::cpa::AbstractState;

/// Order in which waiting states are taken.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum WaitlistOrder {
    #[default]
    Bfs,
    Dfs,
}

/// All states found so far, their precisions and the waitlist of states to expand.
///
/// States are partitioned by location, so merge and stop only look at states
/// of the same program location. The location is recorded when a state is
/// added; removing a state never inspects it again.
#[derive(Debug, Clone)]
pub struct ReachedSet<T, P> {
    states: Vec<T>,
    // precision and partition key
    entries: BTreeMap<T, (P, Option<NodeId>)>,
    waitlist: VecDeque<T>,
    order: WaitlistOrder,
    partitions: BTreeMap<Option<NodeId>, Vec<T>>,
    first: Option<T>,
    last: Option<T>,
}

impl<T, P> ReachedSet<T, P>
where
    T: AbstractState + Ord,
    P: Clone,
{
    pub fn new(order: WaitlistOrder) -> Self {
        Self {
            states: Vec::new(),
            entries: BTreeMap::new(),
            waitlist: VecDeque::new(),
            order,
            partitions: BTreeMap::new(),
            first: None,
            last: None,
        }
    }

    /// Add a state and put it on the waitlist. Adding a known state only
    /// updates its precision.
    pub fn add(&mut self, state: T, precision: P) {
        if let Some(entry) = self.entries.get_mut(&state) {
            entry.0 = precision;
            return;
        }
        let location = state.location();
        self.entries.insert(state.clone(), (precision, location));
        self.partitions.entry(location).or_default().push(state.clone());
        self.states.push(state.clone());
        self.waitlist.push_back(state.clone());
        if self.first.is_none() {
            self.first = Some(state.clone());
        }
        self.last = Some(state);
    }

    pub fn remove(&mut self, state: &T) {
        let Some((_, location)) = self.entries.remove(state) else {
            return;
        };
        self.states.retain(|s| s != state);
        self.waitlist.retain(|s| s != state);
        if let Some(partition) = self.partitions.get_mut(&location) {
            partition.retain(|s| s != state);
        }
        if self.last.as_ref() == Some(state) {
            self.last = self.states.last().cloned();
        }
    }

    pub fn remove_all<'a>(&mut self, states: impl IntoIterator<Item = &'a T>)
    where
        T: 'a,
    {
        for s in states {
            self.remove(s);
        }
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.entries.clear();
        self.waitlist.clear();
        self.partitions.clear();
        self.first = None;
        self.last = None;
    }

    pub fn contains(&self, state: &T) -> bool {
        self.entries.contains_key(state)
    }

    pub fn precision(&self, state: &T) -> Option<&P> {
        self.entries.get(state).map(|(p, _)| p)
    }

    pub fn update_precision(&mut self, state: &T, precision: P) {
        match self.entries.get_mut(state) {
            Some(entry) => entry.0 = precision,
            None => panic!("Cannot update precision of {:?} which is not in the reached set", state),
        }
    }

    /// States in insertion order.
    pub fn states(&self) -> &[T] {
        &self.states
    }

    /// States at the location of `state`.
    pub fn reached(&self, state: &T) -> &[T] {
        self.partitions.get(&state.location()).map(|p| p.as_slice()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn first_state(&self) -> Option<&T> {
        self.first.as_ref()
    }

    pub fn last_state(&self) -> Option<&T> {
        self.last.as_ref()
    }

    pub fn has_waiting_state(&self) -> bool {
        !self.waitlist.is_empty()
    }

    pub fn waitlist_len(&self) -> usize {
        self.waitlist.len()
    }

    pub fn waitlist(&self) -> impl Iterator<Item = &T> {
        self.waitlist.iter()
    }

    pub fn is_waiting(&self, state: &T) -> bool {
        self.waitlist.contains(state)
    }

    pub fn pop_from_waitlist(&mut self) -> Option<T> {
        match self.order {
            WaitlistOrder::Bfs => self.waitlist.pop_front(),
            WaitlistOrder::Dfs => self.waitlist.pop_back(),
        }
    }

    pub fn re_add_to_waitlist(&mut self, state: &T) {
        assert!(self.contains(state), "{:?} is not in the reached set", state);
        if !self.waitlist.contains(state) {
            self.waitlist.push_back(state.clone());
        }
    }

    pub fn clear_waitlist(&mut self) {
        self.waitlist.clear();
    }
}

/// A reached set over ARG states, kept in sync with the ARG.
pub struct ArgReachedSet<S, P> {
    arg: SharedArg<S>,
    reached: ReachedSet<ArgState<S>, P>,
}

impl<S, P> ArgReachedSet<S, P>
where
    S: AbstractState,
    P: Clone,
{
    pub fn new(arg: SharedArg<S>, order: WaitlistOrder) -> Self {
        Self {
            arg,
            reached: ReachedSet::new(order),
        }
    }

    pub fn arg(&self) -> &SharedArg<S> {
        &self.arg
    }

    pub fn reached(&self) -> &ReachedSet<ArgState<S>, P> {
        &self.reached
    }

    pub fn reached_mut(&mut self) -> &mut ReachedSet<ArgState<S>, P> {
        &mut self.reached
    }

    pub fn handle(&self, id: StateId) -> ArgState<S> {
        ArgState::new(id, self.arg.clone())
    }

    pub fn contains(&self, id: StateId) -> bool {
        self.reached.contains(&self.handle(id))
    }

    pub fn precision_of(&self, id: StateId) -> Option<&P> {
        self.reached.precision(&self.handle(id))
    }

    /// Remove `root`, everything below it and everything covered by those
    /// states from both the ARG and the reached set.
    ///
    /// The parents of removed states that stay in the ARG form the frontier:
    /// their precision is replaced by `adapt(old)` and they go back on the
    /// waitlist. Returns the ids of all removed states.
    pub fn remove_subtree(&mut self, root: StateId, adapt: &dyn Fn(&P) -> P) -> Vec<StateId> {
        let (removed, frontier) = self.remove_subtree_without_readding(root);
        for id in frontier {
            let handle = self.handle(id);
            let Some(old) = self.reached.precision(&handle) else {
                continue;
            };
            let new = adapt(old);
            self.reached.update_precision(&handle, new);
            self.reached.re_add_to_waitlist(&handle);
        }
        removed
    }

    fn remove_subtree_without_readding(&mut self, root: StateId) -> (Vec<StateId>, BTreeSet<StateId>) {
        let arg = self.arg.borrow();
        assert!(
            !arg.node(root).parents().is_empty(),
            "May not remove the initial element from the ARG/reached set"
        );
        let mut removed = arg.subgraph(root);
        let covered: Vec<StateId> = removed.iter().flat_map(|&s| arg.node(s).covered_states()).collect();
        removed.extend(covered);

        let frontier: BTreeSet<StateId> = removed
            .iter()
            .flat_map(|&id| arg.node(id).parents().iter().copied())
            .filter(|p| !removed.contains(p))
            .collect();
        drop(arg);

        for &id in &removed {
            let handle = self.handle(id);
            self.reached.remove(&handle);
        }
        let mut arg = self.arg.borrow_mut();
        for &id in &removed {
            arg.remove(id);
        }
        debug!("removed {} states below {}, frontier {:?}", removed.len(), root, frontier);
        (removed.into_iter().collect(), frontier)
    }

    /// Replace the precision of every reached state by `adapt(old)`.
    pub fn update_precision_globally(&mut self, adapt: &dyn Fn(&P) -> P) {
        let states = self.reached.states().to_vec();
        for s in states {
            if let Some(old) = self.reached.precision(&s) {
                let new = adapt(old);
                self.reached.update_precision(&s, new);
            }
        }
    }

    /// Assert that the ARG and the reached set agree.
    ///
    /// Every reached state is alive and linked symmetrically to its parents
    /// and children, and its parents are reached. A child that is not reached
    /// is either covered and childless, or all its parents are waiting.
    pub fn check_consistency(&self) {
        let arg = self.arg.borrow();
        for s in self.reached.states() {
            assert!(arg.contains(s.id()), "Reached set contains destroyed ARG state {}", s.id());
            let node = arg.node(s.id());
            for &p in node.parents() {
                assert!(
                    arg.node(p).children().contains(&s.id()),
                    "Reference from parent {} to child {} is missing in ARG",
                    p,
                    s.id()
                );
                assert!(self.contains(p), "Referenced parent {} is missing in reached", p);
            }
            for &c in node.children() {
                let child = arg.node(c);
                assert!(
                    child.parents().contains(&s.id()),
                    "Reference from child {} to parent {} is missing in ARG",
                    c,
                    s.id()
                );
                if !self.contains(c) {
                    let covered_leaf = child.is_covered() && child.children().is_empty();
                    let parents_waiting = child.parents().iter().all(|&p| self.reached.is_waiting(&self.handle(p)));
                    assert!(
                        covered_leaf || parents_waiting,
                        "Referenced child {} is missing in reached set",
                        c
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::arg::tests::Dummy;
    use crate::arg::Arg;

    type Prec = Vec<&'static str>;

    /// root -> a -> {b, c}, root -> d; d is covered by b.
    fn setup() -> (ArgReachedSet<Dummy, Prec>, [StateId; 5]) {
        let arg = Arg::shared();
        let mut reached = ArgReachedSet::new(arg.clone(), WaitlistOrder::Bfs);
        let ids = {
            let mut g = arg.borrow_mut();
            let root = g.create_root(Dummy::new("root"));
            let a = g.create_successor(root, Dummy::new("a"));
            let b = g.create_successor(a, Dummy::new("b"));
            let c = g.create_successor(a, Dummy::new("c"));
            let d = g.create_successor(root, Dummy::new("d"));
            g.cover(d, b);
            [root, a, b, c, d]
        };
        for id in &ids[..4] {
            let h = reached.handle(*id);
            reached.reached_mut().add(h, vec!["p"]);
        }
        reached.reached_mut().clear_waitlist();
        (reached, ids)
    }

    #[test]
    fn test_reached_set_waitlist_order() {
        let mut r: ReachedSet<crate::cpa::testing::LocationState, ()> = ReachedSet::new(WaitlistOrder::Dfs);
        let s = |n| crate::cpa::testing::LocationState {
            node: NodeId(n),
            target: false,
        };
        r.add(s(0), ());
        r.add(s(1), ());
        r.add(s(2), ());
        r.add(s(1), ());
        assert_eq!(r.len(), 3);
        assert_eq!(r.pop_from_waitlist(), Some(s(2)));
        assert_eq!(r.reached(&s(1)), &[s(1)]);
        r.remove(&s(1));
        assert_eq!(r.last_state(), Some(&s(2)));
        assert_eq!(r.first_state(), Some(&s(0)));
        assert_eq!(r.pop_from_waitlist(), Some(s(0)));
        assert!(!r.has_waiting_state());
    }

    #[test]
    fn test_consistency_of_setup() {
        let (reached, _) = setup();
        reached.check_consistency();
    }

    #[test]
    fn test_remove_subtree() {
        let (mut reached, [root, a, b, c, d]) = setup();
        let removed = reached.remove_subtree(a, &|p: &Prec| {
            let mut p = p.clone();
            p.push("q");
            p
        });
        // d was covered by b and goes with it.
        assert_eq!(removed, vec![a, b, c, d]);
        assert_eq!(reached.reached().len(), 1);
        assert!(reached.reached().is_waiting(&reached.handle(root)));
        assert_eq!(reached.precision_of(root), Some(&vec!["p", "q"]));
        assert_eq!(reached.arg().borrow().len(), 1);
        assert!(reached.arg().borrow().node(root).children().is_empty());
        reached.check_consistency();
    }

    #[test]
    #[should_panic(expected = "May not remove the initial element")]
    fn test_remove_root_panics() {
        let (mut reached, [root, ..]) = setup();
        reached.remove_subtree(root, &|p: &Prec| p.clone());
    }

    #[test]
    fn test_update_precision_globally() {
        let (mut reached, [root, _, _, c, _]) = setup();
        reached.update_precision_globally(&|_| vec!["g"]);
        assert_eq!(reached.precision_of(root), Some(&vec!["g"]));
        assert_eq!(reached.precision_of(c), Some(&vec!["g"]));
    }

    #[test]
    #[should_panic(expected = "is missing in reached set")]
    fn test_inconsistent_reached_set_panics() {
        let (mut reached, [_, _, _, c, _]) = setup();
        let h = reached.handle(c);
        reached.reached_mut().remove(&h);
        reached.check_consistency();
    }
}
