//! Decision-diagram regions.
//!
//! A [`RegionManager`] owns a table of hash-consed decision nodes with
//! complemented edges. Regions are compact, canonical representations of
//! boolean functions over *region variables*; the abstraction engine assigns
//! one region variable per predicate, so a region is a boolean combination of
//! predicates.
//!
//! Variables are numbered from 1. A smaller variable is closer to the root.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Debug, Formatter};

use log::debug;
use num_bigint::BigUint;

use crate::cache::OpCache;
use crate::formula::{Formula, Term};
use crate::reference::Region;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct Node {
    variable: u32,
    low: Region,
    high: Region,
}

pub struct RegionManager {
    nodes: RefCell<Vec<Node>>,
    unique: RefCell<HashMap<Node, u32>>,
    ite_cache: RefCell<OpCache<(Region, Region, Region), Region>>,
    num_vars: Cell<u32>,
    one: Region,
    zero: Region,
}

impl RegionManager {
    pub fn new(cache_bits: usize) -> Self {
        // Slot 0 is unused so that every index can be negated. Slot 1 is the terminal.
        let sentinel = Node {
            variable: 0,
            low: Region::new(0),
            high: Region::new(0),
        };
        let one = Region::new(1);
        Self {
            nodes: RefCell::new(vec![sentinel, sentinel]),
            unique: RefCell::new(HashMap::new()),
            ite_cache: RefCell::new(OpCache::new(cache_bits)),
            num_vars: Cell::new(0),
            one,
            zero: -one,
        }
    }
}

impl Default for RegionManager {
    fn default() -> Self {
        RegionManager::new(16)
    }
}

impl Debug for RegionManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionManager")
            .field("nodes", &self.num_nodes())
            .field("vars", &self.num_vars())
            .finish()
    }
}

impl RegionManager {
    pub fn one(&self) -> Region {
        self.one
    }
    pub fn zero(&self) -> Region {
        self.zero
    }
    pub fn constant(&self, value: bool) -> Region {
        if value {
            self.one
        } else {
            self.zero
        }
    }

    pub fn is_one(&self, r: Region) -> bool {
        r == self.one
    }
    pub fn is_zero(&self, r: Region) -> bool {
        r == self.zero
    }
    pub fn is_terminal(&self, r: Region) -> bool {
        r.index() == 1
    }

    /// Number of allocated decision nodes, including the terminal.
    pub fn num_nodes(&self) -> usize {
        self.nodes.borrow().len() - 1
    }

    pub fn num_vars(&self) -> u32 {
        self.num_vars.get()
    }

    pub fn ite_cache_hits(&self) -> usize {
        self.ite_cache.borrow().hits()
    }

    /// Variable labelling the root node of `r` (0 for terminals).
    pub fn variable(&self, r: Region) -> u32 {
        self.nodes.borrow()[r.index()].variable
    }

    pub fn low(&self, r: Region) -> Region {
        let low = self.nodes.borrow()[r.index()].low;
        if r.is_negated() {
            -low
        } else {
            low
        }
    }

    pub fn high(&self, r: Region) -> Region {
        let high = self.nodes.borrow()[r.index()].high;
        if r.is_negated() {
            -high
        } else {
            high
        }
    }

    /// Allocate a fresh variable and return the region `v`.
    pub fn new_variable(&self) -> Region {
        let v = self.num_vars.get() + 1;
        self.num_vars.set(v);
        self.var(v)
    }

    pub fn var(&self, v: u32) -> Region {
        assert_ne!(v, 0, "Variable index should not be zero");
        if v > self.num_vars.get() {
            self.num_vars.set(v);
        }
        self.mk_node(v, self.zero, self.one)
    }

    pub fn mk_node(&self, v: u32, low: Region, high: Region) -> Region {
        assert_ne!(v, 0, "Variable index should not be zero");

        // Keep the high edge regular.
        if high.is_negated() {
            return -self.mk_node(v, -low, -high);
        }
        if low == high {
            return low;
        }

        let node = Node { variable: v, low, high };
        if let Some(&i) = self.unique.borrow().get(&node) {
            return Region::new(i);
        }
        let mut nodes = self.nodes.borrow_mut();
        let i = nodes.len() as u32;
        nodes.push(node);
        self.unique.borrow_mut().insert(node, i);
        Region::new(i)
    }

    fn top_cofactors(&self, r: Region, v: u32) -> (Region, Region) {
        if self.is_terminal(r) || v < self.variable(r) {
            return (r, r);
        }
        debug_assert_eq!(v, self.variable(r));
        (self.low(r), self.high(r))
    }

    /// `ite(f, g, h) = (f & g) | (!f & h)`.
    pub fn ite(&self, f: Region, g: Region, h: Region) -> Region {
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }

        // Standard triples.
        if g == f {
            return self.ite(f, self.one, h);
        }
        if h == f {
            return self.ite(f, g, self.zero);
        }
        if g == -f {
            return self.ite(f, self.zero, h);
        }
        if h == -f {
            return self.ite(f, g, self.one);
        }

        let i = self.variable(f);
        let j = self.variable(g);
        let k = self.variable(h);

        // Prefer the operand with the smallest top variable as the condition.
        if self.is_one(g) && k != 0 && k < i {
            return self.ite(h, self.one, f);
        }
        if self.is_zero(h) && j != 0 && j < i {
            return self.ite(g, f, self.zero);
        }
        if self.is_one(h) && j != 0 && j < i {
            return self.ite(-g, -f, self.one);
        }
        if self.is_zero(g) && k != 0 && k < i {
            return self.ite(-h, self.zero, -f);
        }

        let (mut f, mut g, mut h) = (f, g, h);
        if f.is_negated() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }
        let negate = g.is_negated();
        if negate {
            g = -g;
            h = -h;
        }

        let key = (f, g, h);
        if let Some(res) = self.ite_cache.borrow().get(&key) {
            return if negate { -res } else { res };
        }

        let mut m = i;
        if j != 0 {
            m = m.min(j);
        }
        if k != 0 {
            m = m.min(k);
        }

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);
        let e = self.ite(f0, g0, h0);
        let t = self.ite(f1, g1, h1);
        let res = self.mk_node(m, e, t);
        self.ite_cache.borrow_mut().insert(key, res);

        if negate {
            -res
        } else {
            res
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(&self, f: Region) -> Region {
        -f
    }
    pub fn and(&self, f: Region, g: Region) -> Region {
        self.ite(f, g, self.zero)
    }
    pub fn or(&self, f: Region, g: Region) -> Region {
        self.ite(f, self.one, g)
    }
    pub fn xor(&self, f: Region, g: Region) -> Region {
        self.ite(f, -g, g)
    }
    pub fn iff(&self, f: Region, g: Region) -> Region {
        self.ite(f, g, -g)
    }
    pub fn imply(&self, f: Region, g: Region) -> Region {
        self.ite(f, g, self.one)
    }

    pub fn and_many(&self, regions: impl IntoIterator<Item = Region>) -> Region {
        let mut res = self.one;
        for r in regions {
            res = self.and(res, r);
            if self.is_zero(res) {
                break;
            }
        }
        res
    }

    pub fn or_many(&self, regions: impl IntoIterator<Item = Region>) -> Region {
        let mut res = self.zero;
        for r in regions {
            res = self.or(res, r);
            if self.is_one(res) {
                break;
            }
        }
        res
    }

    /// Whether every assignment satisfying `f` also satisfies `g`.
    pub fn entails(&self, f: Region, g: Region) -> bool {
        self.is_zero(self.and(f, -g))
    }

    /// Cofactor of `f` with `v` fixed to `value`.
    pub fn restrict(&self, f: Region, v: u32, value: bool) -> Region {
        let mut memo = HashMap::new();
        self.restrict_rec(f, v, value, &mut memo)
    }

    fn restrict_rec(&self, f: Region, v: u32, value: bool, memo: &mut HashMap<Region, Region>) -> Region {
        if self.is_terminal(f) || self.variable(f) > v {
            return f;
        }
        if let Some(&res) = memo.get(&f) {
            return res;
        }
        let res = if self.variable(f) == v {
            if value {
                self.high(f)
            } else {
                self.low(f)
            }
        } else {
            let low = self.restrict_rec(self.low(f), v, value, memo);
            let high = self.restrict_rec(self.high(f), v, value, memo);
            self.mk_node(self.variable(f), low, high)
        };
        memo.insert(f, res);
        res
    }

    pub fn exists(&self, f: Region, v: u32) -> Region {
        self.exists_many(f, &BTreeSet::from([v]))
    }

    /// Existentially quantify all variables in `vars` out of `f`.
    pub fn exists_many(&self, f: Region, vars: &BTreeSet<u32>) -> Region {
        let Some(&last) = vars.last() else {
            return f;
        };
        let mut memo = HashMap::new();
        let res = self.exists_rec(f, vars, last, &mut memo);
        debug!("exists({}, {:?}) = {}", f, vars, res);
        res
    }

    fn exists_rec(&self, f: Region, vars: &BTreeSet<u32>, last: u32, memo: &mut HashMap<Region, Region>) -> Region {
        if self.is_terminal(f) || self.variable(f) > last {
            return f;
        }
        if let Some(&res) = memo.get(&f) {
            return res;
        }
        let v = self.variable(f);
        let low = self.exists_rec(self.low(f), vars, last, memo);
        let high = self.exists_rec(self.high(f), vars, last, memo);
        let res = if vars.contains(&v) {
            self.or(low, high)
        } else {
            self.mk_node(v, low, high)
        };
        memo.insert(f, res);
        res
    }

    /// Variables `f` depends on.
    pub fn support(&self, f: Region) -> BTreeSet<u32> {
        let mut result = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut stack = vec![f.regular()];
        while let Some(r) = stack.pop() {
            if self.is_terminal(r) || !visited.insert(r.index()) {
                continue;
            }
            result.insert(self.variable(r));
            stack.push(self.low(r).regular());
            stack.push(self.high(r).regular());
        }
        result
    }

    /// Number of distinct nodes in `f`, including the terminal.
    pub fn size(&self, f: Region) -> usize {
        let mut visited = BTreeSet::new();
        let mut stack = vec![f.regular()];
        while let Some(r) = stack.pop() {
            if !visited.insert(r.index()) || self.is_terminal(r) {
                continue;
            }
            stack.push(self.low(r).regular());
            stack.push(self.high(r).regular());
        }
        visited.len()
    }

    /// Number of satisfying assignments of `f` over `num_vars` variables.
    pub fn sat_count(&self, f: Region, num_vars: u32) -> BigUint {
        let max = BigUint::from(1u32) << num_vars;
        let mut memo = HashMap::new();
        self.sat_count_rec(f, &max, &mut memo)
    }

    fn sat_count_rec(&self, f: Region, max: &BigUint, memo: &mut HashMap<usize, BigUint>) -> BigUint {
        if self.is_zero(f) {
            return BigUint::from(0u32);
        }
        if self.is_one(f) {
            return max.clone();
        }
        let count = match memo.get(&f.index()) {
            Some(c) => c.clone(),
            None => {
                let r = f.regular();
                let low = self.sat_count_rec(self.low(r), max, memo);
                let high = self.sat_count_rec(self.high(r), max, memo);
                let c: BigUint = (low + high) >> 1;
                memo.insert(f.index(), c.clone());
                c
            }
        };
        if f.is_negated() {
            max - count
        } else {
            count
        }
    }

    /// Evaluate `f` under a total assignment of its variables.
    pub fn eval(&self, f: Region, assignment: &dyn Fn(u32) -> bool) -> bool {
        let mut r = f;
        while !self.is_terminal(r) {
            r = if assignment(self.variable(r)) {
                self.high(r)
            } else {
                self.low(r)
            };
        }
        self.is_one(r)
    }

    /// Iterate over the paths to `one`, each as a list of `(variable, value)` literals.
    pub fn cubes(&self, f: Region) -> Cubes<'_> {
        Cubes {
            manager: self,
            stack: vec![(f, None, 0)],
            path: Vec::new(),
        }
    }

    pub fn cube(&self, literals: &[(u32, bool)]) -> Region {
        let mut sorted = literals.to_vec();
        sorted.sort_by_key(|&(v, _)| std::cmp::Reverse(v));
        let mut current = self.one;
        for (v, value) in sorted {
            current = if value {
                self.mk_node(v, self.zero, current)
            } else {
                self.mk_node(v, current, self.zero)
            };
        }
        current
    }

    /// Convert `f` into a formula, mapping each variable through `atom_of`.
    pub fn to_formula(&self, f: Region, atom_of: &dyn Fn(u32) -> Formula) -> Formula {
        let mut memo = HashMap::new();
        self.to_formula_rec(f, atom_of, &mut memo)
    }

    fn to_formula_rec(
        &self,
        f: Region,
        atom_of: &dyn Fn(u32) -> Formula,
        memo: &mut HashMap<Region, Formula>,
    ) -> Formula {
        if self.is_terminal(f) {
            return Formula::mk_bool(self.is_one(f));
        }
        if f.is_negated() {
            return Formula::not(self.to_formula_rec(-f, atom_of, memo));
        }
        if let Some(res) = memo.get(&f) {
            return res.clone();
        }
        let atom = atom_of(self.variable(f));
        let high = self.to_formula_rec(self.high(f), atom_of, memo);
        let low = self.to_formula_rec(self.low(f), atom_of, memo);
        let res = Formula::or(Formula::and(atom.clone(), high), Formula::and(Formula::not(atom), low));
        memo.insert(f, res.clone());
        res
    }

    /// Convert a formula into a region, mapping each atom through `var_of`.
    pub fn from_formula(&self, f: &Formula, var_of: &mut dyn FnMut(&Formula) -> Region) -> Region {
        match f.term() {
            Term::True => self.one,
            Term::False => self.zero,
            Term::Var(_) | Term::Pred(..) => var_of(f),
            Term::Not(g) => -self.from_formula(g, var_of),
            Term::And(gs) => {
                let mut res = self.one;
                for g in gs {
                    res = self.and(res, self.from_formula(g, var_of));
                }
                res
            }
            Term::Or(gs) => {
                let mut res = self.zero;
                for g in gs {
                    res = self.or(res, self.from_formula(g, var_of));
                }
                res
            }
            Term::Iff(a, b) => {
                let a = self.from_formula(a, var_of);
                let b = self.from_formula(b, var_of);
                self.iff(a, b)
            }
        }
    }

    pub fn builder(&self) -> RegionBuilder<'_> {
        RegionBuilder {
            manager: self,
            cube: self.one,
            result: self.zero,
        }
    }
}

/// Depth-first iterator over the cubes of a region.
pub struct Cubes<'a> {
    manager: &'a RegionManager,
    // (node, literal leading to it, path length before that literal)
    stack: Vec<(Region, Option<(u32, bool)>, usize)>,
    path: Vec<(u32, bool)>,
}

impl Iterator for Cubes<'_> {
    type Item = Vec<(u32, bool)>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((node, literal, depth)) = self.stack.pop() {
            self.path.truncate(depth);
            if let Some(lit) = literal {
                self.path.push(lit);
            }
            if self.manager.is_zero(node) {
                continue;
            }
            if self.manager.is_one(node) {
                return Some(self.path.clone());
            }
            let v = self.manager.variable(node);
            let depth = self.path.len();
            self.stack.push((self.manager.low(node), Some((v, false)), depth));
            self.stack.push((self.manager.high(node), Some((v, true)), depth));
        }
        None
    }
}

/// Accumulates a disjunction of cubes, one literal at a time.
pub struct RegionBuilder<'a> {
    manager: &'a RegionManager,
    cube: Region,
    result: Region,
}

impl RegionBuilder<'_> {
    pub fn start_new_conjunction(&mut self) {
        self.cube = self.manager.one;
    }

    pub fn add_positive(&mut self, r: Region) {
        self.cube = self.manager.and(self.cube, r);
    }

    pub fn add_negative(&mut self, r: Region) {
        self.cube = self.manager.and(self.cube, -r);
    }

    pub fn finish_conjunction(&mut self) {
        self.result = self.manager.or(self.result, self.cube);
        self.cube = self.manager.one;
    }

    pub fn result(&self) -> Region {
        self.result
    }
}
