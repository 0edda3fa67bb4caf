//! Control-flow automata.
//!
//! A [`Cfa`] is an immutable graph of program locations connected by edges
//! that carry one program operation each. Programs are boolean: assigned
//! values and assumed conditions are [`Formula`]s over uninstantiated program
//! variables. Function-local variables are conventionally named
//! `function::variable`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use log::debug;

use crate::formula::Formula;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(pub u32);

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "N{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EdgeId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    Blank,
    Assignment { variable: String, value: Formula },
    /// Assignment of a nondeterministic value.
    Havoc { variable: String },
    Assume { condition: Formula, truth: bool },
    FunctionCall { function: String },
    FunctionReturn { function: String },
    Summary { function: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfaEdge {
    pub id: EdgeId,
    pub predecessor: NodeId,
    pub successor: NodeId,
    pub kind: EdgeKind,
    /// Source text of the operation.
    pub raw: String,
    pub line: u32,
}

impl CfaEdge {
    pub fn is_assume(&self) -> bool {
        matches!(self.kind, EdgeKind::Assume { .. })
    }

    /// Condition and branch direction of an assume edge.
    pub fn assumption(&self) -> Option<(&Formula, bool)> {
        match &self.kind {
            EdgeKind::Assume { condition, truth } => Some((condition, *truth)),
            _ => None,
        }
    }
}

impl Display for CfaEdge {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -{{{}}}-> {}", self.predecessor, self.raw, self.successor)
    }
}

#[derive(Debug, Clone)]
pub struct CfaNode {
    pub id: NodeId,
    pub function: String,
    pub leaving: Vec<EdgeId>,
    pub entering: Vec<EdgeId>,
    pub leaving_summary: Option<EdgeId>,
    pub entering_summary: Option<EdgeId>,
    pub is_loop_head: bool,
    pub is_function_entry: bool,
}

/// A natural loop: the head and every node that can reach a back edge into
/// the head without passing through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loop {
    pub head: NodeId,
    pub body: BTreeSet<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Cfa {
    nodes: Vec<CfaNode>,
    edges: Vec<CfaEdge>,
    entry: NodeId,
    error_locations: BTreeSet<NodeId>,
    loops: Vec<Loop>,
}

impl Cfa {
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    pub fn node(&self, id: NodeId) -> &CfaNode {
        &self.nodes[id.0 as usize]
    }

    pub fn edge(&self, id: EdgeId) -> &CfaEdge {
        &self.edges[id.0 as usize]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CfaNode> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &CfaEdge> {
        self.edges.iter()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn function_of(&self, id: NodeId) -> &str {
        &self.node(id).function
    }

    pub fn leaving_edges(&self, id: NodeId) -> impl Iterator<Item = &CfaEdge> {
        self.node(id).leaving.iter().map(|&e| self.edge(e))
    }

    pub fn entering_edges(&self, id: NodeId) -> impl Iterator<Item = &CfaEdge> {
        self.node(id).entering.iter().map(|&e| self.edge(e))
    }

    pub fn leaving_summary_edge(&self, id: NodeId) -> Option<&CfaEdge> {
        self.node(id).leaving_summary.map(|e| self.edge(e))
    }

    pub fn is_error_location(&self, id: NodeId) -> bool {
        self.error_locations.contains(&id)
    }

    pub fn error_locations(&self) -> &BTreeSet<NodeId> {
        &self.error_locations
    }

    pub fn is_loop_head(&self, id: NodeId) -> bool {
        self.node(id).is_loop_head
    }

    pub fn is_function_entry(&self, id: NodeId) -> bool {
        self.node(id).is_function_entry
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    /// The innermost loop containing `id`, if any.
    pub fn loop_containing(&self, id: NodeId) -> Option<&Loop> {
        self.loops
            .iter()
            .filter(|l| l.body.contains(&id))
            .min_by_key(|l| l.body.len())
    }

    /// The edge connecting `from` to `to`.
    ///
    /// Forward edges are preferred; then an edge in the opposite direction;
    /// then a summary edge.
    pub fn edge_between(&self, from: NodeId, to: NodeId) -> Option<&CfaEdge> {
        if let Some(e) = self.leaving_edges(from).find(|e| e.successor == to) {
            return Some(e);
        }
        if let Some(e) = self.leaving_edges(to).find(|e| e.successor == from) {
            return Some(e);
        }
        self.leaving_summary_edge(from).filter(|e| e.successor == to)
    }
}

/// Incremental constructor for a [`Cfa`].
///
/// ```
/// use cegar_rs::cfa::CfaBuilder;
/// use cegar_rs::formula::Formula;
///
/// let mut b = CfaBuilder::new("main");
/// let entry = b.entry();
/// let then = b.node();
/// let other = b.node();
/// b.branch(entry, Formula::var("x"), then, other);
/// b.error(then);
/// let cfa = b.build();
/// assert_eq!(cfa.leaving_edges(entry).count(), 2);
/// assert!(cfa.is_error_location(then));
/// ```
#[derive(Debug)]
pub struct CfaBuilder {
    nodes: Vec<CfaNode>,
    edges: Vec<CfaEdge>,
    entry: NodeId,
    error_locations: BTreeSet<NodeId>,
    function: String,
}

impl CfaBuilder {
    /// Start a program whose entry node belongs to `function`.
    pub fn new(function: &str) -> Self {
        let mut builder = Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            entry: NodeId(0),
            error_locations: BTreeSet::new(),
            function: function.to_string(),
        };
        builder.entry = builder.function_entry(function);
        builder
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// New node in the current function.
    pub fn node(&mut self) -> NodeId {
        let function = self.function.clone();
        self.node_in(&function)
    }

    pub fn node_in(&mut self, function: &str) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(CfaNode {
            id,
            function: function.to_string(),
            leaving: Vec::new(),
            entering: Vec::new(),
            leaving_summary: None,
            entering_summary: None,
            is_loop_head: false,
            is_function_entry: false,
        });
        id
    }

    /// New entry node of `function`; subsequent [`node`][Self::node] calls belong to it.
    pub fn function_entry(&mut self, function: &str) -> NodeId {
        self.function = function.to_string();
        let id = self.node_in(function);
        self.nodes[id.0 as usize].is_function_entry = true;
        id
    }

    pub fn error(&mut self, node: NodeId) {
        self.error_locations.insert(node);
    }

    fn add_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind, raw: String) -> EdgeId {
        let id = EdgeId(self.edges.len() as u32);
        let is_summary = matches!(kind, EdgeKind::Summary { .. });
        self.edges.push(CfaEdge {
            id,
            predecessor: from,
            successor: to,
            kind,
            raw,
            line: id.0 + 1,
        });
        if is_summary {
            self.nodes[from.0 as usize].leaving_summary = Some(id);
            self.nodes[to.0 as usize].entering_summary = Some(id);
        } else {
            self.nodes[from.0 as usize].leaving.push(id);
            self.nodes[to.0 as usize].entering.push(id);
        }
        id
    }

    pub fn blank(&mut self, from: NodeId, to: NodeId, raw: &str) -> EdgeId {
        self.add_edge(from, to, EdgeKind::Blank, raw.to_string())
    }

    pub fn assign(&mut self, from: NodeId, to: NodeId, variable: &str, value: Formula) -> EdgeId {
        let raw = format!("{} = {};", variable, value);
        let kind = EdgeKind::Assignment {
            variable: variable.to_string(),
            value,
        };
        self.add_edge(from, to, kind, raw)
    }

    pub fn havoc(&mut self, from: NodeId, to: NodeId, variable: &str) -> EdgeId {
        let raw = format!("{} = __nondet();", variable);
        let kind = EdgeKind::Havoc {
            variable: variable.to_string(),
        };
        self.add_edge(from, to, kind, raw)
    }

    pub fn assume(&mut self, from: NodeId, to: NodeId, condition: Formula, truth: bool) -> EdgeId {
        let raw = if truth {
            format!("[{}]", condition)
        } else {
            format!("[!({})]", condition)
        };
        self.add_edge(from, to, EdgeKind::Assume { condition, truth }, raw)
    }

    /// Two complementary assume edges out of `from`; returns (then, else).
    pub fn branch(&mut self, from: NodeId, condition: Formula, then: NodeId, other: NodeId) -> (EdgeId, EdgeId) {
        let t = self.assume(from, then, condition.clone(), true);
        let e = self.assume(from, other, condition, false);
        (t, e)
    }

    pub fn call(&mut self, from: NodeId, to: NodeId, function: &str) -> EdgeId {
        let raw = format!("{}();", function);
        let kind = EdgeKind::FunctionCall {
            function: function.to_string(),
        };
        self.add_edge(from, to, kind, raw)
    }

    pub fn ret(&mut self, from: NodeId, to: NodeId, function: &str) -> EdgeId {
        let raw = format!("return from {}", function);
        let kind = EdgeKind::FunctionReturn {
            function: function.to_string(),
        };
        self.add_edge(from, to, kind, raw)
    }

    /// Summary edge from a call site to its return site.
    pub fn summary(&mut self, from: NodeId, to: NodeId, function: &str) -> EdgeId {
        let raw = format!("{}();", function);
        let kind = EdgeKind::Summary {
            function: function.to_string(),
        };
        self.add_edge(from, to, kind, raw)
    }

    pub fn build(mut self) -> Cfa {
        let back_edges = self.back_edges();
        let mut loops: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for (source, head) in back_edges {
            let body = loops.entry(head).or_default();
            body.insert(head);
            let mut stack = vec![source];
            while let Some(n) = stack.pop() {
                if body.insert(n) {
                    for &e in &self.nodes[n.0 as usize].entering {
                        stack.push(self.edges[e.0 as usize].predecessor);
                    }
                }
            }
        }
        for &head in loops.keys() {
            self.nodes[head.0 as usize].is_loop_head = true;
        }
        debug!("built CFA with {} nodes and {} loops", self.nodes.len(), loops.len());

        Cfa {
            nodes: self.nodes,
            edges: self.edges,
            entry: self.entry,
            error_locations: self.error_locations,
            loops: loops.into_iter().map(|(head, body)| Loop { head, body }).collect(),
        }
    }

    /// Edges closing a cycle in a depth-first traversal from the entry, as (source, head).
    fn back_edges(&self) -> Vec<(NodeId, NodeId)> {
        #[derive(Copy, Clone, PartialEq)]
        enum Mark {
            White,
            Grey,
            Black,
        }
        let mut mark = vec![Mark::White; self.nodes.len()];
        let mut result = Vec::new();
        // (node, index of next leaving edge)
        let mut stack = vec![(self.entry, 0usize)];
        mark[self.entry.0 as usize] = Mark::Grey;
        while let Some((n, i)) = stack.pop() {
            let leaving = &self.nodes[n.0 as usize].leaving;
            if i < leaving.len() {
                stack.push((n, i + 1));
                let succ = self.edges[leaving[i].0 as usize].successor;
                match mark[succ.0 as usize] {
                    Mark::White => {
                        mark[succ.0 as usize] = Mark::Grey;
                        stack.push((succ, 0));
                    }
                    Mark::Grey => result.push((n, succ)),
                    Mark::Black => {}
                }
            } else {
                mark[n.0 as usize] = Mark::Black;
            }
        }
        result
    }
}
