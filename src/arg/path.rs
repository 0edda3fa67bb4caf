//! Path reconstruction through the ARG.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use log::debug;

use crate::arg::{Arg, StateId};
use crate::cfa::{Cfa, CfaEdge};
use crate::cpa::AbstractState;
use crate::error::PathError;

/// A sequence of ARG states from a root towards some state, together with
/// the CFA edge between each consecutive pair.
///
/// `edges[i]` connects `states[i]` and `states[i + 1]`; it is `None` when the
/// states carry no location or no edge connects their locations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgPath {
    states: Vec<StateId>,
    edges: Vec<Option<CfaEdge>>,
}

impl ArgPath {
    pub fn states(&self) -> &[StateId] {
        &self.states
    }

    pub fn edges(&self) -> &[Option<CfaEdge>] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn first(&self) -> Option<StateId> {
        self.states.first().copied()
    }

    pub fn last(&self) -> Option<StateId> {
        self.states.last().copied()
    }

    /// The edges that exist, in path order.
    pub fn full_edges(&self) -> impl Iterator<Item = &CfaEdge> {
        self.edges.iter().flatten()
    }

    /// Raw text of every edge; two paths over the same program text compare equal.
    pub fn edge_texts(&self) -> Vec<String> {
        self.full_edges().map(|e| e.raw.clone()).collect()
    }

    fn from_states<S: AbstractState>(arg: &Arg<S>, cfa: &Cfa, states: Vec<StateId>) -> Self {
        let edges = states
            .windows(2)
            .map(|w| edge_between_states(arg, cfa, w[0], w[1]))
            .collect();
        Self { states, edges }
    }
}

impl Display for ArgPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, s) in self.states.iter().enumerate() {
            if i > 0 {
                match &self.edges[i - 1] {
                    Some(e) => write!(f, " -{{{}}}-> ", e.raw)?,
                    None => write!(f, " -> ")?,
                }
            }
            write!(f, "ARG{}", s)?;
        }
        Ok(())
    }
}

/// The CFA edge leading from the location of `parent` to that of `child`.
pub fn edge_between_states<S: AbstractState>(
    arg: &Arg<S>,
    cfa: &Cfa,
    parent: StateId,
    child: StateId,
) -> Option<CfaEdge> {
    let from = arg.location(parent)?;
    let to = arg.location(child)?;
    cfa.edge_between(from, to).cloned()
}

/// States without parents.
pub fn root_states<S>(arg: &Arg<S>) -> Vec<StateId> {
    arg.ids().filter(|&id| arg.node(id).parents().is_empty()).collect()
}

/// One path from a root to `target`.
///
/// At every step the first parent not visited yet is taken; if all parents
/// were visited, the last one is.
pub fn path_to<S: AbstractState>(arg: &Arg<S>, cfa: &Cfa, target: StateId) -> ArgPath {
    walk_parents(arg, cfa, target, None)
}

/// Like [`path_to`], but stops after walking `limit` parents. The result
/// starts wherever the walk stopped.
pub fn path_to_bounded<S: AbstractState>(arg: &Arg<S>, cfa: &Cfa, target: StateId, limit: usize) -> ArgPath {
    walk_parents(arg, cfa, target, Some(limit))
}

fn walk_parents<S: AbstractState>(arg: &Arg<S>, cfa: &Cfa, target: StateId, limit: Option<usize>) -> ArgPath {
    let mut states = vec![target];
    let mut seen = BTreeSet::from([target]);
    let mut current = target;
    let mut depth = 0;
    while !arg.node(current).parents().is_empty() {
        if limit.is_some_and(|l| depth >= l) {
            break;
        }
        let parents = arg.node(current).parents();
        let parent = parents
            .iter()
            .copied()
            .find(|p| !seen.contains(p))
            .unwrap_or(parents[parents.len() - 1]);
        seen.insert(parent);
        states.push(parent);
        current = parent;
        depth += 1;
    }
    states.reverse();
    debug!("path to {} has {} states", target, states.len());
    ArgPath::from_states(arg, cfa, states)
}

/// Follow the ARG from `root` until a target state is reached.
///
/// Where the ARG branches on a pair of complementary assume edges,
/// `directions` says which branch to take. Every chosen state has to be in
/// `allowed`.
pub fn path_from_branching_information<S: AbstractState>(
    arg: &Arg<S>,
    cfa: &Cfa,
    root: StateId,
    allowed: &BTreeSet<StateId>,
    directions: &BTreeMap<StateId, bool>,
) -> Result<ArgPath, PathError> {
    let mut states = vec![root];
    let mut edges = Vec::new();
    let mut current = root;

    while !arg.is_target(current) {
        let children = arg.node(current).children();
        let (child, edge) = match children.len() {
            0 => return Err(PathError::NoTarget),
            1 => {
                let child = children[0];
                (child, edge_between_states(arg, cfa, current, child))
            }
            2 => choose_branch(arg, cfa, current, allowed, directions)?,
            _ => {
                let child = only_allowed(children, allowed).ok_or(PathError::TooManyBranches)?;
                (child, edge_between_states(arg, cfa, current, child))
            }
        };
        if !allowed.contains(&child) {
            return Err(PathError::DirectionDisagrees);
        }
        states.push(child);
        edges.push(edge);
        current = child;
    }

    Ok(ArgPath { states, edges })
}

/// Like [`path_from_branching_information`], but the path has to end in `target`.
pub fn path_from_branching_information_to_target<S: AbstractState>(
    arg: &Arg<S>,
    cfa: &Cfa,
    root: StateId,
    target: StateId,
    allowed: &BTreeSet<StateId>,
    directions: &BTreeMap<StateId, bool>,
) -> Result<ArgPath, PathError> {
    let path = path_from_branching_information(arg, cfa, root, allowed, directions)?;
    if path.last() != Some(target) {
        return Err(PathError::WrongTarget);
    }
    Ok(path)
}

fn only_allowed(children: &[StateId], allowed: &BTreeSet<StateId>) -> Option<StateId> {
    let mut candidates = children.iter().filter(|c| allowed.contains(c));
    match (candidates.next(), candidates.next()) {
        (Some(&c), None) => Some(c),
        _ => None,
    }
}

fn choose_branch<S: AbstractState>(
    arg: &Arg<S>,
    cfa: &Cfa,
    current: StateId,
    allowed: &BTreeSet<StateId>,
    directions: &BTreeMap<StateId, bool>,
) -> Result<(StateId, Option<CfaEdge>), PathError> {
    let children = arg.node(current).children();
    let all_assume = match arg.location(current) {
        Some(loc) => cfa.leaving_edges(loc).all(|e| e.is_assume()),
        None => false,
    };
    if !all_assume {
        let child = only_allowed(children, allowed).ok_or(PathError::NoAssumeEdge)?;
        return Ok((child, edge_between_states(arg, cfa, current, child)));
    }

    let mut true_branch = None;
    let mut false_branch = None;
    for &child in children {
        let edge = edge_between_states(arg, cfa, current, child);
        match edge.as_ref().and_then(|e| e.assumption()).map(|(_, truth)| truth) {
            Some(true) => true_branch = Some((child, edge)),
            Some(false) => false_branch = Some((child, edge)),
            None => {}
        }
    }
    let (Some(t), Some(f)) = (true_branch, false_branch) else {
        return Err(PathError::NonComplementaryAssumeEdges);
    };
    match directions.get(&current) {
        Some(true) => Ok((t.0, t.1)),
        Some(false) => Ok((f.0, f.1)),
        None => Err(PathError::MissingDirection),
    }
}
