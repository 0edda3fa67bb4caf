//! Path formulas and SSA numbering.
//!
//! A [`PathFormula`] encodes the effect of a path segment as a formula over
//! SSA-indexed variables. The [`SsaMap`] records the current index of every
//! variable at the end of the segment.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use log::debug;

use crate::cfa::{CfaEdge, EdgeKind};
use crate::formula::{Formula, Variable};

/// Index of a variable that has not been assigned yet.
pub const DEFAULT_INDEX: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SsaMap {
    indices: BTreeMap<String, u32>,
}

impl SsaMap {
    pub fn get(&self, variable: &str) -> u32 {
        self.indices.get(variable).copied().unwrap_or(DEFAULT_INDEX)
    }

    pub fn set(&mut self, variable: &str, index: u32) {
        self.indices.insert(variable.to_string(), index);
    }

    /// Allocate the next index of `variable` and return it.
    pub fn bump(&mut self, variable: &str) -> u32 {
        let next = self.get(variable) + 1;
        self.set(variable, next);
        next
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.indices.contains_key(variable)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.indices.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// Point-wise maximum of two maps.
    pub fn merge(a: &SsaMap, b: &SsaMap) -> SsaMap {
        let mut result = a.clone();
        for (name, index) in b.iter() {
            if index > result.get(name) {
                result.set(name, index);
            }
        }
        result
    }
}

impl Display for SsaMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (name, index)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}@{}", name, index)?;
        }
        write!(f, "}}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathFormula {
    pub formula: Formula,
    pub ssa: SsaMap,
    /// Number of edges encoded.
    pub length: usize,
}

impl PathFormula {
    pub fn is_true(&self) -> bool {
        self.formula.is_true()
    }
}

impl Display for PathFormula {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.formula, self.ssa)
    }
}

/// Builds path formulas for boolean programs.
#[derive(Debug, Default)]
pub struct PathFormulaManager;

impl PathFormulaManager {
    pub fn new() -> Self {
        Self
    }

    pub fn make_empty(&self) -> PathFormula {
        PathFormula {
            formula: Formula::mk_true(),
            ssa: SsaMap::default(),
            length: 0,
        }
    }

    /// An empty path formula that continues the SSA numbering of `old`.
    pub fn make_empty_from(&self, old: &PathFormula) -> PathFormula {
        PathFormula {
            formula: Formula::mk_true(),
            ssa: old.ssa.clone(),
            length: 0,
        }
    }

    /// Extend `old` with the operation of `edge`.
    pub fn make_and_edge(&self, old: &PathFormula, edge: &CfaEdge) -> PathFormula {
        let mut ssa = old.ssa.clone();
        let constraint = match &edge.kind {
            EdgeKind::Assignment { variable, value } => {
                let value = value.instantiate(&ssa);
                let index = ssa.bump(variable);
                Formula::iff(Formula::indexed_var(variable, index), value)
            }
            EdgeKind::Havoc { variable } => {
                ssa.bump(variable);
                Formula::mk_true()
            }
            EdgeKind::Assume { condition, truth } => {
                let c = condition.instantiate(&ssa);
                if *truth {
                    c
                } else {
                    Formula::not(c)
                }
            }
            EdgeKind::Blank
            | EdgeKind::FunctionCall { .. }
            | EdgeKind::FunctionReturn { .. }
            | EdgeKind::Summary { .. } => Formula::mk_true(),
        };
        debug!("edge {}: {}", edge, constraint);
        PathFormula {
            formula: Formula::and(old.formula.clone(), constraint),
            ssa,
            length: old.length + 1,
        }
    }

    /// Conjoin an already instantiated formula.
    pub fn make_and(&self, old: &PathFormula, f: Formula) -> PathFormula {
        PathFormula {
            formula: Formula::and(old.formula.clone(), f),
            ssa: old.ssa.clone(),
            length: old.length,
        }
    }

    /// Disjunction of two path formulas.
    ///
    /// Where the SSA maps disagree, the branch with the lower index is padded
    /// so both branches end in the same numbering.
    pub fn make_or(&self, a: &PathFormula, b: &PathFormula) -> PathFormula {
        let ssa = SsaMap::merge(&a.ssa, &b.ssa);
        PathFormula {
            formula: Formula::or(self.pad_to(a, &ssa), self.pad_to(b, &ssa)),
            length: a.length.max(b.length),
            ssa,
        }
    }

    /// The formula of `pf`, extended by `x@own <-> x@high` for every variable
    /// whose index in `ssa` is higher than its own.
    pub fn pad_to(&self, pf: &PathFormula, ssa: &SsaMap) -> Formula {
        let equalities = ssa.iter().filter_map(|(name, index)| {
            let own = pf.ssa.get(name);
            (own < index).then(|| {
                Formula::iff(
                    Formula::of_variable(Variable::indexed(name, index)),
                    Formula::of_variable(Variable::indexed(name, own)),
                )
            })
        });
        Formula::and_all(std::iter::once(pf.formula.clone()).chain(equalities).collect::<Vec<_>>())
    }
}
