//! Boolean formulas over program variables.
//!
//! A [`Formula`] is an immutable, reference-counted term. Atoms are either
//! boolean variables or applications of an uninterpreted relation to
//! variables. Variables may carry an SSA index; a formula whose variables
//! carry no index is *uninstantiated* and talks about "the current value" of
//! each variable, while an instantiated formula talks about one specific
//! version of each variable along a path.
//!
//! ```
//! use cegar_rs::formula::Formula;
//! use cegar_rs::pathformula::SsaMap;
//!
//! let x = Formula::var("x");
//! let y = Formula::var("y");
//! let f = Formula::and(x.clone(), Formula::not(y));
//!
//! let mut ssa = SsaMap::default();
//! ssa.set("x", 3);
//! let g = f.instantiate(&ssa);
//! assert_eq!(g.to_string(), "(x@3 & !y@1)");
//! assert_eq!(g.uninstantiate(), f);
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Debug, Display};
use std::rc::Rc;

use crate::pathformula::SsaMap;

/// A (possibly SSA-indexed) program variable.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable {
    name: Rc<str>,
    index: Option<u32>,
}

impl Variable {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Rc::from(name.as_ref()),
            index: None,
        }
    }

    pub fn indexed(name: impl AsRef<str>, index: u32) -> Self {
        Self {
            name: Rc::from(name.as_ref()),
            index: Some(index),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> Option<u32> {
        self.index
    }

    pub fn with_index(&self, index: u32) -> Self {
        Self {
            name: self.name.clone(),
            index: Some(index),
        }
    }

    pub fn uninstantiated(&self) -> Self {
        Self {
            name: self.name.clone(),
            index: None,
        }
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}@{}", self.name, i),
            None => write!(f, "{}", self.name),
        }
    }
}

impl Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum Term {
    True,
    False,
    Var(Variable),
    Pred(Rc<str>, Vec<Variable>),
    Not(Formula),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Iff(Formula, Formula),
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Formula(Rc<Term>);

impl Formula {
    fn from_term(term: Term) -> Self {
        Self(Rc::new(term))
    }

    pub fn term(&self) -> &Term {
        &self.0
    }

    pub fn mk_true() -> Self {
        Self::from_term(Term::True)
    }

    pub fn mk_false() -> Self {
        Self::from_term(Term::False)
    }

    pub fn mk_bool(value: bool) -> Self {
        if value {
            Self::mk_true()
        } else {
            Self::mk_false()
        }
    }

    pub fn var(name: impl AsRef<str>) -> Self {
        Self::from_term(Term::Var(Variable::new(name)))
    }

    pub fn indexed_var(name: impl AsRef<str>, index: u32) -> Self {
        Self::from_term(Term::Var(Variable::indexed(name, index)))
    }

    pub fn of_variable(v: Variable) -> Self {
        Self::from_term(Term::Var(v))
    }

    /// Application of the uninterpreted relation `name` to `args`.
    pub fn pred(name: impl AsRef<str>, args: impl IntoIterator<Item = Variable>) -> Self {
        Self::from_term(Term::Pred(Rc::from(name.as_ref()), args.into_iter().collect()))
    }

    pub fn is_true(&self) -> bool {
        matches!(self.term(), Term::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self.term(), Term::False)
    }

    pub fn is_atom(&self) -> bool {
        matches!(self.term(), Term::Var(_) | Term::Pred(..))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(f: Formula) -> Formula {
        match f.term() {
            Term::True => Self::mk_false(),
            Term::False => Self::mk_true(),
            Term::Not(inner) => inner.clone(),
            _ => Self::from_term(Term::Not(f)),
        }
    }

    pub fn and(a: Formula, b: Formula) -> Formula {
        Self::and_all([a, b])
    }

    pub fn or(a: Formula, b: Formula) -> Formula {
        Self::or_all([a, b])
    }

    pub fn implies(a: Formula, b: Formula) -> Formula {
        Self::or(Self::not(a), b)
    }

    pub fn iff(a: Formula, b: Formula) -> Formula {
        if a == b {
            return Self::mk_true();
        }
        match (a.term(), b.term()) {
            (Term::True, _) => b,
            (_, Term::True) => a,
            (Term::False, _) => Self::not(b),
            (_, Term::False) => Self::not(a),
            _ => Self::from_term(Term::Iff(a, b)),
        }
    }

    /// Conjunction with flattening, unit propagation of constants and
    /// removal of duplicate conjuncts.
    pub fn and_all(items: impl IntoIterator<Item = Formula>) -> Formula {
        let mut parts: Vec<Formula> = Vec::new();
        let mut seen = BTreeSet::new();
        let mut stack: Vec<Formula> = items.into_iter().collect();
        stack.reverse();
        while let Some(f) = stack.pop() {
            match f.term() {
                Term::True => {}
                Term::False => return Self::mk_false(),
                Term::And(inner) => stack.extend(inner.iter().rev().cloned()),
                _ => {
                    if seen.contains(&Self::not(f.clone())) {
                        return Self::mk_false();
                    }
                    if seen.insert(f.clone()) {
                        parts.push(f);
                    }
                }
            }
        }
        match parts.len() {
            0 => Self::mk_true(),
            1 => parts.remove(0),
            _ => Self::from_term(Term::And(parts)),
        }
    }

    pub fn or_all(items: impl IntoIterator<Item = Formula>) -> Formula {
        let mut parts: Vec<Formula> = Vec::new();
        let mut seen = BTreeSet::new();
        let mut stack: Vec<Formula> = items.into_iter().collect();
        stack.reverse();
        while let Some(f) = stack.pop() {
            match f.term() {
                Term::False => {}
                Term::True => return Self::mk_true(),
                Term::Or(inner) => stack.extend(inner.iter().rev().cloned()),
                _ => {
                    if seen.contains(&Self::not(f.clone())) {
                        return Self::mk_true();
                    }
                    if seen.insert(f.clone()) {
                        parts.push(f);
                    }
                }
            }
        }
        match parts.len() {
            0 => Self::mk_false(),
            1 => parts.remove(0),
            _ => Self::from_term(Term::Or(parts)),
        }
    }

    /// If this formula is a negation, return the negated formula.
    pub fn strip_negation(&self) -> Option<&Formula> {
        match self.term() {
            Term::Not(inner) => Some(inner),
            _ => None,
        }
    }

    /// Rebuild the formula, mapping every variable through `map`.
    pub fn map_variables(&self, map: &dyn Fn(&Variable) -> Variable) -> Formula {
        let mut memo = HashMap::new();
        self.map_variables_rec(map, &mut memo)
    }

    fn map_variables_rec(
        &self,
        map: &dyn Fn(&Variable) -> Variable,
        memo: &mut HashMap<Formula, Formula>,
    ) -> Formula {
        if let Some(res) = memo.get(self) {
            return res.clone();
        }
        let res = match self.term() {
            Term::True | Term::False => self.clone(),
            Term::Var(v) => Self::of_variable(map(v)),
            Term::Pred(name, args) => Self::from_term(Term::Pred(name.clone(), args.iter().map(map).collect())),
            Term::Not(f) => Self::not(f.map_variables_rec(map, memo)),
            Term::And(fs) => Self::and_all(fs.iter().map(|f| f.map_variables_rec(map, memo)).collect::<Vec<_>>()),
            Term::Or(fs) => Self::or_all(fs.iter().map(|f| f.map_variables_rec(map, memo)).collect::<Vec<_>>()),
            Term::Iff(a, b) => Self::iff(a.map_variables_rec(map, memo), b.map_variables_rec(map, memo)),
        };
        memo.insert(self.clone(), res.clone());
        res
    }

    /// Attach the current SSA index from `ssa` to every variable that has none.
    pub fn instantiate(&self, ssa: &SsaMap) -> Formula {
        self.map_variables(&|v| match v.index() {
            Some(_) => v.clone(),
            None => v.with_index(ssa.get(v.name())),
        })
    }

    /// Drop all SSA indices.
    pub fn uninstantiate(&self) -> Formula {
        self.map_variables(&|v| v.uninstantiated())
    }

    /// All variables occurring in the formula, including relation arguments.
    pub fn variables(&self) -> BTreeSet<Variable> {
        let mut result = BTreeSet::new();
        self.visit(&mut |t| match t {
            Term::Var(v) => {
                result.insert(v.clone());
            }
            Term::Pred(_, args) => result.extend(args.iter().cloned()),
            _ => {}
        });
        result
    }

    /// Names of all variables, rendered with their SSA index (`x@2`) if present.
    pub fn variable_names(&self) -> BTreeSet<String> {
        self.variables().iter().map(|v| v.to_string()).collect()
    }

    /// All atoms (variables and relation applications), in order of first occurrence.
    pub fn atoms(&self) -> Vec<Formula> {
        let mut result = Vec::new();
        let mut seen = BTreeSet::new();
        self.visit_formulas(&mut |f| {
            if f.is_atom() && seen.insert(f.clone()) {
                result.push(f.clone());
            }
        });
        result
    }

    /// Whether the formula is a conjunction of literals and constants.
    pub fn is_purely_conjunctive(&self) -> bool {
        match self.term() {
            Term::True | Term::False | Term::Var(_) | Term::Pred(..) => true,
            Term::Not(f) => f.is_atom(),
            Term::And(fs) => fs.iter().all(|f| f.is_purely_conjunctive()),
            Term::Or(_) | Term::Iff(..) => false,
        }
    }

    /// Evaluate under an assignment of truth values to atoms.
    pub fn eval(&self, atom_value: &dyn Fn(&Formula) -> bool) -> bool {
        match self.term() {
            Term::True => true,
            Term::False => false,
            Term::Var(_) | Term::Pred(..) => atom_value(self),
            Term::Not(f) => !f.eval(atom_value),
            Term::And(fs) => fs.iter().all(|f| f.eval(atom_value)),
            Term::Or(fs) => fs.iter().any(|f| f.eval(atom_value)),
            Term::Iff(a, b) => a.eval(atom_value) == b.eval(atom_value),
        }
    }

    /// Number of nodes in the term tree.
    pub fn size(&self) -> usize {
        let mut count = 0;
        self.visit(&mut |_| count += 1);
        count
    }

    fn visit(&self, callback: &mut dyn FnMut(&Term)) {
        self.visit_formulas(&mut |f| callback(f.term()));
    }

    fn visit_formulas(&self, callback: &mut dyn FnMut(&Formula)) {
        let mut stack = vec![self];
        while let Some(f) = stack.pop() {
            callback(f);
            match f.term() {
                Term::Not(g) => stack.push(g),
                Term::And(gs) | Term::Or(gs) => stack.extend(gs.iter().rev()),
                Term::Iff(a, b) => {
                    stack.push(b);
                    stack.push(a);
                }
                _ => {}
            }
        }
    }
}

impl Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.term() {
            Term::True => write!(f, "true"),
            Term::False => write!(f, "false"),
            Term::Var(v) => write!(f, "{}", v),
            Term::Pred(name, args) => {
                write!(f, "{}(", name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            Term::Not(g) => write!(f, "!{}", g),
            Term::And(gs) | Term::Or(gs) => {
                let op = if matches!(self.term(), Term::And(_)) { " & " } else { " | " };
                write!(f, "(")?;
                for (i, g) in gs.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", op)?;
                    }
                    write!(f, "{}", g)?;
                }
                write!(f, ")")
            }
            Term::Iff(a, b) => write!(f, "({} <-> {})", a, b),
        }
    }
}

impl Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}
