//! Predicate precisions.
//!
//! Predicates are attached at four scopes: a location instance (a location
//! together with how often it was visited on the path), a location, a
//! function, or globally. A lookup returns the union of all scopes that apply.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use crate::cfa::NodeId;
use crate::predicate::manager::AbstractionPredicate;

type Predicates = BTreeSet<AbstractionPredicate>;

/// An immutable-by-convention set of predicates. Every `add_*` returns a new precision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredicatePrecision {
    location_instance: BTreeMap<(NodeId, usize), Predicates>,
    location: BTreeMap<NodeId, Predicates>,
    function: BTreeMap<String, Predicates>,
    global: Predicates,
}

impl PredicatePrecision {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.location_instance.is_empty() && self.location.is_empty() && self.function.is_empty() && self.global.is_empty()
    }

    /// All predicates for the `instance`-th visit of `location` in `function`.
    pub fn predicates(&self, location: NodeId, function: &str, instance: usize) -> Predicates {
        let mut result = self.global.clone();
        if let Some(p) = self.function.get(function) {
            result.extend(p.iter().cloned());
        }
        if let Some(p) = self.location.get(&location) {
            result.extend(p.iter().cloned());
        }
        if let Some(p) = self.location_instance.get(&(location, instance)) {
            result.extend(p.iter().cloned());
        }
        result
    }

    pub fn global_predicates(&self) -> &Predicates {
        &self.global
    }

    pub fn function_predicates(&self) -> &BTreeMap<String, Predicates> {
        &self.function
    }

    pub fn local_predicates(&self) -> &BTreeMap<NodeId, Predicates> {
        &self.location
    }

    pub fn location_instance_predicates(&self) -> &BTreeMap<(NodeId, usize), Predicates> {
        &self.location_instance
    }

    pub fn add_global(&self, predicates: impl IntoIterator<Item = AbstractionPredicate>) -> Self {
        let mut result = self.clone();
        result.global.extend(predicates);
        result
    }

    pub fn add_function(&self, predicates: impl IntoIterator<Item = (String, AbstractionPredicate)>) -> Self {
        let mut result = self.clone();
        for (function, p) in predicates {
            result.function.entry(function).or_default().insert(p);
        }
        result
    }

    pub fn add_local(&self, predicates: impl IntoIterator<Item = (NodeId, AbstractionPredicate)>) -> Self {
        let mut result = self.clone();
        for (location, p) in predicates {
            result.location.entry(location).or_default().insert(p);
        }
        result
    }

    pub fn add_location_instance(
        &self,
        predicates: impl IntoIterator<Item = ((NodeId, usize), AbstractionPredicate)>,
    ) -> Self {
        let mut result = self.clone();
        for (key, p) in predicates {
            result.location_instance.entry(key).or_default().insert(p);
        }
        result
    }

    /// Union of both precisions, scope by scope.
    pub fn merge_with(&self, other: &PredicatePrecision) -> Self {
        self.add_global(other.global.iter().cloned())
            .add_function(flatten(&other.function))
            .add_local(flatten(&other.location))
            .add_location_instance(flatten(&other.location_instance))
    }

    /// Number of entries of `self` that are missing in `other`.
    ///
    /// Zero means `other` contains everything `self` contains.
    pub fn calculate_difference_to(&self, other: &PredicatePrecision) -> usize {
        fn missing<K: Ord>(a: &BTreeMap<K, Predicates>, b: &BTreeMap<K, Predicates>) -> usize {
            a.iter()
                .map(|(k, ps)| match b.get(k) {
                    Some(other) => ps.difference(other).count(),
                    None => ps.len(),
                })
                .sum()
        }
        self.global.difference(&other.global).count()
            + missing(&self.function, &other.function)
            + missing(&self.location, &other.location)
            + missing(&self.location_instance, &other.location_instance)
    }

    /// Keep only predicates accepted by `keep`; scopes left empty are dropped.
    pub fn filter(&self, keep: &dyn Fn(&AbstractionPredicate) -> bool) -> Self {
        fn retain<K: Ord + Clone>(
            m: &BTreeMap<K, Predicates>,
            keep: &dyn Fn(&AbstractionPredicate) -> bool,
        ) -> BTreeMap<K, Predicates> {
            m.iter()
                .map(|(k, ps)| (k.clone(), ps.iter().filter(|p| keep(p)).cloned().collect::<Predicates>()))
                .filter(|(_, ps)| !ps.is_empty())
                .collect()
        }
        Self {
            location_instance: retain(&self.location_instance, keep),
            location: retain(&self.location, keep),
            function: retain(&self.function, keep),
            global: self.global.iter().filter(|p| keep(p)).cloned().collect(),
        }
    }

    /// Total number of (scope, predicate) entries.
    pub fn len(&self) -> usize {
        self.global.len()
            + self.function.values().map(BTreeSet::len).sum::<usize>()
            + self.location.values().map(BTreeSet::len).sum::<usize>()
            + self.location_instance.values().map(BTreeSet::len).sum::<usize>()
    }
}

fn flatten<K: Clone>(m: &BTreeMap<K, Predicates>) -> Vec<(K, AbstractionPredicate)> {
    m.iter()
        .flat_map(|(k, ps)| ps.iter().map(move |p| (k.clone(), p.clone())))
        .collect()
}

impl Display for PredicatePrecision {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let list = |ps: &Predicates| ps.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ");
        writeln!(f, "global: [{}]", list(&self.global))?;
        for (function, ps) in &self.function {
            writeln!(f, "{}: [{}]", function, list(ps))?;
        }
        for (location, ps) in &self.location {
            writeln!(f, "{}: [{}]", location, list(ps))?;
        }
        for ((location, instance), ps) in &self.location_instance {
            writeln!(f, "{}#{}: [{}]", location, instance, list(ps))?;
        }
        Ok(())
    }
}
