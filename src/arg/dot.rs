//! ARG to DOT (Graphviz) conversion.
//!
//! Conventions of the generated graph:
//! - every ARG state is a filled box labelled with its id, its location and
//!   the label of the wrapped state;
//! - covered states are green, target states red, states that were never
//!   expanded orange and highlighted states blue;
//! - solid edges are parent/child links labelled with the CFA edge,
//!   dashed edges point from a covered state to the state covering it.
//!
//! # Examples
//!
//! ```
//! use cegar_rs::arg::dot::{to_dot, ArgView};
//! use cegar_rs::arg::Arg;
//! use cegar_rs::cpa::AbstractState;
//!
//! #[derive(Debug, Clone)]
//! struct Named(&'static str);
//! impl AbstractState for Named {}
//!
//! let mut arg = Arg::new();
//! let root = arg.create_root(Named("root"));
//! arg.create_successor(root, Named("child"));
//!
//! let dot = to_dot(&ArgView::new(&arg, None), &|_, _| false).unwrap();
//! assert!(dot.starts_with("digraph ARG {"));
//! ```

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::arg::{Arg, StateId};
use crate::cfa::Cfa;
use crate::cpa::AbstractState;

/// What an exporter needs to know about an ARG.
pub trait ArgTraversal {
    fn roots(&self) -> Vec<StateId>;

    fn successors_of(&self, id: StateId) -> Vec<StateId>;

    /// States covered by `id`.
    fn covered_by(&self, id: StateId) -> Vec<StateId>;

    fn is_covered(&self, id: StateId) -> bool;

    fn is_target(&self, id: StateId) -> bool;

    fn was_expanded(&self, id: StateId) -> bool;

    fn should_highlight(&self, id: StateId) -> bool;

    fn label(&self, id: StateId) -> String;

    /// Description of the CFA edge between a state and its child.
    fn edge_label(&self, from: StateId, to: StateId) -> Option<String>;
}

/// An [`ArgTraversal`] over an arena, optionally resolving CFA edges.
pub struct ArgView<'a, S> {
    arg: &'a Arg<S>,
    cfa: Option<&'a Cfa>,
}

impl<'a, S> ArgView<'a, S> {
    pub fn new(arg: &'a Arg<S>, cfa: Option<&'a Cfa>) -> Self {
        Self { arg, cfa }
    }
}

impl<S: AbstractState> ArgTraversal for ArgView<'_, S> {
    fn roots(&self) -> Vec<StateId> {
        self.arg.roots().collect()
    }

    fn successors_of(&self, id: StateId) -> Vec<StateId> {
        self.arg.node(id).children().to_vec()
    }

    fn covered_by(&self, id: StateId) -> Vec<StateId> {
        self.arg.node(id).covered_states().collect()
    }

    fn is_covered(&self, id: StateId) -> bool {
        self.arg.node(id).is_covered()
    }

    fn is_target(&self, id: StateId) -> bool {
        self.arg.is_target(id)
    }

    fn was_expanded(&self, id: StateId) -> bool {
        self.arg.node(id).was_expanded()
    }

    fn should_highlight(&self, id: StateId) -> bool {
        self.arg.state(id).should_highlight()
    }

    fn label(&self, id: StateId) -> String {
        let mut label = id.to_string();
        if let Some(loc) = self.arg.location(id) {
            label.push_str(&format!(" @ {}", loc));
            if let Some(cfa) = self.cfa {
                label.push_str(&format!("\\n{}", cfa.function_of(loc)));
                if cfa.is_function_entry(loc) {
                    label.push_str(" entry");
                }
            }
        }
        let inner = self.arg.state(id).dot_label();
        if !inner.is_empty() {
            label.push_str("\\n");
            label.push_str(&escape_label(&inner));
        }
        label
    }

    fn edge_label(&self, from: StateId, to: StateId) -> Option<String> {
        let edge = crate::arg::path::edge_between_states(self.arg, self.cfa?, from, to)?;
        Some(format!("Line {}: {}", edge.line, edge.raw.replace('\n', " ").replace('"', "'")))
    }
}

fn escape_label(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// Configuration options for DOT output generation.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape of state nodes (default: "box")
    pub node_shape: &'static str,
    /// Fill color of covered states (default: "green")
    pub covered_color: &'static str,
    /// Fill color of target states (default: "red")
    pub target_color: &'static str,
    /// Fill color of states that were not expanded (default: "orange")
    pub unexpanded_color: &'static str,
    /// Fill color of highlighted states (default: "cornflowerblue")
    pub highlight_color: &'static str,
    /// Color of highlighted edges (default: "red")
    pub highlight_edge_color: &'static str,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            node_shape: "box",
            covered_color: "green",
            target_color: "red",
            unexpanded_color: "orange",
            highlight_color: "cornflowerblue",
            highlight_edge_color: "red",
        }
    }
}

/// Render the graph reachable from the roots of `view`.
///
/// `highlight_edge` selects the parent/child links drawn in the highlight color.
pub fn to_dot(view: &dyn ArgTraversal, highlight_edge: &dyn Fn(StateId, StateId) -> bool) -> Result<String, std::fmt::Error> {
    to_dot_with_config(view, highlight_edge, &DotConfig::default())
}

pub fn to_dot_with_config(
    view: &dyn ArgTraversal,
    highlight_edge: &dyn Fn(StateId, StateId) -> bool,
    config: &DotConfig,
) -> Result<String, std::fmt::Error> {
    let mut dot = String::new();
    writeln!(dot, "digraph ARG {{")?;
    writeln!(dot, "node [style=\"filled\" shape=\"{}\" color=\"white\"]", config.node_shape)?;

    let mut worklist = view.roots();
    worklist.reverse();
    let mut processed = BTreeSet::new();
    let mut edges = String::new();

    while let Some(id) = worklist.pop() {
        if !processed.insert(id) {
            continue;
        }

        write!(dot, "{} [", id)?;
        if let Some(color) = node_color(view, id, config) {
            write!(dot, "fillcolor=\"{}\" ", color)?;
        }
        writeln!(dot, "label=\"{}\" id=\"{}\"]", view.label(id), id)?;

        for covered in view.covered_by(id) {
            writeln!(edges, "{} -> {} [style=\"dashed\" weight=\"0\" label=\"covered by\"]", covered, id)?;
        }

        for child in view.successors_of(id) {
            write!(edges, "{} -> {} [", id, child)?;
            match view.edge_label(id, child) {
                // No direct CFA edge between the locations.
                None => write!(edges, "style=\"bold\" color=\"blue\" label=\"dummy edge\"")?,
                Some(label) => {
                    if highlight_edge(id, child) {
                        write!(edges, "color=\"{}\" ", config.highlight_edge_color)?;
                    }
                    write!(edges, "label=\"{}\"", label)?;
                }
            }
            writeln!(edges, " id=\"{} -> {}\"]", id, child)?;
            worklist.push(child);
        }
    }

    dot.push_str(&edges);
    writeln!(dot, "}}")?;
    Ok(dot)
}

fn node_color(view: &dyn ArgTraversal, id: StateId, config: &DotConfig) -> Option<&'static str> {
    if view.is_covered(id) {
        Some(config.covered_color)
    } else if view.is_target(id) {
        Some(config.target_color)
    } else if !view.was_expanded(id) {
        Some(config.unexpanded_color)
    } else if view.should_highlight(id) {
        Some(config.highlight_color)
    } else {
        None
    }
}
