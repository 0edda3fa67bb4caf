//! Export of ARG paths as control automata.
//!
//! The automaton has one state per ARG state on the path. Each state matches
//! the raw text of the CFA edge to its successor on the path and moves on;
//! the edge into a target state leads to `ERROR`; everything else stops.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Write as _;

use crate::arg::path::edge_between_states;
use crate::arg::{Arg, StateId};
use crate::cfa::{Cfa, EdgeKind, Loop, NodeId};
use crate::cpa::AbstractState;

type FmtResult = Result<(), std::fmt::Error>;

/// An automaton that follows exactly the edges between `path_states`.
///
/// `assumptions` maps a state to code assumed on the edges leaving it.
pub fn produce_path_automaton<S: AbstractState>(
    arg: &Arg<S>,
    cfa: &Cfa,
    root: StateId,
    path_states: &BTreeSet<StateId>,
    name: &str,
    assumptions: &BTreeMap<StateId, String>,
) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    write_header(&mut out, root, name)?;
    for &s in path_states {
        writeln!(out, "STATE USEFIRST ARG{} :", s)?;
        write_path_transitions(&mut out, arg, cfa, s, path_states, assumptions)?;
        writeln!(out, "    TRUE -> STOP;\n")?;
    }
    writeln!(out, "END AUTOMATON")?;
    Ok(out)
}

/// Like [`produce_path_automaton`], but the parts of the path inside one of
/// `loops` are replaced by the whole loop body.
///
/// Leaving the loop over the edge the path takes continues with the rest of
/// the path; leaving it over any other edge stops.
pub fn produce_path_automaton_with_loops<S: AbstractState>(
    arg: &Arg<S>,
    cfa: &Cfa,
    root: StateId,
    path_states: &BTreeSet<StateId>,
    name: &str,
    loops: &[Loop],
) -> Result<String, std::fmt::Error> {
    let in_loop = |n: Option<NodeId>| n.is_some_and(|n| loops.iter().any(|l| l.body.contains(&n)));

    let mut out = String::new();
    write_header(&mut out, root, name)?;

    let mut into_loop: Option<StateId> = None;
    let mut into_loop_node: Option<NodeId> = None;
    let mut loop_exits: Vec<(StateId, StateId)> = Vec::new();
    let no_assumptions = BTreeMap::new();

    for &s in path_states {
        let loc = arg.location(s);
        let found = in_loop(loc);

        if found {
            if into_loop.is_none() {
                into_loop = Some(s);
                into_loop_node = loc;
            }
            continue;
        }
        // A call inside the loop we re-expand.
        if let (Some(head), Some(l)) = (into_loop_node, loc) {
            if cfa.function_of(head) != cfa.function_of(l) {
                continue;
            }
        }
        if let Some(entered) = into_loop.take() {
            loop_exits.push((entered, s));
            into_loop_node = None;
        }

        writeln!(out, "STATE USEFIRST ARG{} :", s)?;
        write_path_transitions(&mut out, arg, cfa, s, path_states, &no_assumptions)?;
        writeln!(out, "    TRUE -> STOP;\n")?;
    }

    for &(entered, left) in &loop_exits {
        write_loop(&mut out, arg, cfa, loops, entered, Some(left))?;
    }
    // The last loop on the path is never left.
    if let Some(entered) = into_loop {
        write_loop(&mut out, arg, cfa, loops, entered, None)?;
    }

    writeln!(out, "END AUTOMATON")?;
    Ok(out)
}

fn write_header(out: &mut String, root: StateId, name: &str) -> FmtResult {
    writeln!(out, "CONTROL AUTOMATON {}\n", name)?;
    writeln!(out, "INITIAL STATE ARG{};\n", root)
}

fn write_path_transitions<S: AbstractState>(
    out: &mut String,
    arg: &Arg<S>,
    cfa: &Cfa,
    s: StateId,
    path_states: &BTreeSet<StateId>,
    assumptions: &BTreeMap<StateId, String>,
) -> FmtResult {
    for &child in arg.node(s).children() {
        let child = arg.node(child).covered_by().unwrap_or(child);
        if !path_states.contains(&child) {
            continue;
        }
        let Some(edge) = edge_between_states(arg, cfa, s, child) else {
            continue;
        };
        write!(out, "    MATCH \"{}\" -> ", escape(&edge.raw))?;
        if arg.is_target(child) {
            write!(out, "ERROR")?;
        } else {
            if let Some(code) = assumptions.get(&s).filter(|c| !c.is_empty()) {
                write!(out, "ASSUME {{{}}} ", code)?;
            }
            write!(out, "GOTO ARG{}", child)?;
        }
        writeln!(out, ";")?;
    }
    Ok(())
}

fn write_loop<S: AbstractState>(
    out: &mut String,
    arg: &Arg<S>,
    cfa: &Cfa,
    loops: &[Loop],
    entered: StateId,
    left: Option<StateId>,
) -> FmtResult {
    let Some(head) = arg.location(entered) else {
        return Ok(());
    };
    let exit_node = left.and_then(|l| arg.location(l));
    let in_loop = |n: NodeId| loops.iter().any(|l| l.body.contains(&n));

    let mut handled = BTreeSet::new();
    let mut queue = VecDeque::from([head]);
    let mut first = true;

    while let Some(current) = queue.pop_front() {
        if !handled.insert(current) {
            continue;
        }
        if first {
            writeln!(out, "STATE USEFIRST ARG{} :", entered)?;
            first = false;
        } else {
            writeln!(out, "STATE USEFIRST NODE{} :", current.0)?;
        }

        for edge in cfa.leaving_edges(current) {
            let successor = edge.successor;
            if matches!(edge.kind, EdgeKind::FunctionCall { .. }) {
                // Calls are skipped: wait in a sink until control is back in this function.
                let Some(summary) = cfa.leaving_summary_edge(current) else {
                    continue;
                };
                let return_site = summary.successor;
                if return_site != head {
                    queue.push_back(return_site);
                }
                writeln!(out, "    TRUE -> GOTO NODE{}_FUNCTIONSINK;", current.0)?;
                writeln!(out, "STATE USEFIRST NODE{}_FUNCTIONSINK :", current.0)?;
                write!(
                    out,
                    "    ( CHECK(location, \"functionname=={}\")) -> ",
                    cfa.function_of(summary.predecessor)
                )?;
                if return_site == head {
                    writeln!(out, "GOTO ARG{};", entered)?;
                } else {
                    writeln!(out, "GOTO NODE{};", return_site.0)?;
                }
                writeln!(out, "    TRUE -> GOTO NODE{}_FUNCTIONSINK;", current.0)?;
                continue;
            }

            write!(out, "    MATCH \"{}\" -> ", escape(&edge.raw))?;
            if in_loop(successor) && successor != head {
                writeln!(out, "GOTO NODE{};", successor.0)?;
                queue.push_back(successor);
            } else if in_loop(successor) {
                writeln!(out, "GOTO ARG{};", entered)?;
            } else if exit_node == Some(successor) {
                if let Some(l) = left {
                    writeln!(out, "GOTO ARG{};", l)?;
                }
            } else {
                writeln!(out, "STOP;")?;
            }
        }
        writeln!(out, "    TRUE -> STOP;\n")?;
    }
    Ok(())
}

fn escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::cfa::CfaBuilder;
    use crate::cpa::testing::LocationState;
    use crate::formula::Formula;

    fn at(node: NodeId, cfa: &Cfa) -> LocationState {
        LocationState {
            node,
            target: cfa.is_error_location(node),
        }
    }

    #[test]
    fn test_linear_path_automaton() {
        let mut b = CfaBuilder::new("main");
        let n0 = b.entry();
        let n1 = b.node();
        let n2 = b.node();
        b.assign(n0, n1, "x", Formula::mk_true());
        b.assume(n1, n2, Formula::var("x"), true);
        b.error(n2);
        let cfa = b.build();

        let mut arg = Arg::new();
        let s0 = arg.create_root(at(n0, &cfa));
        let s1 = arg.create_successor(s0, at(n1, &cfa));
        let s2 = arg.create_successor(s1, at(n2, &cfa));
        let path = BTreeSet::from([s0, s1, s2]);

        let automaton = produce_path_automaton(&arg, &cfa, s0, &path, "cex", &BTreeMap::new()).unwrap();
        let expected = "CONTROL AUTOMATON cex\n\n\
                        INITIAL STATE ARG0;\n\n\
                        STATE USEFIRST ARG0 :\n    MATCH \"x = true;\" -> GOTO ARG1;\n    TRUE -> STOP;\n\n\
                        STATE USEFIRST ARG1 :\n    MATCH \"[x]\" -> ERROR;\n    TRUE -> STOP;\n\n\
                        STATE USEFIRST ARG2 :\n    TRUE -> STOP;\n\n\
                        END AUTOMATON\n";
        assert_eq!(automaton, expected);

        let assumptions = BTreeMap::from([(s0, "x == 1".to_string())]);
        let automaton = produce_path_automaton(&arg, &cfa, s0, &path, "cex", &assumptions).unwrap();
        assert!(automaton.contains("MATCH \"x = true;\" -> ASSUME {x == 1} GOTO ARG1;"));
    }

    #[test]
    fn test_loop_is_reexpanded() {
        let mut b = CfaBuilder::new("main");
        let entry = b.entry();
        let head = b.node();
        let body = b.node();
        let exit = b.node();
        b.havoc(entry, head, "x");
        b.branch(head, Formula::var("x"), body, exit);
        b.assign(body, head, "x", Formula::not(Formula::var("x")));
        b.error(exit);
        let cfa = b.build();

        let mut arg = Arg::new();
        let s0 = arg.create_root(at(entry, &cfa));
        let s1 = arg.create_successor(s0, at(head, &cfa));
        let s2 = arg.create_successor(s1, at(body, &cfa));
        let s3 = arg.create_successor(s2, at(head, &cfa));
        let s4 = arg.create_successor(s3, at(exit, &cfa));
        let path = BTreeSet::from([s0, s1, s2, s3, s4]);

        let automaton = produce_path_automaton_with_loops(&arg, &cfa, s0, &path, "loop", cfa.loops()).unwrap();
        assert!(automaton.contains("STATE USEFIRST ARG0 :\n    MATCH \"x = __nondet();\" -> GOTO ARG1;\n"));
        assert!(automaton.contains("STATE USEFIRST ARG1 :\n    MATCH \"[x]\" -> GOTO NODE2;\n    MATCH \"[!(x)]\" -> GOTO ARG4;\n"));
        assert!(automaton.contains("STATE USEFIRST NODE2 :\n    MATCH \"x = !x;\" -> GOTO ARG1;\n"));
        assert!(automaton.contains("STATE USEFIRST ARG4 :\n    TRUE -> STOP;\n"));
        assert!(!automaton.contains("ARG2 :"));
        assert!(automaton.ends_with("END AUTOMATON\n"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a \"b\"\n\\"), "a \\\"b\\\"\\n\\\\");
    }
}
