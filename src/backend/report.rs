//! Text renderings of the analysis results, one per inspection command.

use std::collections::BTreeSet;

use super::analysis::{InterferenceGraph, Liveness};
use super::ir::Node;
use super::regalloc::{Assignment, Coloring};

fn set(out: &mut String, nodes: &BTreeSet<Node>) {
    let names: Vec<&str> = nodes.iter().map(Node::name).collect();
    out.push_str(&format!("({})\n", names.join(" ")));
}

/// ```text
/// (
/// (in
/// (%x rdi)
/// ...
/// )
/// (out
/// ...
/// )
/// )
/// ```
pub fn liveness(liveness: &Liveness) -> String {
    let mut out = String::from("(\n(in\n");
    for nodes in liveness.live_in.iter() {
        set(&mut out, nodes);
    }

    out.push_str(")\n(out\n");
    for nodes in liveness.live_out.iter() {
        set(&mut out, nodes);
    }

    out.push_str(")\n)\n");
    out
}

/// One line per node: the node followed by its neighbours.
pub fn interference(graph: &InterferenceGraph) -> String {
    let mut out = String::new();
    for (node, neighbors) in graph.iter() {
        out.push_str(node.name());
        for n in neighbors.iter() {
            out.push(' ');
            out.push_str(n.name());
        }
        out.push('\n');
    }

    out
}

pub fn coloring(coloring: &Coloring) -> String {
    let mut out = String::new();
    for (variable, assignment) in coloring.iter() {
        let place = match assignment {
            Assignment::Color(c) => coloring.register(c).map_or("spill", |r| r.name()),
            Assignment::Spill => "spill",
        };
        out.push_str(&format!("{} {}\n", variable, place));
    }

    out
}
