use std::collections::{BTreeMap, BTreeSet};

use crate::backend::analysis::InterferenceGraph;
use crate::backend::arch::{x64, Register};
use crate::backend::ir::{Node, Variable};

/// One colour per analyzable register.
pub const PALETTE: usize = 15;

/// An abstract register, resolved through the per-function bijection set
/// up when the register nodes are coloured.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Color(u8);

impl Color {
    fn palette() -> impl Iterator<Item = Color> {
        (0..PALETTE as u8).map(Color)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Assignment {
    Color(Color),
    Spill,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coloring {
    registers: BTreeMap<Color, Register>,
    assignments: BTreeMap<Variable, Assignment>,
}

impl Coloring {
    pub fn register(&self, color: Color) -> Option<Register> {
        self.registers.get(&color).copied()
    }

    pub fn assignment(&self, variable: &Variable) -> Option<Assignment> {
        self.assignments.get(variable).copied()
    }

    /// The register `variable` ended up in, if it was coloured.
    pub fn register_of(&self, variable: &Variable) -> Option<Register> {
        match self.assignment(variable)? {
            Assignment::Color(c) => self.register(c),
            Assignment::Spill => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.assignments.values().all(|a| *a != Assignment::Spill)
    }

    pub fn spilled(&self) -> impl Iterator<Item = &Variable> + '_ {
        self.assignments
            .iter()
            .filter(|(_, a)| **a == Assignment::Spill)
            .map(|(v, _)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, Assignment)> + '_ {
        self.assignments.iter().map(|(v, a)| (v, *a))
    }
}

/// Picks the lowest free colour, which maps to a caller-saved register
/// whenever one is free since those were coloured first.
fn pick(used: &BTreeSet<Color>) -> Option<Color> {
    Color::palette().find(|c| !used.contains(c))
}

pub fn color(graph: &InterferenceGraph) -> Coloring {
    let mut colors: BTreeMap<Node, Color> = BTreeMap::new();
    let mut registers = BTreeMap::new();

    for r in x64::analyzable() {
        let node = Node::Register(r);
        let used: BTreeSet<Color> = graph
            .neighbors(&node)
            .filter_map(|n| colors.get(n).copied())
            .chain(registers.keys().copied())
            .collect();

        if let Some(c) = pick(&used) {
            colors.insert(node, c);
            registers.insert(c, r);
        }
    }

    let mut variables: Vec<&Node> = graph.nodes().filter(|n| n.variable().is_some()).collect();
    variables.sort_by(|a, b| graph.degree(b).cmp(&graph.degree(a)).then_with(|| a.cmp(b)));

    let mut work = graph.clone();
    let mut stack = Vec::with_capacity(variables.len());
    for node in variables {
        let neighbors = work.remove_node(node).unwrap_or_default();
        stack.push((node.clone(), neighbors));
    }

    let mut assignments = BTreeMap::new();
    while let Some((node, neighbors)) = stack.pop() {
        let used: BTreeSet<Color> = neighbors
            .iter()
            .filter_map(|n| colors.get(n).copied())
            .collect();

        let assignment = match pick(&used) {
            Some(c) => {
                colors.insert(node.clone(), c);
                Assignment::Color(c)
            }
            None => Assignment::Spill,
        };

        log::trace!("{} -> {:?}", node, assignment);
        work.add_node(node.clone());
        for n in neighbors.iter() {
            work.add_edge(&node, n);
        }

        if let Node::Variable(v) = node {
            assignments.insert(v, assignment);
        }
    }

    Coloring {
        registers,
        assignments,
    }
}
