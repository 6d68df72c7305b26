use std::collections::{BTreeMap, BTreeSet};

use super::{GenKill, Liveness};
use crate::backend::arch::x64;
use crate::backend::ir::{Function, Instruction, Node, Operand, Variable};

/// How definitions are connected to values that stay live past them.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum KillPolicy {
    /// Every killed node interferes with everything live after it.
    #[default]
    Conservative,

    /// A plain copy leaves its destination free to share a register with
    /// its source, so the copy can disappear.
    Optimistic,
}

impl KillPolicy {
    /// The node a definition in `instr` need not interfere with.
    fn exempt(self, instr: &Instruction) -> Option<Node> {
        match (self, instr) {
            (KillPolicy::Optimistic, Instruction::Move { source, .. }) => source.node(),
            _ => None,
        }
    }
}

/// Undirected graph over variables and registers. Edges are always stored
/// in both directions and a node never neighbors itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterferenceGraph {
    adjacency: BTreeMap<Node, BTreeSet<Node>>,
}

impl InterferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) {
        self.adjacency.entry(node).or_default();
    }

    pub fn add_edge(&mut self, a: &Node, b: &Node) {
        if a == b {
            return;
        }

        self.adjacency.entry(a.clone()).or_default().insert(b.clone());
        self.adjacency.entry(b.clone()).or_default().insert(a.clone());
    }

    /// Detaches `node` from the graph, returning the neighbors it had.
    pub fn remove_node(&mut self, node: &Node) -> Option<BTreeSet<Node>> {
        let neighbors = self.adjacency.remove(node)?;
        for n in neighbors.iter() {
            if let Some(set) = self.adjacency.get_mut(n) {
                set.remove(node);
            }
        }

        Some(neighbors)
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.adjacency.contains_key(node)
    }

    pub fn interferes(&self, a: &Node, b: &Node) -> bool {
        self.adjacency.get(a).map_or(false, |set| set.contains(b))
    }

    pub fn neighbors(&self, node: &Node) -> impl Iterator<Item = &Node> + '_ {
        self.adjacency.get(node).into_iter().flat_map(|set| set.iter())
    }

    pub fn degree(&self, node: &Node) -> usize {
        self.adjacency.get(node).map_or(0, BTreeSet::len)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.adjacency.keys()
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Node, &BTreeSet<Node>)> + '_ {
        self.adjacency.iter()
    }

    fn connect_all(&mut self, set: &BTreeSet<Node>) {
        for (i, a) in set.iter().enumerate() {
            for b in set.iter().skip(i + 1) {
                self.add_edge(a, b);
            }
        }
    }
}

pub fn build(
    function: &Function,
    gen_kill: &[GenKill],
    liveness: &Liveness,
    variables: &BTreeSet<Variable>,
    policy: KillPolicy,
) -> InterferenceGraph {
    let mut graph = InterferenceGraph::new();

    let registers: BTreeSet<Node> = x64::analyzable().map(Node::Register).collect();
    for r in registers.iter() {
        graph.add_node(r.clone());
    }
    graph.connect_all(&registers);

    for v in variables.iter() {
        graph.add_node(Node::Variable(v.clone()));
    }

    for (live_in, live_out) in liveness.live_in.iter().zip(liveness.live_out.iter()) {
        graph.connect_all(live_in);
        graph.connect_all(live_out);
    }

    for (i, instr) in function.instructions.iter().enumerate() {
        let exempt = policy.exempt(instr);
        for killed in gen_kill[i].kills.iter() {
            for live in liveness.live_out[i].iter() {
                if exempt.as_ref() != Some(live) {
                    graph.add_edge(killed, live);
                }
            }
        }

        // variable shift counts must end up in rcx
        if let Instruction::Shift {
            source: Operand::Variable(v),
            ..
        } = instr
        {
            let count = Node::Variable(v.clone());
            for r in x64::analyzable().filter(|&r| r != x64::SHIFT) {
                graph.add_edge(&count, &Node::Register(r));
            }
        }
    }

    log::trace!(
        "interference graph for {} has {} nodes",
        function.name,
        graph.len()
    );
    graph
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::analysis::analyze;
    use crate::backend::analysis::test_util::function;
    use crate::backend::arch::Register;

    fn var(name: &str) -> Node {
        Node::Variable(Variable::new(name))
    }

    fn graph(src: &str, policy: KillPolicy) -> InterferenceGraph {
        analyze(&function(src), policy).unwrap().interference
    }

    fn assert_well_formed(graph: &InterferenceGraph) {
        for (node, neighbors) in graph.iter() {
            assert!(!neighbors.contains(node), "{} neighbors itself", node);
            for n in neighbors.iter() {
                assert!(graph.interferes(n, node), "{} -> {} is one way", node, n);
            }
        }

        let registers: Vec<Node> = x64::analyzable().map(Node::Register).collect();
        for a in registers.iter() {
            for b in registers.iter().filter(|b| *b != a) {
                assert!(graph.interferes(a, b), "{} and {} must interfere", a, b);
            }
        }
    }

    #[test]
    fn edges_are_symmetric() {
        let mut g = InterferenceGraph::new();
        g.add_edge(&var("%a"), &var("%b"));
        g.add_edge(&var("%a"), &var("%a"));
        assert!(g.interferes(&var("%b"), &var("%a")));
        assert_eq!(g.degree(&var("%a")), 1);

        let removed = g.remove_node(&var("%a")).unwrap();
        assert!(removed.contains(&var("%b")));
        assert_eq!(g.degree(&var("%b")), 0);
        assert!(!g.contains(&var("%a")));
    }

    #[test]
    fn single_move() {
        let g = graph("(:f 1 0 (%x <- rdi) (rax <- %x) (return))", KillPolicy::Conservative);
        assert_well_formed(&g);

        // %x is never live alongside rdi or rax
        assert!(!g.interferes(&var("%x"), &Node::Register(Register::Rdi)));
        assert!(!g.interferes(&var("%x"), &Node::Register(Register::Rax)));
        assert!(g.interferes(&var("%x"), &Node::Register(Register::Rbx)));
    }

    #[test]
    fn shift_count_avoids_other_registers() {
        let g = graph(
            "(:f 1 0 (%a <- rdi) (%b <- 3) (%a <<= %b) (rax <- %a) (return))",
            KillPolicy::Conservative,
        );
        assert_well_formed(&g);

        for r in x64::analyzable() {
            let edge = g.interferes(&var("%b"), &Node::Register(r));
            assert_eq!(edge, r != Register::Rcx, "%b against {}", r);
        }
    }

    #[test]
    fn calls_clobber_live_values() {
        let g = graph(
            "(:f 1 0 (%keep <- rdi) (call print 1) (rax <- %keep) (return))",
            KillPolicy::Conservative,
        );
        assert_well_formed(&g);

        for r in x64::CALLER_SAVED {
            assert!(g.interferes(&var("%keep"), &Node::Register(r)));
        }
    }

    #[test]
    fn kill_policies() {
        let src = "(:f 1 0
            (%a <- rdi)
            (%b <- %a)
            (%b += %a)
            (rax <- %b)
            (return))";

        let conservative = graph(src, KillPolicy::Conservative);
        let optimistic = graph(src, KillPolicy::Optimistic);
        assert_well_formed(&conservative);
        assert_well_formed(&optimistic);

        // %a is live past the copy into %b, so they always interfere through OUT
        assert!(conservative.interferes(&var("%a"), &var("%b")));
        assert!(optimistic.interferes(&var("%a"), &var("%b")));
    }

    #[test]
    fn optimistic_lets_copies_share_with_their_source() {
        // %t is a dead copy of %u; only %u itself may share its register
        let src = "(:f 2 0
            (%u <- rdi)
            (%v <- rsi)
            (%t <- %u)
            (rax <- %u)
            (rax += %v)
            (return))";

        let conservative = graph(src, KillPolicy::Conservative);
        let optimistic = graph(src, KillPolicy::Optimistic);
        assert_well_formed(&optimistic);

        assert!(conservative.interferes(&var("%t"), &var("%u")));
        assert!(!optimistic.interferes(&var("%t"), &var("%u")));
        assert!(conservative.interferes(&var("%t"), &var("%v")));
        assert!(optimistic.interferes(&var("%t"), &var("%v")));
    }

    #[test]
    fn optimistic_keeps_load_edges() {
        let src = "(:f 1 1
            (%u <- rdi)
            (%t <- (mem rsp 0))
            (rax <- %u)
            (return))";
        assert!(graph(src, KillPolicy::Conservative).interferes(&var("%t"), &var("%u")));
        assert!(graph(src, KillPolicy::Optimistic).interferes(&var("%t"), &var("%u")));
    }
}
