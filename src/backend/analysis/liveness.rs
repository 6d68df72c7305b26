use std::collections::BTreeSet;

use super::{GenKill, Successors};
use crate::backend::ir::Node;

/// Per-instruction live sets, indexed like the instructions they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Liveness {
    pub live_in: Vec<BTreeSet<Node>>,
    pub live_out: Vec<BTreeSet<Node>>,
}

/// Backward dataflow iterated to a fixed point:
///
/// ```text
/// IN[i]  = GEN[i] ∪ (OUT[i] − KILL[i])
/// OUT[i] = ∪ IN[s] for s in succ(i)
/// ```
///
/// Instructions are visited last to first so most facts settle in one pass.
pub fn compute(successors: &Successors, gen_kill: &[GenKill]) -> Liveness {
    let len = gen_kill.len();
    let mut live_in = vec![BTreeSet::new(); len];
    let mut live_out = vec![BTreeSet::new(); len];

    let mut passes = 0;
    loop {
        passes += 1;
        let mut changed = false;

        for i in (0..len).rev() {
            let sets = &gen_kill[i];
            let new_in: BTreeSet<Node> = live_out[i]
                .difference(&sets.kills)
                .chain(sets.gens.iter())
                .cloned()
                .collect();

            if new_in != live_in[i] {
                live_in[i] = new_in;
                changed = true;
            }

            for &s in successors.of(i) {
                let missing: Vec<Node> = live_in[s].difference(&live_out[i]).cloned().collect();
                if !missing.is_empty() {
                    live_out[i].extend(missing);
                    changed = true;
                }
            }
        }

        if !changed {
            break;
        }
    }

    log::trace!("liveness settled after {} passes", passes);
    Liveness { live_in, live_out }
}
