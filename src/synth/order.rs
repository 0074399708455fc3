use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use super::spec::Spec;

/// Topological order over the outputs. `pi[rank]` is the variable at that
/// rank; the allowed feature set of rank i is X plus `pi[..i]`.
#[derive(Clone, Debug)]
pub struct Order {
    pub pi: Vec<u32>,
    rank: HashMap<u32, usize>,
}

impl Order {
    fn from_pi(pi: Vec<u32>) -> Self {
        let rank = pi.iter().enumerate().map(|(i, &v)| (v, i)).collect();
        Self { pi, rank }
    }

    pub fn len(&self) -> usize { self.pi.len() }

    pub fn is_empty(&self) -> bool { self.pi.is_empty() }

    pub fn var_at(&self, rank: usize) -> u32 { self.pi[rank] }

    pub fn rank_of(&self, var: u32) -> Option<usize> { self.rank.get(&var).copied() }

    pub fn prefix(&self, rank: usize) -> &[u32] { &self.pi[..rank] }
}

/// Keeps the QDIMACS declaration order.
pub fn declaration_order(spec: &Spec) -> Order {
    Order::from_pi(spec.existentials.clone())
}

/// Min-degree elimination order over the co-occurrence graph of the
/// outputs: repeatedly take the output of minimum remaining degree,
/// smallest variable id on ties, and remove it.
pub fn dependency_order(spec: &Spec) -> Order {
    let mut adj: BTreeMap<u32, HashSet<u32>> =
        spec.existentials.iter().map(|&v| (v, HashSet::new())).collect();
    for clause in &spec.clauses {
        let ys: Vec<u32> =
            clause.iter().map(|l| l.var()).filter(|v| spec.is_existential(*v)).collect();
        for (i, &a) in ys.iter().enumerate() {
            for &b in &ys[i + 1..] {
                if a == b {
                    continue;
                }
                if let Some(s) = adj.get_mut(&a) {
                    s.insert(b);
                }
                if let Some(s) = adj.get_mut(&b) {
                    s.insert(a);
                }
            }
        }
    }

    let mut pi = Vec::with_capacity(adj.len());
    while !adj.is_empty() {
        let pick = adj
            .iter()
            .map(|(&v, n)| (n.len(), v))
            .min()
            .map(|(_, v)| v)
            .unwrap();
        let neighbors = adj.remove(&pick).unwrap();
        for n in neighbors {
            if let Some(s) = adj.get_mut(&n) {
                s.remove(&pick);
            }
        }
        pi.push(pick);
    }
    debug!(?pi, "output order");
    Order::from_pi(pi)
}
