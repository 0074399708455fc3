use anyhow::Result;
use tracing::debug;

use super::sat::SatSolver;
use super::spec::{Assignment, Lit};
use super::SynthError;

// One soft unit with its current payload clause and selector. The solver
// holds `payload v -selector`; assuming the selector activates the clause.
struct Soft {
    payload: Vec<Lit>,
    selector: Lit,
}

/// Core-guided MaxSAT for unit soft clauses of weight 1: solve under the
/// soft selectors, and while UNSAT relax every soft in the failed core with
/// a fresh relaxation literal plus an at-most-one over the round's
/// relaxations. Exact for unit weights.
pub struct MaxSat<S: SatSolver> {
    sat: S,
    next_var: u32,
    softs: Vec<Soft>,
}

impl<S: SatSolver> MaxSat<S> {
    /// `first_free` is the first variable id not used by the hard part.
    pub fn new(sat: S, first_free: u32) -> Self {
        Self { sat, next_var: first_free, softs: Vec::new() }
    }

    fn fresh(&mut self) -> Lit {
        let v = self.next_var;
        self.next_var += 1;
        Lit::of_var(v, true)
    }

    pub fn add_hard(&mut self, clause: &[Lit]) {
        self.sat.add_clause(clause);
    }

    pub fn add_soft_unit(&mut self, lit: Lit) {
        let selector = self.fresh();
        self.sat.add_clause(&[lit, selector.negated()]);
        self.softs.push(Soft { payload: vec![lit], selector });
    }

    /// Returns the violation count and an optimal assignment.
    pub fn solve(&mut self) -> Result<(u32, Assignment)> {
        let mut cost = 0u32;
        loop {
            let assumptions: Vec<Lit> = self.softs.iter().map(|s| s.selector).collect();
            if self.sat.solve(&assumptions)? {
                let model = self
                    .sat
                    .model()
                    .ok_or_else(|| SynthError::Solver("missing model after SAT".into()))?;
                debug!(cost, "maxsat optimum");
                return Ok((cost, model));
            }
            let core = self.sat.failed_core();
            if core.is_empty() {
                return Err(SynthError::Invariant("maxsat hard clauses unsatisfiable".into()).into());
            }
            cost += 1;
            let mut round_relax = Vec::new();
            for idx in 0..self.softs.len() {
                if !core.contains(&self.softs[idx].selector) {
                    continue;
                }
                let relax = self.fresh();
                let selector = self.fresh();
                self.softs[idx].payload.push(relax);
                let mut clause = self.softs[idx].payload.clone();
                clause.push(selector.negated());
                self.sat.add_clause(&clause);
                self.softs[idx].selector = selector;
                round_relax.push(relax);
            }
            for i in 0..round_relax.len() {
                for j in i + 1..round_relax.len() {
                    self.sat.add_clause(&[round_relax[i].negated(), round_relax[j].negated()]);
                }
            }
            debug!(cost, relaxed = round_relax.len(), "maxsat core relaxed");
        }
    }
}
