use anyhow::Result;
use varisat::ExtendFormula;

use super::spec::{Assignment, Lit, Spec};
use super::SynthError;

/// Solver capability surface used throughout: incremental clause addition,
/// solving under assumptions, model extraction, and the subset of failed
/// assumptions after an UNSAT answer.
pub trait SatSolver {
    fn add_clause(&mut self, lits: &[Lit]);
    fn solve(&mut self, assumptions: &[Lit]) -> Result<bool>;
    fn model(&self) -> Option<Assignment>;
    fn failed_core(&self) -> Vec<Lit>;
}

pub struct Varisat {
    inner: varisat::Solver<'static>,
}

impl Varisat {
    pub fn new() -> Self {
        Self { inner: varisat::Solver::new() }
    }

    /// Fresh solver preloaded with the clause matrix of F.
    pub fn with_spec(spec: &Spec) -> Self {
        let mut s = Self::new();
        for clause in &spec.clauses {
            s.add_clause(clause);
        }
        s.ensure_vars(spec.num_vars);
        s
    }

    /// Materializes variables up to `num_vars` so models cover the full
    /// range even when a variable occurs in no clause.
    pub fn ensure_vars(&mut self, num_vars: u32) {
        if num_vars > 0 {
            let v = varisat::Var::from_index(num_vars as usize - 1);
            self.inner.add_clause(&[varisat::Lit::positive(v), varisat::Lit::negative(v)]);
        }
    }
}

impl Default for Varisat {
    fn default() -> Self { Self::new() }
}

fn to_varisat(l: Lit) -> varisat::Lit {
    let var = varisat::Var::from_index(l.var() as usize - 1);
    if l.is_positive() { varisat::Lit::positive(var) } else { varisat::Lit::negative(var) }
}

fn from_varisat(l: varisat::Lit) -> Lit {
    Lit::of_var(l.var().index() as u32 + 1, l.is_positive())
}

impl SatSolver for Varisat {
    fn add_clause(&mut self, lits: &[Lit]) {
        let clause: Vec<varisat::Lit> = lits.iter().map(|&l| to_varisat(l)).collect();
        self.inner.add_clause(&clause);
    }

    fn solve(&mut self, assumptions: &[Lit]) -> Result<bool> {
        let asm: Vec<varisat::Lit> = assumptions.iter().map(|&l| to_varisat(l)).collect();
        self.inner.assume(&asm);
        self.inner
            .solve()
            .map_err(|e| SynthError::Solver(e.to_string()).into())
    }

    fn model(&self) -> Option<Assignment> {
        self.inner.model().map(|lits| {
            let mut asg = Assignment::new(lits.len() as u32);
            for l in lits {
                asg.set(l.var().index() as u32 + 1, l.is_positive());
            }
            asg
        })
    }

    fn failed_core(&self) -> Vec<Lit> {
        self.inner
            .failed_core()
            .map(|core| core.iter().map(|&l| from_varisat(l)).collect())
            .unwrap_or_default()
    }
}

/// Satisfiability probe used at load time to reject degenerate inputs.
pub fn probe_satisfiable(spec: &Spec) -> Result<bool> {
    let mut s = Varisat::with_spec(spec);
    s.solve(&[])
}
