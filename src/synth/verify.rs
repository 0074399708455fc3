use std::collections::HashMap;

use anyhow::Result;
use tracing::{debug, info};

use super::basis::BasisStore;
use super::circuit::{build_candidate, Encoder};
use super::order::Order;
use super::sat::{SatSolver, Varisat};
use super::spec::{Assignment, Lit, Spec};
use super::SynthError;

/// One model of the error formula: the shared universal inputs together
/// with the witness outputs, the choice parameters, and what the candidate
/// actually produced. Lives for a single loop iteration.
#[derive(Clone, Debug)]
pub struct Counterexample {
    /// Values of all specification variables (σ_X and the witness σ_Y).
    pub model: Assignment,
    /// Parameter values by rank.
    pub g: Vec<bool>,
    /// Candidate outputs by rank.
    pub y_syn: Vec<bool>,
}

/// Solves E ≡ F(X,Y) ∧ ¬F(X,Y′) ∧ ⋀ y′_i ↔ ψ_i. Returns None on UNSAT
/// (the basis is correct) or the extracted counterexample.
pub fn verify(spec: &Spec, order: &Order, store: &mut BasisStore) -> Result<Option<Counterexample>> {
    let cand = build_candidate(spec, order, store);

    let mut enc = Encoder::new(spec.num_vars + 1);
    let g_lits: Vec<Lit> = (0..order.len()).map(|_| enc.fresh()).collect();
    let var_map = |v: u32| Lit::of_var(v, true);
    let param_map = |i: usize| g_lits[i];

    let mut cache: HashMap<_, _> = HashMap::new();
    let psi_lits: Vec<Lit> = cand
        .psi
        .iter()
        .map(|&p| enc.lower(&store.netlist, p, &var_map, &param_map, &mut cache))
        .collect();
    let out_lit = enc.lower(&store.netlist, cand.out, &var_map, &param_map, &mut cache);

    let mut sat = Varisat::new();
    sat.ensure_vars(spec.num_vars);
    for clause in &enc.clauses {
        sat.add_clause(clause);
    }
    sat.add_clause(&[out_lit]);

    if !sat.solve(&[])? {
        info!("verifier: no counterexample, basis is correct");
        return Ok(None);
    }
    let model = sat
        .model()
        .ok_or_else(|| SynthError::Solver("missing model after SAT".into()))?;
    let g: Vec<bool> = g_lits.iter().map(|&l| model.satisfies(l)).collect();
    let y_syn: Vec<bool> = psi_lits.iter().map(|&l| model.satisfies(l)).collect();
    let mut spec_model = Assignment::new(spec.num_vars);
    for v in 1..=spec.num_vars {
        spec_model.set(v, model.value(v));
    }
    debug!(?y_syn, ?g, "verifier counterexample");
    Ok(Some(Counterexample { model: spec_model, g, y_syn }))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::synth::basis::{BasisForm, Cube, DualForm};
    use crate::synth::order::dependency_order;
    use crate::synth::qdimacs;

    const DEMO: &str = "p cnf 4 4\na 2 3 0\ne 1 4 0\n-1 2 0\n-1 3 0\n1 2 3 0\n4 0\n";

    fn setup() -> (Spec, Order, BasisStore) {
        let spec = qdimacs::parse_str(DEMO).unwrap();
        let order = dependency_order(&spec);
        let store = BasisStore::new_false(order.len());
        (spec, order, store)
    }

    #[test]
    fn correct_basis_passes() {
        let (spec, order, mut store) = setup();
        // y1: forced to 0 whenever x2 and x3 disagree; Ĉ covers that.
        let r1 = order.rank_of(1).unwrap();
        let c1 = DualForm::from_cubes(vec![
            Cube::new(vec![Lit(-2)]).unwrap(),
            Cube::new(vec![Lit(-3)]).unwrap(),
        ]);
        store.install_learned(r1, DualForm::constant_false(), c1);
        // y4 is always forced to 1.
        let r4 = order.rank_of(4).unwrap();
        store.install_learned(r4, DualForm::from_cubes(vec![Cube::top()]), DualForm::constant_false());
        assert!(verify(&spec, &order, &mut store).unwrap().is_none());
    }

    #[test]
    fn under_approximate_output_is_caught() {
        let (spec, order, mut store) = setup();
        let r1 = order.rank_of(1).unwrap();
        let c1 = DualForm::from_cubes(vec![
            Cube::new(vec![Lit(-2)]).unwrap(),
            Cube::new(vec![Lit(-3)]).unwrap(),
        ]);
        store.install_learned(r1, DualForm::constant_false(), c1);
        // y4 left at constant false: choosing g4 = 0 drives y'4 to 0.
        let cex = verify(&spec, &order, &mut store).unwrap().unwrap();
        let r4 = order.rank_of(4).unwrap();
        assert!(!cex.y_syn[r4]);
        assert!(spec.satisfied_by(&cex.model));
    }

    #[test]
    fn over_eager_must_region_is_caught() {
        let (spec, order, mut store) = setup();
        let r1 = order.rank_of(1).unwrap();
        let r4 = order.rank_of(4).unwrap();
        // Â_1 = true forces y'1 = 1 even where x2, x3 disagree.
        store.install_learned(r1, DualForm::from_cubes(vec![Cube::top()]), DualForm::constant_false());
        store.install_learned(r4, DualForm::from_cubes(vec![Cube::top()]), DualForm::constant_false());
        let cex = verify(&spec, &order, &mut store).unwrap().unwrap();
        assert!(cex.y_syn[r1]);
        // The counterexample input admits a model, but not with y1 = 1.
        assert!(spec.satisfied_by(&cex.model));
        assert!(cex.model.value(2) != cex.model.value(3));
    }

    #[test]
    fn semantic_entry_verifies() {
        let (spec, order, mut store) = setup();
        let r1 = order.rank_of(1).unwrap();
        let r4 = order.rank_of(4).unwrap();
        // Install exact cofactor regions for both outputs.
        let f = store.netlist.spec_gate(&spec);
        for (rank, y) in [(r1, 1u32), (r4, 4u32)] {
            let nl = &mut store.netlist;
            let f1 = nl.cofactor(f, y, true);
            let f0 = nl.cofactor(f, y, false);
            let downstream: Vec<u32> =
                (rank + 1..order.len()).map(|r| order.var_at(r)).collect();
            let e1 = nl.exists(f1, &downstream);
            let e0 = nl.exists(f0, &downstream);
            let n0 = nl.not(e0);
            let a = nl.and(e1, n0);
            let n1 = nl.not(e1);
            let c = nl.and(e0, n1);
            store.entries[rank].a = BasisForm::Semantic(a);
            store.entries[rank].c = BasisForm::Semantic(c);
        }
        assert!(verify(&spec, &order, &mut store).unwrap().is_none());
    }
}
