use anyhow::Result;
use tracing::{debug, info, warn};

use super::basis::{BasisForm, BasisStore, Cube};
use super::diagnose::{Diagnosis, RepairAction};
use super::order::Order;
use super::sat::{SatSolver, Varisat};
use super::spec::{Lit, Spec};
use super::verify::Counterexample;
use super::SynthError;

/// Applies every diagnosed fix in rank order, so later repairs see the
/// upstream changes of the same iteration. Entries past the repair
/// threshold are replaced by their semantic definitions and frozen.
pub fn repair(
    spec: &Spec,
    order: &Order,
    store: &mut BasisStore,
    cex: &Counterexample,
    diag: &Diagnosis,
    threshold: u32,
) -> Result<()> {
    let mut applied = 0usize;
    for &(rank, action) in &diag.fixes {
        if store.entry(rank).frozen {
            warn!(rank, "skipping repair of frozen entry");
            continue;
        }
        let beta = conflict_cube(spec, order, cex, diag, rank)?;
        apply(store, rank, action, beta)?;
        applied += 1;

        store.entry_mut(rank).repair_count += 1;
        let count = store.entry(rank).repair_count;
        if count > threshold {
            info!(rank, count, "repair threshold hit, deriving semantic entry");
            install_semantic(spec, order, store, rank);
        }
        #[cfg(debug_assertions)]
        probe_disjoint(spec, order, store, rank)?;
    }
    if applied == 0 {
        return Err(SynthError::Invariant(
            "every diagnosed output is frozen, repair cannot progress".into(),
        )
        .into());
    }
    Ok(())
}

/// Builds the conflict formula for one erring output and generalizes it to
/// a cube: F with the output clamped to its wrong value and downstream
/// outputs clamped to the corrected vector, solved under the observed
/// values of X and the upstream wires as assumptions. The failed core
/// names the observed values that force the clash.
fn conflict_cube(
    spec: &Spec,
    order: &Order,
    cex: &Counterexample,
    diag: &Diagnosis,
    rank: usize,
) -> Result<Cube> {
    let mut sat = Varisat::with_spec(spec);
    let y = order.var_at(rank);
    sat.add_clause(&[Lit::of_var(y, cex.y_syn[rank])]);
    for below in rank + 1..order.len() {
        sat.add_clause(&[Lit::of_var(order.var_at(below), diag.y_fix[below])]);
    }

    let mut assumptions: Vec<Lit> = Vec::new();
    for &x in &spec.universals {
        assumptions.push(Lit::of_var(x, cex.model.value(x)));
    }
    for above in 0..rank {
        assumptions.push(Lit::of_var(order.var_at(above), cex.y_syn[above]));
    }

    if sat.solve(&assumptions)? {
        return Err(SynthError::Invariant(format!(
            "conflict formula for output {y} is satisfiable"
        ))
        .into());
    }
    let core = sat.failed_core();
    let beta = Cube::new(core).ok_or_else(|| {
        SynthError::Invariant("conflict core contains complementary literals".into())
    })?;
    debug!(rank, lits = beta.lits().len(), "conflict cube extracted");
    Ok(beta)
}

fn apply(store: &mut BasisStore, rank: usize, action: RepairAction, beta: Cube) -> Result<()> {
    let entry = store.entry_mut(rank);
    let (form, expand) = match action {
        RepairAction::ShrinkA => (&mut entry.a, false),
        RepairAction::ExpandA => (&mut entry.a, true),
        RepairAction::ShrinkC => (&mut entry.c, false),
        RepairAction::ExpandC => (&mut entry.c, true),
    };
    let dual = form.as_dual_mut().ok_or_else(|| {
        SynthError::Invariant("repair aimed at a semantic basis entry".into())
    })?;
    if expand {
        debug!(rank, ?action, cube = ?beta.lits(), "expanding");
        dual.add_cube(beta);
    } else {
        debug!(rank, ?action, clause = ?beta.negated_clause(), "shrinking");
        dual.add_clause(beta.negated_clause());
    }
    Ok(())
}

/// Exact must regions from the specification cofactors, with the
/// downstream outputs removed by Shannon expansion so the result only
/// reads X and the upstream outputs. Kept as gates, never flattened.
pub fn install_semantic(spec: &Spec, order: &Order, store: &mut BasisStore, rank: usize) {
    let y = order.var_at(rank);
    let downstream: Vec<u32> = (rank + 1..order.len()).map(|r| order.var_at(r)).collect();
    let nl = &mut store.netlist;
    let f = nl.spec_gate(spec);
    let f1 = nl.cofactor(f, y, true);
    let f0 = nl.cofactor(f, y, false);
    let e1 = nl.exists(f1, &downstream);
    let e0 = nl.exists(f0, &downstream);
    let not_e0 = nl.not(e0);
    let not_e1 = nl.not(e1);
    let a = nl.and(e1, not_e0);
    let c = nl.and(e0, not_e1);
    let entry = store.entry_mut(rank);
    entry.a = BasisForm::Semantic(a);
    entry.c = BasisForm::Semantic(c);
    entry.frozen = true;
}

/// Test-build probe: the must-1 and must-0 regions of a repaired entry may
/// never intersect.
#[cfg(debug_assertions)]
fn probe_disjoint(spec: &Spec, order: &Order, store: &mut BasisStore, rank: usize) -> Result<()> {
    use std::collections::HashMap;

    use super::circuit::Encoder;

    let a = match &store.entry(rank).a {
        BasisForm::Dual(d) => d.clone(),
        BasisForm::Semantic(_) => return Ok(()),
    };
    let c = match &store.entry(rank).c {
        BasisForm::Dual(d) => d.clone(),
        BasisForm::Semantic(_) => return Ok(()),
    };
    let nl = &mut store.netlist;
    let ga = a.to_gate(nl, &|nl, v| nl.var(v));
    let gc = c.to_gate(nl, &|nl, v| nl.var(v));
    let both = nl.and(ga, gc);

    let mut enc = Encoder::new(spec.num_vars + 1);
    let mut cache = HashMap::new();
    let lit = enc.lower(
        &store.netlist,
        both,
        &|v| Lit::of_var(v, true),
        &|_| unreachable!("parameter inside a basis region"),
        &mut cache,
    );
    let mut sat = Varisat::new();
    for clause in &enc.clauses {
        sat.add_clause(clause);
    }
    sat.add_clause(&[lit]);
    if sat.solve(&[])? {
        return Err(SynthError::Invariant(format!(
            "must-1 and must-0 regions of output {} intersect",
            order.var_at(rank)
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::synth::basis::DualForm;
    use crate::synth::diagnose::diagnose;
    use crate::synth::order::dependency_order;
    use crate::synth::qdimacs;
    use crate::synth::verify::verify;

    const DEMO: &str = "p cnf 4 4\na 2 3 0\ne 1 4 0\n-1 2 0\n-1 3 0\n1 2 3 0\n4 0\n";

    fn setup() -> (Spec, Order, BasisStore) {
        let spec = qdimacs::parse_str(DEMO).unwrap();
        let order = dependency_order(&spec);
        let store = BasisStore::new_false(order.len());
        (spec, order, store)
    }

    fn one_round(spec: &Spec, order: &Order, store: &mut BasisStore, threshold: u32) -> bool {
        match verify(spec, order, store).unwrap() {
            None => true,
            Some(cex) => {
                let diag = diagnose(spec, order, store, &cex).unwrap();
                repair(spec, order, store, &cex, &diag, threshold).unwrap();
                false
            }
        }
    }

    #[test]
    fn under_approximation_expands_to_true() {
        let (spec, order, mut store) = setup();
        let r1 = order.rank_of(1).unwrap();
        let r4 = order.rank_of(4).unwrap();
        let c1 = DualForm::from_cubes(vec![
            Cube::new(vec![Lit(-2)]).unwrap(),
            Cube::new(vec![Lit(-3)]).unwrap(),
        ]);
        store.install_learned(r1, DualForm::constant_false(), c1);
        // y4 starts at constant false; one repair must lift Â_4 to true.
        let mut rounds = 0;
        while !one_round(&spec, &order, &mut store, 50) {
            rounds += 1;
            assert!(rounds < 8, "did not converge");
        }
        match &store.entry(r4).a {
            BasisForm::Dual(d) => {
                assert!(d.cubes.iter().any(|c| c.is_top()));
                assert!(d.clauses.is_empty());
            }
            BasisForm::Semantic(_) => panic!("unexpected fallback"),
        }
    }

    #[test]
    fn over_eager_region_shrinks_to_safety() {
        let (spec, order, mut store) = setup();
        let r1 = order.rank_of(1).unwrap();
        let r4 = order.rank_of(4).unwrap();
        store.install_learned(r1, DualForm::from_cubes(vec![Cube::top()]), DualForm::constant_false());
        store.install_learned(r4, DualForm::from_cubes(vec![Cube::top()]), DualForm::constant_false());
        let mut rounds = 0;
        while !one_round(&spec, &order, &mut store, 50) {
            rounds += 1;
            assert!(rounds < 8, "did not converge");
        }
        // The must-1 side of y1 was tightened, never the must-0 side.
        match &store.entry(r1).a {
            BasisForm::Dual(d) => assert!(!d.clauses.is_empty()),
            BasisForm::Semantic(_) => panic!("unexpected fallback"),
        }
        match &store.entry(r1).c {
            BasisForm::Dual(d) => {
                assert!(d.cubes.is_empty());
                assert!(d.clauses.is_empty());
            }
            BasisForm::Semantic(_) => panic!("unexpected fallback"),
        }
    }

    #[test]
    fn threshold_trips_into_semantic_entry() {
        let (spec, order, mut store) = setup();
        let mut rounds = 0;
        while !one_round(&spec, &order, &mut store, 0) {
            rounds += 1;
            assert!(rounds < 8, "did not converge");
        }
        // With a zero threshold every repaired entry freezes semantic, and
        // the loop still closes.
        assert!(store
            .entries
            .iter()
            .any(|e| e.frozen && matches!(e.a, BasisForm::Semantic(_))));
    }

    #[test]
    fn conflict_cube_generalizes() {
        let (spec, order, mut store) = setup();
        let r1 = order.rank_of(1).unwrap();
        let r4 = order.rank_of(4).unwrap();
        store.install_learned(r1, DualForm::from_cubes(vec![Cube::top()]), DualForm::constant_false());
        store.install_learned(r4, DualForm::from_cubes(vec![Cube::top()]), DualForm::constant_false());
        let cex = verify(&spec, &order, &mut store).unwrap().unwrap();
        let diag = diagnose(&spec, &order, &store, &cex).unwrap();
        let (rank, _) = diag.fixes[0];
        assert_eq!(rank, r1);
        let beta = conflict_cube(&spec, &order, &cex, &diag, rank).unwrap();
        // The clash is explained by the disagreeing input alone, so the
        // cube stays within the universal values.
        assert!(beta.lits().iter().all(|l| !spec.is_existential(l.var())));
        assert!(!beta.is_top());
    }
}
