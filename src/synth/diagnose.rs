use anyhow::Result;
use tracing::{debug, info};

use super::basis::BasisStore;
use super::maxsat::MaxSat;
use super::order::Order;
use super::sat::Varisat;
use super::spec::{Lit, Spec};
use super::verify::Counterexample;
use super::SynthError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepairAction {
    ShrinkA,
    ExpandA,
    ShrinkC,
    ExpandC,
}

/// The erring indices in rank order, each with its repair action, plus the
/// corrected output vector the localization found.
#[derive(Clone, Debug)]
pub struct Diagnosis {
    pub fixes: Vec<(usize, RepairAction)>,
    pub y_fix: Vec<bool>,
}

/// Chooses the repair for one erring output. `a_holds` is consulted only
/// in the target-0, parameter-1 row: a must-1 region that actually covered
/// the point is at fault and gets shrunk; expanding the must-0 region is
/// reserved for the case where the parameter alone produced the 1.
pub fn classify(target: bool, g_val: bool, a_holds: impl FnOnce() -> bool) -> RepairAction {
    match (target, g_val) {
        (false, false) => RepairAction::ShrinkA,
        (false, true) => {
            if a_holds() { RepairAction::ShrinkA } else { RepairAction::ExpandC }
        }
        (true, false) => RepairAction::ExpandA,
        (true, true) => RepairAction::ShrinkC,
    }
}

/// Finds the minimum set of outputs whose flip makes the candidate's
/// assignment consistent with F on the counterexample inputs: hard clauses
/// are F and the universal values, one weight-1 soft unit per output pins
/// its candidate value.
pub fn diagnose(
    spec: &Spec,
    order: &Order,
    store: &BasisStore,
    cex: &Counterexample,
) -> Result<Diagnosis> {
    let mut ms = MaxSat::new(Varisat::with_spec(spec), spec.num_vars + 1);
    for &x in &spec.universals {
        ms.add_hard(&[Lit::of_var(x, cex.model.value(x))]);
    }
    for (rank, &y) in order.pi.iter().enumerate() {
        ms.add_soft_unit(Lit::of_var(y, cex.y_syn[rank]));
    }
    let (cost, fixed) = ms.solve()?;

    let y_fix: Vec<bool> = order.pi.iter().map(|&y| fixed.value(y)).collect();
    let flipped: Vec<usize> =
        (0..order.len()).filter(|&r| y_fix[r] != cex.y_syn[r]).collect();
    if flipped.is_empty() {
        return Err(SynthError::Invariant(
            "counterexample exists but localization flips no output".into(),
        )
        .into());
    }
    info!(cost, ?flipped, "diagnosis localized erring outputs");

    // The candidate's own outputs stand in for the upstream values when a
    // must-1 region is consulted.
    let mut point = cex.model.clone();
    for (rank, &y) in order.pi.iter().enumerate() {
        point.set(y, cex.y_syn[rank]);
    }

    let mut fixes = Vec::with_capacity(flipped.len());
    for rank in flipped {
        let action = classify(y_fix[rank], cex.g[rank], || store.eval_a(rank, &point));
        debug!(rank, ?action, "classified repair");
        fixes.push((rank, action));
    }
    Ok(Diagnosis { fixes, y_fix })
}
