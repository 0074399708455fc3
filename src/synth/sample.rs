use std::collections::HashSet;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use super::sat::{SatSolver, Varisat};
use super::spec::{Assignment, Lit, Spec};
use super::SynthError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Label {
    Must0,
    Must1,
    DontCare,
}

/// Produces satisfying assignments of F with reasonable coverage of the
/// solution space. Distribution is opaque to the caller.
pub trait Sampler {
    fn sample(&mut self, n: usize) -> Result<Vec<Assignment>>;
}

/// Samples by assuming a random phase for every variable and retreating on
/// the failed core until the solver accepts. Seeded for determinism.
pub struct PhaseSampler {
    sat: Varisat,
    num_vars: u32,
    rng: StdRng,
}

impl PhaseSampler {
    pub fn new(spec: &Spec, seed: u64) -> Self {
        Self {
            sat: Varisat::with_spec(spec),
            num_vars: spec.num_vars,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Sampler for PhaseSampler {
    fn sample(&mut self, n: usize) -> Result<Vec<Assignment>> {
        let mut out: Vec<Assignment> = Vec::with_capacity(n);
        let mut seen: HashSet<Assignment> = HashSet::new();
        let attempts = n.saturating_mul(4).max(8);
        for _ in 0..attempts {
            if out.len() >= n {
                break;
            }
            let mut phases: Vec<Lit> = (1..=self.num_vars)
                .map(|v| Lit::of_var(v, self.rng.gen()))
                .collect();
            loop {
                if self.sat.solve(&phases)? {
                    let model = self
                        .sat
                        .model()
                        .ok_or_else(|| SynthError::Solver("missing model after SAT".into()))?;
                    if seen.insert(model.clone()) {
                        out.push(model);
                    }
                    break;
                }
                let core: HashSet<Lit> = self.sat.failed_core().into_iter().collect();
                if core.is_empty() {
                    // Unconditionally UNSAT: no more models exist.
                    return Ok(out);
                }
                phases.retain(|l| !core.contains(l));
            }
        }
        if out.len() < n {
            warn!(requested = n, got = out.len(), "sampler starved, proceeding");
        } else {
            info!(samples = out.len(), "sampling complete");
        }
        Ok(out)
    }
}

/// Labels output `y` on one sample by evaluating F with every other
/// variable fixed. No solver call is involved.
pub fn label_sample(spec: &Spec, sample: &Assignment, y: u32) -> Result<Label> {
    let can_be_zero = spec.satisfied_with(sample, y, false);
    let can_be_one = spec.satisfied_with(sample, y, true);
    match (can_be_zero, can_be_one) {
        (true, true) => Ok(Label::DontCare),
        (false, true) => Ok(Label::Must1),
        (true, false) => Ok(Label::Must0),
        (false, false) => Err(SynthError::Invariant(format!(
            "sample falsifies the specification at variable {y}"
        ))
        .into()),
    }
}

pub fn label_all(spec: &Spec, samples: &[Assignment], y: u32) -> Result<Vec<Label>> {
    let labels = samples
        .iter()
        .map(|s| label_sample(spec, s, y))
        .collect::<Result<Vec<_>>>()?;
    debug!(
        y,
        must1 = labels.iter().filter(|l| **l == Label::Must1).count(),
        must0 = labels.iter().filter(|l| **l == Label::Must0).count(),
        "labeled samples"
    );
    Ok(labels)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::synth::qdimacs;

    const DEMO: &str = "p cnf 4 4\na 2 3 0\ne 1 4 0\n-1 2 0\n-1 3 0\n1 2 3 0\n4 0\n";

    fn demo() -> Spec { qdimacs::parse_str(DEMO).unwrap() }

    #[test]
    fn samples_satisfy_spec() {
        let spec = demo();
        let mut sampler = PhaseSampler::new(&spec, 42);
        let samples = sampler.sample(16).unwrap();
        assert!(!samples.is_empty());
        for s in &samples {
            assert!(spec.satisfied_by(s));
        }
    }

    #[test]
    fn unsat_spec_yields_nothing() {
        let spec = qdimacs::parse_str("p cnf 1 2\ne 1 0\n1 0\n-1 0\n").unwrap();
        let mut sampler = PhaseSampler::new(&spec, 7);
        assert!(sampler.sample(4).unwrap().is_empty());
    }

    #[test]
    fn labels_forced_and_free_outputs() {
        let spec = demo();
        // x2=1, x3=0 forces y1=0; y4 is always forced to 1.
        let mut s = Assignment::new(4);
        s.set(2, true);
        s.set(4, true);
        assert_eq!(label_sample(&spec, &s, 1).unwrap(), Label::Must0);
        assert_eq!(label_sample(&spec, &s, 4).unwrap(), Label::Must1);
        // x2=1, x3=1 leaves y1 free.
        let mut s = Assignment::new(4);
        s.set(2, true);
        s.set(3, true);
        s.set(4, true);
        assert_eq!(label_sample(&spec, &s, 1).unwrap(), Label::DontCare);
    }

    #[test]
    fn non_model_is_rejected() {
        let spec = demo();
        // y4=0 falsifies F regardless of y1.
        let s = Assignment::new(4);
        assert!(label_sample(&spec, &s, 1).is_err());
    }
}
