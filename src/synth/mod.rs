use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use thiserror::Error;
use tracing::{info, warn};

pub mod basis;
pub mod circuit;
pub mod diagnose;
pub mod learn;
pub mod maxsat;
pub mod order;
pub mod qdimacs;
pub mod repair;
pub mod sample;
pub mod sat;
pub mod spec;
pub mod verify;

use basis::{BasisForm, BasisStore, DualForm};
use circuit::{build_candidate, write_verilog};
use learn::{GiniLearner, LabeledRows, Learner};
use order::{declaration_order, dependency_order, Order};
use sample::{label_all, Label, PhaseSampler, Sampler};
use spec::Spec;
use verify::{verify, Counterexample};

/// Failure kinds that map onto process exit codes.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("malformed input at line {line}: {msg}")]
    Malformed { line: usize, msg: String },
    #[error("specification is unsatisfiable")]
    Degenerate,
    #[error("solver failure: {0}")]
    Solver(String),
    #[error("wall-clock budget exhausted")]
    Timeout,
    #[error("invariant violation: {0}")]
    Invariant(String),
}

pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<SynthError>() {
        Some(SynthError::Malformed { .. }) => 4,
        Some(SynthError::Degenerate) => 1,
        Some(SynthError::Solver(_)) | Some(SynthError::Timeout) | Some(SynthError::Invariant(_)) => 3,
        None => 3,
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Training samples requested from the sampler.
    pub samples: usize,
    /// Verification iterations before giving up.
    pub iterations: usize,
    /// Repairs of one output before its entry goes semantic.
    pub threshold: u32,
    /// Decision tree depth cap.
    pub max_depth: usize,
    pub seed: u64,
    /// Whole-run wall-clock budget in seconds, 0 for none.
    pub timeout_secs: u64,
    /// Order outputs by dependency analysis instead of declaration order.
    pub topo_sort: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            samples: 500,
            iterations: 50,
            threshold: 50,
            max_depth: 10,
            seed: 42,
            timeout_secs: 0,
            topo_sort: true,
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    /// The final check was UNSAT: the basis is correct.
    Done { iterations: usize },
    /// Iteration cap hit; the partial basis and the last counterexample
    /// are still available.
    CapReached { iterations: usize, last: Option<Counterexample> },
}

enum Phase {
    Learn,
    Verify,
    Diagnose(Counterexample),
    Repair(Counterexample, diagnose::Diagnosis),
}

/// Owns the specification, the output order, the basis store and the
/// solver lifecycle, and drives learn → verify → diagnose → repair until
/// the verifier answers UNSAT or a budget runs out.
#[derive(Debug)]
pub struct Synthesizer {
    spec: Spec,
    order: Order,
    store: BasisStore,
    config: Config,
}

impl Synthesizer {
    pub fn from_file(path: &Path, config: Config) -> Result<Self> {
        Self::new(qdimacs::parse_file(path)?, config)
    }

    pub fn new(spec: Spec, config: Config) -> Result<Self> {
        if !sat::probe_satisfiable(&spec)? {
            return Err(SynthError::Degenerate.into());
        }
        let order =
            if config.topo_sort { dependency_order(&spec) } else { declaration_order(&spec) };
        let store = BasisStore::new_false(order.len());
        Ok(Self { spec, order, store, config })
    }

    pub fn spec(&self) -> &Spec { &self.spec }

    pub fn order(&self) -> &Order { &self.order }

    pub fn store(&self) -> &BasisStore { &self.store }

    // Phase 2 and 3: sample, label, train, extract. Everything built here
    // is dropped again once the initial regions are installed.
    fn learn_initial(&mut self) -> Result<()> {
        let mut sampler = PhaseSampler::new(&self.spec, self.config.seed);
        let samples = sampler.sample(self.config.samples)?;
        if samples.is_empty() {
            warn!("no usable samples, every region starts at constant false");
            return Ok(());
        }
        let learner = GiniLearner { max_depth: self.config.max_depth };
        let mut x_columns = self.spec.universals.clone();
        x_columns.sort_unstable();
        for rank in 0..self.order.len() {
            let y = self.order.var_at(rank);
            let labels = label_all(&self.spec, &samples, y)?;
            let mut columns = x_columns.clone();
            columns.extend_from_slice(self.order.prefix(rank));
            let data = LabeledRows::build(columns, &samples, labels);
            let tree = learner.fit(&data);
            let a = DualForm::from_cubes(tree.extract_cubes(&data.columns, Label::Must1));
            let c = DualForm::from_cubes(tree.extract_cubes(&data.columns, Label::Must0));
            self.store.install_learned(rank, a, c);
        }
        Ok(())
    }

    pub fn run(&mut self) -> Result<Outcome> {
        let deadline = (self.config.timeout_secs > 0)
            .then(|| Instant::now() + Duration::from_secs(self.config.timeout_secs));
        let mut iterations = 0usize;
        let mut last_cex: Option<Counterexample> = None;
        let mut phase = Phase::Learn;
        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(SynthError::Timeout.into());
            }
            phase = match phase {
                Phase::Learn => {
                    self.learn_initial()?;
                    Phase::Verify
                }
                Phase::Verify => {
                    if iterations >= self.config.iterations {
                        warn!(iterations, "iteration cap reached");
                        return Ok(Outcome::CapReached { iterations, last: last_cex });
                    }
                    iterations += 1;
                    info!(iteration = iterations, "verifying candidate");
                    match verify(&self.spec, &self.order, &mut self.store)? {
                        None => return Ok(Outcome::Done { iterations }),
                        Some(cex) => Phase::Diagnose(cex),
                    }
                }
                Phase::Diagnose(cex) => {
                    let diag = diagnose::diagnose(&self.spec, &self.order, &self.store, &cex)?;
                    Phase::Repair(cex, diag)
                }
                Phase::Repair(cex, diag) => {
                    repair::repair(
                        &self.spec,
                        &self.order,
                        &mut self.store,
                        &cex,
                        &diag,
                        self.config.threshold,
                    )?;
                    last_cex = Some(cex);
                    Phase::Verify
                }
            };
        }
    }

    /// Emits the synthesized functions plus the doubled-specification
    /// harness as structural Verilog.
    pub fn write_netlist<W: Write>(&mut self, w: &mut W) -> Result<()> {
        let cand = build_candidate(&self.spec, &self.order, &mut self.store);
        write_verilog(w, &self.spec, &self.order, &self.store.netlist, &cand)?;
        Ok(())
    }

    /// One line per output describing its basis entry.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for rank in 0..self.order.len() {
            let y = self.order.var_at(rank);
            let entry = self.store.entry(rank);
            let describe = |form: &BasisForm| match form {
                BasisForm::Dual(d) => {
                    format!("{} cubes, {} clauses", d.cubes.len(), d.clauses.len())
                }
                BasisForm::Semantic(_) => "semantic".to_string(),
            };
            out.push_str(&format!(
                "y{y}: must-1 [{}], must-0 [{}], repairs {}\n",
                describe(&entry.a),
                describe(&entry.c),
                entry.repair_count
            ));
        }
        out
    }
}
