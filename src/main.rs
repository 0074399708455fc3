use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::exit;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use miniskolem::synth::{exit_code, Config, Outcome, Synthesizer};

/// Synthesizes a parameterized Skolem basis for a QDIMACS specification.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// QDIMACS input: universal block first, existential blocks after.
    spec_file: PathBuf,

    /// Number of training samples.
    #[arg(long, default_value_t = 500)]
    samples: usize,

    /// Maximum verification iterations.
    #[arg(long, default_value_t = 50)]
    iterations: usize,

    /// Repairs of one output before switching it to its semantic definition.
    #[arg(long, default_value_t = 50)]
    threshold: u32,

    /// Decision tree depth cap.
    #[arg(long, default_value_t = 10)]
    depth: usize,

    /// Sampler and learner seed.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Wall-clock budget in seconds (0 disables).
    #[arg(long, default_value_t = 0)]
    timeout: u64,

    /// Where to write the synthesized netlist.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Keep the QDIMACS declaration order of the outputs.
    #[arg(long)]
    no_topo_sort: bool,
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_level(true)
        .try_init();

    match run(Cli::parse()) {
        Ok(code) => exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            exit(exit_code(&e));
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    debug!("starting miniskolem");
    let config = Config {
        samples: cli.samples,
        iterations: cli.iterations,
        threshold: cli.threshold,
        max_depth: cli.depth,
        seed: cli.seed,
        timeout_secs: cli.timeout,
        topo_sort: !cli.no_topo_sort,
    };
    info!(spec = %cli.spec_file.display(), "processing specification");
    let mut synth = Synthesizer::from_file(&cli.spec_file, config)?;
    info!(
        universals = synth.spec().universals.len(),
        existentials = synth.spec().existentials.len(),
        "input dimensions"
    );

    let outcome = synth.run()?;
    match outcome {
        Outcome::Done { iterations } => {
            println!("valid Skolem basis synthesized in {iterations} iteration(s)");
            print!("{}", synth.summary());
            if let Some(path) = &cli.output {
                let file = File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                synth.write_netlist(&mut BufWriter::new(file))?;
                println!("netlist written to {}", path.display());
            }
            Ok(0)
        }
        Outcome::CapReached { iterations, last } => {
            eprintln!("synthesis did not converge within {iterations} iteration(s)");
            eprint!("{}", synth.summary());
            if let Some(cex) = last {
                eprintln!("last counterexample outputs: {:?}", cex.y_syn);
            }
            Ok(2)
        }
    }
}
