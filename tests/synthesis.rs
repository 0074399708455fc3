use miniskolem::synth::basis::BasisForm;
use miniskolem::synth::spec::Assignment;
use miniskolem::synth::{exit_code, qdimacs, Config, Outcome, Synthesizer};

const DEMO: &str = "c two inputs, two outputs\np cnf 4 4\na 2 3 0\ne 1 4 0\n-1 2 0\n-1 3 0\n1 2 3 0\n4 0\n";

fn quick(samples: usize) -> Config {
    Config { samples, iterations: 20, ..Config::default() }
}

#[test]
fn full_pipeline_converges() {
    let spec = qdimacs::parse_str(DEMO).unwrap();
    let mut synth = Synthesizer::new(spec, quick(64)).unwrap();
    match synth.run().unwrap() {
        Outcome::Done { iterations } => assert!(iterations <= 20),
        other => panic!("expected convergence, got {other:?}"),
    }
    let summary = synth.summary();
    assert!(summary.contains("y1:"));
    assert!(summary.contains("y4:"));
}

#[test]
fn repairs_from_scratch_without_samples() {
    // An empty sample set skips the learner: every region starts false and
    // the loop must build the basis by repair alone.
    let spec = qdimacs::parse_str(DEMO).unwrap();
    let mut synth = Synthesizer::new(spec, quick(0)).unwrap();
    assert!(matches!(synth.run().unwrap(), Outcome::Done { .. }));
}

#[test]
fn single_output_converges_fast() {
    // y1 mirrors x2: no don't-cares at all.
    let spec = qdimacs::parse_str("p cnf 2 2\na 2 0\ne 1 0\n-1 2 0\n1 -2 0\n").unwrap();
    let mut synth = Synthesizer::new(spec, quick(32)).unwrap();
    match synth.run().unwrap() {
        Outcome::Done { iterations } => assert!(iterations <= 2),
        other => panic!("expected convergence, got {other:?}"),
    }
}

#[test]
fn forced_output_becomes_constant_one() {
    // y1 is must-1 on every sample, so its must-1 region covers everything.
    let spec = qdimacs::parse_str("p cnf 2 2\na 2 0\ne 1 0\n1 0\n2 -2 0\n").unwrap();
    let mut synth = Synthesizer::new(spec, quick(16)).unwrap();
    assert!(matches!(synth.run().unwrap(), Outcome::Done { iterations } if iterations <= 2));
    let entry = synth.store().entry(0);
    match &entry.a {
        BasisForm::Dual(d) => {
            let mut any = Assignment::new(2);
            assert!(d.eval(&any), "must-1 region should hold at x2=0");
            any.set(2, true);
            assert!(d.eval(&any), "must-1 region should hold at x2=1");
        }
        BasisForm::Semantic(_) => {}
    }
}

#[test]
fn mirror_spec_covers_every_input_after_convergence() {
    // With no don't-cares the union of the two regions covers every
    // satisfiable input point.
    let spec = qdimacs::parse_str("p cnf 2 2\na 2 0\ne 1 0\n-1 2 0\n1 -2 0\n").unwrap();
    let mut synth = Synthesizer::new(spec, quick(32)).unwrap();
    assert!(matches!(synth.run().unwrap(), Outcome::Done { .. }));
    let store = synth.store();
    for x2 in [false, true] {
        let mut point = Assignment::new(2);
        point.set(2, x2);
        let a = eval_form(store, &store.entry(0).a, &point);
        let c = eval_form(store, &store.entry(0).c, &point);
        assert!(a ^ c, "exactly one region must claim x2={x2}");
    }
}

fn eval_form(
    store: &miniskolem::synth::basis::BasisStore,
    form: &BasisForm,
    point: &Assignment,
) -> bool {
    match form {
        BasisForm::Dual(d) => d.eval(point),
        BasisForm::Semantic(g) => store.netlist.eval(*g, point, &[]),
    }
}

#[test]
fn zero_threshold_falls_back_to_semantic_entries() {
    let spec = qdimacs::parse_str(DEMO).unwrap();
    let config = Config { samples: 0, threshold: 0, iterations: 20, ..Config::default() };
    let mut synth = Synthesizer::new(spec, config).unwrap();
    assert!(matches!(synth.run().unwrap(), Outcome::Done { .. }));
    let frozen = (0..synth.order().len())
        .filter(|&r| synth.store().entry(r).frozen)
        .count();
    assert!(frozen > 0, "at least one entry must have gone semantic");
}

#[test]
fn unsatisfiable_spec_maps_to_exit_one() {
    let spec = qdimacs::parse_str("p cnf 2 2\na 2 0\ne 1 0\n1 0\n-1 0\n").unwrap();
    let err = Synthesizer::new(spec, Config::default()).unwrap_err();
    assert_eq!(exit_code(&err), 1);
}

#[test]
fn malformed_input_maps_to_exit_four() {
    let err = qdimacs::parse_str("p cnf 2 1\n1 junk 0\n").unwrap_err();
    assert_eq!(exit_code(&err), 4);
}

#[test]
fn iteration_cap_surfaces_partial_state() {
    let spec = qdimacs::parse_str(DEMO).unwrap();
    let config = Config { samples: 0, iterations: 1, ..Config::default() };
    let mut synth = Synthesizer::new(spec, config).unwrap();
    match synth.run().unwrap() {
        Outcome::CapReached { iterations, last } => {
            assert_eq!(iterations, 1);
            assert!(last.is_some());
        }
        Outcome::Done { .. } => panic!("one iteration cannot finish an all-false basis"),
    }
    // The partial basis is still inspectable.
    assert!(!synth.summary().is_empty());
}

#[test]
fn netlist_contains_functions_and_harness() {
    let spec = qdimacs::parse_str(DEMO).unwrap();
    let mut synth = Synthesizer::new(spec, quick(32)).unwrap();
    assert!(matches!(synth.run().unwrap(), Outcome::Done { .. }));
    let mut buf = Vec::new();
    synth.write_netlist(&mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.contains("module skolem("));
    assert!(text.contains("assign ys1 ="));
    assert!(text.contains("assign ys4 ="));
    assert!(text.contains("assign out ="));
    assert!(text.contains("endmodule"));
}

#[test]
fn declaration_order_is_honored_when_requested() {
    let spec = qdimacs::parse_str("p cnf 3 2\na 3 0\ne 2 1 0\n1 2 3 0\n-1 -2 0\n").unwrap();
    let config = Config { topo_sort: false, samples: 8, ..Config::default() };
    let synth = Synthesizer::new(spec, config).unwrap();
    assert_eq!(synth.order().pi, vec![2, 1]);
}
