use std::collections::{HashMap, HashSet};
use std::io::{self, Write};

use tracing::debug;

use super::basis::BasisForm;
use super::order::Order;
use super::spec::{Assignment, Clause, Lit, Spec};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GateRef(pub u32);

/// `Var` references a specification variable, `Param` the free choice
/// input of the output at that rank.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Gate {
    Const(bool),
    Var(u32),
    Param(usize),
    Not(GateRef),
    And(GateRef, GateRef),
    Or(GateRef, GateRef),
}

/// Structurally hash-consed gate store. Children always precede parents,
/// so the vector order is topological.
#[derive(Clone, Debug, Default)]
pub struct Netlist {
    gates: Vec<Gate>,
    dedup: HashMap<Gate, GateRef>,
}

impl Netlist {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.gates.len() }

    pub fn is_empty(&self) -> bool { self.gates.is_empty() }

    pub fn gate(&self, r: GateRef) -> &Gate { &self.gates[r.0 as usize] }

    fn intern(&mut self, g: Gate) -> GateRef {
        if let Some(&r) = self.dedup.get(&g) {
            return r;
        }
        let r = GateRef(self.gates.len() as u32);
        self.gates.push(g.clone());
        self.dedup.insert(g, r);
        r
    }

    pub fn constant(&mut self, value: bool) -> GateRef { self.intern(Gate::Const(value)) }

    pub fn var(&mut self, v: u32) -> GateRef { self.intern(Gate::Var(v)) }

    pub fn param(&mut self, rank: usize) -> GateRef { self.intern(Gate::Param(rank)) }

    pub fn not(&mut self, a: GateRef) -> GateRef {
        match self.gate(a).clone() {
            Gate::Const(b) => self.constant(!b),
            Gate::Not(inner) => inner,
            _ => self.intern(Gate::Not(a)),
        }
    }

    pub fn and(&mut self, a: GateRef, b: GateRef) -> GateRef {
        if a == b {
            return a;
        }
        match (self.gate(a).clone(), self.gate(b).clone()) {
            (Gate::Const(true), _) => return b,
            (_, Gate::Const(true)) => return a,
            (Gate::Const(false), _) | (_, Gate::Const(false)) => return self.constant(false),
            (Gate::Not(x), _) if x == b => return self.constant(false),
            (_, Gate::Not(x)) if x == a => return self.constant(false),
            _ => {}
        }
        let (lo, hi) = if a.0 <= b.0 { (a, b) } else { (b, a) };
        self.intern(Gate::And(lo, hi))
    }

    pub fn or(&mut self, a: GateRef, b: GateRef) -> GateRef {
        if a == b {
            return a;
        }
        match (self.gate(a).clone(), self.gate(b).clone()) {
            (Gate::Const(false), _) => return b,
            (_, Gate::Const(false)) => return a,
            (Gate::Const(true), _) | (_, Gate::Const(true)) => return self.constant(true),
            (Gate::Not(x), _) if x == b => return self.constant(true),
            (_, Gate::Not(x)) if x == a => return self.constant(true),
            _ => {}
        }
        let (lo, hi) = if a.0 <= b.0 { (a, b) } else { (b, a) };
        self.intern(Gate::Or(lo, hi))
    }

    pub fn and_all(&mut self, xs: &[GateRef]) -> GateRef {
        let mut acc = self.constant(true);
        for &x in xs {
            acc = self.and(acc, x);
        }
        acc
    }

    pub fn or_all(&mut self, xs: &[GateRef]) -> GateRef {
        let mut acc = self.constant(false);
        for &x in xs {
            acc = self.or(acc, x);
        }
        acc
    }

    /// Evaluates `root` with specification variables read from `asg` and
    /// parameter inputs from `params` (indexed by rank).
    pub fn eval(&self, root: GateRef, asg: &Assignment, params: &[bool]) -> bool {
        let mut memo: HashMap<GateRef, bool> = HashMap::new();
        self.eval_rec(root, asg, params, &mut memo)
    }

    fn eval_rec(
        &self,
        at: GateRef,
        asg: &Assignment,
        params: &[bool],
        memo: &mut HashMap<GateRef, bool>,
    ) -> bool {
        if let Some(&v) = memo.get(&at) {
            return v;
        }
        let v = match *self.gate(at) {
            Gate::Const(b) => b,
            Gate::Var(x) => asg.value(x),
            Gate::Param(i) => params[i],
            Gate::Not(a) => !self.eval_rec(a, asg, params, memo),
            Gate::And(a, b) => {
                self.eval_rec(a, asg, params, memo) && self.eval_rec(b, asg, params, memo)
            }
            Gate::Or(a, b) => {
                self.eval_rec(a, asg, params, memo) || self.eval_rec(b, asg, params, memo)
            }
        };
        memo.insert(at, v);
        v
    }

    /// Positive or negative cofactor on one specification variable.
    pub fn cofactor(&mut self, root: GateRef, var: u32, value: bool) -> GateRef {
        let mut memo = HashMap::new();
        self.cofactor_rec(root, var, value, &mut memo)
    }

    fn cofactor_rec(
        &mut self,
        at: GateRef,
        var: u32,
        value: bool,
        memo: &mut HashMap<GateRef, GateRef>,
    ) -> GateRef {
        if let Some(&r) = memo.get(&at) {
            return r;
        }
        let r = match self.gate(at).clone() {
            Gate::Var(x) if x == var => self.constant(value),
            Gate::Const(_) | Gate::Var(_) | Gate::Param(_) => at,
            Gate::Not(a) => {
                let a = self.cofactor_rec(a, var, value, memo);
                self.not(a)
            }
            Gate::And(a, b) => {
                let a = self.cofactor_rec(a, var, value, memo);
                let b = self.cofactor_rec(b, var, value, memo);
                self.and(a, b)
            }
            Gate::Or(a, b) => {
                let a = self.cofactor_rec(a, var, value, memo);
                let b = self.cofactor_rec(b, var, value, memo);
                self.or(a, b)
            }
        };
        memo.insert(at, r);
        r
    }

    /// Existential quantification by Shannon expansion, one variable at a
    /// time. Sharing in the store keeps the expansion from flattening.
    pub fn exists(&mut self, root: GateRef, vars: &[u32]) -> GateRef {
        let mut acc = root;
        for &v in vars {
            let lo = self.cofactor(acc, v, false);
            let hi = self.cofactor(acc, v, true);
            acc = self.or(lo, hi);
        }
        acc
    }

    /// Rewrites specification-variable references through `map`.
    pub fn substitute(&mut self, root: GateRef, map: &HashMap<u32, GateRef>) -> GateRef {
        let mut memo = HashMap::new();
        self.substitute_rec(root, map, &mut memo)
    }

    fn substitute_rec(
        &mut self,
        at: GateRef,
        map: &HashMap<u32, GateRef>,
        memo: &mut HashMap<GateRef, GateRef>,
    ) -> GateRef {
        if let Some(&r) = memo.get(&at) {
            return r;
        }
        let r = match self.gate(at).clone() {
            Gate::Var(x) => map.get(&x).copied().unwrap_or(at),
            Gate::Const(_) | Gate::Param(_) => at,
            Gate::Not(a) => {
                let a = self.substitute_rec(a, map, memo);
                self.not(a)
            }
            Gate::And(a, b) => {
                let a = self.substitute_rec(a, map, memo);
                let b = self.substitute_rec(b, map, memo);
                self.and(a, b)
            }
            Gate::Or(a, b) => {
                let a = self.substitute_rec(a, map, memo);
                let b = self.substitute_rec(b, map, memo);
                self.or(a, b)
            }
        };
        memo.insert(at, r);
        r
    }

    /// F as a gate over the raw specification variables.
    pub fn spec_gate(&mut self, spec: &Spec) -> GateRef {
        let mut clause_gates = Vec::with_capacity(spec.clauses.len());
        for clause in &spec.clauses {
            let lits: Vec<GateRef> = clause
                .iter()
                .map(|&l| {
                    let v = self.var(l.var());
                    if l.is_positive() { v } else { self.not(v) }
                })
                .collect();
            clause_gates.push(self.or_all(&lits));
        }
        self.and_all(&clause_gates)
    }
}

/// The composed candidate: ψ wires by rank and the doubled-specification
/// harness with its error output.
pub struct Candidate {
    pub psi: Vec<GateRef>,
    pub valid_orig: GateRef,
    pub valid_syn: GateRef,
    pub out: GateRef,
}

/// Composes ψ_i = Â_i ∨ (g_i ∧ ¬Ĉ_i) for every rank, wiring upstream
/// outputs to their ψ gates, then instantiates F over the original outputs
/// and over the ψ wires and exports out = valid_orig ∧ ¬valid_syn.
pub fn build_candidate(
    spec: &Spec,
    order: &Order,
    store: &mut super::basis::BasisStore,
) -> Candidate {
    let mut psi: Vec<GateRef> = Vec::with_capacity(order.len());
    for rank in 0..order.len() {
        let a = form_gate(&store.entries[rank].a.clone(), order, &psi, &mut store.netlist);
        let c = form_gate(&store.entries[rank].c.clone(), order, &psi, &mut store.netlist);
        let nl = &mut store.netlist;
        let g = nl.param(rank);
        let not_c = nl.not(c);
        let choice = nl.and(g, not_c);
        psi.push(nl.or(a, choice));
    }

    let nl = &mut store.netlist;
    let mut orig_gates = Vec::with_capacity(spec.clauses.len());
    let mut syn_gates = Vec::with_capacity(spec.clauses.len());
    for clause in &spec.clauses {
        orig_gates.push(clause_gate(nl, clause, &|nl, v| nl.var(v)));
        syn_gates.push(clause_gate(nl, clause, &|nl, v| match order.rank_of(v) {
            Some(r) => psi[r],
            None => nl.var(v),
        }));
    }
    let valid_orig = nl.and_all(&orig_gates);
    let valid_syn = nl.and_all(&syn_gates);
    let not_syn = nl.not(valid_syn);
    let out = nl.and(valid_orig, not_syn);
    debug!(gates = nl.len(), "candidate circuit built");
    Candidate { psi, valid_orig, valid_syn, out }
}

fn clause_gate(
    nl: &mut Netlist,
    clause: &Clause,
    map: &dyn Fn(&mut Netlist, u32) -> GateRef,
) -> GateRef {
    let lits: Vec<GateRef> = clause
        .iter()
        .map(|&l| {
            let v = map(nl, l.var());
            if l.is_positive() { v } else { nl.not(v) }
        })
        .collect();
    nl.or_all(&lits)
}

fn form_gate(form: &BasisForm, order: &Order, psi: &[GateRef], nl: &mut Netlist) -> GateRef {
    match form {
        BasisForm::Dual(d) => d.to_gate(nl, &|nl, v| match order.rank_of(v) {
            Some(r) if r < psi.len() => psi[r],
            _ => nl.var(v),
        }),
        BasisForm::Semantic(g) => {
            let map: HashMap<u32, GateRef> = order
                .pi
                .iter()
                .enumerate()
                .take(psi.len())
                .map(|(r, &v)| (v, psi[r]))
                .collect();
            nl.substitute(*g, &map)
        }
    }
}

/// Tseitin lowering of gates and of raw and/or terms into CNF clauses.
/// Fresh variables start at `first_free`; both implication directions are
/// always emitted.
pub struct Encoder {
    pub clauses: Vec<Clause>,
    next_var: u32,
}

impl Encoder {
    pub fn new(first_free: u32) -> Self {
        Self { clauses: Vec::new(), next_var: first_free }
    }

    pub fn fresh(&mut self) -> Lit {
        let v = self.next_var;
        self.next_var += 1;
        Lit::of_var(v, true)
    }

    pub fn constant(&mut self, value: bool) -> Lit {
        let t = self.fresh();
        self.clauses.push(vec![if value { t } else { t.negated() }]);
        t
    }

    pub fn mk_and(&mut self, ins: &[Lit]) -> Lit {
        match ins {
            [] => self.constant(true),
            [only] => *only,
            _ => {
                let out = self.fresh();
                for &l in ins {
                    self.clauses.push(vec![out.negated(), l]);
                }
                let mut clause: Clause = ins.iter().map(|l| l.negated()).collect();
                clause.push(out);
                self.clauses.push(clause);
                out
            }
        }
    }

    pub fn mk_or(&mut self, ins: &[Lit]) -> Lit {
        match ins {
            [] => self.constant(false),
            [only] => *only,
            _ => {
                let out = self.fresh();
                for &l in ins {
                    self.clauses.push(vec![l.negated(), out]);
                }
                let mut clause: Clause = ins.to_vec();
                clause.push(out.negated());
                self.clauses.push(clause);
                out
            }
        }
    }

    /// Lowers a gate; specification variables and parameters are resolved
    /// through the supplied maps.
    pub fn lower(
        &mut self,
        nl: &Netlist,
        root: GateRef,
        var_map: &dyn Fn(u32) -> Lit,
        param_map: &dyn Fn(usize) -> Lit,
        cache: &mut HashMap<GateRef, Lit>,
    ) -> Lit {
        if let Some(&l) = cache.get(&root) {
            return l;
        }
        let l = match *nl.gate(root) {
            Gate::Const(b) => self.constant(b),
            Gate::Var(v) => var_map(v),
            Gate::Param(i) => param_map(i),
            Gate::Not(a) => self.lower(nl, a, var_map, param_map, cache).negated(),
            Gate::And(a, b) => {
                let la = self.lower(nl, a, var_map, param_map, cache);
                let lb = self.lower(nl, b, var_map, param_map, cache);
                self.mk_and(&[la, lb])
            }
            Gate::Or(a, b) => {
                let la = self.lower(nl, a, var_map, param_map, cache);
                let lb = self.lower(nl, b, var_map, param_map, cache);
                self.mk_or(&[la, lb])
            }
        };
        cache.insert(root, l);
        l
    }
}

/// Writes the synthesized functions and the verification harness as one
/// structural Verilog module. `out` is satisfiable iff the candidate is
/// wrong, so a downstream checker asserts it stays 0.
pub fn write_verilog<W: Write>(
    w: &mut W,
    spec: &Spec,
    order: &Order,
    nl: &Netlist,
    cand: &Candidate,
) -> io::Result<()> {
    let mut reachable: HashSet<GateRef> = HashSet::new();
    let mut stack: Vec<GateRef> = cand.psi.clone();
    stack.push(cand.out);
    while let Some(at) = stack.pop() {
        if !reachable.insert(at) {
            continue;
        }
        match *nl.gate(at) {
            Gate::Not(a) => stack.push(a),
            Gate::And(a, b) | Gate::Or(a, b) => {
                stack.push(a);
                stack.push(b);
            }
            _ => {}
        }
    }

    let name = |r: GateRef| -> String {
        match *nl.gate(r) {
            Gate::Const(true) => "1'b1".into(),
            Gate::Const(false) => "1'b0".into(),
            Gate::Var(v) => {
                if order.rank_of(v).is_some() { format!("y{v}") } else { format!("x{v}") }
            }
            Gate::Param(i) => format!("g{}", order.var_at(i)),
            _ => format!("n{}", r.0),
        }
    };

    let xs: Vec<String> = spec.universals.iter().map(|v| format!("x{v}")).collect();
    let gs: Vec<String> = order.pi.iter().map(|v| format!("g{v}")).collect();
    let ys: Vec<String> = order.pi.iter().map(|v| format!("y{v}")).collect();
    let outs: Vec<String> = order.pi.iter().map(|v| format!("ys{v}")).collect();

    let mut ports: Vec<String> = Vec::new();
    ports.extend(xs.iter().cloned());
    ports.extend(gs.iter().cloned());
    ports.extend(ys.iter().cloned());
    ports.extend(outs.iter().cloned());
    ports.push("out".into());
    writeln!(w, "module skolem({});", ports.join(", "))?;
    for p in xs.iter().chain(gs.iter()).chain(ys.iter()) {
        writeln!(w, "  input {p};")?;
    }
    for p in &outs {
        writeln!(w, "  output {p};")?;
    }
    writeln!(w, "  output out;")?;

    let mut internal: Vec<GateRef> = reachable
        .iter()
        .copied()
        .filter(|r| matches!(nl.gate(*r), Gate::Not(_) | Gate::And(..) | Gate::Or(..)))
        .collect();
    internal.sort_by_key(|r| r.0);
    for &r in &internal {
        writeln!(w, "  wire n{};", r.0)?;
    }
    for &r in &internal {
        match *nl.gate(r) {
            Gate::Not(a) => writeln!(w, "  assign n{} = ~{};", r.0, name(a))?,
            Gate::And(a, b) => writeln!(w, "  assign n{} = {} & {};", r.0, name(a), name(b))?,
            Gate::Or(a, b) => writeln!(w, "  assign n{} = {} | {};", r.0, name(a), name(b))?,
            _ => unreachable!(),
        }
    }
    for (rank, v) in order.pi.iter().enumerate() {
        writeln!(w, "  assign ys{} = {};", v, name(cand.psi[rank]))?;
    }
    writeln!(w, "  assign out = {};", name(cand.out))?;
    writeln!(w, "endmodule")?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn folding_keeps_constants_out() {
        let mut nl = Netlist::new();
        let t = nl.constant(true);
        let v = nl.var(1);
        assert_eq!(nl.and(t, v), v);
        let f = nl.constant(false);
        assert_eq!(nl.or(f, v), v);
        let nv = nl.not(v);
        assert_eq!(nl.and(v, nv), f);
        assert_eq!(nl.not(nv), v);
    }

    #[test]
    fn hash_consing_shares_structure() {
        let mut nl = Netlist::new();
        let a = nl.var(1);
        let b = nl.var(2);
        let x = nl.and(a, b);
        let y = nl.and(b, a);
        assert_eq!(x, y);
    }

    #[test]
    fn eval_and_cofactor_agree() {
        let mut nl = Netlist::new();
        let a = nl.var(1);
        let b = nl.var(2);
        let nb = nl.not(b);
        let root = nl.or(a, nb);
        let mut asg = Assignment::new(2);
        asg.set(2, true);
        assert!(!nl.eval(root, &asg, &[]));
        let co = nl.cofactor(root, 1, true);
        assert!(nl.eval(co, &asg, &[]));
    }

    #[test]
    fn exists_removes_the_variable() {
        let mut nl = Netlist::new();
        // (v1 & v2): exists v2 gives v1.
        let a = nl.var(1);
        let b = nl.var(2);
        let root = nl.and(a, b);
        let q = nl.exists(root, &[2]);
        assert_eq!(q, a);
        // (v2 & !v2) under exists stays false.
        let nb = nl.not(b);
        let contra = nl.and(b, nb);
        let q = nl.exists(contra, &[2]);
        assert_eq!(q, nl.constant(false));
    }

    #[test]
    fn encoder_and_or_semantics() {
        use crate::synth::sat::{SatSolver, Varisat};
        let mut enc = Encoder::new(3);
        let out = enc.mk_and(&[Lit(1), Lit(-2)]);
        let mut sat = Varisat::new();
        for c in &enc.clauses {
            sat.add_clause(c);
        }
        // out & 2 is unsat because out forces -2.
        assert!(!sat.solve(&[out, Lit(2)]).unwrap());
        assert!(sat.solve(&[out, Lit(1)]).unwrap());
        // !out with 1 & -2 contradicts the definition.
        assert!(!sat.solve(&[out.negated(), Lit(1), Lit(-2)]).unwrap());
    }
}
