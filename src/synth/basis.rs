use tracing::debug;

use super::circuit::{GateRef, Netlist};
use super::spec::{Assignment, Clause, Lit};

/// Conjunction of literals, kept sorted and duplicate-free. Construction
/// fails on a complementary pair (the cube would be unsatisfiable).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cube(Vec<Lit>);

impl Cube {
    pub fn new(mut lits: Vec<Lit>) -> Option<Cube> {
        lits.sort_by_key(|l| (l.var(), l.is_positive()));
        lits.dedup();
        for w in lits.windows(2) {
            if w[0].var() == w[1].var() {
                return None;
            }
        }
        Some(Cube(lits))
    }

    /// The empty cube: constant true.
    pub fn top() -> Cube { Cube(Vec::new()) }

    pub fn is_top(&self) -> bool { self.0.is_empty() }

    pub fn lits(&self) -> &[Lit] { &self.0 }

    pub fn eval(&self, asg: &Assignment) -> bool {
        self.0.iter().all(|&l| asg.satisfies(l))
    }

    /// The clause ¬cube.
    pub fn negated_clause(&self) -> Clause {
        self.0.iter().map(|l| l.negated()).collect()
    }
}

/// One side of a basis entry in dual form: a growing DNF (cubes, implicit
/// or) conjoined with an accreting CNF (clauses, implicit and). The empty
/// DNF is constant false, the empty CNF constant true, so the default is
/// the constant-false set.
#[derive(Clone, Debug, Default)]
pub struct DualForm {
    pub cubes: Vec<Cube>,
    pub clauses: Vec<Clause>,
}

impl DualForm {
    pub fn constant_false() -> Self { Self::default() }

    pub fn from_cubes(cubes: Vec<Cube>) -> Self {
        Self { cubes, clauses: Vec::new() }
    }

    pub fn eval(&self, asg: &Assignment) -> bool {
        self.cubes.iter().any(|c| c.eval(asg))
            && self.clauses.iter().all(|c| c.iter().any(|&l| asg.satisfies(l)))
    }

    /// Expands coverage (or in one more cube). Exact duplicates are dropped.
    pub fn add_cube(&mut self, cube: Cube) {
        if !self.cubes.contains(&cube) {
            self.cubes.push(cube);
        }
    }

    /// Shrinks coverage (and in one more clause).
    pub fn add_clause(&mut self, clause: Clause) {
        if !self.clauses.contains(&clause) {
            self.clauses.push(clause);
        }
    }

    /// Builds the form as gates, with every variable reference routed
    /// through `map`.
    pub fn to_gate(&self, nl: &mut Netlist, map: &dyn Fn(&mut Netlist, u32) -> GateRef) -> GateRef {
        let mut cube_gates = Vec::with_capacity(self.cubes.len());
        for cube in &self.cubes {
            let lits: Vec<GateRef> = cube.lits().iter().map(|&l| lit_gate(nl, l, map)).collect();
            cube_gates.push(nl.and_all(&lits));
        }
        let dnf = nl.or_all(&cube_gates);
        let mut parts = vec![dnf];
        for clause in &self.clauses {
            let lits: Vec<GateRef> = clause.iter().map(|&l| lit_gate(nl, l, map)).collect();
            parts.push(nl.or_all(&lits));
        }
        nl.and_all(&parts)
    }
}

fn lit_gate(nl: &mut Netlist, l: Lit, map: &dyn Fn(&mut Netlist, u32) -> GateRef) -> GateRef {
    let v = map(nl, l.var());
    if l.is_positive() { v } else { nl.not(v) }
}

/// One side of an entry: the learned-and-repaired dual form, or the frozen
/// semantic gate installed by the fallback.
#[derive(Clone, Debug)]
pub enum BasisForm {
    Dual(DualForm),
    Semantic(GateRef),
}

impl BasisForm {
    pub fn as_dual_mut(&mut self) -> Option<&mut DualForm> {
        match self {
            BasisForm::Dual(d) => Some(d),
            BasisForm::Semantic(_) => None,
        }
    }
}

/// Per-output basis state: the must-1 region `a`, the must-0 region `c`,
/// and repair bookkeeping.
#[derive(Clone, Debug)]
pub struct BasisEntry {
    pub a: BasisForm,
    pub c: BasisForm,
    pub repair_count: u32,
    pub frozen: bool,
}

impl BasisEntry {
    fn constant_false() -> Self {
        Self {
            a: BasisForm::Dual(DualForm::constant_false()),
            c: BasisForm::Dual(DualForm::constant_false()),
            repair_count: 0,
            frozen: false,
        }
    }
}

/// Holds one entry per output rank plus the netlist that owns all semantic
/// gates. Mutated only by the repairer and the fallback.
#[derive(Debug)]
pub struct BasisStore {
    pub entries: Vec<BasisEntry>,
    pub netlist: Netlist,
}

impl BasisStore {
    pub fn new_false(outputs: usize) -> Self {
        Self {
            entries: (0..outputs).map(|_| BasisEntry::constant_false()).collect(),
            netlist: Netlist::new(),
        }
    }

    pub fn entry(&self, rank: usize) -> &BasisEntry { &self.entries[rank] }

    pub fn entry_mut(&mut self, rank: usize) -> &mut BasisEntry { &mut self.entries[rank] }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Evaluates the must-1 region of `rank` on a point over X and the
    /// upstream outputs.
    pub fn eval_a(&self, rank: usize, asg: &Assignment) -> bool {
        match &self.entries[rank].a {
            BasisForm::Dual(d) => d.eval(asg),
            BasisForm::Semantic(g) => self.netlist.eval(*g, asg, &[]),
        }
    }

    pub fn install_learned(&mut self, rank: usize, a: DualForm, c: DualForm) {
        debug!(
            rank,
            a_cubes = a.cubes.len(),
            c_cubes = c.cubes.len(),
            "installing learned basis entry"
        );
        let e = &mut self.entries[rank];
        e.a = BasisForm::Dual(a);
        e.c = BasisForm::Dual(c);
    }
}
