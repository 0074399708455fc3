use std::collections::HashSet;
use std::fmt;

/// Signed variable reference in DIMACS convention: positive payload is the
/// variable asserted true, negative is the variable asserted false.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lit(pub i32);

impl Lit {
    pub fn of_var(var: u32, positive: bool) -> Self {
        debug_assert!(var > 0);
        if positive { Lit(var as i32) } else { Lit(-(var as i32)) }
    }

    pub fn var(self) -> u32 { self.0.unsigned_abs() }

    pub fn is_positive(self) -> bool { self.0 > 0 }

    pub fn negated(self) -> Lit { Lit(-self.0) }
}

impl fmt::Debug for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Disjunction of literals.
pub type Clause = Vec<Lit>;

/// Dense total assignment, indexed by variable id (slot 0 unused).
/// Variables beyond the stored range read as false.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Assignment {
    values: Vec<bool>,
}

impl Assignment {
    pub fn new(num_vars: u32) -> Self {
        Self { values: vec![false; num_vars as usize + 1] }
    }

    pub fn set(&mut self, var: u32, value: bool) {
        let idx = var as usize;
        if idx >= self.values.len() {
            self.values.resize(idx + 1, false);
        }
        self.values[idx] = value;
    }

    pub fn value(&self, var: u32) -> bool {
        self.values.get(var as usize).copied().unwrap_or(false)
    }

    pub fn satisfies(&self, lit: Lit) -> bool {
        self.value(lit.var()) == lit.is_positive()
    }
}

/// The relational specification F: a CNF matrix plus the quantifier
/// partition. Read-only after load.
#[derive(Clone, Debug)]
pub struct Spec {
    pub num_vars: u32,
    pub clauses: Vec<Clause>,
    pub universals: Vec<u32>,
    pub existentials: Vec<u32>,
    existential_set: HashSet<u32>,
}

impl Spec {
    pub fn new(
        num_vars: u32,
        clauses: Vec<Clause>,
        universals: Vec<u32>,
        existentials: Vec<u32>,
    ) -> Self {
        let existential_set = existentials.iter().copied().collect();
        Self { num_vars, clauses, universals, existentials, existential_set }
    }

    pub fn is_existential(&self, var: u32) -> bool {
        self.existential_set.contains(&var)
    }

    pub fn clause_satisfied(clause: &Clause, asg: &Assignment) -> bool {
        clause.iter().any(|&l| asg.satisfies(l))
    }

    pub fn satisfied_by(&self, asg: &Assignment) -> bool {
        self.clauses.iter().all(|c| Self::clause_satisfied(c, asg))
    }

    /// Evaluates F with one variable overridden, all others taken from `asg`.
    pub fn satisfied_with(&self, asg: &Assignment, var: u32, value: bool) -> bool {
        self.clauses.iter().all(|c| {
            c.iter().any(|&l| {
                if l.var() == var { value == l.is_positive() } else { asg.satisfies(l) }
            })
        })
    }
}
