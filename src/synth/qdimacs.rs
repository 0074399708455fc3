use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::spec::{Clause, Lit, Spec};
use super::SynthError;

pub fn parse_file(path: &Path) -> Result<Spec> {
    let input = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_str(&input)
}

fn malformed(line: usize, msg: impl Into<String>) -> anyhow::Error {
    SynthError::Malformed { line, msg: msg.into() }.into()
}

/// Parses QDIMACS: comment lines, a `p cnf V C` header, `a`/`e` quantifier
/// lines and zero-terminated clauses. The first `a` block is the universal
/// prefix; `e` blocks list the outputs in order. Variables mentioned in no
/// block default to universal.
pub fn parse_str(input: &str) -> Result<Spec> {
    let mut num_vars: u32 = 0;
    let mut declared_clauses: usize = 0;
    let mut saw_header = false;
    let mut universals: Vec<u32> = Vec::new();
    let mut existentials: Vec<u32> = Vec::new();
    let mut clauses: Vec<Clause> = Vec::new();

    for (idx, raw) in input.lines().enumerate() {
        let lineno = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('c') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("p ") {
            if saw_header {
                return Err(malformed(lineno, "duplicate problem header"));
            }
            let parts: Vec<&str> = rest.split_whitespace().collect();
            if parts.len() != 3 || parts[0] != "cnf" {
                return Err(malformed(lineno, "expected `p cnf <vars> <clauses>`"));
            }
            num_vars = parts[1]
                .parse()
                .map_err(|_| malformed(lineno, format!("bad variable count `{}`", parts[1])))?;
            declared_clauses = parts[2]
                .parse()
                .map_err(|_| malformed(lineno, format!("bad clause count `{}`", parts[2])))?;
            saw_header = true;
            debug!(num_vars, declared_clauses, "parsed header");
            continue;
        }
        if line.starts_with('a') || line.starts_with('e') {
            let mut toks = line.split_whitespace();
            let quant = toks.next().unwrap_or_default();
            if quant != "a" && quant != "e" {
                return Err(malformed(lineno, format!("unrecognized token `{quant}`")));
            }
            let mut vars = Vec::new();
            let mut terminated = false;
            for t in toks {
                let v: i64 = t
                    .parse()
                    .map_err(|_| malformed(lineno, format!("bad variable `{t}`")))?;
                if v == 0 {
                    terminated = true;
                    break;
                }
                if v < 0 || (saw_header && v as u32 > num_vars) {
                    return Err(malformed(lineno, format!("variable {v} out of range")));
                }
                vars.push(v as u32);
            }
            if !terminated {
                return Err(malformed(lineno, "quantifier line missing terminating 0"));
            }
            if quant == "a" {
                universals.extend(vars);
            } else {
                existentials.extend(vars);
            }
            continue;
        }
        // Clause line.
        if !saw_header {
            return Err(malformed(lineno, "clause before problem header"));
        }
        let mut lits: Clause = Vec::new();
        let mut terminated = false;
        for t in line.split_whitespace() {
            let v: i64 = t
                .parse()
                .map_err(|_| malformed(lineno, format!("bad literal `{t}`")))?;
            if v == 0 {
                terminated = true;
                break;
            }
            if v.unsigned_abs() as u32 > num_vars {
                return Err(malformed(lineno, format!("literal {v} out of range")));
            }
            lits.push(Lit(v as i32));
        }
        if !terminated {
            return Err(malformed(lineno, "clause missing terminating 0"));
        }
        clauses.push(lits);
    }

    if !saw_header {
        return Err(malformed(1, "missing problem header"));
    }
    if declared_clauses != clauses.len() {
        debug!(declared_clauses, actual = clauses.len(), "clause count differs from header");
    }

    // Unquantified variables default to universal.
    let mut bound: HashSet<u32> = universals.iter().copied().collect();
    bound.extend(existentials.iter().copied());
    for v in 1..=num_vars {
        if !bound.contains(&v) {
            universals.push(v);
        }
    }

    info!(
        universals = universals.len(),
        existentials = existentials.len(),
        clauses = clauses.len(),
        "parsed specification"
    );
    Ok(Spec::new(num_vars, clauses, universals, existentials))
}

#[cfg(test)]
mod test {
    use super::*;

    const DEMO: &str = "c demo\np cnf 4 4\na 2 3 0\ne 1 4 0\n-1 2 0\n-1 3 0\n1 2 3 0\n4 0\n";

    #[test]
    fn parses_demo() {
        let spec = parse_str(DEMO).unwrap();
        assert_eq!(spec.num_vars, 4);
        assert_eq!(spec.universals, vec![2, 3]);
        assert_eq!(spec.existentials, vec![1, 4]);
        assert_eq!(spec.clauses.len(), 4);
        assert_eq!(spec.clauses[3], vec![Lit(4)]);
    }

    #[test]
    fn unbound_vars_are_universal() {
        let spec = parse_str("p cnf 3 1\ne 1 0\n1 2 3 0\n").unwrap();
        assert!(spec.is_existential(1));
        assert_eq!(spec.universals, vec![2, 3]);
    }

    #[test]
    fn reports_line_of_bad_literal() {
        let err = parse_str("p cnf 2 1\na 1 0\ne 2 0\n1 x 0\n").unwrap_err();
        let synth = err.downcast_ref::<SynthError>().unwrap();
        match synth {
            SynthError::Malformed { line, .. } => assert_eq!(*line, 4),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_terminator() {
        let err = parse_str("p cnf 2 1\n1 2\n").unwrap_err();
        assert!(err.to_string().contains("terminating 0"));
    }
}
