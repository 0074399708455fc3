use tracing::debug;

use super::basis::Cube;
use super::sample::Label;
use super::spec::{Assignment, Lit};

/// Training table for one output: `columns` are the allowed feature
/// variables, each row holds their values, one label per row.
pub struct LabeledRows {
    pub columns: Vec<u32>,
    pub rows: Vec<Vec<bool>>,
    pub labels: Vec<Label>,
}

impl LabeledRows {
    pub fn build(columns: Vec<u32>, samples: &[Assignment], labels: Vec<Label>) -> Self {
        let rows = samples
            .iter()
            .map(|s| columns.iter().map(|&v| s.value(v)).collect())
            .collect();
        Self { columns, rows, labels }
    }
}

#[derive(Debug)]
enum Node {
    Leaf { label: Label },
    Split { column: usize, low: usize, high: usize },
}

/// Binary classification tree over boolean features. The left child is the
/// feature-false branch.
pub struct Tree {
    nodes: Vec<Node>,
    root: usize,
}

impl Tree {
    pub fn classify(&self, row: &[bool]) -> Label {
        let mut at = self.root;
        loop {
            match &self.nodes[at] {
                Node::Leaf { label } => return *label,
                Node::Split { column, low, high } => {
                    at = if row[*column] { *high } else { *low };
                }
            }
        }
    }

    /// Cubes over the feature variables for every root-to-leaf path ending
    /// in `target`: a true edge contributes the positive literal, a false
    /// edge the negative one.
    pub fn extract_cubes(&self, columns: &[u32], target: Label) -> Vec<Cube> {
        let mut out = Vec::new();
        let mut path: Vec<Lit> = Vec::new();
        self.walk(self.root, columns, target, &mut path, &mut out);
        out
    }

    fn walk(
        &self,
        at: usize,
        columns: &[u32],
        target: Label,
        path: &mut Vec<Lit>,
        out: &mut Vec<Cube>,
    ) {
        match &self.nodes[at] {
            Node::Leaf { label } => {
                if *label == target {
                    if let Some(cube) = Cube::new(path.clone()) {
                        out.push(cube);
                    }
                }
            }
            Node::Split { column, low, high } => {
                path.push(Lit::of_var(columns[*column], false));
                self.walk(*low, columns, target, path, out);
                path.pop();
                path.push(Lit::of_var(columns[*column], true));
                self.walk(*high, columns, target, path, out);
                path.pop();
            }
        }
    }
}

pub trait Learner {
    fn fit(&self, data: &LabeledRows) -> Tree;
}

/// CART-style learner with Gini impurity and a depth cap. Ties resolve to
/// the smallest column index, so training is deterministic.
pub struct GiniLearner {
    pub max_depth: usize,
}

const CLASSES: [Label; 3] = [Label::Must1, Label::Must0, Label::DontCare];

fn counts(data: &LabeledRows, idx: &[usize]) -> [usize; 3] {
    let mut c = [0usize; 3];
    for &i in idx {
        let k = CLASSES.iter().position(|&l| l == data.labels[i]).unwrap();
        c[k] += 1;
    }
    c
}

fn gini(c: &[usize; 3]) -> f64 {
    let total: usize = c.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let t = total as f64;
    1.0 - c.iter().map(|&n| (n as f64 / t) * (n as f64 / t)).sum::<f64>()
}

fn majority(c: &[usize; 3]) -> Label {
    if c.iter().all(|&n| n == 0) {
        return Label::DontCare;
    }
    let mut best = 0;
    for k in 1..3 {
        if c[k] > c[best] {
            best = k;
        }
    }
    CLASSES[best]
}

impl GiniLearner {
    fn grow(&self, data: &LabeledRows, idx: &[usize], depth: usize, nodes: &mut Vec<Node>) -> usize {
        let c = counts(data, idx);
        let pure = c.iter().filter(|&&n| n > 0).count() <= 1;
        if pure || depth >= self.max_depth || idx.is_empty() {
            nodes.push(Node::Leaf { label: majority(&c) });
            return nodes.len() - 1;
        }

        // Pick the split of minimum weighted impurity among those that put
        // rows on both sides; iterating columns in order keeps ties on the
        // smallest index.
        let mut best: Option<(f64, usize)> = None;
        for col in 0..data.columns.len() {
            let (mut c0, mut c1) = ([0usize; 3], [0usize; 3]);
            for &i in idx {
                let k = CLASSES.iter().position(|&l| l == data.labels[i]).unwrap();
                if data.rows[i][col] { c1[k] += 1 } else { c0[k] += 1 };
            }
            let (n0, n1): (usize, usize) = (c0.iter().sum(), c1.iter().sum());
            if n0 == 0 || n1 == 0 {
                continue;
            }
            let total = (n0 + n1) as f64;
            let weighted = gini(&c0) * n0 as f64 / total + gini(&c1) * n1 as f64 / total;
            if best.map_or(true, |(w, _)| weighted < w - 1e-12) {
                best = Some((weighted, col));
            }
        }

        let Some((_, col)) = best else {
            nodes.push(Node::Leaf { label: majority(&c) });
            return nodes.len() - 1;
        };

        let (mut left, mut right) = (Vec::new(), Vec::new());
        for &i in idx {
            if data.rows[i][col] { right.push(i) } else { left.push(i) };
        }
        let low = self.grow(data, &left, depth + 1, nodes);
        let high = self.grow(data, &right, depth + 1, nodes);
        nodes.push(Node::Split { column: col, low, high });
        nodes.len() - 1
    }
}

impl Learner for GiniLearner {
    fn fit(&self, data: &LabeledRows) -> Tree {
        let idx: Vec<usize> = (0..data.rows.len()).collect();
        let mut nodes = Vec::new();
        let root = self.grow(data, &idx, 0, &mut nodes);
        debug!(nodes = nodes.len(), rows = data.rows.len(), "trained tree");
        Tree { nodes, root }
    }
}
