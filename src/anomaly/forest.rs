use rand::seq::index;
use rand::Rng;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Isolation forest over a dense row-major feature matrix
///
/// Algorithm:
/// 1. Each tree draws a subsample without replacement
/// 2. Nodes split on a random non-constant feature at a uniform random threshold
/// 3. Trees stop growing at depth ceil(log2(subsample size))
/// 4. Outliers isolate in fewer splits, so their average path length is short
///
/// All randomness comes from the caller's RNG, so a seeded RNG gives a reproducible forest.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl IsolationForest {
    /// Grow `num_trees` trees over `data`.
    ///
    /// # Arguments
    /// * `data` - One row per observation, every row the same width
    /// * `num_trees` - Number of isolation trees
    /// * `max_samples` - Subsample size per tree (capped at the row count)
    pub fn fit<R: Rng + ?Sized>(
        data: &[Vec<f64>],
        num_trees: usize,
        max_samples: usize,
        rng: &mut R,
    ) -> Self {
        let sample_size = max_samples.min(data.len());
        let height_limit = if sample_size > 1 {
            (sample_size as f64).log2().ceil() as usize
        } else {
            0
        };

        let trees = (0..num_trees)
            .map(|_| {
                let rows = index::sample(rng, data.len(), sample_size).into_vec();
                build_node(data, rows, 0, height_limit, rng)
            })
            .collect();

        Self { trees, sample_size }
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Mean isolation depth of `x` across all trees
    pub fn mean_path_length(&self, x: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: f64 = self.trees.iter().map(|tree| path_length(tree, x)).sum();
        total / self.trees.len() as f64
    }

    /// Score in [-1, 0): -2^(-E[h(x)] / c(sample_size)).
    ///
    /// Lower means more anomalous. The forest must have been fitted on at least two rows.
    pub fn score_sample(&self, x: &[f64]) -> f64 {
        debug_assert!(self.sample_size >= 2, "isolation forest fitted on fewer than 2 rows");
        -(2f64).powf(-self.mean_path_length(x) / average_path_length(self.sample_size))
    }

    pub fn score_samples(&self, data: &[Vec<f64>]) -> Vec<f64> {
        data.iter().map(|x| self.score_sample(x)).collect()
    }
}

/// Average path length of an unsuccessful binary search tree lookup over `n` points
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

fn build_node<R: Rng + ?Sized>(
    data: &[Vec<f64>],
    rows: Vec<usize>,
    depth: usize,
    height_limit: usize,
    rng: &mut R,
) -> Node {
    if depth >= height_limit || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    let width = data[rows[0]].len();
    let candidates: Vec<(usize, f64, f64)> = (0..width)
        .filter_map(|feature| {
            let (lo, hi) = bounds(data, &rows, feature);
            (hi > lo).then_some((feature, lo, hi))
        })
        .collect();

    if candidates.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = rng.gen_range(lo..hi);

    let (left, right): (Vec<usize>, Vec<usize>) = rows
        .into_iter()
        .partition(|&row| data[row][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_node(data, left, depth + 1, height_limit, rng)),
        right: Box::new(build_node(data, right, depth + 1, height_limit, rng)),
    }
}

fn bounds(data: &[Vec<f64>], rows: &[usize], feature: usize) -> (f64, f64) {
    rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &row| {
        let v = data[row][feature];
        (lo.min(v), hi.max(v))
    })
}

fn path_length(root: &Node, x: &[f64]) -> f64 {
    let mut node = root;
    let mut depth = 0.0;

    loop {
        match node {
            Node::Leaf { size } => return depth + average_path_length(*size),
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                node = if x[*feature] < *threshold { left } else { right };
                depth += 1.0;
            }
        }
    }
}
