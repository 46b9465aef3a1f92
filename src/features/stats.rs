use statrs::statistics::Statistics;

/// Added to the standard deviation before dividing, so a flat series never divides by zero
pub const EPSILON: f64 = 1e-6;

/// Summary statistics of one region's series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator); 0 for fewer than two points
    pub stddev: f64,
    pub count: usize,
}

impl SeriesStats {
    pub fn from_values(values: &[f64]) -> Self {
        let count = values.len();
        if count == 0 {
            return Self { mean: 0.0, stddev: 0.0, count };
        }

        let mean = values.iter().mean();
        let stddev = if count < 2 { 0.0 } else { values.iter().std_dev() };

        Self {
            mean,
            stddev: if stddev.is_finite() { stddev } else { 0.0 },
            count,
        }
    }

    /// Standardized deviation of `value` from the series mean
    pub fn zscore(&self, value: f64) -> f64 {
        if self.stddev == 0.0 {
            return 0.0;
        }
        (value - self.mean) / (self.stddev + EPSILON)
    }
}

/// Z-score every value against its own series.
///
/// A constant or single-valued series maps to all zeros.
pub fn zscores(values: &[f64]) -> Vec<f64> {
    if is_constant(values) {
        return vec![0.0; values.len()];
    }

    let stats = SeriesStats::from_values(values);
    values.iter().map(|&v| stats.zscore(v)).collect()
}

/// Absolute change from the previous value; the first entry is 0
pub fn abs_diffs(values: &[f64]) -> Vec<f64> {
    let mut diffs = Vec::with_capacity(values.len());
    if values.is_empty() {
        return diffs;
    }

    diffs.push(0.0);
    diffs.extend(values.windows(2).map(|w| (w[1] - w[0]).abs()));
    diffs
}

fn is_constant(values: &[f64]) -> bool {
    match values.first() {
        Some(first) => values.iter().all(|v| v == first),
        None => true,
    }
}
