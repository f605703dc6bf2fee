//! Column statistics for the descriptive overview and the detectors
//!
//! All functions skip missing cells. Quantities that are undefined for the
//! available data (std of a single value, correlation with a constant
//! column) are `None` rather than NaN.

use crate::dataset::{ColumnSlot, MergedTable};
use serde::Serialize;

/// Describe-style summary for one numeric column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    /// Number of present (non-missing) values
    pub count: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation (n - 1 denominator)
    pub std: Option<f64>,
    pub min: Option<f64>,
    /// 25th percentile
    pub p25: Option<f64>,
    /// Median
    pub p50: Option<f64>,
    /// 75th percentile
    pub p75: Option<f64>,
    pub max: Option<f64>,
}

/// Present values of a column, in row order
pub fn present(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().flatten().copied().collect()
}

/// Arithmetic mean; `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation; `None` with fewer than two values
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let sum_sq_diff: f64 = values.iter().map(|&x| (x - mean).powi(2)).sum();
    Some((sum_sq_diff / (values.len() - 1) as f64).sqrt())
}

/// Calculate percentile from sorted data (linear interpolation between ranks)
pub fn percentile(sorted_data: &[f64], percentile: f64) -> Option<f64> {
    if sorted_data.is_empty() {
        return None;
    }
    if sorted_data.len() == 1 {
        return Some(sorted_data[0]);
    }

    let index = (percentile / 100.0) * (sorted_data.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;

    if lower == upper {
        Some(sorted_data[lower])
    } else {
        let weight = index - lower as f64;
        Some(sorted_data[lower] * (1.0 - weight) + sorted_data[upper] * weight)
    }
}

/// Summarize a column, ignoring missing cells
pub fn describe(values: &[Option<f64>]) -> ColumnSummary {
    let mut sorted = present(values);
    sorted.sort_by(f64::total_cmp);

    ColumnSummary {
        count: sorted.len(),
        mean: mean(&sorted),
        std: sample_std(&sorted),
        min: sorted.first().copied(),
        p25: percentile(&sorted, 25.0),
        p50: percentile(&sorted, 50.0),
        p75: percentile(&sorted, 75.0),
        max: sorted.last().copied(),
    }
}

/// Pearson correlation over the rows where both values are present
pub fn pearson(xs: &[Option<f64>], ys: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    // Rounding can push |r| marginally past 1
    Some((cov / denom).clamp(-1.0, 1.0))
}

/// Square correlation matrix over the metric columns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    /// Row-major, `columns.len()` squared entries
    pub values: Vec<Option<f64>>,
}

impl CorrelationMatrix {
    pub fn size(&self) -> usize {
        self.columns.len()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.values.get(row * self.size() + col).copied().flatten()
    }
}

/// Pairwise correlations of every numeric column except the join key
pub fn correlation_matrix(table: &MergedTable) -> CorrelationMatrix {
    let metric_columns: Vec<_> = table.schema.metric_columns().collect();
    let series: Vec<Vec<Option<f64>>> = metric_columns
        .iter()
        .map(|c| table.column_values(c.slot))
        .collect();

    let n = series.len();
    let mut values = vec![None; n * n];
    for i in 0..n {
        for j in i..n {
            let r = pearson(&series[i], &series[j]);
            values[i * n + j] = r;
            values[j * n + i] = r;
        }
    }

    CorrelationMatrix {
        columns: metric_columns.iter().map(|c| c.name.clone()).collect(),
        values,
    }
}

/// Missing-cell count per column, in header order, followed by `time`
pub fn missing_counts(table: &MergedTable) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = table
        .schema
        .columns()
        .iter()
        .map(|column| {
            let missing = match column.slot {
                ColumnSlot::IdTime => 0,
                slot => table
                    .records
                    .iter()
                    .filter(|r| r.flow.value(slot).is_none())
                    .count(),
            };
            (column.name.clone(), missing)
        })
        .collect();
    counts.push((crate::dataset::TIME.to_string(), table.missing_times()));
    counts
}
