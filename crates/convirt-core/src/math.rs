//! Shared math utilities.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

/// L2-normalize every row of a `[N, D]` matrix, returning a new matrix.
pub fn l2_normalize_rows(m: ArrayView2<f32>) -> Array2<f32> {
    let mut out = m.to_owned();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            row.mapv_inplace(|x| x / norm);
        }
    }
    out
}

/// Numerically stable `log(sum(exp(v)))`.
pub fn log_sum_exp(v: ArrayView1<f32>) -> f32 {
    let max = v.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
    if !max.is_finite() {
        return max;
    }
    max + v.iter().map(|&x| (x - max).exp()).sum::<f32>().ln()
}

/// Index of the first maximal element, or `None` for an empty slice.
pub fn argmax(v: ArrayView1<f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &x) in v.iter().enumerate() {
        match best {
            Some((_, b)) if x <= b => {}
            _ => best = Some((i, x)),
        }
    }
    best.map(|(i, _)| i)
}

/// Arithmetic mean and population standard deviation.
///
/// Returns `(0.0, 0.0)` for an empty slice.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
