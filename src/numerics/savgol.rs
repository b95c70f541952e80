//! Savitzky–Golay first-derivative filter.
//!
//! Interior samples use the classic convolution weights of a degree-`order` local polynomial
//! over a centred window of odd length. The first and last half-windows are evaluated on the
//! polynomial fitted to the first and last full window respectively.
use nalgebra::DMatrix;

use crate::overlap_errors::OverlapError;

/// Pseudo-inverse of the Vandermonde matrix of `positions` up to degree `order`.
///
/// Row `k` maps samples to the coefficient of `t^k`.
fn local_fit_operator(positions: &[f64], order: usize) -> Result<DMatrix<f64>, OverlapError> {
    let a = DMatrix::from_fn(positions.len(), order + 1, |i, k| {
        positions[i].powi(k as i32)
    });
    a.pseudo_inverse(1e-12)
        .map_err(|e| OverlapError::SingularFit(e.to_string()))
}

/// First derivative of `y` sampled every `delta`.
///
/// Arguments
/// -----------------
/// * `y`: samples, at least `window` of them.
/// * `window`: odd window length.
/// * `order`: local polynomial degree, strictly below `window`.
/// * `delta`: sample spacing.
///
/// Return
/// ----------
/// * The derivative at every sample, or `Err(OverlapError::InvalidConfig)` for an unusable
///   window/order/length combination.
pub fn savgol_derivative(
    y: &[f64],
    window: usize,
    order: usize,
    delta: f64,
) -> Result<Vec<f64>, OverlapError> {
    if window % 2 == 0 || order >= window || order == 0 {
        return Err(OverlapError::InvalidConfig(format!(
            "Savitzky-Golay window {window} must be odd and larger than order {order} >= 1"
        )));
    }
    if y.len() < window {
        return Err(OverlapError::InvalidConfig(format!(
            "Savitzky-Golay window {window} longer than the {} samples",
            y.len()
        )));
    }
    if delta <= 0.0 {
        return Err(OverlapError::InvalidConfig(
            "Savitzky-Golay spacing must be positive".into(),
        ));
    }

    let half = window / 2;
    let positions: Vec<f64> = (0..window).map(|i| i as f64 - half as f64).collect();
    let operator = local_fit_operator(&positions, order)?;

    // d/dt at t = 0 is the linear coefficient
    let weights: Vec<f64> = operator.row(1).iter().copied().collect();

    let n = y.len();
    let mut out = vec![0.0; n];
    for (i, slot) in out.iter_mut().enumerate().take(n - half).skip(half) {
        *slot = weights
            .iter()
            .zip(&y[i - half..=i + half])
            .map(|(w, v)| w * v)
            .sum::<f64>()
            / delta;
    }

    let edge = |samples: &[f64], at: &[usize]| -> Vec<(usize, f64)> {
        let coefficients = &operator * nalgebra::DVector::from_column_slice(samples);
        at.iter()
            .map(|&i| {
                let t = i as f64 - half as f64;
                let slope: f64 = (1..=order)
                    .map(|k| k as f64 * coefficients[k] * t.powi(k as i32 - 1))
                    .sum();
                (i, slope / delta)
            })
            .collect()
    };

    let head: Vec<usize> = (0..half).collect();
    for (i, v) in edge(&y[..window], &head) {
        out[i] = v;
    }
    let tail: Vec<usize> = (window - half..window).collect();
    for (i, v) in edge(&y[n - window..], &tail) {
        out[n - window + i] = v;
    }

    Ok(out)
}
