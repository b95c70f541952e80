//! Least-squares fits.
//!
//! Straight lines are fitted with the closed-form normal equations (the same sums also give
//! the coefficient of determination). Higher orders go through an SVD solve of the
//! Vandermonde system on a centred, scaled abscissa.
use nalgebra::{DMatrix, DVector};

use crate::overlap_errors::OverlapError;

/// Straight line `y = intercept + slope * x` with its coefficient of determination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// `NaN` when `y` has no variance.
    pub r2: f64,
    pub n: usize,
}

impl LinearFit {
    pub fn eval(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Ordinary least-squares line through `(x, y)`.
///
/// Pairs with a NaN coordinate are skipped.
///
/// Return
/// ----------
/// * `Err(OverlapError::SingularFit)` if fewer than two distinct abscissae remain.
pub fn simple_linear_fit(x: &[f64], y: &[f64]) -> Result<LinearFit, OverlapError> {
    let (mut n, mut sx, mut sy, mut sxx, mut syy, mut sxy) = (0usize, 0.0, 0.0, 0.0, 0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(y) {
        if xi.is_nan() || yi.is_nan() {
            continue;
        }
        n += 1;
        sx += xi;
        sy += yi;
        sxx += xi * xi;
        syy += yi * yi;
        sxy += xi * yi;
    }

    let nf = n as f64;
    let dxx = nf * sxx - sx * sx;
    let dyy = nf * syy - sy * sy;
    let dxy = nf * sxy - sx * sy;
    if n < 2 || dxx <= 0.0 {
        return Err(OverlapError::SingularFit(format!(
            "straight line through {n} points without abscissa spread"
        )));
    }

    let slope = dxy / dxx;
    let intercept = (sy - slope * sx) / nf;
    let r2 = if dyy > 0.0 {
        dxy * dxy / (dxx * dyy)
    } else {
        f64::NAN
    };

    Ok(LinearFit {
        slope,
        intercept,
        r2,
        n,
    })
}

/// Polynomial in a centred and scaled variable `u = (x - shift) / scale`.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    /// Ascending powers of `u`.
    pub coefficients: Vec<f64>,
    pub shift: f64,
    pub scale: f64,
}

impl Polynomial {
    /// Least-squares polynomial of degree `order` through `(x, y)`.
    ///
    /// Arguments
    /// -----------------
    /// * `x`, `y`: samples of equal length, no NaN.
    /// * `order`: polynomial degree, at least 1.
    ///
    /// Return
    /// ----------
    /// * `Err(OverlapError::SingularFit)` when there are not more samples than coefficients
    ///   or the system cannot be solved.
    pub fn fit(x: &[f64], y: &[f64], order: usize) -> Result<Self, OverlapError> {
        let n = x.len().min(y.len());
        if n <= order {
            return Err(OverlapError::SingularFit(format!(
                "degree {order} polynomial through {n} points"
            )));
        }

        let (lo, hi) = x[..n]
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let shift = 0.5 * (lo + hi);
        let scale = if hi > lo { 0.5 * (hi - lo) } else { 1.0 };

        let vandermonde = DMatrix::from_fn(n, order + 1, |i, k| {
            ((x[i] - shift) / scale).powi(k as i32)
        });
        let rhs = DVector::from_column_slice(&y[..n]);
        let coefficients = vandermonde
            .svd(true, true)
            .solve(&rhs, 1e-12)
            .map_err(|e| OverlapError::SingularFit(e.to_string()))?;

        Ok(Polynomial {
            coefficients: coefficients.iter().copied().collect(),
            shift,
            scale,
        })
    }

    /// Straight line as a polynomial.
    pub fn from_linear(fit: &LinearFit) -> Self {
        Polynomial {
            coefficients: vec![fit.intercept, fit.slope],
            shift: 0.0,
            scale: 1.0,
        }
    }

    pub fn order(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// Horner evaluation at `x`.
    pub fn eval(&self, x: f64) -> f64 {
        let u = (x - self.shift) / self.scale;
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, c| acc * u + c)
    }

    /// Derivative with respect to `x`.
    pub fn derivative_at(&self, x: f64) -> f64 {
        let u = (x - self.shift) / self.scale;
        let du: f64 = self
            .coefficients
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0.0, |acc, (k, c)| acc * u + k as f64 * c);
        du / self.scale
    }
}

#[cfg(test)]
mod least_squares_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_simple_linear_fit_exact_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let fit = simple_linear_fit(&x, &y).unwrap();
        assert_relative_eq!(fit.slope, 2.0, epsilon = 1e-12);
        assert_relative_eq!(fit.intercept, 1.0, epsilon = 1e-12);
        assert_relative_eq!(fit.r2, 1.0, epsilon = 1e-12);
        assert_eq!(fit.n, 4);
    }

    #[test]
    fn test_simple_linear_fit_r2_and_nan() {
        let x = [0.0, 1.0, 2.0, f64::NAN];
        let y = [0.0, 2.0, 1.0, 10.0];
        let fit = simple_linear_fit(&x, &y).unwrap();
        // n=3, Sx=3, Sy=3, Sxx=5, Syy=5, Sxy=4
        assert_relative_eq!(fit.slope, 0.5, epsilon = 1e-12);
        assert_relative_eq!(fit.intercept, 0.5, epsilon = 1e-12);
        assert_relative_eq!(fit.r2, 9.0 / 36.0, epsilon = 1e-12);
    }

    #[test]
    fn test_simple_linear_fit_degenerate() {
        let err = simple_linear_fit(&[2.0, 2.0], &[1.0, 3.0]).unwrap_err();
        assert!(matches!(err, OverlapError::SingularFit(_)));

        let flat = simple_linear_fit(&[1.0, 2.0], &[4.0, 4.0]).unwrap();
        assert_eq!(flat.slope, 0.0);
        assert!(flat.r2.is_nan());
    }

    #[test]
    fn test_polynomial_fit_recovers_quadratic() {
        let x: Vec<f64> = (0..20).map(|i| 500.0 + 15.0 * i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 - 1e-3 * v + 4e-7 * v * v).collect();
        let poly = Polynomial::fit(&x, &y, 2).unwrap();
        assert_eq!(poly.order(), 2);
        for (xi, yi) in x.iter().zip(&y) {
            assert_relative_eq!(poly.eval(*xi), *yi, epsilon = 1e-9);
        }
        assert_relative_eq!(poly.derivative_at(600.0), -1e-3 + 8e-7 * 600.0, epsilon = 1e-9);
        assert!(Polynomial::fit(&x[..2], &y[..2], 2).is_err());
    }
}
