//! 3×3 Sobel gradients of a (time × range) grid.
//!
//! The grid is convolved ("same" output size) with
//!
//! ```text
//! along range        along time
//! [ 1  0 -1 ]        [ 1  2  1 ]
//! [ 2  0 -2 ]        [ 0  0  0 ]
//! [ 1  0 -1 ]        [-1 -2 -1 ]
//! ```
//!
//! Out-of-grid neighbours count as zero, so the outermost rows and columns carry padding
//! artefacts and are excluded by every consumer. Every kernel tap is applied, so a NaN
//! neighbour makes the output NaN.
use nalgebra::DMatrix;

/// Gradients of a grid, same shape as the input.
#[derive(Debug, Clone)]
pub struct SobelGradients {
    /// Difference towards increasing time index
    pub along_time: DMatrix<f64>,
    /// Difference towards increasing range index
    pub along_range: DMatrix<f64>,
}

const SMOOTHING: [f64; 3] = [1.0, 2.0, 1.0];
const DIFFERENCE: [f64; 3] = [1.0, 0.0, -1.0];

fn padded(grid: &DMatrix<f64>, t: isize, r: isize) -> f64 {
    if t < 0 || r < 0 || t as usize >= grid.nrows() || r as usize >= grid.ncols() {
        0.0
    } else {
        grid[(t as usize, r as usize)]
    }
}

/// Convolve `grid` with both Sobel kernels.
pub fn sobel(grid: &DMatrix<f64>) -> SobelGradients {
    let (rows, cols) = grid.shape();
    let mut along_time = DMatrix::zeros(rows, cols);
    let mut along_range = DMatrix::zeros(rows, cols);

    for t in 0..rows {
        for r in 0..cols {
            let (ti, ri) = (t as isize, r as isize);
            let mut gt = 0.0;
            let mut gr = 0.0;
            // convolution flips the kernel: tap (a, b) reads (t + 1 - a, r + 1 - b)
            for a in 0..3 {
                for b in 0..3 {
                    let v = padded(grid, ti + 1 - a as isize, ri + 1 - b as isize);
                    gr += SMOOTHING[a] * DIFFERENCE[b] * v;
                    gt += DIFFERENCE[a] * SMOOTHING[b] * v;
                }
            }
            along_time[(t, r)] = gt;
            along_range[(t, r)] = gr;
        }
    }

    SobelGradients {
        along_time,
        along_range,
    }
}

#[cfg(test)]
mod sobel_test {
    use super::*;

    #[test]
    fn test_linear_ramp_along_range() {
        // value = 2 * r, constant in time
        let grid = DMatrix::from_fn(5, 6, |_, r| 2.0 * r as f64);
        let g = sobel(&grid);
        for t in 1..4 {
            for r in 1..5 {
                assert_eq!(g.along_range[(t, r)], 16.0);
                assert_eq!(g.along_time[(t, r)], 0.0);
            }
        }
        // zero padding on the first column
        assert_ne!(g.along_range[(2, 0)], 16.0);
    }

    #[test]
    fn test_linear_ramp_along_time() {
        let grid = DMatrix::from_fn(5, 5, |t, _| -1.0 * t as f64);
        let g = sobel(&grid);
        assert_eq!(g.along_time[(2, 2)], -8.0);
        assert_eq!(g.along_range[(2, 2)], 0.0);
    }

    #[test]
    fn test_nan_propagates() {
        let mut grid = DMatrix::from_element(4, 4, 1.0);
        grid[(1, 1)] = f64::NAN;
        let g = sobel(&grid);
        assert!(g.along_range[(1, 1)].is_nan());
        assert!(g.along_time[(2, 2)].is_nan());
        assert!(!g.along_time[(3, 3)].is_nan());
    }
}
