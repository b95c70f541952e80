//! # Numerical building blocks
//!
//! Small, allocation-light numeric kernels shared by the check pipeline and the
//! temperature model:
//!
//! * [`stats`] – NaN-aware mean / std / median, linear-interpolation percentiles, modes,
//!   trapezoidal integration,
//! * [`least_squares`] – closed-form straight-line fits with R² and nalgebra-based
//!   polynomial fits,
//! * [`sobel`] – 3×3 Sobel gradients of a (time × range) grid with zero padding,
//! * [`savgol`] – Savitzky–Golay derivative filter with polynomial edge handling.
//!
//! All kernels are pure functions; NaN values are propagated or skipped as documented on
//! each function, never silently replaced by zero.
pub mod least_squares;
pub mod savgol;
pub mod sobel;
pub mod stats;
