//! `kron-gp` provides exact gaussian process regression for data observed on
//! a cartesian-product grid.
//!
//! When the training inputs form a grid, the full covariance matrix is the
//! Kronecker product of one small covariance matrix per axis plus isotropic
//! gaussian noise. Eigendecomposing each factor diagonalizes the whole
//! matrix, so the marginal log-likelihood, its hyperparameter gradients and
//! posterior predictions come out exactly without ever assembling the full
//! matrix.
//!
//! # Example
//!
//! ```
//! use kron_gp::kernels::{Kernel, Matern52Kernel, SquaredExponentialKernel};
//! use kron_gp::KroneckerGaussianProcess;
//! use ndarray::{array, ArrayD, IxDyn};
//!
//! // a 3 x 4 grid: 3 positions on the first axis, 4 on the second
//! let x0 = array![[0.0], [0.5], [1.0]];
//! let x1 = array![[0.0], [0.3], [0.7], [1.2]];
//! let y = ArrayD::from_shape_fn(IxDyn(&[3, 4]), |idx| {
//!     (idx[0] as f64).sin() + (idx[1] as f64).cos()
//! });
//!
//! let k0: Box<dyn Kernel<f64>> = Box::new(SquaredExponentialKernel::new(1));
//! let k1: Box<dyn Kernel<f64>> = Box::new(Matern52Kernel::new(1));
//! let mut gp =
//!     KroneckerGaussianProcess::new(vec![(x0, k0), (x1, k1)], y, 0.01).unwrap();
//! gp.parameters_changed().unwrap();
//!
//! println!("log-likelihood: {}", gp.log_likelihood().unwrap());
//! let xnew0 = array![[0.25]];
//! let xnew1 = array![[0.5], [1.0]];
//! let (mean, variance) = gp.predict(&[xnew0.view(), xnew1.view()], false).unwrap();
//! assert_eq!(mean.len(), 2);
//! assert_eq!(variance.unwrap().len(), 2);
//! ```
#![warn(missing_docs)]

mod algorithm;
mod errors;
pub mod kernels;
mod likelihood;
pub mod tensor;

pub use algorithm::*;
pub use errors::*;
pub use kernels::Kernel;
pub use likelihood::*;
