use thiserror::Error;

/// A result type for Kronecker GP operations
pub type Result<T> = std::result::Result<T, GpError>;

/// An error when building or evaluating a [`KroneckerGaussianProcess`](crate::KroneckerGaussianProcess)
#[derive(Error, Debug)]
pub enum GpError {
    /// When input sets, kernels and the data tensor have inconsistent shapes
    #[error("Shape error: {0}")]
    ShapeError(String),
    /// When a query requires an inference pass which has not been run yet
    #[error("State error: {0}")]
    StateError(String),
    /// When a numerical linear algebra routine fails
    #[error(transparent)]
    NumericalError(#[from] linfa_linalg::LinalgError),
}
