use linfa::Float;

/// Gaussian observation noise with an isotropic variance parameter.
///
/// The inference pass reads `variance` and writes the derivative of the
/// marginal log-likelihood into the `gradient` slot where an external
/// optimizer can read it back.
#[derive(Debug, Clone)]
pub struct GaussianLikelihood<F: Float> {
    variance: F,
    gradient: F,
}

impl<F: Float> GaussianLikelihood<F> {
    /// A likelihood with the given noise variance and a zeroed gradient slot.
    pub fn new(variance: F) -> Self {
        GaussianLikelihood {
            variance,
            gradient: F::zero(),
        }
    }

    /// Current noise variance.
    pub fn variance(&self) -> F {
        self.variance
    }

    /// Overwrite the noise variance.
    pub fn set_variance(&mut self, variance: F) {
        self.variance = variance;
    }

    /// Gradient of the marginal log-likelihood w.r.t. the noise variance,
    /// as written by the latest inference pass.
    pub fn gradient(&self) -> F {
        self.gradient
    }

    pub(crate) fn set_gradient(&mut self, gradient: F) {
        self.gradient = gradient;
    }
}
