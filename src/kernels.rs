//! A module for covariance functions evaluated on per-axis input sets.
//!
//! The following kernels are implemented:
//! * squared exponential,
//! * exponential,
//! * matern 3/2,
//! * matern 5/2.
//!
//! Each kernel owns its hyperparameters `[variance, lengthscale]` together
//! with one gradient slot per hyperparameter. The engine writes the slots
//! through [`Kernel::update_gradients_full`] during the inference pass and an
//! external optimizer reads them back through [`Kernel::gradient`].

use linfa::Float;
use ndarray::{arr1, Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Data, Ix2, Zip};
use std::fmt;

/// Interface between the engine and a per-axis covariance function.
///
/// Both hyperparameters are expected to be strictly positive; the trait does
/// not enforce this, positivity is the responsibility of whoever drives the
/// parameter values.
pub trait Kernel<F: Float>: fmt::Display {
    /// Declared number of input features.
    fn input_dim(&self) -> usize;

    /// Covariance matrix on one input set (n, n), symmetric PSD.
    fn k(&self, x: &ArrayView2<F>) -> Array2<F>;

    /// Cross covariance between two input sets (na, nb).
    fn k_cross(&self, xa: &ArrayView2<F>, xb: &ArrayView2<F>) -> Array2<F>;

    /// Diagonal of the covariance matrix on one input set.
    fn kdiag(&self, x: &ArrayView2<F>) -> Array1<F>;

    /// Number of hyperparameters.
    fn n_params(&self) -> usize;

    /// Current hyperparameter values.
    fn params(&self) -> Array1<F>;

    /// Overwrite the hyperparameter values.
    fn set_params(&mut self, params: &ArrayView1<F>);

    /// Current gradient slot values, one per hyperparameter.
    fn gradient(&self) -> Array1<F>;

    /// Write dL/dparams into the gradient slots, given the derivative
    /// `dl_dk` of the objective w.r.t. the covariance matrix on `x`.
    fn update_gradients_full(&mut self, dl_dk: &ArrayView2<F>, x: &ArrayView2<F>);
}

/// Pairwise euclidean distances between the rows of two input sets,
/// as an (nrows(xa), nrows(xb)) matrix.
/// *Panics* if xa and xb have not the same column numbers
pub fn cross_distances<F: Float>(
    xa: &ArrayBase<impl Data<Elem = F>, Ix2>,
    xb: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Array2<F> {
    assert!(xa.ncols() == xb.ncols());

    let mut d = Array2::zeros((xa.nrows(), xb.nrows()));
    for (i, a) in xa.rows().into_iter().enumerate() {
        for (j, b) in xb.rows().into_iter().enumerate() {
            let mut sq = F::zero();
            Zip::from(&a).and(&b).for_each(|&ai, &bi| {
                let diff = ai - bi;
                sq = sq + diff * diff;
            });
            d[[i, j]] = sq.sqrt();
        }
    }
    d
}

/// Squared exponential (RBF) kernel
///
/// `k(x, x') = v * exp(-r^2 / (2 * l^2))` with `r = |x - x'|`
#[derive(Clone, Debug, PartialEq)]
pub struct SquaredExponentialKernel<F: Float> {
    input_dim: usize,
    variance: F,
    lengthscale: F,
    variance_grad: F,
    lengthscale_grad: F,
}

impl<F: Float> SquaredExponentialKernel<F> {
    /// A kernel over `input_dim` features with unit variance and lengthscale.
    pub fn new(input_dim: usize) -> Self {
        SquaredExponentialKernel {
            input_dim,
            variance: F::one(),
            lengthscale: F::one(),
            variance_grad: F::zero(),
            lengthscale_grad: F::zero(),
        }
    }

    /// Set the signal variance.
    pub fn with_variance(mut self, variance: F) -> Self {
        self.variance = variance;
        self
    }

    /// Set the lengthscale.
    pub fn with_lengthscale(mut self, lengthscale: F) -> Self {
        self.lengthscale = lengthscale;
        self
    }

    fn value(&self, r: &Array2<F>) -> Array2<F> {
        let half = F::cast(0.5);
        let l2 = self.lengthscale * self.lengthscale;
        r.mapv(|v| self.variance * (-half * v * v / l2).exp())
    }
}

impl<F: Float> Kernel<F> for SquaredExponentialKernel<F> {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn k(&self, x: &ArrayView2<F>) -> Array2<F> {
        self.k_cross(x, x)
    }

    fn k_cross(&self, xa: &ArrayView2<F>, xb: &ArrayView2<F>) -> Array2<F> {
        self.value(&cross_distances(xa, xb))
    }

    fn kdiag(&self, x: &ArrayView2<F>) -> Array1<F> {
        Array1::from_elem(x.nrows(), self.variance)
    }

    fn n_params(&self) -> usize {
        2
    }

    fn params(&self) -> Array1<F> {
        arr1(&[self.variance, self.lengthscale])
    }

    fn set_params(&mut self, params: &ArrayView1<F>) {
        self.variance = params[0];
        self.lengthscale = params[1];
    }

    fn gradient(&self) -> Array1<F> {
        arr1(&[self.variance_grad, self.lengthscale_grad])
    }

    fn update_gradients_full(&mut self, dl_dk: &ArrayView2<F>, x: &ArrayView2<F>) {
        let r = cross_distances(x, x);
        let k = self.value(&r);
        self.variance_grad = (dl_dk * &k).sum() / self.variance;
        // dk/dl = k * r^2 / l^3
        let l3 = self.lengthscale.powi(3);
        let dk_dl = &k * &r.mapv(|v| v * v / l3);
        self.lengthscale_grad = (dl_dk * &dk_dl).sum();
    }
}

impl<F: Float> fmt::Display for SquaredExponentialKernel<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SquaredExponential(variance={}, lengthscale={})",
            self.variance, self.lengthscale
        )
    }
}

/// Exponential kernel
///
/// `k(x, x') = v * exp(-r / l)` with `r = |x - x'|`
#[derive(Clone, Debug, PartialEq)]
pub struct ExponentialKernel<F: Float> {
    input_dim: usize,
    variance: F,
    lengthscale: F,
    variance_grad: F,
    lengthscale_grad: F,
}

impl<F: Float> ExponentialKernel<F> {
    /// A kernel over `input_dim` features with unit variance and lengthscale.
    pub fn new(input_dim: usize) -> Self {
        ExponentialKernel {
            input_dim,
            variance: F::one(),
            lengthscale: F::one(),
            variance_grad: F::zero(),
            lengthscale_grad: F::zero(),
        }
    }

    /// Set the signal variance.
    pub fn with_variance(mut self, variance: F) -> Self {
        self.variance = variance;
        self
    }

    /// Set the lengthscale.
    pub fn with_lengthscale(mut self, lengthscale: F) -> Self {
        self.lengthscale = lengthscale;
        self
    }

    fn value(&self, r: &Array2<F>) -> Array2<F> {
        r.mapv(|v| self.variance * (-v / self.lengthscale).exp())
    }
}

impl<F: Float> Kernel<F> for ExponentialKernel<F> {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn k(&self, x: &ArrayView2<F>) -> Array2<F> {
        self.k_cross(x, x)
    }

    fn k_cross(&self, xa: &ArrayView2<F>, xb: &ArrayView2<F>) -> Array2<F> {
        self.value(&cross_distances(xa, xb))
    }

    fn kdiag(&self, x: &ArrayView2<F>) -> Array1<F> {
        Array1::from_elem(x.nrows(), self.variance)
    }

    fn n_params(&self) -> usize {
        2
    }

    fn params(&self) -> Array1<F> {
        arr1(&[self.variance, self.lengthscale])
    }

    fn set_params(&mut self, params: &ArrayView1<F>) {
        self.variance = params[0];
        self.lengthscale = params[1];
    }

    fn gradient(&self) -> Array1<F> {
        arr1(&[self.variance_grad, self.lengthscale_grad])
    }

    fn update_gradients_full(&mut self, dl_dk: &ArrayView2<F>, x: &ArrayView2<F>) {
        let r = cross_distances(x, x);
        let k = self.value(&r);
        self.variance_grad = (dl_dk * &k).sum() / self.variance;
        // dk/dl = k * r / l^2
        let l2 = self.lengthscale * self.lengthscale;
        let dk_dl = &k * &r.mapv(|v| v / l2);
        self.lengthscale_grad = (dl_dk * &dk_dl).sum();
    }
}

impl<F: Float> fmt::Display for ExponentialKernel<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Exponential(variance={}, lengthscale={})",
            self.variance, self.lengthscale
        )
    }
}

/// Matern 3/2 kernel
///
/// `k(x, x') = v * (1 + sqrt(3) * r / l) * exp(-sqrt(3) * r / l)`
#[derive(Clone, Debug, PartialEq)]
pub struct Matern32Kernel<F: Float> {
    input_dim: usize,
    variance: F,
    lengthscale: F,
    variance_grad: F,
    lengthscale_grad: F,
}

impl<F: Float> Matern32Kernel<F> {
    /// A kernel over `input_dim` features with unit variance and lengthscale.
    pub fn new(input_dim: usize) -> Self {
        Matern32Kernel {
            input_dim,
            variance: F::one(),
            lengthscale: F::one(),
            variance_grad: F::zero(),
            lengthscale_grad: F::zero(),
        }
    }

    /// Set the signal variance.
    pub fn with_variance(mut self, variance: F) -> Self {
        self.variance = variance;
        self
    }

    /// Set the lengthscale.
    pub fn with_lengthscale(mut self, lengthscale: F) -> Self {
        self.lengthscale = lengthscale;
        self
    }

    fn value(&self, r: &Array2<F>) -> Array2<F> {
        let sqrt3 = F::cast(3.).sqrt();
        r.mapv(|v| {
            let t = sqrt3 * v / self.lengthscale;
            self.variance * (F::one() + t) * (-t).exp()
        })
    }
}

impl<F: Float> Kernel<F> for Matern32Kernel<F> {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn k(&self, x: &ArrayView2<F>) -> Array2<F> {
        self.k_cross(x, x)
    }

    fn k_cross(&self, xa: &ArrayView2<F>, xb: &ArrayView2<F>) -> Array2<F> {
        self.value(&cross_distances(xa, xb))
    }

    fn kdiag(&self, x: &ArrayView2<F>) -> Array1<F> {
        Array1::from_elem(x.nrows(), self.variance)
    }

    fn n_params(&self) -> usize {
        2
    }

    fn params(&self) -> Array1<F> {
        arr1(&[self.variance, self.lengthscale])
    }

    fn set_params(&mut self, params: &ArrayView1<F>) {
        self.variance = params[0];
        self.lengthscale = params[1];
    }

    fn gradient(&self) -> Array1<F> {
        arr1(&[self.variance_grad, self.lengthscale_grad])
    }

    fn update_gradients_full(&mut self, dl_dk: &ArrayView2<F>, x: &ArrayView2<F>) {
        let r = cross_distances(x, x);
        let k = self.value(&r);
        self.variance_grad = (dl_dk * &k).sum() / self.variance;
        // dk/dl = 3 * v * r^2 * exp(-sqrt(3) * r / l) / l^3
        let sqrt3 = F::cast(3.).sqrt();
        let l3 = self.lengthscale.powi(3);
        let dk_dl = r.mapv(|v| {
            F::cast(3.) * self.variance * v * v * (-sqrt3 * v / self.lengthscale).exp() / l3
        });
        self.lengthscale_grad = (dl_dk * &dk_dl).sum();
    }
}

impl<F: Float> fmt::Display for Matern32Kernel<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Matern32(variance={}, lengthscale={})",
            self.variance, self.lengthscale
        )
    }
}

/// Matern 5/2 kernel
///
/// `k(x, x') = v * (1 + sqrt(5) * r / l + 5 * r^2 / (3 * l^2)) * exp(-sqrt(5) * r / l)`
#[derive(Clone, Debug, PartialEq)]
pub struct Matern52Kernel<F: Float> {
    input_dim: usize,
    variance: F,
    lengthscale: F,
    variance_grad: F,
    lengthscale_grad: F,
}

impl<F: Float> Matern52Kernel<F> {
    /// A kernel over `input_dim` features with unit variance and lengthscale.
    pub fn new(input_dim: usize) -> Self {
        Matern52Kernel {
            input_dim,
            variance: F::one(),
            lengthscale: F::one(),
            variance_grad: F::zero(),
            lengthscale_grad: F::zero(),
        }
    }

    /// Set the signal variance.
    pub fn with_variance(mut self, variance: F) -> Self {
        self.variance = variance;
        self
    }

    /// Set the lengthscale.
    pub fn with_lengthscale(mut self, lengthscale: F) -> Self {
        self.lengthscale = lengthscale;
        self
    }

    fn value(&self, r: &Array2<F>) -> Array2<F> {
        let sqrt5 = F::cast(5.).sqrt();
        let third = F::cast(1. / 3.);
        r.mapv(|v| {
            let t = sqrt5 * v / self.lengthscale;
            self.variance * (F::one() + t + third * t * t) * (-t).exp()
        })
    }
}

impl<F: Float> Kernel<F> for Matern52Kernel<F> {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn k(&self, x: &ArrayView2<F>) -> Array2<F> {
        self.k_cross(x, x)
    }

    fn k_cross(&self, xa: &ArrayView2<F>, xb: &ArrayView2<F>) -> Array2<F> {
        self.value(&cross_distances(xa, xb))
    }

    fn kdiag(&self, x: &ArrayView2<F>) -> Array1<F> {
        Array1::from_elem(x.nrows(), self.variance)
    }

    fn n_params(&self) -> usize {
        2
    }

    fn params(&self) -> Array1<F> {
        arr1(&[self.variance, self.lengthscale])
    }

    fn set_params(&mut self, params: &ArrayView1<F>) {
        self.variance = params[0];
        self.lengthscale = params[1];
    }

    fn gradient(&self) -> Array1<F> {
        arr1(&[self.variance_grad, self.lengthscale_grad])
    }

    fn update_gradients_full(&mut self, dl_dk: &ArrayView2<F>, x: &ArrayView2<F>) {
        let r = cross_distances(x, x);
        let k = self.value(&r);
        self.variance_grad = (dl_dk * &k).sum() / self.variance;
        // dk/dl = 5 * v * r^2 * (1 + sqrt(5) * r / l) * exp(-sqrt(5) * r / l) / (3 * l^3)
        let sqrt5 = F::cast(5.).sqrt();
        let l3 = self.lengthscale.powi(3);
        let dk_dl = r.mapv(|v| {
            let t = sqrt5 * v / self.lengthscale;
            F::cast(5. / 3.) * self.variance * v * v * (F::one() + t) * (-t).exp() / l3
        });
        self.lengthscale_grad = (dl_dk * &dk_dl).sum();
    }
}

impl<F: Float> fmt::Display for Matern52Kernel<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Matern52(variance={}, lengthscale={})",
            self.variance, self.lengthscale
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use finitediff::FiniteDiff;
    use ndarray::array;
    use paste::paste;

    #[test]
    fn test_cross_distances() {
        let xa = array![[0., 0.], [3., 4.]];
        let xb = array![[0., 0.], [1., 0.], [3., 0.]];
        let d = cross_distances(&xa, &xb);
        assert_abs_diff_eq!(
            d,
            array![[0., 1., 3.], [5., f64::sqrt(20.), 4.]],
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_squared_exponential_values() {
        let xt = array![[0.], [1.], [2.]];
        let kern = SquaredExponentialKernel::<f64>::new(1);
        let k = kern.k(&xt.view());
        assert_abs_diff_eq!(k[[0, 0]], 1., epsilon = 1e-12);
        assert_abs_diff_eq!(k[[0, 1]], f64::exp(-0.5), epsilon = 1e-12);
        assert_abs_diff_eq!(k[[0, 2]], f64::exp(-2.), epsilon = 1e-12);
        assert_abs_diff_eq!(k, k.t().to_owned(), epsilon = 1e-12);
    }

    #[test]
    fn test_matern32_values() {
        let xt = array![[0.], [1.]];
        let kern = Matern32Kernel::<f64>::new(1).with_variance(2.);
        let k = kern.k(&xt.view());
        let sqrt3 = f64::sqrt(3.);
        assert_abs_diff_eq!(k[[0, 0]], 2., epsilon = 1e-12);
        assert_abs_diff_eq!(k[[0, 1]], 2. * (1. + sqrt3) * f64::exp(-sqrt3), epsilon = 1e-12);
    }

    #[test]
    fn test_kdiag_is_variance() {
        let xt = array![[0.5], [1.2], [2.0]];
        let kern = Matern52Kernel::<f64>::new(1).with_variance(1.7);
        assert_abs_diff_eq!(
            kern.kdiag(&xt.view()),
            array![1.7, 1.7, 1.7],
            epsilon = 1e-12
        );
    }

    macro_rules! test_kernel_gradients {
        ($kernel:ident) => {
            paste! {
                #[test]
                fn [<test_ $kernel:snake _gradients>]() {
                    let x = array![[0.1, 0.3], [0.8, 0.2], [0.4, 0.9], [0.6, 0.5]];
                    // with dl_dk all ones the gradient slots must match the
                    // derivatives of sum(k) w.r.t. [variance, lengthscale]
                    let f = |p: &Array1<f64>| {
                        let kern = $kernel::new(2)
                            .with_variance(p[0])
                            .with_lengthscale(p[1]);
                        kern.k(&x.view()).sum()
                    };
                    let params = array![1.2, 0.7];
                    let mut kern = $kernel::new(2).with_variance(1.2).with_lengthscale(0.7);
                    let ones = Array2::ones((4, 4));
                    kern.update_gradients_full(&ones.view(), &x.view());
                    let fdiff = params.central_diff(&f);
                    assert_abs_diff_eq!(kern.gradient(), fdiff, epsilon = 1e-6);
                }
            }
        };
    }

    test_kernel_gradients!(SquaredExponentialKernel);
    test_kernel_gradients!(ExponentialKernel);
    test_kernel_gradients!(Matern32Kernel);
    test_kernel_gradients!(Matern52Kernel);
}
