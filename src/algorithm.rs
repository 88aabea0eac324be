//! Exact gaussian process regression over Kronecker-structured grids.
//!
//! The training inputs are the cartesian product of one input set per grid
//! axis, so the full covariance matrix factorizes as a Kronecker product of
//! small per-axis covariance matrices plus isotropic gaussian noise. After
//! eigendecomposing each factor the full matrix diagonalizes in the joint
//! eigenbasis, which brings inference down from cubic in the total number of
//! grid points to cubic in the individual axis sizes.
//!
//! See Saatci (2011), "Scalable Inference for Structured Gaussian Process
//! Models", chapter 5.

use crate::errors::{GpError, Result};
use crate::kernels::Kernel;
use crate::likelihood::GaussianLikelihood;
use crate::tensor::{flatten_f, kron_mat, kron_vec, outer, reshape_f};
use linfa::Float;
use linfa_linalg::eigh::*;
use log::debug;
use ndarray::{s, Array1, Array2, ArrayD, ArrayView1, ArrayView2, Axis, Ix1, Ix2};
use ndarray_einsum_beta::tensordot;
use std::fmt;

/// One axis of the grid: its input set and the kernel acting on it.
struct GridAxis<F: Float> {
    x: Array2<F>,
    kernel: Box<dyn Kernel<F>>,
}

/// Quantities produced by an inference pass and reused by every query.
struct InferenceState<F: Float> {
    eigvecs: Vec<Array2<F>>,
    /// Inverse of the diagonalized full covariance, axis 0 varying fastest.
    wi: Array1<F>,
    /// Whitened data, i.e. rotated data scaled by `wi`.
    ytilde: Array1<F>,
    log_marginal: F,
}

/// Exact GP regression on a cartesian-product grid with gaussian noise.
///
/// Construction only validates shapes. [`parameters_changed`] runs the
/// inference pass for the current hyperparameters; queries such as
/// [`log_likelihood`], [`predict`] and the gradient accessors reflect the
/// latest completed pass and fail with a state error before the first one.
///
/// [`parameters_changed`]: KroneckerGaussianProcess::parameters_changed
/// [`log_likelihood`]: KroneckerGaussianProcess::log_likelihood
/// [`predict`]: KroneckerGaussianProcess::predict
pub struct KroneckerGaussianProcess<F: Float> {
    axes: Vec<GridAxis<F>>,
    y: ArrayD<F>,
    likelihood: GaussianLikelihood<F>,
    state: Option<InferenceState<F>>,
}

impl<F: Float> KroneckerGaussianProcess<F> {
    /// Build a model from one `(input set, kernel)` pair per grid axis and
    /// the data tensor observed on the grid.
    ///
    /// Axis `i` of `y` must have as many entries as input set `i` has rows,
    /// and each kernel must declare the feature count of its input set.
    pub fn new(
        axes: Vec<(Array2<F>, Box<dyn Kernel<F>>)>,
        y: ArrayD<F>,
        noise_variance: F,
    ) -> Result<Self> {
        if axes.len() < 2 {
            return Err(GpError::ShapeError(format!(
                "a Kronecker grid needs at least 2 axes, got {}",
                axes.len()
            )));
        }
        if axes.len() != y.ndim() {
            return Err(GpError::ShapeError(format!(
                "got {} axes but the data tensor has {} dimensions",
                axes.len(),
                y.ndim()
            )));
        }
        for (i, (x, kernel)) in axes.iter().enumerate() {
            if x.nrows() != y.shape()[i] {
                return Err(GpError::ShapeError(format!(
                    "input set {} has {} points but data axis {} has length {}",
                    i,
                    x.nrows(),
                    i,
                    y.shape()[i]
                )));
            }
            if kernel.input_dim() != x.ncols() {
                return Err(GpError::ShapeError(format!(
                    "kernel {} expects {} features but input set {} has {}",
                    i,
                    kernel.input_dim(),
                    i,
                    x.ncols()
                )));
            }
        }
        Ok(KroneckerGaussianProcess {
            axes: axes
                .into_iter()
                .map(|(x, kernel)| GridAxis { x, kernel })
                .collect(),
            y,
            likelihood: GaussianLikelihood::new(noise_variance),
            state: None,
        })
    }

    /// Run the inference pass for the current hyperparameters.
    ///
    /// Eigendecomposes each per-axis covariance matrix, whitens the data in
    /// the joint eigenbasis, computes the marginal log-likelihood and writes
    /// its gradients into the kernel and likelihood gradient slots.
    pub fn parameters_changed(&mut self) -> Result<()> {
        let shape: Vec<usize> = self.y.shape().to_vec();
        let n_axes = self.axes.len();

        let mut eigvals = Vec::with_capacity(n_axes);
        let mut eigvecs = Vec::with_capacity(n_axes);
        for axis in &self.axes {
            let k = axis.kernel.k(&axis.x.view());
            let (vals, vecs) = k.eigh_into()?;
            let (vals, vecs) = sort_eig_ascending(vals, vecs);
            eigvals.push(vals);
            eigvecs.push(vecs);
        }

        // Diagonal of the full covariance in the joint eigenbasis. The
        // Kronecker product runs over the axes in reverse so that the axis-0
        // eigenvalues vary fastest, matching the flattening convention.
        let noise = self.likelihood.variance();
        let mut w = eigvals[n_axes - 1].clone();
        for vals in eigvals[..n_axes - 1].iter().rev() {
            w = kron_vec(&w, vals);
        }
        let w = w.mapv(|v| v + noise);
        let wi = w.mapv(|v| F::one() / v);

        // Rotate the data into the joint eigenbasis, one mode product with
        // the transposed eigenvector matrix per axis. Each product moves the
        // contracted axis to the back, so after a full sweep the axes are
        // back in their original order.
        let mut rotated = self.y.clone();
        for vecs in &eigvecs {
            rotated = tensordot(&rotated, vecs, &[Axis(0)], &[Axis(0)]);
        }
        let y_rot = flatten_f(&rotated);
        let ytilde = &y_rot * &wi;

        let half = F::cast(0.5);
        let num_data = F::cast(self.y.len());
        let two_pi = F::cast(2. * std::f64::consts::PI);
        let log_marginal = -half * num_data * two_pi.ln()
            - half * w.mapv(|v| v.ln()).sum()
            - half * y_rot.dot(&ytilde);

        let noise_grad = -half * wi.sum() + half * ytilde.mapv(|v| v * v).sum();
        self.likelihood.set_gradient(noise_grad);

        let yt_reshaped = reshape_f(&ytilde, &shape);
        let wi_reshaped = reshape_f(&wi, &shape);
        for (i, axis) in self.axes.iter_mut().enumerate() {
            let GridAxis { x, kernel } = axis;
            let vecs = &eigvecs[i];
            // tmp[a, ..] = sum_r U[a, r] * ytilde[.., r, ..], the whitened
            // data sent back through this axis' rotation
            let tmp = tensordot(vecs, &yt_reshaped, &[Axis(1)], &[Axis(i)]);
            let other_vals: Vec<ArrayView1<F>> = eigvals
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, v)| v.view())
                .collect();
            let s_not_i = outer(&other_vals);
            let tmps = &tmp * &s_not_i.broadcast(tmp.raw_dim()).unwrap();
            let inner: Vec<Axis> = (1..n_axes).map(Axis).collect();
            let part1 = tensordot(&tmps, &tmp, &inner, &inner)
                .into_dimensionality::<Ix2>()
                .unwrap();
            let lhs_axes: Vec<Axis> = (0..n_axes).filter(|j| *j != i).map(Axis).collect();
            let rhs_axes: Vec<Axis> = (0..n_axes - 1).map(Axis).collect();
            let diag = tensordot(&wi_reshaped, &s_not_i, &lhs_axes, &rhs_axes)
                .into_dimensionality::<Ix1>()
                .unwrap();
            let part2 = (vecs * &diag).dot(&vecs.t());
            let dl_dk = (&part1 - &part2).mapv(|v| v * half);
            kernel.update_gradients_full(&dl_dk.view(), &x.view());
        }

        debug!("log marginal likelihood: {}", log_marginal);
        self.state = Some(InferenceState {
            eigvecs,
            wi,
            ytilde,
            log_marginal,
        });
        Ok(())
    }

    /// Marginal log-likelihood from the latest inference pass.
    pub fn log_likelihood(&self) -> Result<F> {
        self.state
            .as_ref()
            .map(|s| s.log_marginal)
            .ok_or_else(|| no_inference_pass("log_likelihood"))
    }

    /// Posterior mean and variance on the grid spanned by the given query
    /// input sets, one set per axis, flattened with axis 0 varying fastest.
    ///
    /// With `mean_only` the variance is skipped, which avoids materializing
    /// a dense cross-covariance over all training points. The returned
    /// variance is exact up to round-off; entries very close to zero can
    /// come out marginally negative and are not clipped.
    pub fn predict(
        &self,
        xnews: &[ArrayView2<F>],
        mean_only: bool,
    ) -> Result<(Array1<F>, Option<Array1<F>>)> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| no_inference_pass("predict"))?;
        if xnews.len() != self.axes.len() {
            return Err(GpError::ShapeError(format!(
                "expected {} query input sets, got {}",
                self.axes.len(),
                xnews.len()
            )));
        }

        let mut embeds = Vec::with_capacity(self.axes.len());
        let mut kxxs = Vec::with_capacity(self.axes.len());
        for (i, (axis, xnew)) in self.axes.iter().zip(xnews).enumerate() {
            if xnew.ncols() != axis.x.ncols() {
                return Err(GpError::ShapeError(format!(
                    "query input set {} has {} features, expected {}",
                    i,
                    xnew.ncols(),
                    axis.x.ncols()
                )));
            }
            // cross covariance to the training points, expressed in the
            // eigenbasis of this axis
            embeds.push(axis.kernel.k_cross(xnew, &axis.x.view()).dot(&state.eigvecs[i]));
            if !mean_only {
                kxxs.push(axis.kernel.kdiag(xnew));
            }
        }

        let shape: Vec<usize> = self.y.shape().to_vec();
        let mut acc = reshape_f(&state.ytilde, &shape);
        for e in &embeds {
            acc = tensordot(&acc, e, &[Axis(0)], &[Axis(1)]);
        }
        let mean = flatten_f(&acc);

        if mean_only {
            return Ok((mean, None));
        }

        let n_axes = self.axes.len();
        let mut kxx = kxxs[n_axes - 1].clone();
        for v in kxxs[..n_axes - 1].iter().rev() {
            kxx = kron_vec(&kxx, v);
        }
        let mut cross = embeds[n_axes - 1].clone();
        for e in embeds[..n_axes - 1].iter().rev() {
            cross = kron_mat(&cross, e);
        }
        let explained = cross.mapv(|v| v * v).dot(&state.wi);
        let noise = self.likelihood.variance();
        let var = (&kxx - &explained).mapv(|v| v + noise);
        Ok((mean, Some(var)))
    }

    /// All hyperparameters as a flat vector: the kernel parameters axis by
    /// axis, then the noise variance last.
    pub fn hyperparameters(&self) -> Array1<F> {
        let mut out = Vec::new();
        for axis in &self.axes {
            out.extend(axis.kernel.params().iter().copied());
        }
        out.push(self.likelihood.variance());
        Array1::from_vec(out)
    }

    /// Overwrite all hyperparameters from a flat vector laid out as in
    /// [`hyperparameters`](KroneckerGaussianProcess::hyperparameters), then
    /// rerun the inference pass.
    pub fn set_hyperparameters(&mut self, params: &ArrayView1<F>) -> Result<()> {
        let expected: usize = self.axes.iter().map(|a| a.kernel.n_params()).sum::<usize>() + 1;
        if params.len() != expected {
            return Err(GpError::ShapeError(format!(
                "expected {} hyperparameters, got {}",
                expected,
                params.len()
            )));
        }
        let mut offset = 0;
        for axis in &mut self.axes {
            let n = axis.kernel.n_params();
            axis.kernel.set_params(&params.slice(s![offset..offset + n]));
            offset += n;
        }
        self.likelihood.set_variance(params[offset]);
        self.parameters_changed()
    }

    /// Gradient of the marginal log-likelihood w.r.t. every hyperparameter,
    /// laid out as in [`hyperparameters`](KroneckerGaussianProcess::hyperparameters).
    pub fn hyperparameter_gradients(&self) -> Result<Array1<F>> {
        if self.state.is_none() {
            return Err(no_inference_pass("hyperparameter_gradients"));
        }
        let mut out = Vec::new();
        for axis in &self.axes {
            out.extend(axis.kernel.gradient().iter().copied());
        }
        out.push(self.likelihood.gradient());
        Ok(Array1::from_vec(out))
    }

    /// Current noise variance.
    pub fn noise_variance(&self) -> F {
        self.likelihood.variance()
    }

    /// Overwrite the noise variance. Takes effect at the next
    /// [`parameters_changed`](KroneckerGaussianProcess::parameters_changed).
    pub fn set_noise_variance(&mut self, variance: F) {
        self.likelihood.set_variance(variance);
    }

    /// Gradient of the marginal log-likelihood w.r.t. the noise variance.
    pub fn noise_gradient(&self) -> Result<F> {
        if self.state.is_none() {
            return Err(no_inference_pass("noise_gradient"));
        }
        Ok(self.likelihood.gradient())
    }

    /// Kernel acting on grid axis `i`.
    pub fn kernel(&self, i: usize) -> &dyn Kernel<F> {
        self.axes[i].kernel.as_ref()
    }

    /// Mutable kernel acting on grid axis `i`. Changes take effect at the
    /// next [`parameters_changed`](KroneckerGaussianProcess::parameters_changed).
    pub fn kernel_mut(&mut self, i: usize) -> &mut dyn Kernel<F> {
        self.axes[i].kernel.as_mut()
    }
}

impl<F: Float> fmt::Display for KroneckerGaussianProcess<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let dims: Vec<String> = self.y.shape().iter().map(|d| d.to_string()).collect();
        writeln!(f, "KroneckerGaussianProcess over a {} grid", dims.join("x"))?;
        for axis in &self.axes {
            writeln!(f, "  {}", axis.kernel)?;
        }
        write!(f, "  noise variance: {}", self.likelihood.variance())
    }
}

fn no_inference_pass(op: &str) -> GpError {
    GpError::StateError(format!(
        "{} requires an inference pass, call parameters_changed first",
        op
    ))
}

/// Reorder an eigendecomposition so the eigenvalues come out ascending.
fn sort_eig_ascending<F: Float>(vals: Array1<F>, vecs: Array2<F>) -> (Array1<F>, Array2<F>) {
    let mut order: Vec<usize> = (0..vals.len()).collect();
    order.sort_by(|&a, &b| vals[a].partial_cmp(&vals[b]).unwrap());
    let sorted_vals = order.iter().map(|&i| vals[i]).collect();
    let sorted_vecs = vecs.select(Axis(1), &order);
    (sorted_vals, sorted_vecs)
}
