//! Multi-dimensional array primitives used by the Kronecker GP engine.
//!
//! Every routine here commits to a single flattening convention: **axis 0
//! varies fastest** (Fortran order). The combined eigenvalue vector, the
//! whitened data and the data tensor itself are only compatible under this
//! one convention, so it is applied everywhere and Kronecker products are
//! taken in reverse axis order to match.

use linfa::Float;
use ndarray::{s, Array1, Array2, ArrayBase, ArrayD, ArrayView1, Data, Ix1, Ix2, IxDyn, ShapeBuilder};

/// Flatten a tensor with axis 0 varying fastest.
pub fn flatten_f<F: Float>(a: &ArrayBase<impl Data<Elem = F>, IxDyn>) -> Array1<F> {
    a.t().iter().copied().collect()
}

/// Rebuild a tensor of the given shape from an axis-0-fastest flattened
/// vector. Inverse of [`flatten_f`].
///
/// *Panics* if the vector length does not equal the shape product.
pub fn reshape_f<F: Float>(v: &ArrayBase<impl Data<Elem = F>, Ix1>, shape: &[usize]) -> ArrayD<F> {
    ArrayD::from_shape_vec(IxDyn(shape).f(), v.to_vec()).unwrap()
}

/// Kronecker product of two vectors: `out[i * b.len() + j] = a[i] * b[j]`,
/// so the `b` index varies fastest.
pub fn kron_vec<F: Float>(
    a: &ArrayBase<impl Data<Elem = F>, Ix1>,
    b: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Array1<F> {
    let nb = b.len();
    Array1::from_shape_fn(a.len() * nb, |k| a[k / nb] * b[k % nb])
}

/// Kronecker product of two matrices: the block at `(i, j)` is `a[i, j] * b`.
pub fn kron_mat<F: Float>(
    a: &ArrayBase<impl Data<Elem = F>, Ix2>,
    b: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Array2<F> {
    let (m, n) = a.dim();
    let (p, q) = b.dim();
    let mut out = Array2::zeros((m * p, n * q));
    for i in 0..m {
        for j in 0..n {
            out.slice_mut(s![i * p..(i + 1) * p, j * q..(j + 1) * q])
                .assign(&b.mapv(|v| v * a[[i, j]]));
        }
    }
    out
}

/// Outer product of a sequence of vectors:
/// `out[i_0, ..., i_{k-1}] = v_0[i_0] * ... * v_{k-1}[i_{k-1}]`.
pub fn outer<F: Float>(vs: &[ArrayView1<F>]) -> ArrayD<F> {
    let dims: Vec<usize> = vs.iter().map(|v| v.len()).collect();
    ArrayD::from_shape_fn(IxDyn(&dims), |idx| {
        vs.iter()
            .enumerate()
            .fold(F::one(), |acc, (j, v)| acc * v[idx[j]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_flatten_axis0_fastest() {
        let a = array![[1., 2., 3.], [4., 5., 6.]].into_dyn();
        assert_eq!(flatten_f(&a), array![1., 4., 2., 5., 3., 6.]);
    }

    #[test]
    fn test_flatten_reshape_roundtrip() {
        let a = ArrayD::from_shape_fn(IxDyn(&[2, 3, 4]), |idx| {
            (idx[0] * 100 + idx[1] * 10 + idx[2]) as f64
        });
        let v = flatten_f(&a);
        assert_eq!(reshape_f(&v, &[2, 3, 4]), a);
    }

    #[test]
    fn test_kron_vec() {
        let a = array![1., 2.];
        let b = array![3., 4., 5.];
        assert_abs_diff_eq!(
            kron_vec(&a, &b),
            array![3., 4., 5., 6., 8., 10.],
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_kron_mat() {
        let a = array![[1., 2.], [3., 4.]];
        let b = array![[5., 6.], [7., 8.]];
        let c = kron_mat(&a, &b);
        assert_eq!(c.dim(), (4, 4));
        assert_abs_diff_eq!(
            c,
            array![
                [5., 6., 10., 12.],
                [7., 8., 14., 16.],
                [15., 18., 20., 24.],
                [21., 24., 28., 32.]
            ],
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_kron_consistency_with_flattening() {
        // kron taken in reverse axis order lines up with axis-0-fastest
        // flattening: kron(b, a)[k] indexes a fastest
        let a = array![1., 2., 3.];
        let b = array![10., 100.];
        let grid = ArrayD::from_shape_fn(IxDyn(&[3, 2]), |idx| a[idx[0]] * b[idx[1]]);
        assert_abs_diff_eq!(kron_vec(&b, &a), flatten_f(&grid), epsilon = 1e-12);
    }

    #[test]
    fn test_outer() {
        let u = array![1., 2., 3.];
        let v = array![4., 5.];
        let m = outer(&[u.view(), v.view()]);
        assert_eq!(m.shape(), &[3, 2]);
        assert_abs_diff_eq!(m[[0, 0]], 4., epsilon = 1e-12);
        assert_abs_diff_eq!(m[[1, 0]], 8., epsilon = 1e-12);
        assert_abs_diff_eq!(m[[2, 1]], 15., epsilon = 1e-12);
    }
}
