//! Tensor - Contiguous f32 Array Type
//!
//! The `Tensor` struct is the fundamental data structure in RepFace. It is a
//! contiguous, row-major, CPU-resident array of `f32` values. The inference
//! stack never needs views, broadcasting, or device placement, so none of
//! that machinery exists here; every operation that changes layout produces
//! a freshly allocated tensor.
//!
//! # Key Features
//! - N-dimensional shape over flat `Vec<f32>` storage
//! - Elementwise arithmetic with strict shape checking
//! - 2D matrix multiplication and transposition
//! - Whole-tensor reductions
//!
//! @version 0.1.0
//! @author `RepFace` Development Team

use core::fmt;

use crate::error::{Error, Result};
use crate::shape::{
    contiguous_strides, linear_index, normalize_dim, numel, resolve_reshape, Shape,
};

// =============================================================================
// Tensor Struct
// =============================================================================

/// A contiguous N-dimensional array of `f32` values.
#[derive(Clone)]
pub struct Tensor {
    /// Flat row-major storage.
    pub(crate) data: Vec<f32>,
    /// Shape of the tensor (dimensions).
    pub(crate) shape: Shape,
}

impl Tensor {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Creates a new tensor from a vector with the given shape.
    ///
    /// # Returns
    /// New tensor, or error if shape doesn't match data length.
    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Result<Self> {
        let total = numel(shape);
        if total != data.len() {
            return Err(Error::shape_mismatch(&[data.len()], shape));
        }

        Ok(Self {
            data,
            shape: Shape::from_slice(shape),
        })
    }

    /// Creates a new tensor from a slice with the given shape.
    pub fn from_slice(data: &[f32], shape: &[usize]) -> Result<Self> {
        Self::from_vec(data.to_vec(), shape)
    }

    /// Creates a scalar tensor (0-dimensional).
    #[must_use]
    pub fn scalar(value: f32) -> Self {
        Self {
            data: vec![value],
            shape: Shape::new(),
        }
    }

    /// Creates a tensor filled with zeros.
    #[must_use]
    pub fn zeros(shape: &[usize]) -> Self {
        crate::creation::zeros(shape)
    }

    /// Creates a tensor filled with ones.
    #[must_use]
    pub fn ones(shape: &[usize]) -> Self {
        crate::creation::ones(shape)
    }

    /// Creates a tensor filled with a constant value.
    #[must_use]
    pub fn full(shape: &[usize], value: f32) -> Self {
        crate::creation::full(shape, value)
    }

    /// Creates a tensor with random values from the standard normal distribution.
    #[must_use]
    pub fn randn(shape: &[usize]) -> Self {
        crate::creation::randn(shape)
    }

    /// Creates a tensor with random values from the uniform distribution [0, 1).
    #[must_use]
    pub fn rand(shape: &[usize]) -> Self {
        crate::creation::rand(shape)
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Returns the shape of the tensor.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the tensor has zero elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the size of a specific dimension.
    ///
    /// # Arguments
    /// * `dim` - Dimension index (supports negative indexing)
    pub fn size(&self, dim: i64) -> Result<usize> {
        let idx = normalize_dim(dim, self.ndim())?;
        Ok(self.shape[idx])
    }

    // =========================================================================
    // Data Access
    // =========================================================================

    /// Returns the underlying storage as a flat slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Returns the underlying storage as a mutable flat slice.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Returns a copy of the data as a contiguous vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.clone()
    }

    /// Returns the element at the given indices.
    pub fn get(&self, indices: &[usize]) -> Result<f32> {
        if indices.len() != self.ndim() {
            return Err(Error::invalid_operation(format!(
                "Expected {} indices, got {}",
                self.ndim(),
                indices.len()
            )));
        }

        for (&idx, &dim) in indices.iter().zip(self.shape.iter()) {
            if idx >= dim {
                return Err(Error::IndexOutOfBounds {
                    index: idx,
                    size: dim,
                });
            }
        }

        let strides = contiguous_strides(&self.shape);
        Ok(self.data[linear_index(indices, &strides)])
    }

    /// Returns the scalar value for a single-element tensor.
    pub fn item(&self) -> Result<f32> {
        if self.numel() != 1 {
            return Err(Error::invalid_operation(
                "item() only works on single-element tensors",
            ));
        }
        Ok(self.data[0])
    }

    // =========================================================================
    // Shape Operations
    // =========================================================================

    /// Returns a new tensor with the specified shape.
    ///
    /// The total number of elements must remain the same.
    /// Supports -1 in one dimension to infer the size.
    pub fn reshape(&self, new_shape: &[isize]) -> Result<Self> {
        let shape = resolve_reshape(&self.shape, new_shape)?;
        Ok(Self {
            data: self.data.clone(),
            shape,
        })
    }

    /// Returns a new tensor with two dimensions swapped.
    ///
    /// The result is materialized in row-major order.
    pub fn transpose(&self, dim0: i64, dim1: i64) -> Result<Self> {
        let d0 = normalize_dim(dim0, self.ndim())?;
        let d1 = normalize_dim(dim1, self.ndim())?;

        let mut new_shape = self.shape.clone();
        new_shape.swap(d0, d1);

        let src_strides = contiguous_strides(&self.shape);
        let dst_strides = contiguous_strides(&new_shape);

        let mut data = vec![0.0f32; self.numel()];
        let mut indices = vec![0usize; self.ndim()];
        for (i, slot) in data.iter_mut().enumerate() {
            // Unravel i against the destination shape
            let mut rem = i;
            for d in 0..dst_strides.len() {
                indices[d] = rem / dst_strides[d];
                rem %= dst_strides[d];
            }
            indices.swap(d0, d1);
            *slot = self.data[linear_index(&indices, &src_strides)];
        }

        Ok(Self {
            data,
            shape: new_shape,
        })
    }

    /// Returns the matrix transpose of a 2D tensor.
    pub fn t(&self) -> Result<Self> {
        if self.ndim() != 2 {
            return Err(Error::invalid_operation("t() requires a 2D tensor"));
        }
        self.transpose(0, 1)
    }

    // =========================================================================
    // Elementwise Arithmetic
    // =========================================================================

    /// Element-wise addition. Shapes must match exactly.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, |a, b| a + b)
    }

    /// Element-wise subtraction. Shapes must match exactly.
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, |a, b| a - b)
    }

    /// Element-wise multiplication. Shapes must match exactly.
    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, |a, b| a * b)
    }

    fn zip_with(&self, other: &Self, f: impl Fn(f32, f32) -> f32) -> Result<Self> {
        if self.shape != other.shape {
            return Err(Error::shape_mismatch(&self.shape, &other.shape));
        }

        let data: Vec<f32> = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| f(a, b))
            .collect();

        Ok(Self {
            data,
            shape: self.shape.clone(),
        })
    }

    /// Scalar addition.
    #[must_use]
    pub fn add_scalar(&self, scalar: f32) -> Self {
        Self {
            data: self.data.iter().map(|&x| x + scalar).collect(),
            shape: self.shape.clone(),
        }
    }

    /// Scalar multiplication.
    #[must_use]
    pub fn mul_scalar(&self, scalar: f32) -> Self {
        Self {
            data: self.data.iter().map(|&x| x * scalar).collect(),
            shape: self.shape.clone(),
        }
    }

    /// Scalar division.
    #[must_use]
    pub fn div_scalar(&self, scalar: f32) -> Self {
        Self {
            data: self.data.iter().map(|&x| x / scalar).collect(),
            shape: self.shape.clone(),
        }
    }

    // =========================================================================
    // Linear Algebra
    // =========================================================================

    /// Matrix multiplication for 2D tensors: [m, k] @ [k, n] -> [m, n].
    pub fn matmul(&self, other: &Self) -> Result<Self> {
        if self.ndim() != 2 || other.ndim() != 2 {
            return Err(Error::invalid_operation("matmul requires 2D tensors"));
        }

        let m = self.shape[0];
        let k1 = self.shape[1];
        let k2 = other.shape[0];
        let n = other.shape[1];

        if k1 != k2 {
            return Err(Error::invalid_operation(format!(
                "matmul inner dimensions must match: {k1} vs {k2}"
            )));
        }

        let mut data = vec![0.0f32; m * n];
        for i in 0..m {
            for kk in 0..k1 {
                let a = self.data[i * k1 + kk];
                let b_row = &other.data[kk * n..(kk + 1) * n];
                let c_row = &mut data[i * n..(i + 1) * n];
                for (c, &b) in c_row.iter_mut().zip(b_row.iter()) {
                    *c += a * b;
                }
            }
        }

        Self::from_vec(data, &[m, n])
    }

    // =========================================================================
    // Reductions
    // =========================================================================

    /// Sum of all elements.
    #[must_use]
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    /// Mean of all elements. Returns 0 for empty tensors.
    #[must_use]
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.sum() / self.data.len() as f32
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape.as_slice())
            .field("numel", &self.numel())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.ndim(), 2);
        assert_eq!(t.numel(), 6);
    }

    #[test]
    fn test_from_vec_shape_mismatch() {
        let result = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[2, 2]);
        assert!(result.is_err());
    }

    #[test]
    fn test_get() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        assert_eq!(t.get(&[0, 0]).unwrap(), 1.0);
        assert_eq!(t.get(&[0, 2]).unwrap(), 3.0);
        assert_eq!(t.get(&[1, 0]).unwrap(), 4.0);
        assert_eq!(t.get(&[1, 2]).unwrap(), 6.0);
        assert!(t.get(&[2, 0]).is_err());
        assert!(t.get(&[0]).is_err());
    }

    #[test]
    fn test_reshape() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();

        let r = t.reshape(&[3, 2]).unwrap();
        assert_eq!(r.shape(), &[3, 2]);
        assert_eq!(r.to_vec(), t.to_vec());

        let r = t.reshape(&[-1]).unwrap();
        assert_eq!(r.shape(), &[6]);

        assert!(t.reshape(&[4, 2]).is_err());
    }

    #[test]
    fn test_transpose_2d() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        let tt = t.t().unwrap();
        assert_eq!(tt.shape(), &[3, 2]);
        assert_eq!(tt.to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_transpose_inner_dims() {
        // [2, 2, 2] swap of last two dims transposes each 2x2 block
        let t = Tensor::from_vec((1..=8).map(|x| x as f32).collect(), &[2, 2, 2]).unwrap();
        let tt = t.transpose(1, 2).unwrap();
        assert_eq!(tt.shape(), &[2, 2, 2]);
        assert_eq!(tt.to_vec(), vec![1.0, 3.0, 2.0, 4.0, 5.0, 7.0, 6.0, 8.0]);
    }

    #[test]
    fn test_add_sub_mul() {
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[3]).unwrap();
        let b = Tensor::from_vec(vec![10.0, 20.0, 30.0], &[3]).unwrap();

        assert_eq!(a.add(&b).unwrap().to_vec(), vec![11.0, 22.0, 33.0]);
        assert_eq!(b.sub(&a).unwrap().to_vec(), vec![9.0, 18.0, 27.0]);
        assert_eq!(a.mul(&b).unwrap().to_vec(), vec![10.0, 40.0, 90.0]);

        let c = Tensor::zeros(&[4]);
        assert!(a.add(&c).is_err());
    }

    #[test]
    fn test_scalar_ops() {
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[3]).unwrap();
        assert_eq!(a.add_scalar(1.0).to_vec(), vec![2.0, 3.0, 4.0]);
        assert_eq!(a.mul_scalar(2.0).to_vec(), vec![2.0, 4.0, 6.0]);
        assert_eq!(a.div_scalar(2.0).to_vec(), vec![0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_matmul() {
        // [2, 3] @ [3, 2] -> [2, 2]
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        let b = Tensor::from_vec(vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0], &[3, 2]).unwrap();

        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), &[2, 2]);
        assert_eq!(c.to_vec(), vec![58.0, 64.0, 139.0, 154.0]);

        assert!(a.matmul(&a).is_err());
    }

    #[test]
    fn test_matmul_zero_times_nonfinite() {
        // 0 * NaN must stay NaN through the accumulation
        let a = Tensor::from_vec(vec![0.0, 1.0], &[1, 2]).unwrap();
        let b = Tensor::from_vec(vec![f32::NAN, 2.0], &[2, 1]).unwrap();
        assert!(a.matmul(&b).unwrap().to_vec()[0].is_nan());

        let inf = Tensor::from_vec(vec![f32::INFINITY, 2.0], &[2, 1]).unwrap();
        assert!(a.matmul(&inf).unwrap().to_vec()[0].is_nan());
    }

    #[test]
    fn test_reductions() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
        assert_eq!(t.sum(), 10.0);
        assert_eq!(t.mean(), 2.5);
    }

    #[test]
    fn test_item() {
        let t = Tensor::scalar(42.0);
        assert_eq!(t.item().unwrap(), 42.0);

        let t = Tensor::from_vec(vec![1.0, 2.0], &[2]).unwrap();
        assert!(t.item().is_err());
    }
}
