//! Tensor Creation Functions
//!
//! Provides convenient functions for creating tensors with various
//! initializations including zeros, ones, constants, and random values.
//!
//! @version 0.1.0
//! @author `RepFace` Development Team

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::tensor::Tensor;

// =============================================================================
// Constant Initialization
// =============================================================================

/// Creates a tensor filled with zeros.
#[must_use]
pub fn zeros(shape: &[usize]) -> Tensor {
    full(shape, 0.0)
}

/// Creates a tensor filled with ones.
#[must_use]
pub fn ones(shape: &[usize]) -> Tensor {
    full(shape, 1.0)
}

/// Creates a tensor filled with a specific value.
#[must_use]
pub fn full(shape: &[usize], value: f32) -> Tensor {
    let numel: usize = shape.iter().product();
    let data = vec![value; numel];
    Tensor::from_vec(data, shape).unwrap()
}

// =============================================================================
// Random Initialization
// =============================================================================

/// Creates a tensor with uniformly distributed random values in [0, 1).
#[must_use]
pub fn rand(shape: &[usize]) -> Tensor {
    let numel: usize = shape.iter().product();
    let mut rng = rand::thread_rng();
    let data: Vec<f32> = (0..numel).map(|_| rng.gen()).collect();
    Tensor::from_vec(data, shape).unwrap()
}

/// Creates a tensor with standard normal random values (mean 0, std 1).
#[must_use]
pub fn randn(shape: &[usize]) -> Tensor {
    let numel: usize = shape.iter().product();
    let mut rng = rand::thread_rng();
    let normal = StandardNormal;
    let data: Vec<f32> = (0..numel).map(|_| normal.sample(&mut rng)).collect();
    Tensor::from_vec(data, shape).unwrap()
}

// =============================================================================
// Tests
// =============================================================================
