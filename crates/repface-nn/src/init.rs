//! Weight Initialization Functions
//!
//! Provides standard initialization schemes for layer weights. Convolutions
//! and linear layers default to Kaiming uniform; the embedding projection
//! uses a truncated normal.
//!
//! @version 0.1.0
//! @author RepFace Development Team

use rand::Rng;
use rand_distr::{Distribution, Normal};

use repface_tensor::Tensor;

// =============================================================================
// Constant Initializers
// =============================================================================

/// Initializes a tensor with zeros.
#[must_use]
pub fn zeros(shape: &[usize]) -> Tensor {
    Tensor::zeros(shape)
}

/// Initializes a tensor with ones.
#[must_use]
pub fn ones(shape: &[usize]) -> Tensor {
    Tensor::ones(shape)
}

/// Initializes a tensor with a constant value.
#[must_use]
pub fn constant(shape: &[usize], value: f32) -> Tensor {
    Tensor::full(shape, value)
}

// =============================================================================
// Random Initializers
// =============================================================================

/// Initializes a tensor with uniform random values in [low, high).
#[must_use]
pub fn uniform_range(shape: &[usize], low: f32, high: f32) -> Tensor {
    let numel: usize = shape.iter().product();
    let mut rng = rand::thread_rng();
    let data: Vec<f32> = (0..numel).map(|_| rng.gen_range(low..high)).collect();
    Tensor::from_vec(data, shape).unwrap()
}

/// Initializes a tensor with standard normal random values.
#[must_use]
pub fn randn(shape: &[usize]) -> Tensor {
    Tensor::randn(shape)
}

/// Initializes a tensor with normal random values.
#[must_use]
pub fn normal(shape: &[usize], mean: f32, std: f32) -> Tensor {
    let numel: usize = shape.iter().product();
    let mut rng = rand::thread_rng();
    let dist = Normal::new(mean, std).unwrap();
    let data: Vec<f32> = (0..numel).map(|_| dist.sample(&mut rng)).collect();
    Tensor::from_vec(data, shape).unwrap()
}

/// Initializes a tensor with a truncated normal distribution.
///
/// Samples from N(0, std) and resamples any draw outside [-2*std, 2*std].
#[must_use]
pub fn trunc_normal(shape: &[usize], std: f32) -> Tensor {
    let numel: usize = shape.iter().product();
    let mut rng = rand::thread_rng();
    let dist = Normal::new(0.0f32, std).unwrap();
    let cutoff = 2.0 * std;
    let data: Vec<f32> = (0..numel)
        .map(|_| loop {
            let v = dist.sample(&mut rng);
            if v.abs() <= cutoff {
                break v;
            }
        })
        .collect();
    Tensor::from_vec(data, shape).unwrap()
}

// =============================================================================
// Kaiming Initialization
// =============================================================================

/// Kaiming (He) uniform initialization for ReLU-family networks.
///
/// Samples from U(-bound, bound) where bound = sqrt(6 / fan_in).
///
/// # Arguments
/// * `fan_out` - Number of output units
/// * `fan_in` - Number of input units
#[must_use]
pub fn kaiming_uniform(fan_out: usize, fan_in: usize) -> Tensor {
    let bound = (6.0 / fan_in as f32).sqrt();
    uniform_range(&[fan_out, fan_in], -bound, bound)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros_ones_constant() {
        assert!(zeros(&[4]).to_vec().iter().all(|&x| x == 0.0));
        assert!(ones(&[4]).to_vec().iter().all(|&x| x == 1.0));
        assert!(constant(&[4], 0.25).to_vec().iter().all(|&x| x == 0.25));
    }

    #[test]
    fn test_uniform_range_bounds() {
        let t = uniform_range(&[1000], -0.5, 0.5);
        assert!(t.to_vec().iter().all(|&x| (-0.5..0.5).contains(&x)));
    }

    #[test]
    fn test_kaiming_uniform_bounds() {
        let t = kaiming_uniform(10, 20);
        assert_eq!(t.shape(), &[10, 20]);
        let bound = (6.0 / 20.0_f32).sqrt();
        assert!(t.to_vec().iter().all(|&x| x.abs() <= bound));
    }

    #[test]
    fn test_trunc_normal_cutoff() {
        let t = trunc_normal(&[2000], 0.02);
        assert!(t.to_vec().iter().all(|&x| x.abs() <= 0.04));
    }

    #[test]
    fn test_normal_rough_center() {
        let t = normal(&[5000], 3.0, 0.1);
        let mean = t.mean();
        assert!((mean - 3.0).abs() < 0.05);
    }
}
