//! Normalization Layers - BatchNorm1d and BatchNorm2d
//!
//! Batch normalization with learnable affine parameters and tracked running
//! statistics. Training mode normalizes with batch statistics and updates
//! the running estimates; eval mode normalizes with the running estimates.
//! The running statistics are also what every fusion rewrite folds from,
//! regardless of the current mode.
//!
//! @version 0.1.0
//! @author RepFace Development Team

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use repface_tensor::Tensor;

use crate::init::{ones, zeros};
use crate::module::Module;
use crate::parameter::Parameter;

// =============================================================================
// BatchNorm1d
// =============================================================================

/// Applies Batch Normalization over a 2D or 3D input.
///
/// y = (x - E[x]) / sqrt(Var[x] + eps) * gamma + beta
///
/// # Shape
/// - Input: (N, C) or (N, C, L)
/// - Output: Same as input
pub struct BatchNorm1d {
    /// Learnable scale parameter (gamma).
    pub weight: Parameter,
    /// Learnable shift parameter (beta).
    pub bias: Parameter,
    /// Running mean for inference (updated during training).
    running_mean: RwLock<Tensor>,
    /// Running variance for inference (updated during training).
    running_var: RwLock<Tensor>,
    /// Number of features.
    num_features: usize,
    /// Epsilon for numerical stability.
    eps: f32,
    /// Momentum for running stats update: running = (1 - momentum) * running + momentum * batch.
    momentum: f32,
    /// Whether in training mode.
    training: AtomicBool,
}

impl BatchNorm1d {
    /// Creates a new BatchNorm1d layer.
    pub fn new(num_features: usize) -> Self {
        Self::with_options(num_features, 1e-5, 0.1)
    }

    /// Creates a BatchNorm1d with custom options.
    pub fn with_options(num_features: usize, eps: f32, momentum: f32) -> Self {
        Self {
            weight: Parameter::named("weight", ones(&[num_features])),
            bias: Parameter::named("bias", zeros(&[num_features])),
            running_mean: RwLock::new(zeros(&[num_features])),
            running_var: RwLock::new(ones(&[num_features])),
            num_features,
            eps,
            momentum,
            training: AtomicBool::new(true),
        }
    }

    /// Returns the number of features.
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Returns the epsilon used for numerical stability.
    pub fn eps(&self) -> f32 {
        self.eps
    }

    /// Returns a clone of the running mean.
    pub fn running_mean(&self) -> Tensor {
        self.running_mean.read().clone()
    }

    /// Returns a clone of the running variance.
    pub fn running_var(&self) -> Tensor {
        self.running_var.read().clone()
    }

    /// Installs running statistics, e.g. from a checkpoint.
    pub fn set_running_stats(&self, mean: Tensor, var: Tensor) {
        assert_eq!(mean.shape(), &[self.num_features], "mean shape mismatch");
        assert_eq!(var.shape(), &[self.num_features], "var shape mismatch");
        *self.running_mean.write() = mean;
        *self.running_var.write() = var;
    }
}

impl Module for BatchNorm1d {
    fn forward(&self, input: &Tensor) -> Tensor {
        let shape = input.shape().to_vec();
        assert!(
            shape.len() == 2 || shape.len() == 3,
            "BatchNorm1d expects a (N, C) or (N, C, L) input"
        );
        let batch_size = shape[0];
        let num_features = shape[1];

        assert_eq!(
            num_features, self.num_features,
            "BatchNorm1d: expected {} features, got {}",
            self.num_features, num_features
        );

        let spatial_size: usize = if shape.len() > 2 {
            shape[2..].iter().product()
        } else {
            1
        };

        let (means, vars) = normalize_stats(
            input.as_slice(),
            batch_size,
            num_features,
            spatial_size,
            self.training.load(Ordering::Relaxed),
            self.momentum,
            &self.running_mean,
            &self.running_var,
        );

        let output = apply_affine(
            input.as_slice(),
            batch_size,
            num_features,
            spatial_size,
            &means,
            &vars,
            self.eps,
            &self.weight.data().to_vec(),
            &self.bias.data().to_vec(),
        );

        Tensor::from_vec(output, &shape).unwrap()
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![self.weight.clone(), self.bias.clone()]
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        let mut params = HashMap::new();
        params.insert("weight".to_string(), self.weight.clone());
        params.insert("bias".to_string(), self.bias.clone());
        params
    }

    fn set_training(&mut self, training: bool) {
        self.training.store(training, Ordering::Relaxed);
    }

    fn is_training(&self) -> bool {
        self.training.load(Ordering::Relaxed)
    }

    fn name(&self) -> &'static str {
        "BatchNorm1d"
    }
}

// =============================================================================
// BatchNorm2d
// =============================================================================

/// Applies Batch Normalization over a 4D input (images).
///
/// # Shape
/// - Input: (N, C, H, W)
/// - Output: Same as input
pub struct BatchNorm2d {
    /// Learnable scale parameter (gamma).
    pub weight: Parameter,
    /// Learnable shift parameter (beta).
    pub bias: Parameter,
    /// Running mean for inference (updated during training).
    running_mean: RwLock<Tensor>,
    /// Running variance for inference (updated during training).
    running_var: RwLock<Tensor>,
    /// Number of features (channels).
    num_features: usize,
    /// Epsilon for numerical stability.
    eps: f32,
    /// Momentum for running stats update.
    momentum: f32,
    /// Whether in training mode.
    training: AtomicBool,
}

impl BatchNorm2d {
    /// Creates a new BatchNorm2d layer.
    pub fn new(num_features: usize) -> Self {
        Self::with_options(num_features, 1e-5, 0.1)
    }

    /// Creates a BatchNorm2d with custom options.
    pub fn with_options(num_features: usize, eps: f32, momentum: f32) -> Self {
        Self {
            weight: Parameter::named("weight", ones(&[num_features])),
            bias: Parameter::named("bias", zeros(&[num_features])),
            running_mean: RwLock::new(zeros(&[num_features])),
            running_var: RwLock::new(ones(&[num_features])),
            num_features,
            eps,
            momentum,
            training: AtomicBool::new(true),
        }
    }

    /// Returns the number of features (channels).
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Returns the epsilon used for numerical stability.
    pub fn eps(&self) -> f32 {
        self.eps
    }

    /// Returns a clone of the running mean.
    pub fn running_mean(&self) -> Tensor {
        self.running_mean.read().clone()
    }

    /// Returns a clone of the running variance.
    pub fn running_var(&self) -> Tensor {
        self.running_var.read().clone()
    }

    /// Installs running statistics, e.g. from a checkpoint.
    pub fn set_running_stats(&self, mean: Tensor, var: Tensor) {
        assert_eq!(mean.shape(), &[self.num_features], "mean shape mismatch");
        assert_eq!(var.shape(), &[self.num_features], "var shape mismatch");
        *self.running_mean.write() = mean;
        *self.running_var.write() = var;
    }
}

impl Module for BatchNorm2d {
    fn forward(&self, input: &Tensor) -> Tensor {
        let shape = input.shape().to_vec();
        assert_eq!(shape.len(), 4, "BatchNorm2d expects a (N, C, H, W) input");
        let batch_size = shape[0];
        let channels = shape[1];
        let spatial_size = shape[2] * shape[3];

        assert_eq!(
            channels, self.num_features,
            "BatchNorm2d: expected {} channels, got {}",
            self.num_features, channels
        );

        let (means, vars) = normalize_stats(
            input.as_slice(),
            batch_size,
            channels,
            spatial_size,
            self.training.load(Ordering::Relaxed),
            self.momentum,
            &self.running_mean,
            &self.running_var,
        );

        let output = apply_affine(
            input.as_slice(),
            batch_size,
            channels,
            spatial_size,
            &means,
            &vars,
            self.eps,
            &self.weight.data().to_vec(),
            &self.bias.data().to_vec(),
        );

        Tensor::from_vec(output, &shape).unwrap()
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![self.weight.clone(), self.bias.clone()]
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        let mut params = HashMap::new();
        params.insert("weight".to_string(), self.weight.clone());
        params.insert("bias".to_string(), self.bias.clone());
        params
    }

    fn set_training(&mut self, training: bool) {
        self.training.store(training, Ordering::Relaxed);
    }

    fn is_training(&self) -> bool {
        self.training.load(Ordering::Relaxed)
    }

    fn name(&self) -> &'static str {
        "BatchNorm2d"
    }
}

// =============================================================================
// Shared Statistics Helpers
// =============================================================================

/// Computes the per-channel statistics used for normalization.
///
/// Training mode computes batch statistics and folds them into the running
/// estimates; eval mode returns the running estimates.
#[allow(clippy::too_many_arguments)]
fn normalize_stats(
    input: &[f32],
    batch_size: usize,
    channels: usize,
    spatial_size: usize,
    is_training: bool,
    momentum: f32,
    running_mean: &RwLock<Tensor>,
    running_var: &RwLock<Tensor>,
) -> (Vec<f32>, Vec<f32>) {
    if !is_training {
        return (running_mean.read().to_vec(), running_var.read().to_vec());
    }

    let count = (batch_size * spatial_size) as f32;
    let mut means = vec![0.0f32; channels];
    let mut vars = vec![0.0f32; channels];

    for c in 0..channels {
        let mut sum = 0.0f32;
        for b in 0..batch_size {
            let start = b * channels * spatial_size + c * spatial_size;
            for s in 0..spatial_size {
                sum += input[start + s];
            }
        }
        means[c] = sum / count;

        let mut var_sum = 0.0f32;
        for b in 0..batch_size {
            let start = b * channels * spatial_size + c * spatial_size;
            for s in 0..spatial_size {
                let diff = input[start + s] - means[c];
                var_sum += diff * diff;
            }
        }
        vars[c] = var_sum / count;
    }

    // Fold batch statistics into the running estimates
    let mut rm = running_mean.write();
    let mut rv = running_var.write();
    let new_mean: Vec<f32> = rm
        .to_vec()
        .iter()
        .zip(means.iter())
        .map(|(&r, &m)| (1.0 - momentum) * r + momentum * m)
        .collect();
    let new_var: Vec<f32> = rv
        .to_vec()
        .iter()
        .zip(vars.iter())
        .map(|(&r, &v)| (1.0 - momentum) * r + momentum * v)
        .collect();
    *rm = Tensor::from_vec(new_mean, &[channels]).unwrap();
    *rv = Tensor::from_vec(new_var, &[channels]).unwrap();

    (means, vars)
}

/// Normalizes and applies the affine transform per channel.
#[allow(clippy::too_many_arguments)]
fn apply_affine(
    input: &[f32],
    batch_size: usize,
    channels: usize,
    spatial_size: usize,
    means: &[f32],
    vars: &[f32],
    eps: f32,
    weight: &[f32],
    bias: &[f32],
) -> Vec<f32> {
    let mut output = vec![0.0f32; input.len()];
    for b in 0..batch_size {
        for c in 0..channels {
            let inv_std = 1.0 / (vars[c] + eps).sqrt();
            let start = b * channels * spatial_size + c * spatial_size;
            for s in 0..spatial_size {
                let normalized = (input[start + s] - means[c]) * inv_std;
                output[start + s] = normalized * weight[c] + bias[c];
            }
        }
    }
    output
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batchnorm1d_training_normalizes() {
        let bn = BatchNorm1d::new(2);
        // Two samples per feature: feature 0 is {1, 3}, feature 1 is {2, 6}
        let input = Tensor::from_vec(vec![1.0, 2.0, 3.0, 6.0], &[2, 2]).unwrap();
        let output = bn.forward(&input);
        let out = output.to_vec();

        // Unit gamma, zero beta: output is the normalized input, so each
        // feature column sums to ~0
        assert!((out[0] + out[2]).abs() < 1e-5);
        assert!((out[1] + out[3]).abs() < 1e-5);
    }

    #[test]
    fn test_batchnorm2d_eval_uses_running_stats() {
        let mut bn = BatchNorm2d::new(1);
        bn.set_running_stats(
            Tensor::from_vec(vec![2.0], &[1]).unwrap(),
            Tensor::from_vec(vec![4.0], &[1]).unwrap(),
        );
        bn.eval();

        let input = Tensor::from_vec(vec![4.0], &[1, 1, 1, 1]).unwrap();
        let output = bn.forward(&input);

        // (4 - 2) / sqrt(4 + eps) ~= 1
        assert!((output.to_vec()[0] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_batchnorm2d_running_stats_update() {
        let bn = BatchNorm2d::new(1);
        let input = Tensor::from_vec(vec![10.0, 10.0, 10.0, 10.0], &[1, 1, 2, 2]).unwrap();
        bn.forward(&input);

        // running_mean = 0.9 * 0 + 0.1 * 10
        let rm = bn.running_mean().to_vec();
        assert!((rm[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_batchnorm1d_3d_input() {
        let bn = BatchNorm1d::new(2);
        let input = Tensor::zeros(&[2, 2, 5]);
        let output = bn.forward(&input);
        assert_eq!(output.shape(), &[2, 2, 5]);
    }

    #[test]
    fn test_batchnorm_parameters() {
        let bn = BatchNorm1d::new(10);
        assert_eq!(bn.parameters().len(), 2);
        assert_eq!(bn.num_parameters(), 20); // weight + bias
    }
}
