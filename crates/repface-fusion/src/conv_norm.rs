//! ConvNorm - Fusable Convolution + Batch Norm Pair
//!
//! A bias-free convolution followed by batch normalization over its output
//! channels. `fuse` collapses the pair into a single biased convolution
//! with identical eval-mode behavior.
//!
//! @version 0.1.0
//! @author RepFace Development Team

use std::collections::HashMap;

use repface_nn::layers::{BatchNorm2d, Conv2d};
use repface_nn::module::prefixed_parameters;
use repface_nn::{Module, Parameter};
use repface_tensor::Tensor;

use crate::fold::fold_conv_bn;

/// Convolution + batch norm, fusable into one operator.
///
/// The convolution never carries a bias; the norm's shift plays that role
/// until the pair is fused.
pub struct ConvNorm {
    /// Bias-free convolution.
    pub conv: Conv2d,
    /// Batch norm over the convolution's output channels.
    pub norm: BatchNorm2d,
}

impl ConvNorm {
    /// Creates a pointwise (1x1, stride 1, dense) pair.
    pub fn new(in_channels: usize, out_channels: usize) -> Self {
        Self::with_options(
            in_channels,
            out_channels,
            (1, 1),
            (1, 1),
            (0, 0),
            (1, 1),
            1,
            1.0,
        )
    }

    /// Creates a pair with full convolution geometry.
    ///
    /// `norm_weight_init` sets the initial norm scale; the channel-mixer
    /// projection layers start theirs at zero so freshly built residual
    /// branches contribute nothing.
    pub fn with_options(
        in_channels: usize,
        out_channels: usize,
        kernel_size: (usize, usize),
        stride: (usize, usize),
        padding: (usize, usize),
        dilation: (usize, usize),
        groups: usize,
        norm_weight_init: f32,
    ) -> Self {
        let conv = Conv2d::with_options(
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
            dilation,
            groups,
            false,
        );
        let norm = BatchNorm2d::new(out_channels);
        norm.weight
            .update_data(Tensor::full(&[out_channels], norm_weight_init));

        Self { conv, norm }
    }

    /// Collapses the pair into a single biased convolution.
    ///
    /// Reads the running statistics, so the result reproduces the pair's
    /// eval-mode forward pass; fusing while the norm is still accumulating
    /// batch statistics is a caller error. The source pair is left
    /// untouched and the caller substitutes the returned operator.
    pub fn fuse(&self) -> Conv2d {
        let weight = self.conv.weight.data();
        let (fused_weight, fused_bias) = fold_conv_bn(&weight, None, &self.norm);

        Conv2d::from_weights(
            fused_weight,
            Some(fused_bias),
            self.conv.stride(),
            self.conv.padding(),
            self.conv.dilation(),
            self.conv.groups(),
        )
    }
}

impl Module for ConvNorm {
    fn forward(&self, input: &Tensor) -> Tensor {
        self.norm.forward(&self.conv.forward(input))
    }

    fn parameters(&self) -> Vec<Parameter> {
        let mut params = self.conv.parameters();
        params.extend(self.norm.parameters());
        params
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        let mut params = HashMap::new();
        prefixed_parameters(&mut params, "conv", &self.conv);
        prefixed_parameters(&mut params, "norm", &self.norm);
        params
    }

    fn set_training(&mut self, training: bool) {
        self.norm.set_training(training);
    }

    fn is_training(&self) -> bool {
        self.norm.is_training()
    }

    fn name(&self) -> &'static str {
        "ConvNorm"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_shape() {
        let pair = ConvNorm::with_options(3, 8, (3, 3), (2, 2), (1, 1), (1, 1), 1, 1.0);
        let input = Tensor::randn(&[2, 3, 8, 8]);
        let output = pair.forward(&input);
        assert_eq!(output.shape(), &[2, 8, 4, 4]);
    }

    #[test]
    fn test_zero_norm_weight_init() {
        let pair = ConvNorm::with_options(4, 4, (1, 1), (1, 1), (0, 0), (1, 1), 1, 0.0);
        assert_eq!(pair.norm.weight.data().to_vec(), vec![0.0; 4]);

        // Zero scale zeroes the fused kernel too
        let fused = pair.fuse();
        assert_eq!(fused.weight.data().sum(), 0.0);
    }

    #[test]
    fn test_fuse_copies_geometry() {
        let pair = ConvNorm::with_options(8, 8, (3, 3), (2, 2), (1, 1), (1, 1), 8, 1.0);
        let fused = pair.fuse();

        assert_eq!(fused.in_channels(), 8);
        assert_eq!(fused.out_channels(), 8);
        assert_eq!(fused.kernel_size(), (3, 3));
        assert_eq!(fused.stride(), (2, 2));
        assert_eq!(fused.padding(), (1, 1));
        assert_eq!(fused.groups(), 8);
        assert!(fused.bias.is_some());
    }

    #[test]
    fn test_fuse_matches_eval_forward() {
        let mut pair = ConvNorm::with_options(2, 4, (3, 3), (1, 1), (1, 1), (1, 1), 1, 1.0);
        pair.conv.weight.update_data(Tensor::randn(&[4, 2, 3, 3]));
        pair.norm.weight.update_data(Tensor::randn(&[4]));
        pair.norm.bias.update_data(Tensor::randn(&[4]));
        pair.norm.set_running_stats(
            Tensor::randn(&[4]),
            Tensor::rand(&[4]).add_scalar(0.5),
        );
        pair.eval();

        let input = Tensor::randn(&[2, 2, 6, 6]);
        let expected = pair.forward(&input);
        let actual = pair.fuse().forward(&input);

        for (e, a) in expected.to_vec().iter().zip(actual.to_vec()) {
            assert!((e - a).abs() < 1e-4, "fused output diverged: {e} vs {a}");
        }
    }

    #[test]
    fn test_parameter_names() {
        let pair = ConvNorm::new(2, 3);
        let names = pair.named_parameters();
        assert!(names.contains_key("conv.weight"));
        assert!(names.contains_key("norm.weight"));
        assert!(names.contains_key("norm.bias"));
        assert_eq!(names.len(), 3);
    }
}
