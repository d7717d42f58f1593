//! Embedding Head - Separable Neck and Global Depthwise Projection
//!
//! The backbone ends in a fixed head: a 1x1 separable projection to the
//! head width, a spatially-global depthwise convolution that collapses the
//! final map to 1x1, and a bias-free dense projection normalized into the
//! embedding space. No activation follows the final normalization.
//!
//! @version 0.1.0
//! @author RepFace Development Team

use std::collections::HashMap;

use repface_fusion::ConvNorm;
use repface_nn::{prefixed_parameters, BatchNorm1d, Linear, Module, PReLU, Parameter};
use repface_tensor::Tensor;

use crate::stage::RepStage;

// =============================================================================
// Helpers
// =============================================================================

/// Collapses trailing spatial dimensions into a feature axis.
fn flatten(input: &Tensor) -> Tensor {
    let shape = input.shape();
    if shape.len() <= 2 {
        return input.clone();
    }
    let batch_size = shape[0] as isize;
    input.reshape(&[batch_size, -1]).unwrap()
}

// =============================================================================
// ConvBlock
// =============================================================================

/// Convolution + batch norm + per-channel PReLU.
pub struct ConvBlock {
    /// Fusable convolution + norm stage.
    pub conv: RepStage,
    act: PReLU,
}

impl ConvBlock {
    /// Builds a 1x1 projection block.
    #[must_use]
    pub fn new(in_channels: usize, out_channels: usize) -> Self {
        Self::with_options(in_channels, out_channels, (1, 1), (1, 1), (0, 0), 1)
    }

    /// Builds a block with explicit geometry.
    #[must_use]
    pub fn with_options(
        in_channels: usize,
        out_channels: usize,
        kernel_size: (usize, usize),
        stride: (usize, usize),
        padding: (usize, usize),
        groups: usize,
    ) -> Self {
        Self {
            conv: RepStage::ConvNorm(ConvNorm::with_options(
                in_channels,
                out_channels,
                kernel_size,
                stride,
                padding,
                (1, 1),
                groups,
                1.0,
            )),
            act: PReLU::new(out_channels),
        }
    }
}

impl Module for ConvBlock {
    fn forward(&self, input: &Tensor) -> Tensor {
        self.act.forward(&self.conv.forward(input))
    }

    fn parameters(&self) -> Vec<Parameter> {
        let mut params = self.conv.parameters();
        params.extend(self.act.parameters());
        params
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        let mut params = HashMap::new();
        prefixed_parameters(&mut params, "conv", &self.conv);
        prefixed_parameters(&mut params, "act", &self.act);
        params
    }

    fn set_training(&mut self, training: bool) {
        self.conv.set_training(training);
    }

    fn is_training(&self) -> bool {
        self.conv.is_training()
    }

    fn name(&self) -> &'static str {
        "ConvBlock"
    }
}

// =============================================================================
// GdcHead
// =============================================================================

/// Global depthwise embedding head.
///
/// A 7x7 grouped convolution spans the whole feature map left by a
/// 112x112 input, so its output is spatially 1x1. The flattened features
/// pass through a bias-free linear projection and a final per-feature
/// normalization to yield the embedding.
pub struct GdcHead {
    /// Spatially-global depthwise stage.
    pub depthwise: RepStage,
    /// Bias-free projection into the embedding space.
    pub projection: Linear,
    /// Final per-feature normalization; no activation follows.
    pub norm: BatchNorm1d,
}

impl GdcHead {
    /// Builds the head over `channels`-wide 7x7 feature maps.
    #[must_use]
    pub fn new(channels: usize, embedding_dim: usize) -> Self {
        Self {
            depthwise: RepStage::ConvNorm(ConvNorm::with_options(
                channels,
                channels,
                (7, 7),
                (1, 1),
                (0, 0),
                (1, 1),
                channels,
                1.0,
            )),
            projection: Linear::with_bias(channels, embedding_dim, false),
            norm: BatchNorm1d::new(embedding_dim),
        }
    }

    /// Width of the embedding this head produces.
    #[must_use]
    pub fn embedding_dim(&self) -> usize {
        self.norm.num_features()
    }
}

impl Module for GdcHead {
    fn forward(&self, input: &Tensor) -> Tensor {
        let pooled = self.depthwise.forward(input);
        let projected = self.projection.forward(&flatten(&pooled));
        self.norm.forward(&projected)
    }

    fn parameters(&self) -> Vec<Parameter> {
        let mut params = self.depthwise.parameters();
        params.extend(self.projection.parameters());
        params.extend(self.norm.parameters());
        params
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        let mut params = HashMap::new();
        prefixed_parameters(&mut params, "depthwise", &self.depthwise);
        prefixed_parameters(&mut params, "projection", &self.projection);
        prefixed_parameters(&mut params, "norm", &self.norm);
        params
    }

    fn set_training(&mut self, training: bool) {
        self.depthwise.set_training(training);
        self.norm.set_training(training);
    }

    fn is_training(&self) -> bool {
        self.norm.is_training()
    }

    fn name(&self) -> &'static str {
        "GdcHead"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_collapses_spatial_dims() {
        let input = Tensor::randn(&[2, 3, 4, 4]);
        let flat = flatten(&input);
        assert_eq!(flat.shape(), &[2, 48]);
        assert_eq!(flat.to_vec(), input.to_vec());
    }

    #[test]
    fn test_flatten_passes_matrices_through() {
        let input = Tensor::randn(&[2, 5]);
        assert_eq!(flatten(&input).shape(), &[2, 5]);
    }

    #[test]
    fn test_conv_block_shape_and_params() {
        let block = ConvBlock::new(8, 16);
        let output = block.forward(&Tensor::randn(&[1, 8, 7, 7]));
        assert_eq!(output.shape(), &[1, 16, 7, 7]);
        // 8*16 conv weights, 16+16 norm, 16 slopes
        assert_eq!(block.num_parameters(), 8 * 16 + 32 + 16);
    }

    #[test]
    fn test_gdc_head_produces_embedding_rows() {
        let mut head = GdcHead::new(32, 24);
        head.eval();
        let output = head.forward(&Tensor::randn(&[3, 32, 7, 7]));
        assert_eq!(output.shape(), &[3, 24]);
        assert_eq!(head.embedding_dim(), 24);
    }

    #[test]
    fn test_gdc_head_depthwise_is_fusable() {
        let mut head = GdcHead::new(16, 8);
        head.eval();
        let input = Tensor::randn(&[1, 16, 7, 7]);
        let before = head.forward(&input);

        head.depthwise.reparameterize();
        assert!(head.depthwise.is_fused());

        let after = head.forward(&input);
        for (b, a) in before.to_vec().iter().zip(after.to_vec()) {
            assert!((b - a).abs() < 1e-4);
        }
    }

    #[test]
    fn test_gdc_head_parameter_names() {
        let head = GdcHead::new(16, 8);
        let named = head.named_parameters();
        assert!(named.contains_key("depthwise.conv.weight"));
        assert!(named.contains_key("depthwise.norm.weight"));
        assert!(named.contains_key("projection.weight"));
        assert!(named.contains_key("norm.bias"));
        assert!(!named.contains_key("projection.bias"));
    }
}
