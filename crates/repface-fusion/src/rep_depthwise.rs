//! RepDepthwise - Re-parameterized Depthwise Block
//!
//! Three parallel depthwise branches over the same channels - a 3x3
//! conv+norm, a 1x1 conv with bias, and the identity - summed and passed
//! through a trailing batch norm. After training the whole block collapses
//! into one 3x3 depthwise convolution.
//!
//! @version 0.1.0
//! @author RepFace Development Team

use std::collections::HashMap;

use repface_nn::layers::{BatchNorm2d, Conv2d};
use repface_nn::module::prefixed_parameters;
use repface_nn::{Module, Parameter};
use repface_tensor::Tensor;

use crate::conv_norm::ConvNorm;
use crate::fold::{fold_conv_bn, identity_kernel, pad_kernel};

/// Multi-branch depthwise block, fusable into a single 3x3 convolution.
///
/// Forward: `norm(conv(x) + conv1(x) + x)`. The block is square by
/// construction: input channels, output channels and groups all match.
pub struct RepDepthwise {
    /// 3x3 depthwise conv + norm branch.
    pub conv: ConvNorm,
    /// Parallel 1x1 depthwise conv branch, carrying its own bias.
    pub conv1: Conv2d,
    /// Norm applied to the three-way branch sum.
    pub norm: BatchNorm2d,
    /// Channel count shared by every branch.
    channels: usize,
}

impl RepDepthwise {
    /// Creates a block over `channels` channels.
    pub fn new(channels: usize) -> Self {
        let conv = ConvNorm::with_options(
            channels,
            channels,
            (3, 3),
            (1, 1),
            (1, 1),
            (1, 1),
            channels,
            1.0,
        );
        let conv1 = Conv2d::with_options(
            channels,
            channels,
            (1, 1),
            (1, 1),
            (0, 0),
            (1, 1),
            channels,
            true,
        );
        let norm = BatchNorm2d::new(channels);

        Self {
            conv,
            conv1,
            norm,
            channels,
        }
    }

    /// Returns the channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Collapses the three branches and the trailing norm into one
    /// 3x3 depthwise convolution.
    ///
    /// The 3x3 branch folds its own norm first; the 1x1 kernel and the
    /// identity tap are padded onto the 3x3 grid and summed in. The
    /// trailing norm wrapped the branch sum, so it must fold last, over
    /// the summed kernel and bias.
    pub fn fuse(&self) -> Conv2d {
        let (w_conv, b_conv) = fold_conv_bn(&self.conv.conv.weight.data(), None, &self.conv.norm);

        let w_conv1 = pad_kernel(&self.conv1.weight.data(), (3, 3));
        let b_conv1 = self
            .conv1
            .bias
            .as_ref()
            .map_or_else(|| Tensor::zeros(&[self.channels]), Parameter::data);

        // The identity branch contributes a centered unit tap and no bias
        let identity = identity_kernel(self.channels, 1, (3, 3));

        let w_sum = w_conv.add(&w_conv1).unwrap().add(&identity).unwrap();
        let b_sum = b_conv.add(&b_conv1).unwrap();

        let (w_final, b_final) = fold_conv_bn(&w_sum, Some(&b_sum), &self.norm);

        Conv2d::from_weights(
            w_final,
            Some(b_final),
            (1, 1),
            (1, 1),
            (1, 1),
            self.channels,
        )
    }
}

impl Module for RepDepthwise {
    fn forward(&self, input: &Tensor) -> Tensor {
        let a = self.conv.forward(input);
        let b = self.conv1.forward(input);
        let sum = a.add(&b).unwrap().add(input).unwrap();
        self.norm.forward(&sum)
    }

    fn parameters(&self) -> Vec<Parameter> {
        let mut params = self.conv.parameters();
        params.extend(self.conv1.parameters());
        params.extend(self.norm.parameters());
        params
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        let mut params = HashMap::new();
        prefixed_parameters(&mut params, "conv", &self.conv);
        prefixed_parameters(&mut params, "conv1", &self.conv1);
        prefixed_parameters(&mut params, "norm", &self.norm);
        params
    }

    fn set_training(&mut self, training: bool) {
        self.conv.set_training(training);
        self.norm.set_training(training);
    }

    fn is_training(&self) -> bool {
        self.norm.is_training()
    }

    fn name(&self) -> &'static str {
        "RepDepthwise"
    }
}

// =============================================================================
// Tests
// =============================================================================
