//! Convolution Layers - 2D Convolution with Groups and Dilation
//!
//! Direct (im2col-free) convolution over NCHW tensors. Grouped convolution
//! covers both the depthwise token mixers (groups = channels) and plain
//! dense convolution (groups = 1). Output positions are computed in
//! parallel per (batch, channel) plane.
//!
//! @version 0.1.0
//! @author RepFace Development Team

use std::collections::HashMap;

use rayon::prelude::*;
use repface_tensor::Tensor;

use crate::init::{kaiming_uniform, zeros};
use crate::module::Module;
use crate::parameter::Parameter;

// =============================================================================
// Conv2d
// =============================================================================

/// Applies a 2D convolution over an input image.
///
/// # Shape
/// - Input: (N, C_in, H, W)
/// - Output: (N, C_out, H_out, W_out)
///
/// where H_out = (H + 2*padding - dilation*(kernel - 1) - 1) / stride + 1
pub struct Conv2d {
    /// Weight tensor of shape (out_channels, in_channels / groups, kernel_h, kernel_w).
    pub weight: Parameter,
    /// Bias tensor of shape (out_channels).
    pub bias: Option<Parameter>,
    /// Number of input channels.
    in_channels: usize,
    /// Number of output channels.
    out_channels: usize,
    /// Size of the convolving kernel (height, width).
    kernel_size: (usize, usize),
    /// Stride of the convolution (height, width).
    stride: (usize, usize),
    /// Zero-padding added to both sides (height, width).
    padding: (usize, usize),
    /// Spacing between kernel taps (height, width).
    dilation: (usize, usize),
    /// Number of blocked connections from input to output channels.
    groups: usize,
}

impl Conv2d {
    /// Creates a new Conv2d layer with square kernel, stride 1 and no padding.
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self::with_options(
            in_channels,
            out_channels,
            (kernel_size, kernel_size),
            (1, 1),
            (0, 0),
            (1, 1),
            1,
            true,
        )
    }

    /// Creates a Conv2d layer with all options.
    pub fn with_options(
        in_channels: usize,
        out_channels: usize,
        kernel_size: (usize, usize),
        stride: (usize, usize),
        padding: (usize, usize),
        dilation: (usize, usize),
        groups: usize,
        bias: bool,
    ) -> Self {
        assert!(groups > 0, "Conv2d: groups must be positive");
        assert_eq!(
            in_channels % groups,
            0,
            "Conv2d: in_channels {in_channels} not divisible by groups {groups}"
        );
        assert_eq!(
            out_channels % groups,
            0,
            "Conv2d: out_channels {out_channels} not divisible by groups {groups}"
        );

        let (kh, kw) = kernel_size;
        let in_per_group = in_channels / groups;
        let fan_in = in_per_group * kh * kw;

        // Initialize weights
        let weight_data = kaiming_uniform(out_channels, fan_in);
        let weight_reshaped = weight_data
            .reshape(&[
                out_channels as isize,
                in_per_group as isize,
                kh as isize,
                kw as isize,
            ])
            .unwrap();
        let weight = Parameter::named("weight", weight_reshaped);

        let bias_param = if bias {
            Some(Parameter::named("bias", zeros(&[out_channels])))
        } else {
            None
        };

        Self {
            weight,
            bias: bias_param,
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
            dilation,
            groups,
        }
    }

    /// Creates a Conv2d layer from existing weights.
    ///
    /// The layer geometry is recovered from the weight shape:
    /// `in_channels = weight.shape[1] * groups`. This is the constructor
    /// the fusion rewrites use to materialize folded convolutions.
    pub fn from_weights(
        weight: Tensor,
        bias: Option<Tensor>,
        stride: (usize, usize),
        padding: (usize, usize),
        dilation: (usize, usize),
        groups: usize,
    ) -> Self {
        assert_eq!(
            weight.ndim(),
            4,
            "Conv2d weights must be (out, in/groups, kh, kw)"
        );
        let shape = weight.shape().to_vec();
        let out_channels = shape[0];
        let in_channels = shape[1] * groups;
        let kernel_size = (shape[2], shape[3]);
        assert_eq!(
            out_channels % groups,
            0,
            "Conv2d: out_channels {out_channels} not divisible by groups {groups}"
        );
        if let Some(ref b) = bias {
            assert_eq!(b.shape(), &[out_channels], "Conv2d bias shape mismatch");
        }

        Self {
            weight: Parameter::named("weight", weight),
            bias: bias.map(|b| Parameter::named("bias", b)),
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
            dilation,
            groups,
        }
    }

    /// Returns the number of input channels.
    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Returns the number of output channels.
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Returns the kernel size (height, width).
    pub fn kernel_size(&self) -> (usize, usize) {
        self.kernel_size
    }

    /// Returns the stride (height, width).
    pub fn stride(&self) -> (usize, usize) {
        self.stride
    }

    /// Returns the padding (height, width).
    pub fn padding(&self) -> (usize, usize) {
        self.padding
    }

    /// Returns the dilation (height, width).
    pub fn dilation(&self) -> (usize, usize) {
        self.dilation
    }

    /// Returns the group count.
    pub fn groups(&self) -> usize {
        self.groups
    }
}

impl Module for Conv2d {
    fn forward(&self, input: &Tensor) -> Tensor {
        let input_shape = input.shape();
        assert_eq!(input_shape.len(), 4, "Conv2d expects a (N, C, H, W) input");
        let batch_size = input_shape[0];
        let in_height = input_shape[2];
        let in_width = input_shape[3];

        assert_eq!(
            input_shape[1], self.in_channels,
            "Conv2d: expected {} input channels, got {}",
            self.in_channels, input_shape[1]
        );

        let (kh, kw) = self.kernel_size;
        let (sh, sw) = self.stride;
        let (ph, pw) = self.padding;
        let (dh, dw) = self.dilation;

        let out_height = (in_height + 2 * ph - dh * (kh - 1) - 1) / sh + 1;
        let out_width = (in_width + 2 * pw - dw * (kw - 1) - 1) / sw + 1;

        let in_per_group = self.in_channels / self.groups;
        let out_per_group = self.out_channels / self.groups;

        let input_vec = input.as_slice();
        let weight_data = self.weight.data();
        let weight_vec = weight_data.as_slice();
        let bias_data = self.bias.as_ref().map(|b| b.data());

        let plane = out_height * out_width;
        let mut output_data = vec![0.0f32; batch_size * self.out_channels * plane];

        // One task per (batch, out-channel) output plane
        output_data
            .par_chunks_mut(plane)
            .enumerate()
            .for_each(|(chunk, out_plane)| {
                let b = chunk / self.out_channels;
                let oc = chunk % self.out_channels;
                let ic_start = (oc / out_per_group) * in_per_group;
                let bias = bias_data.as_ref().map_or(0.0, |bd| bd.as_slice()[oc]);

                for oh in 0..out_height {
                    for ow in 0..out_width {
                        let mut sum = bias;

                        for icg in 0..in_per_group {
                            let ic = ic_start + icg;
                            for ki in 0..kh {
                                let ih = oh * sh + ki * dh;

                                // Handle padding
                                if ih < ph || ih >= in_height + ph {
                                    continue;
                                }
                                let actual_ih = ih - ph;

                                for kj in 0..kw {
                                    let iw = ow * sw + kj * dw;
                                    if iw < pw || iw >= in_width + pw {
                                        continue;
                                    }
                                    let actual_iw = iw - pw;

                                    let input_idx = b * self.in_channels * in_height * in_width
                                        + ic * in_height * in_width
                                        + actual_ih * in_width
                                        + actual_iw;

                                    let weight_idx = oc * in_per_group * kh * kw
                                        + icg * kh * kw
                                        + ki * kw
                                        + kj;

                                    sum += input_vec[input_idx] * weight_vec[weight_idx];
                                }
                            }
                        }

                        out_plane[oh * out_width + ow] = sum;
                    }
                }
            });

        Tensor::from_vec(
            output_data,
            &[batch_size, self.out_channels, out_height, out_width],
        )
        .unwrap()
    }

    fn parameters(&self) -> Vec<Parameter> {
        let mut params = vec![self.weight.clone()];
        if let Some(ref bias) = self.bias {
            params.push(bias.clone());
        }
        params
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        let mut params = HashMap::new();
        params.insert("weight".to_string(), self.weight.clone());
        if let Some(ref bias) = self.bias {
            params.insert("bias".to_string(), bias.clone());
        }
        params
    }

    fn name(&self) -> &'static str {
        "Conv2d"
    }
}

// =============================================================================
// Tests
// =============================================================================
