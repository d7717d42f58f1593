//! Squeeze-and-Excitation Layer
//!
//! Channel attention: global average pooling followed by a two-layer 1x1
//! convolution bottleneck whose sigmoid output rescales each channel.
//!
//! @version 0.1.0
//! @author RepFace Development Team

use std::collections::HashMap;

use repface_tensor::Tensor;

use crate::activation::{ReLU, Sigmoid};
use crate::module::{prefixed_parameters, Module};
use crate::parameter::Parameter;

use super::conv::Conv2d;

// =============================================================================
// SqueezeExcite
// =============================================================================

/// Squeeze-and-Excitation channel attention over a (N, C, H, W) input.
///
/// s = sigmoid(expand(relu(reduce(avgpool(x)))))
/// y = x * s (broadcast over H, W)
pub struct SqueezeExcite {
    /// 1x1 bottleneck reduction conv.
    pub reduce: Conv2d,
    /// 1x1 bottleneck expansion conv.
    pub expand: Conv2d,
    act: ReLU,
    gate: Sigmoid,
    channels: usize,
}

impl SqueezeExcite {
    /// Creates a squeeze-excite block with the given reduction ratio.
    ///
    /// The bottleneck width is `round(channels * ratio)`, floored at 1.
    pub fn new(channels: usize, ratio: f32) -> Self {
        assert!(channels > 0, "SqueezeExcite needs at least one channel");
        let rd_channels = ((channels as f32 * ratio).round() as usize).max(1);

        Self {
            reduce: Conv2d::with_options(
                channels,
                rd_channels,
                (1, 1),
                (1, 1),
                (0, 0),
                (1, 1),
                1,
                true,
            ),
            expand: Conv2d::with_options(
                rd_channels,
                channels,
                (1, 1),
                (1, 1),
                (0, 0),
                (1, 1),
                1,
                true,
            ),
            act: ReLU::new(),
            gate: Sigmoid::new(),
            channels,
        }
    }

    /// Returns the channel count this block operates on.
    pub fn channels(&self) -> usize {
        self.channels
    }
}

impl Module for SqueezeExcite {
    fn forward(&self, input: &Tensor) -> Tensor {
        let shape = input.shape().to_vec();
        assert_eq!(shape.len(), 4, "SqueezeExcite expects a (N, C, H, W) input");
        let batch_size = shape[0];
        let channels = shape[1];
        let spatial_size = shape[2] * shape[3];

        assert_eq!(
            channels, self.channels,
            "SqueezeExcite: expected {} channels, got {}",
            self.channels, channels
        );

        // Squeeze: global average pool to (N, C, 1, 1)
        let input_vec = input.as_slice();
        let mut pooled = vec![0.0f32; batch_size * channels];
        for b in 0..batch_size {
            for c in 0..channels {
                let start = b * channels * spatial_size + c * spatial_size;
                let sum: f32 = input_vec[start..start + spatial_size].iter().sum();
                pooled[b * channels + c] = sum / spatial_size as f32;
            }
        }
        let pooled = Tensor::from_vec(pooled, &[batch_size, channels, 1, 1]).unwrap();

        // Excite: bottleneck and gate
        let s = self.act.forward(&self.reduce.forward(&pooled));
        let s = self.gate.forward(&self.expand.forward(&s));

        // Scale each channel
        let scale = s.as_slice();
        let mut output = vec![0.0f32; input_vec.len()];
        for b in 0..batch_size {
            for c in 0..channels {
                let g = scale[b * channels + c];
                let start = b * channels * spatial_size + c * spatial_size;
                for i in 0..spatial_size {
                    output[start + i] = input_vec[start + i] * g;
                }
            }
        }

        Tensor::from_vec(output, &shape).unwrap()
    }

    fn parameters(&self) -> Vec<Parameter> {
        let mut params = self.reduce.parameters();
        params.extend(self.expand.parameters());
        params
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        let mut params = HashMap::new();
        prefixed_parameters(&mut params, "reduce", &self.reduce);
        prefixed_parameters(&mut params, "expand", &self.expand);
        params
    }

    fn name(&self) -> &'static str {
        "SqueezeExcite"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_se_shape() {
        let se = SqueezeExcite::new(8, 0.25);
        let input = Tensor::randn(&[2, 8, 4, 4]);
        let output = se.forward(&input);
        assert_eq!(output.shape(), &[2, 8, 4, 4]);
    }

    #[test]
    fn test_se_bottleneck_width() {
        let se = SqueezeExcite::new(48, 0.25);
        assert_eq!(se.reduce.out_channels(), 12);
        assert_eq!(se.expand.in_channels(), 12);
        assert_eq!(se.expand.out_channels(), 48);

        // Tiny channel counts floor at one bottleneck channel
        let se = SqueezeExcite::new(2, 0.25);
        assert_eq!(se.reduce.out_channels(), 1);
    }

    #[test]
    fn test_se_gates_between_zero_and_one() {
        let se = SqueezeExcite::new(4, 0.25);
        let input = Tensor::ones(&[1, 4, 3, 3]);
        let output = se.forward(&input);

        // Sigmoid gate keeps every output within (0, input)
        for &v in output.as_slice() {
            assert!(v > 0.0 && v < 1.0);
        }
    }

    #[test]
    fn test_se_zero_weights_give_half_gate() {
        let se = SqueezeExcite::new(2, 0.5);
        se.reduce.weight.update_data(Tensor::zeros(&[1, 2, 1, 1]));
        se.reduce
            .bias
            .as_ref()
            .unwrap()
            .update_data(Tensor::zeros(&[1]));
        se.expand.weight.update_data(Tensor::zeros(&[2, 1, 1, 1]));
        se.expand
            .bias
            .as_ref()
            .unwrap()
            .update_data(Tensor::zeros(&[2]));

        let input = Tensor::full(&[1, 2, 2, 2], 4.0);
        let output = se.forward(&input);

        // sigmoid(0) = 0.5 gate on every channel
        for &v in output.as_slice() {
            assert!((v - 2.0).abs() < 1e-6);
        }
    }
}
