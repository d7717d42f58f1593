//! Activation Modules - Non-linear Activation Functions
//!
//! Provides activation functions as modules for use inside composite blocks.
//!
//! @version 0.1.0
//! @author RepFace Development Team

use std::collections::HashMap;

use repface_tensor::Tensor;

use crate::init::constant;
use crate::module::Module;
use crate::parameter::Parameter;

fn map_elementwise(input: &Tensor, f: impl Fn(f32) -> f32) -> Tensor {
    let data: Vec<f32> = input.as_slice().iter().map(|&x| f(x)).collect();
    Tensor::from_vec(data, input.shape()).unwrap()
}

// =============================================================================
// ReLU
// =============================================================================

/// Applies the rectified linear unit function element-wise.
///
/// ReLU(x) = max(0, x)
#[derive(Debug, Clone, Copy, Default)]
pub struct ReLU;

impl ReLU {
    /// Creates a new ReLU activation.
    pub fn new() -> Self {
        Self
    }
}

impl Module for ReLU {
    fn forward(&self, input: &Tensor) -> Tensor {
        map_elementwise(input, |x| x.max(0.0))
    }

    fn name(&self) -> &'static str {
        "ReLU"
    }
}

// =============================================================================
// GELU
// =============================================================================

/// Applies the Gaussian error linear unit function element-wise.
///
/// GELU(x) = x * Phi(x) where Phi is the CDF of the standard normal
/// distribution, computed with the tanh approximation.
#[derive(Debug, Clone, Copy, Default)]
pub struct GELU;

impl GELU {
    /// Creates a new GELU activation.
    pub fn new() -> Self {
        Self
    }
}

impl Module for GELU {
    fn forward(&self, input: &Tensor) -> Tensor {
        // GELU(x) ≈ 0.5 * x * (1 + tanh(sqrt(2/π) * (x + 0.044715 * x³)))
        let sqrt_2_over_pi = (2.0_f32 / std::f32::consts::PI).sqrt();
        map_elementwise(input, |x| {
            let inner = sqrt_2_over_pi * (x + 0.044715 * x.powi(3));
            0.5 * x * (1.0 + inner.tanh())
        })
    }

    fn name(&self) -> &'static str {
        "GELU"
    }
}

// =============================================================================
// Sigmoid
// =============================================================================

/// Applies the sigmoid function element-wise.
///
/// Sigmoid(x) = 1 / (1 + exp(-x))
#[derive(Debug, Clone, Copy, Default)]
pub struct Sigmoid;

impl Sigmoid {
    /// Creates a new Sigmoid activation.
    pub fn new() -> Self {
        Self
    }
}

impl Module for Sigmoid {
    fn forward(&self, input: &Tensor) -> Tensor {
        map_elementwise(input, |x| 1.0 / (1.0 + (-x).exp()))
    }

    fn name(&self) -> &'static str {
        "Sigmoid"
    }
}

// =============================================================================
// Identity
// =============================================================================

/// Passes the input through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Identity {
    /// Creates a new Identity module.
    pub fn new() -> Self {
        Self
    }
}

impl Module for Identity {
    fn forward(&self, input: &Tensor) -> Tensor {
        input.clone()
    }

    fn name(&self) -> &'static str {
        "Identity"
    }
}

// =============================================================================
// PReLU
// =============================================================================

/// Applies the parametric ReLU function element-wise.
///
/// PReLU(x) = max(0, x) + a * min(0, x)
///
/// The slope `a` is learnable, either shared (`num_parameters = 1`) or one
/// per channel of a (N, C, ...) input.
pub struct PReLU {
    /// Learnable negative slopes.
    pub weight: Parameter,
    /// Number of slope parameters (1 or the channel count).
    num_parameters: usize,
}

impl PReLU {
    /// Creates a PReLU with one slope per channel, initialized to 0.25.
    pub fn new(num_parameters: usize) -> Self {
        assert!(num_parameters > 0, "PReLU needs at least one parameter");
        Self {
            weight: Parameter::named("weight", constant(&[num_parameters], 0.25)),
            num_parameters,
        }
    }
}

impl Module for PReLU {
    fn forward(&self, input: &Tensor) -> Tensor {
        let shape = input.shape().to_vec();
        assert!(
            shape.len() >= 2 || self.num_parameters == 1,
            "PReLU with per-channel slopes needs a (N, C, ...) input"
        );

        let slopes = self.weight.data().to_vec();
        if self.num_parameters == 1 {
            let a = slopes[0];
            return map_elementwise(input, |x| if x >= 0.0 { x } else { a * x });
        }

        let channels = shape[1];
        assert_eq!(
            channels, self.num_parameters,
            "PReLU: expected {} channels, got {}",
            self.num_parameters, channels
        );
        let spatial_size: usize = shape[2..].iter().product();

        let input_vec = input.as_slice();
        let mut output_vec = vec![0.0f32; input_vec.len()];
        let batch_size = shape[0];
        for b in 0..batch_size {
            for c in 0..channels {
                let a = slopes[c];
                let start = b * channels * spatial_size + c * spatial_size;
                for s in 0..spatial_size {
                    let x = input_vec[start + s];
                    output_vec[start + s] = if x >= 0.0 { x } else { a * x };
                }
            }
        }

        Tensor::from_vec(output_vec, &shape).unwrap()
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![self.weight.clone()]
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        let mut params = HashMap::new();
        params.insert("weight".to_string(), self.weight.clone());
        params
    }

    fn name(&self) -> &'static str {
        "PReLU"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu() {
        let input = Tensor::from_vec(vec![-1.0, 0.0, 2.0], &[3]).unwrap();
        let output = ReLU::new().forward(&input);
        assert_eq!(output.to_vec(), vec![0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_gelu_known_values() {
        let input = Tensor::from_vec(vec![0.0, 1.0, -1.0], &[3]).unwrap();
        let output = GELU::new().forward(&input);
        let out = output.to_vec();

        assert_eq!(out[0], 0.0);
        assert!((out[1] - 0.841_192).abs() < 1e-4);
        assert!((out[2] + 0.158_808).abs() < 1e-4);
    }

    #[test]
    fn test_sigmoid() {
        let input = Tensor::from_vec(vec![0.0, 100.0, -100.0], &[3]).unwrap();
        let output = Sigmoid::new().forward(&input);
        let out = output.to_vec();

        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);
        assert!(out[2].abs() < 1e-6);
    }

    #[test]
    fn test_identity() {
        let input = Tensor::from_vec(vec![1.0, -2.0], &[2]).unwrap();
        let output = Identity::new().forward(&input);
        assert_eq!(output.to_vec(), input.to_vec());
    }

    #[test]
    fn test_prelu_per_channel() {
        let prelu = PReLU::new(2);
        prelu
            .weight
            .update_data(Tensor::from_vec(vec![0.1, 0.5], &[2]).unwrap());

        // (1, 2, 2) input: channel 0 negative, channel 1 negative
        let input = Tensor::from_vec(vec![-1.0, 1.0, -2.0, 2.0], &[1, 2, 2]).unwrap();
        let output = prelu.forward(&input);
        let out = output.to_vec();

        assert!((out[0] + 0.1).abs() < 1e-6);
        assert_eq!(out[1], 1.0);
        assert!((out[2] + 1.0).abs() < 1e-6);
        assert_eq!(out[3], 2.0);
    }

    #[test]
    fn test_prelu_parameter_count() {
        let prelu = PReLU::new(64);
        assert_eq!(prelu.num_parameters(), 64);
    }
}
