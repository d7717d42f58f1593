//! Linear Layer - Fully Connected Transformation
//!
//! Applies y = x @ W^T + b over the last dimension of a 2D input.
//!
//! @version 0.1.0
//! @author RepFace Development Team

use std::collections::HashMap;

use repface_tensor::Tensor;

use crate::init::{kaiming_uniform, zeros};
use crate::module::Module;
use crate::parameter::Parameter;

// =============================================================================
// Linear
// =============================================================================

/// Applies a linear transformation to the incoming data.
///
/// # Shape
/// - Input: (N, in_features)
/// - Output: (N, out_features)
pub struct Linear {
    /// Weight tensor of shape (out_features, in_features).
    pub weight: Parameter,
    /// Optional bias tensor of shape (out_features).
    pub bias: Option<Parameter>,
    /// Number of input features.
    in_features: usize,
    /// Number of output features.
    out_features: usize,
}

impl Linear {
    /// Creates a new Linear layer with bias.
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self::with_bias(in_features, out_features, true)
    }

    /// Creates a Linear layer with optional bias.
    pub fn with_bias(in_features: usize, out_features: usize, bias: bool) -> Self {
        let weight = Parameter::named("weight", kaiming_uniform(out_features, in_features));
        let bias_param = if bias {
            Some(Parameter::named("bias", zeros(&[out_features])))
        } else {
            None
        };

        Self {
            weight,
            bias: bias_param,
            in_features,
            out_features,
        }
    }

    /// Creates a Linear layer from existing weights.
    ///
    /// Used by the fusion rewrites to materialize folded projections.
    pub fn from_weights(weight: Tensor, bias: Option<Tensor>) -> Self {
        assert_eq!(weight.ndim(), 2, "Linear weights must be (out, in)");
        let out_features = weight.shape()[0];
        let in_features = weight.shape()[1];
        if let Some(ref b) = bias {
            assert_eq!(b.shape(), &[out_features], "Linear bias shape mismatch");
        }

        Self {
            weight: Parameter::named("weight", weight),
            bias: bias.map(|b| Parameter::named("bias", b)),
            in_features,
            out_features,
        }
    }

    /// Returns the number of input features.
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Returns the number of output features.
    pub fn out_features(&self) -> usize {
        self.out_features
    }
}

impl Module for Linear {
    fn forward(&self, input: &Tensor) -> Tensor {
        assert_eq!(input.ndim(), 2, "Linear expects a (N, in_features) input");
        assert_eq!(
            input.shape()[1],
            self.in_features,
            "Linear: expected {} input features, got {}",
            self.in_features,
            input.shape()[1]
        );

        let weight_t = self.weight.data().t().unwrap();
        let mut output = input.matmul(&weight_t).unwrap();

        if let Some(ref bias) = self.bias {
            let bias_vec = bias.data().to_vec();
            let out = output.as_mut_slice();
            for row in out.chunks_mut(self.out_features) {
                for (o, b) in row.iter_mut().zip(bias_vec.iter()) {
                    *o += b;
                }
            }
        }

        output
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
        "Linear"
    }
}

// =============================================================================
// Tests
// =============================================================================
