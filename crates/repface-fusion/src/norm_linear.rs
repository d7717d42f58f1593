//! NormLinear - Fusable Batch Norm + Linear Pair
//!
//! A 1D batch norm feeding a dense projection, fused into a single biased
//! linear layer. The classifier-style counterpart of [`crate::ConvNorm`],
//! with the norm on the input side instead of the output side.
//!
//! @version 0.1.0
//! @author RepFace Development Team

use std::collections::HashMap;

use repface_nn::init::trunc_normal;
use repface_nn::layers::{BatchNorm1d, Linear};
use repface_nn::module::prefixed_parameters;
use repface_nn::{Module, Parameter};
use repface_tensor::Tensor;

use crate::fold::bn_scale;

/// Batch norm + linear, fusable into one operator.
pub struct NormLinear {
    /// Batch norm over the input features.
    pub norm: BatchNorm1d,
    /// Dense projection applied to the normalized features.
    pub linear: Linear,
}

impl NormLinear {
    /// Creates a pair projecting `in_features` to `out_features`.
    ///
    /// The linear weight starts from a truncated normal (std 0.02); its
    /// bias, when requested, starts at zero.
    pub fn new(in_features: usize, out_features: usize, bias: bool) -> Self {
        let norm = BatchNorm1d::new(in_features);
        let linear = Linear::with_bias(in_features, out_features, bias);
        linear
            .weight
            .update_data(trunc_normal(&[out_features, in_features], 0.02));

        Self { norm, linear }
    }

    /// Collapses the pair into a single biased linear layer.
    ///
    /// The norm scale folds into the weight columns. The norm shift takes
    /// one of two routes: a bias-free linear has no slot for it, so it is
    /// projected through the weight matrix (`b_adj @ W^T`); a biased linear
    /// accumulates the projected shift onto its existing bias
    /// (`W @ b_adj + bias`). The fused layer always carries a bias.
    pub fn fuse(&self) -> Linear {
        let weight = self.linear.weight.data();
        let out_features = weight.shape()[0];
        let in_features = weight.shape()[1];
        assert_eq!(
            self.norm.num_features(),
            in_features,
            "NormLinear: norm features {} do not match {} input features",
            self.norm.num_features(),
            in_features
        );

        let gamma = self.norm.weight.data().to_vec();
        let beta = self.norm.bias.data().to_vec();
        let mean = self.norm.running_mean().to_vec();
        let var = self.norm.running_var().to_vec();
        let scale = bn_scale(&gamma, &var, self.norm.eps());
        let b_adj: Vec<f32> = (0..in_features)
            .map(|i| beta[i] - mean[i] * scale[i])
            .collect();

        let w = weight.as_slice();
        let mut fused_weight = vec![0.0f32; out_features * in_features];
        for o in 0..out_features {
            for i in 0..in_features {
                fused_weight[o * in_features + i] = w[o * in_features + i] * scale[i];
            }
        }

        let fused_bias: Vec<f32> = match self.linear.bias {
            None => {
                let row = Tensor::from_vec(b_adj, &[1, in_features]).unwrap();
                row.matmul(&weight.t().unwrap()).unwrap().to_vec()
            }
            Some(ref bias) => {
                let column = Tensor::from_vec(b_adj, &[in_features, 1]).unwrap();
                let projected = weight.matmul(&column).unwrap();
                projected
                    .to_vec()
                    .iter()
                    .zip(bias.data().to_vec())
                    .map(|(&p, l)| p + l)
                    .collect()
            }
        };

        Linear::from_weights(
            Tensor::from_vec(fused_weight, &[out_features, in_features]).unwrap(),
            Some(Tensor::from_vec(fused_bias, &[out_features]).unwrap()),
        )
    }
}

impl Module for NormLinear {
    fn forward(&self, input: &Tensor) -> Tensor {
        self.linear.forward(&self.norm.forward(input))
    }

    fn parameters(&self) -> Vec<Parameter> {
        let mut params = self.norm.parameters();
        params.extend(self.linear.parameters());
        params
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        let mut params = HashMap::new();
        prefixed_parameters(&mut params, "norm", &self.norm);
        prefixed_parameters(&mut params, "linear", &self.linear);
        params
    }

    fn set_training(&mut self, training: bool) {
        self.norm.set_training(training);
    }

    fn is_training(&self) -> bool {
        self.norm.is_training()
    }

    fn name(&self) -> &'static str {
        "NormLinear"
    }
}

// =============================================================================
// Tests
// =============================================================================
