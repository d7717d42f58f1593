//! Residual - Skip Connection with Foldable Identity
//!
//! Wraps a branch module and adds its output back onto the input, with
//! optional per-sample stochastic depth during training. When the branch
//! is convolutional the `+ input` can be folded into the kernel as a
//! centered unit tap, collapsing the wrapper into one convolution.
//!
//! @version 0.1.0
//! @author RepFace Development Team

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;
use repface_nn::layers::Conv2d;
use repface_nn::module::prefixed_parameters;
use repface_nn::{Module, Parameter};
use repface_tensor::Tensor;

use crate::conv_norm::ConvNorm;
use crate::fold::identity_kernel;
use crate::rep_depthwise::RepDepthwise;

// =============================================================================
// Branch
// =============================================================================

/// The module kinds a residual wrapper knows how to fold.
///
/// Dispatch is by tag rather than downcasting: each variant has its own
/// fusion rule, and anything else rides along as `Opaque`.
pub enum Branch {
    /// A fusable convolution + norm pair; must be depthwise to fold.
    ConvNorm(ConvNorm),
    /// A plain convolution carrying its own bias; must not be depthwise.
    Conv(Conv2d),
    /// A re-parameterizable depthwise block.
    Depthwise(RepDepthwise),
    /// Any other module; fusing leaves the wrapper unchanged.
    Opaque(Box<dyn Module>),
}

impl Branch {
    fn as_module(&self) -> &dyn Module {
        match self {
            Branch::ConvNorm(m) => m,
            Branch::Conv(m) => m,
            Branch::Depthwise(m) => m,
            Branch::Opaque(m) => m.as_ref(),
        }
    }
}

impl Module for Branch {
    fn forward(&self, input: &Tensor) -> Tensor {
        self.as_module().forward(input)
    }

    fn parameters(&self) -> Vec<Parameter> {
        self.as_module().parameters()
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        self.as_module().named_parameters()
    }

    fn set_training(&mut self, training: bool) {
        match self {
            Branch::ConvNorm(m) => m.set_training(training),
            Branch::Conv(_) => {}
            Branch::Depthwise(m) => m.set_training(training),
            Branch::Opaque(m) => m.set_training(training),
        }
    }

    fn is_training(&self) -> bool {
        self.as_module().is_training()
    }

    fn name(&self) -> &'static str {
        match self {
            Branch::ConvNorm(_) => "Branch::ConvNorm",
            Branch::Conv(_) => "Branch::Conv",
            Branch::Depthwise(_) => "Branch::Depthwise",
            Branch::Opaque(_) => "Branch::Opaque",
        }
    }
}

// =============================================================================
// Residual
// =============================================================================

/// Result of attempting to fold a residual wrapper.
pub enum FuseOutcome {
    /// The wrapper collapsed into a single convolution.
    Fused(Conv2d),
    /// The branch is not foldable; the wrapper is handed back intact.
    Unchanged(Residual),
}

/// Skip connection: `output = input + branch(input)`.
///
/// With a nonzero drop rate, training-mode forward passes zero the branch
/// contribution of each sample independently with probability `drop` and
/// scale the survivors by `1 / (1 - drop)` to keep the expectation. Eval
/// forward passes are deterministic.
pub struct Residual {
    /// The wrapped branch.
    pub inner: Branch,
    /// Per-sample probability of dropping the branch during training.
    drop: f32,
    /// Whether in training mode.
    training: AtomicBool,
}

impl Residual {
    /// Wraps a branch with no stochastic depth.
    pub fn new(inner: Branch) -> Self {
        Self::with_drop(inner, 0.0)
    }

    /// Wraps a branch with a stochastic depth rate in `[0, 1)`.
    pub fn with_drop(inner: Branch, drop: f32) -> Self {
        assert!(
            (0.0..1.0).contains(&drop),
            "Residual: drop rate {drop} outside [0, 1)"
        );
        Self {
            inner,
            drop,
            training: AtomicBool::new(true),
        }
    }

    /// Returns the stochastic depth rate.
    pub fn drop_rate(&self) -> f32 {
        self.drop
    }

    /// Folds the skip connection into the branch, where possible.
    ///
    /// The branch is first reduced to a single convolution (its own fusion
    /// rule), then the identity is added as a centered unit tap. The tap
    /// only reproduces `+ input` when each kernel row sees one input
    /// channel, so the conv-pair and depthwise-block arms insist on the
    /// depthwise layout; the plain-conv arm mirrors that check inverted.
    /// Branches with no fusion rule come back as `Unchanged`.
    pub fn fuse(self) -> FuseOutcome {
        match self.inner {
            Branch::ConvNorm(pair) => {
                let fused = pair.fuse();
                assert_eq!(
                    fused.groups(),
                    fused.in_channels(),
                    "residual conv+norm branch must be depthwise"
                );
                FuseOutcome::Fused(add_identity(&fused))
            }
            Branch::Conv(conv) => {
                assert_ne!(
                    conv.groups(),
                    conv.in_channels(),
                    "residual plain-conv branch must not be depthwise"
                );
                FuseOutcome::Fused(add_identity(&conv))
            }
            Branch::Depthwise(block) => {
                let fused = block.fuse();
                assert_eq!(
                    fused.groups(),
                    fused.in_channels(),
                    "residual depthwise block must stay depthwise after fusion"
                );
                FuseOutcome::Fused(add_identity(&fused))
            }
            Branch::Opaque(_) => FuseOutcome::Unchanged(self),
        }
    }
}

/// Adds the identity tap to a convolution's kernel.
fn add_identity(conv: &Conv2d) -> Conv2d {
    let weight = conv.weight.data();
    let shape = weight.shape().to_vec();
    let identity = identity_kernel(shape[0], shape[1], (shape[2], shape[3]));
    let summed = weight.add(&identity).unwrap();

    Conv2d::from_weights(
        summed,
        conv.bias.as_ref().map(Parameter::data),
        conv.stride(),
        conv.padding(),
        conv.dilation(),
        conv.groups(),
    )
}

impl Module for Residual {
    fn forward(&self, input: &Tensor) -> Tensor {
        let branch = self.inner.forward(input);

        if self.training.load(Ordering::Relaxed) && self.drop > 0.0 {
            let batch_size = input.shape()[0];
            let per_sample = branch.numel() / batch_size;
            let keep_scale = 1.0 / (1.0 - self.drop);
            let mut rng = rand::thread_rng();

            let mut masked = branch.to_vec();
            for b in 0..batch_size {
                let factor = if rng.gen::<f32>() >= self.drop {
                    keep_scale
                } else {
                    0.0
                };
                for value in &mut masked[b * per_sample..(b + 1) * per_sample] {
                    *value *= factor;
                }
            }

            let masked = Tensor::from_vec(masked, branch.shape()).unwrap();
            input.add(&masked).unwrap()
        } else {
            input.add(&branch).unwrap()
        }
    }

    fn parameters(&self) -> Vec<Parameter> {
        self.inner.parameters()
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        let mut params = HashMap::new();
        prefixed_parameters(&mut params, "inner", &self.inner);
        params
    }

    fn set_training(&mut self, training: bool) {
        self.training.store(training, Ordering::Relaxed);
        self.inner.set_training(training);
    }

    fn is_training(&self) -> bool {
        self.training.load(Ordering::Relaxed)
    }

    fn name(&self) -> &'static str {
        "Residual"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_branch_conv(channels: usize) -> Conv2d {
        let conv = Conv2d::with_options(
            channels,
            channels,
            (1, 1),
            (1, 1),
            (0, 0),
            (1, 1),
            1,
            true,
        );
        conv.weight
            .update_data(Tensor::zeros(&[channels, channels, 1, 1]));
        conv
    }

    #[test]
    fn test_forward_adds_branch() {
        // Zero branch: the wrapper is the identity
        let residual = Residual::new(Branch::Conv(zero_branch_conv(2)));
        let input = Tensor::randn(&[1, 2, 3, 3]);
        let output = residual.forward(&input);
        assert_eq!(output.to_vec(), input.to_vec());
    }

    #[test]
    fn test_drop_path_masks_whole_samples() {
        // Branch output is constant 1 everywhere (zero weight, unit bias),
        // so with drop 0.5 each sample's residual is exactly 0 or 2
        let conv = zero_branch_conv(2);
        conv.bias
            .as_ref()
            .unwrap()
            .update_data(Tensor::ones(&[2]));

        let residual = Residual::with_drop(Branch::Conv(conv), 0.5);
        assert!(residual.is_training());

        let input = Tensor::zeros(&[8, 2, 2, 2]);
        let output = residual.forward(&input);
        let out = output.to_vec();

        let per_sample = 2 * 2 * 2;
        for b in 0..8 {
            let sample = &out[b * per_sample..(b + 1) * per_sample];
            let first = sample[0];
            assert!(
                (first - 0.0).abs() < 1e-6 || (first - 2.0).abs() < 1e-6,
                "sample {b} has unexpected residual {first}"
            );
            for &v in sample {
                assert!((v - first).abs() < 1e-6, "mask varied within sample {b}");
            }
        }
    }

    #[test]
    fn test_drop_path_inactive_in_eval() {
        let conv = zero_branch_conv(1);
        conv.bias
            .as_ref()
            .unwrap()
            .update_data(Tensor::ones(&[1]));

        let mut residual = Residual::with_drop(Branch::Conv(conv), 0.9);
        residual.eval();

        let input = Tensor::zeros(&[4, 1, 1, 1]);
        let output = residual.forward(&input);
        assert_eq!(output.to_vec(), vec![1.0; 4]);
    }

    #[test]
    fn test_fuse_depthwise_zero_weights_yields_identity_kernel() {
        let pair = ConvNorm::with_options(3, 3, (3, 3), (1, 1), (1, 1), (1, 1), 3, 1.0);
        pair.conv.weight.update_data(Tensor::zeros(&[3, 1, 3, 3]));

        match Residual::new(Branch::ConvNorm(pair)).fuse() {
            FuseOutcome::Fused(conv) => {
                let expected = identity_kernel(3, 1, (3, 3));
                assert_eq!(conv.weight.data().to_vec(), expected.to_vec());
            }
            FuseOutcome::Unchanged(_) => panic!("depthwise conv+norm branch must fuse"),
        }
    }

    #[test]
    fn test_fuse_opaque_is_unchanged() {
        struct Gain;
        impl Module for Gain {
            fn forward(&self, input: &Tensor) -> Tensor {
                input.mul_scalar(2.0)
            }
        }

        let residual = Residual::new(Branch::Opaque(Box::new(Gain)));
        match residual.fuse() {
            FuseOutcome::Unchanged(wrapper) => {
                // Still a working residual: x + 2x = 3x
                let input = Tensor::ones(&[1, 1, 1, 1]);
                assert_eq!(wrapper.forward(&input).to_vec(), vec![3.0]);
            }
            FuseOutcome::Fused(_) => panic!("opaque branch must not fuse"),
        }
    }

    #[test]
    #[should_panic(expected = "must not be depthwise")]
    fn test_fuse_rejects_depthwise_plain_conv() {
        let conv = Conv2d::with_options(2, 2, (3, 3), (1, 1), (1, 1), (1, 1), 2, true);
        let _ = Residual::new(Branch::Conv(conv)).fuse();
    }

    #[test]
    #[should_panic(expected = "must be depthwise")]
    fn test_fuse_rejects_dense_conv_norm() {
        let pair = ConvNorm::with_options(2, 2, (3, 3), (1, 1), (1, 1), (1, 1), 1, 1.0);
        let _ = Residual::new(Branch::ConvNorm(pair)).fuse();
    }
}
