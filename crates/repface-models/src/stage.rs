//! Re-parameterizable Stage Slot
//!
//! Fusable stages sit in the model tree behind this enum so callers can
//! collapse them one at a time: the training-time form is swapped in place
//! for the single convolution its fuse operation returns. Nothing here
//! walks the tree; each slot is substituted individually.
//!
//! @version 0.1.0
//! @author RepFace Development Team

use std::collections::HashMap;

use repface_fusion::{ConvNorm, RepDepthwise};
use repface_nn::{Conv2d, Module, Parameter};
use repface_tensor::Tensor;

// =============================================================================
// RepStage
// =============================================================================

/// A convolution stage in one of its two lives: the multi-branch
/// training-time form, or the single convolution it folds into.
pub enum RepStage {
    /// Fusable convolution + batch norm pair.
    ConvNorm(ConvNorm),
    /// Multi-branch depthwise block.
    Depthwise(RepDepthwise),
    /// Already collapsed to a single convolution.
    Fused(Conv2d),
}

impl RepStage {
    /// Collapses the stage into its single-convolution form in place.
    ///
    /// A stage that is already a plain convolution no longer matches any
    /// fusable form and is left untouched, so repeated calls are harmless.
    pub fn reparameterize(&mut self) {
        let fused = match self {
            RepStage::ConvNorm(pair) => pair.fuse(),
            RepStage::Depthwise(block) => block.fuse(),
            RepStage::Fused(_) => return,
        };
        *self = RepStage::Fused(fused);
    }

    /// Whether the stage has already been collapsed.
    #[must_use]
    pub fn is_fused(&self) -> bool {
        matches!(self, RepStage::Fused(_))
    }

    fn as_module(&self) -> &dyn Module {
        match self {
            RepStage::ConvNorm(pair) => pair,
            RepStage::Depthwise(block) => block,
            RepStage::Fused(conv) => conv,
        }
    }
}

impl Module for RepStage {
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
            RepStage::ConvNorm(pair) => pair.set_training(training),
            RepStage::Depthwise(block) => block.set_training(training),
            RepStage::Fused(_) => {}
        }
    }

    fn is_training(&self) -> bool {
        self.as_module().is_training()
    }

    fn name(&self) -> &'static str {
        "RepStage"
    }
}

// =============================================================================
// Tests
// =============================================================================
