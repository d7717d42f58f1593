//! RepFace Fusion - Structural Re-parameterization
//!
//! Offline transforms that fold frozen batch-norm statistics and parallel
//! residual branches into single convolution or linear operators, trading
//! the multi-branch training topology for a faster inference one:
//!
//! - [`ConvNorm`] - conv + norm pair, fused into one biased convolution
//! - [`NormLinear`] - norm + linear pair, fused into one biased projection
//! - [`Residual`] - skip connection folded into the branch kernel
//! - [`RepDepthwise`] - 3x3 + 1x1 + identity collapsed into one 3x3
//!
//! Every `fuse` reads running statistics and builds a fresh operator, so
//! the result reproduces the source's eval-mode forward pass; callers
//! substitute it into their module tree. Precondition violations (wrong
//! grouping, uncenterable kernels) are panics: they signal construction
//! bugs, not recoverable conditions.
//!
//! # Example
//! ```rust
//! use repface_fusion::ConvNorm;
//! use repface_nn::Module;
//! use repface_tensor::Tensor;
//!
//! let mut pair = ConvNorm::with_options(3, 8, (3, 3), (1, 1), (1, 1), (1, 1), 1, 1.0);
//! pair.eval();
//!
//! let input = Tensor::randn(&[1, 3, 16, 16]);
//! let fused = pair.fuse();
//! assert_eq!(fused.forward(&input).shape(), pair.forward(&input).shape());
//! ```
//!
//! @version 0.1.0
//! @author `RepFace` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// ML-specific allowances
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::float_cmp)]

// =============================================================================
// Modules
// =============================================================================

pub mod conv_norm;
pub mod fold;
pub mod norm_linear;
pub mod rep_depthwise;
pub mod residual;

// =============================================================================
// Re-exports
// =============================================================================

pub use conv_norm::ConvNorm;
pub use fold::{bn_scale, fold_conv_bn, identity_kernel, pad_kernel};
pub use norm_linear::NormLinear;
pub use rep_depthwise::RepDepthwise;
pub use residual::{Branch, FuseOutcome, Residual};

// =============================================================================
// Prelude
// =============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::conv_norm::ConvNorm;
    pub use crate::norm_linear::NormLinear;
    pub use crate::rep_depthwise::RepDepthwise;
    pub use crate::residual::{Branch, FuseOutcome, Residual};
}
