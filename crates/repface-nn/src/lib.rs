//! RepFace NN - Neural Network Layers for CPU Inference
//!
//! This crate provides the `Module` trait and the layer set the RepFace
//! backbone is assembled from: grouped/dilated 2D convolution, batch
//! normalization with tracked running statistics, linear projections,
//! squeeze-excite attention, and the activation functions between them.
//!
//! Modules operate directly on `repface_tensor::Tensor` values; there is no
//! gradient tape. Training mode only changes normalization statistics and
//! stochastic behavior of wrappers built on top of these layers.
//!
//! # Example
//! ```rust
//! use repface_nn::layers::Conv2d;
//! use repface_nn::Module;
//! use repface_tensor::Tensor;
//!
//! let conv = Conv2d::with_options(3, 8, (3, 3), (2, 2), (1, 1), (1, 1), 1, false);
//! let input = Tensor::randn(&[1, 3, 32, 32]);
//! let output = conv.forward(&input);
//! assert_eq!(output.shape(), &[1, 8, 16, 16]);
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
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::float_cmp)]

// =============================================================================
// Modules
// =============================================================================

pub mod activation;
pub mod init;
pub mod layers;
pub mod module;
pub mod parameter;

// =============================================================================
// Re-exports
// =============================================================================

pub use activation::{Identity, PReLU, ReLU, Sigmoid, GELU};
pub use layers::{BatchNorm1d, BatchNorm2d, Conv2d, Linear, SqueezeExcite};
pub use module::{prefixed_parameters, Module};
pub use parameter::Parameter;

// =============================================================================
// Prelude
// =============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::activation::{Identity, PReLU, ReLU, Sigmoid, GELU};
    pub use crate::layers::{BatchNorm1d, BatchNorm2d, Conv2d, Linear, SqueezeExcite};
    pub use crate::module::Module;
    pub use crate::parameter::Parameter;
}
