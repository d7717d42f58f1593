//! RepFace Tensor - Dense f32 Arrays for CPU Inference
//!
//! This crate provides the core `Tensor` type that the RepFace layers and
//! fusion utilities are built on. Tensors are contiguous row-major `f32`
//! arrays with strict shape checking; there is no autograd, no broadcasting,
//! and no device abstraction, because the inference stack needs none of it.
//!
//! # Key Features
//! - N-dimensional tensor with small-vector shape storage
//! - Strict same-shape elementwise arithmetic
//! - 2D matrix multiplication and transposition
//! - Factory functions for constant and random initialization
//!
//! # Example
//! ```rust
//! use repface_tensor::{ones, zeros, Tensor};
//!
//! let a = zeros(&[2, 3]);
//! let b = ones(&[2, 3]);
//!
//! let c = a.add(&b).unwrap();
//! let d = c.mul_scalar(2.0);
//!
//! assert_eq!(d.sum(), 12.0);
//! ```
//!
//! @version 0.1.0
//! @author `RepFace` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// ML/tensor-specific allowances
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::float_cmp)]

// =============================================================================
// Modules
// =============================================================================

pub mod creation;
pub mod error;
pub mod shape;
pub mod tensor;

// =============================================================================
// Re-exports
// =============================================================================

pub use creation::{full, ones, rand, randn, zeros};
pub use error::{Error, Result};
pub use shape::{Shape, Strides};
pub use tensor::Tensor;

// =============================================================================
// Prelude
// =============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::shape::{Shape, Strides};
    pub use crate::tensor::Tensor;
    pub use crate::{full, ones, rand, randn, zeros};
}
