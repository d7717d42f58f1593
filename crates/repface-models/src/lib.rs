//! RepFace Models - Face Embedding Backbones
//!
//! Assembles the RepViT face-embedding backbone from the fusable layers in
//! `repface-fusion`: a strided patch-embedding stem, token/channel mixer
//! stages, a separable neck, and a global depthwise head that maps a
//! 112x112x3 crop to one embedding row. Fusable stages sit behind
//! [`RepStage`] slots so callers can re-parameterize them in place for
//! inference.
//!
//! # Example
//! ```rust
//! use repface_models::build;
//! use repface_nn::Module;
//! use repface_tensor::Tensor;
//!
//! let mut model = build("repvit_m0_9", 512).unwrap();
//! model.eval();
//!
//! let crops = Tensor::randn(&[1, 3, 112, 112]);
//! let embeddings = model.forward(&crops);
//! assert_eq!(embeddings.shape(), &[1, 512]);
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

pub mod backbone;
pub mod head;
pub mod stage;
pub mod zoo;

// =============================================================================
// Re-exports
// =============================================================================

pub use backbone::{make_divisible, FeedForward, MixerBlock, RepViT, TokenMixer};
pub use head::{ConvBlock, GdcHead};
pub use stage::RepStage;
pub use zoo::{build, repvit_m0_9, StageConfig, MODELS};

// =============================================================================
// Prelude
// =============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::backbone::{MixerBlock, RepViT, TokenMixer};
    pub use crate::head::{ConvBlock, GdcHead};
    pub use crate::stage::RepStage;
    pub use crate::zoo::{build, repvit_m0_9, StageConfig};
}
