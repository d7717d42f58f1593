//! Model Zoo - Named Backbone Factories
//!
//! Stage tables for the RepViT variants used for face embeddings, plus a
//! name-keyed factory for building them.
//!
//! @version 0.1.0
//! @author RepFace Development Team

use repface_tensor::{Error, Result};

use crate::backbone::RepViT;

// =============================================================================
// StageConfig
// =============================================================================

/// One row of a backbone stage table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageConfig {
    /// Token-mixer kernel size.
    pub kernel: usize,
    /// Channel-mixer expansion ratio over the input width.
    pub expansion: f64,
    /// Requested output width; rounded to a multiple of 8 at build time.
    pub channels: usize,
    /// Gate the token mixer with squeeze-excite.
    pub use_se: bool,
    /// Nonlinearity selector carried per row (see
    /// [`crate::backbone::FeedForward`]).
    pub use_hs: bool,
    /// Spatial stride, 1 or 2.
    pub stride: usize,
}

fn stage(
    kernel: usize,
    expansion: f64,
    channels: usize,
    use_se: bool,
    use_hs: bool,
    stride: usize,
) -> StageConfig {
    StageConfig {
        kernel,
        expansion,
        channels,
        use_se,
        use_hs,
        stride,
    }
}

// =============================================================================
// Factories
// =============================================================================

/// Model names accepted by [`build`].
pub const MODELS: &[&str] = &["repvit_m0_9"];

/// RepViT-M0.9 tuned for 112x112 face crops.
///
/// Ten stages across four resolutions (56 -> 28 -> 14 -> 7), widths
/// 48/96/192, no squeeze-excite gates.
#[must_use]
pub fn repvit_m0_9(embedding_dim: usize) -> RepViT {
    // kernel, expansion, channels, SE, HS, stride
    let cfgs = [
        stage(3, 2.0, 48, false, false, 1),
        stage(3, 2.0, 48, false, false, 1),
        stage(3, 2.0, 96, false, false, 2),
        stage(3, 2.0, 192, false, false, 2),
        stage(3, 2.0, 192, false, false, 1),
        stage(3, 2.0, 192, false, false, 1),
        stage(3, 2.0, 192, false, false, 1),
        stage(3, 2.0, 192, false, false, 1),
        stage(3, 2.0, 192, false, false, 1),
        stage(3, 2.0, 192, false, false, 2),
    ];
    RepViT::new(&cfgs, embedding_dim)
}

/// Builds a registered backbone by name.
///
/// # Errors
/// Returns [`Error::UnknownModel`] for names not listed in [`MODELS`].
pub fn build(name: &str, embedding_dim: usize) -> Result<RepViT> {
    match name {
        "repvit_m0_9" => Ok(repvit_m0_9(embedding_dim)),
        _ => Err(Error::UnknownModel(name.to_string())),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_m0_9_stage_table() {
        let model = repvit_m0_9(512);
        assert_eq!(model.blocks.len(), 10);
        assert_eq!(model.embedding_dim(), 512);

        let strides: Vec<usize> = model.blocks.iter().map(|b| b.stride()).collect();
        assert_eq!(strides, vec![1, 1, 2, 2, 1, 1, 1, 1, 1, 2]);

        assert_eq!(model.blocks[0].in_channels(), 48);
        assert_eq!(model.blocks[2].out_channels(), 96);
        assert_eq!(model.blocks[3].out_channels(), 192);
        assert_eq!(model.blocks[9].out_channels(), 192);
    }

    #[test]
    fn test_build_rejects_unknown_names() {
        let err = match build("repvit_m9_0", 512) {
            Ok(_) => panic!("unknown name must not build"),
            Err(err) => err,
        };
        assert_eq!(err, Error::UnknownModel("repvit_m9_0".to_string()));
    }

    #[test]
    fn test_every_registered_model_builds() {
        for name in MODELS {
            let model = build(name, 128).unwrap();
            assert_eq!(model.embedding_dim(), 128);
        }
    }
}
