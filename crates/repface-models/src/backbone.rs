//! RepViT Backbone - Re-parameterizable Token/Channel Mixer Stages
//!
//! Mobile-friendly convolutional backbone built from RepViT mixer blocks:
//! depthwise token mixing (multi-branch and re-parameterizable at stride 1),
//! optional squeeze-excite gates, and residual pointwise channel mixing.
//! A strided convolution patchifies the input; a separable neck and a
//! global depthwise head turn the final map into a face embedding.
//!
//! Reference: "RepViT: Revisiting Mobile CNN From ViT Perspective"
//! (Wang et al., 2023) <https://arxiv.org/abs/2307.09283>
//!
//! @version 0.1.0
//! @author RepFace Development Team

use std::collections::HashMap;

use repface_fusion::{Branch, ConvNorm, RepDepthwise, Residual};
use repface_nn::{prefixed_parameters, Module, Parameter, SqueezeExcite, GELU};
use repface_tensor::Tensor;

use crate::head::{ConvBlock, GdcHead};
use crate::stage::RepStage;
use crate::zoo::StageConfig;

/// Channel width consumed by the embedding head.
const HEAD_WIDTH: usize = 512;

// =============================================================================
// Width Rounding
// =============================================================================

/// Rounds a requested channel count to the nearest multiple of `divisor`,
/// never shrinking the result below 90% of the request.
///
/// `min_value` defaults to `divisor`. This is the channel rounding used
/// throughout the MobileNet family of architectures.
#[must_use]
pub fn make_divisible(v: f64, divisor: usize, min_value: Option<usize>) -> usize {
    let min_value = min_value.unwrap_or(divisor);
    let rounded = ((v + divisor as f64 / 2.0) as usize / divisor) * divisor;
    let new_v = rounded.max(min_value);
    // Rounding down must not lose more than 10% of the requested width.
    if (new_v as f64) < 0.9 * v {
        new_v + divisor
    } else {
        new_v
    }
}

// =============================================================================
// FeedForward
// =============================================================================

/// Pointwise expand / contract channel mixer.
///
/// The contracting stage starts with a zero norm scale, so a freshly built
/// mixer contributes nothing and its enclosing residual passes the input
/// through unchanged.
pub struct FeedForward {
    /// Expanding 1x1 stage.
    pub expand: ConvNorm,
    act: GELU,
    /// Contracting 1x1 stage, norm scale initialized to zero.
    pub project: ConvNorm,
}

impl FeedForward {
    /// Builds the mixer. `use_hs` selects the nonlinearity family; both
    /// settings currently resolve to GELU.
    #[must_use]
    pub fn new(in_channels: usize, hidden: usize, out_channels: usize, use_hs: bool) -> Self {
        #[allow(clippy::if_same_then_else)] // hard-swish arm not wired up yet
        let act = if use_hs { GELU::new() } else { GELU::new() };
        Self {
            expand: ConvNorm::with_options(
                in_channels,
                hidden,
                (1, 1),
                (1, 1),
                (0, 0),
                (1, 1),
                1,
                1.0,
            ),
            act,
            project: ConvNorm::with_options(
                hidden,
                out_channels,
                (1, 1),
                (1, 1),
                (0, 0),
                (1, 1),
                1,
                0.0,
            ),
        }
    }
}

impl Module for FeedForward {
    fn forward(&self, input: &Tensor) -> Tensor {
        let expanded = self.act.forward(&self.expand.forward(input));
        self.project.forward(&expanded)
    }

    fn parameters(&self) -> Vec<Parameter> {
        let mut params = self.expand.parameters();
        params.extend(self.project.parameters());
        params
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        let mut params = HashMap::new();
        prefixed_parameters(&mut params, "expand", &self.expand);
        prefixed_parameters(&mut params, "project", &self.project);
        params
    }

    fn set_training(&mut self, training: bool) {
        self.expand.set_training(training);
        self.project.set_training(training);
    }

    fn is_training(&self) -> bool {
        self.expand.is_training()
    }

    fn name(&self) -> &'static str {
        "FeedForward"
    }
}

// =============================================================================
// TokenMixer
// =============================================================================

/// Spatial mixing path of a [`MixerBlock`].
pub enum TokenMixer {
    /// Stride-2 form: depthwise downsample, optional SE gate, and a
    /// pointwise projection to the new width.
    Downsample {
        /// Grouped k x k stride-2 stage.
        depthwise: RepStage,
        /// Optional squeeze-excite gate between the stages.
        se: Option<SqueezeExcite>,
        /// 1x1 projection to the output width.
        pointwise: RepStage,
    },
    /// Stride-1 form: multi-branch depthwise mixer with an optional SE
    /// gate; width and resolution pass through unchanged.
    Reparam {
        /// Re-parameterizable depthwise stage.
        mixer: RepStage,
        /// Optional squeeze-excite gate.
        se: Option<SqueezeExcite>,
    },
}

impl Module for TokenMixer {
    fn forward(&self, input: &Tensor) -> Tensor {
        match self {
            TokenMixer::Downsample {
                depthwise,
                se,
                pointwise,
            } => {
                let mut out = depthwise.forward(input);
                if let Some(gate) = se {
                    out = gate.forward(&out);
                }
                pointwise.forward(&out)
            }
            TokenMixer::Reparam { mixer, se } => {
                let mut out = mixer.forward(input);
                if let Some(gate) = se {
                    out = gate.forward(&out);
                }
                out
            }
        }
    }

    fn parameters(&self) -> Vec<Parameter> {
        match self {
            TokenMixer::Downsample {
                depthwise,
                se,
                pointwise,
            } => {
                let mut params = depthwise.parameters();
                if let Some(gate) = se {
                    params.extend(gate.parameters());
                }
                params.extend(pointwise.parameters());
                params
            }
            TokenMixer::Reparam { mixer, se } => {
                let mut params = mixer.parameters();
                if let Some(gate) = se {
                    params.extend(gate.parameters());
                }
                params
            }
        }
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        let mut params = HashMap::new();
        match self {
            TokenMixer::Downsample {
                depthwise,
                se,
                pointwise,
            } => {
                prefixed_parameters(&mut params, "depthwise", depthwise);
                if let Some(gate) = se {
                    prefixed_parameters(&mut params, "se", gate);
                }
                prefixed_parameters(&mut params, "pointwise", pointwise);
            }
            TokenMixer::Reparam { mixer, se } => {
                prefixed_parameters(&mut params, "mixer", mixer);
                if let Some(gate) = se {
                    prefixed_parameters(&mut params, "se", gate);
                }
            }
        }
        params
    }

    fn set_training(&mut self, training: bool) {
        match self {
            TokenMixer::Downsample {
                depthwise,
                pointwise,
                ..
            } => {
                depthwise.set_training(training);
                pointwise.set_training(training);
            }
            TokenMixer::Reparam { mixer, .. } => mixer.set_training(training),
        }
    }

    fn is_training(&self) -> bool {
        match self {
            TokenMixer::Downsample { depthwise, .. } => depthwise.is_training(),
            TokenMixer::Reparam { mixer, .. } => mixer.is_training(),
        }
    }

    fn name(&self) -> &'static str {
        "TokenMixer"
    }
}

// =============================================================================
// MixerBlock
// =============================================================================

/// One RepViT stage: token mixing across space, then residual channel
/// mixing across features.
pub struct MixerBlock {
    /// Spatial mixing path.
    pub token_mixer: TokenMixer,
    /// Residual-wrapped pointwise feed-forward.
    pub channel_mixer: Residual,
    in_channels: usize,
    out_channels: usize,
    stride: usize,
}

impl MixerBlock {
    /// Builds a block from one configuration row.
    ///
    /// Stride-1 blocks mix channels through the configured `hidden` width;
    /// the published tables derive it as twice the input width, but the
    /// ratio is free. Stride-2 blocks mix at twice the downsampled width
    /// and do not read `hidden`.
    ///
    /// # Panics
    /// If `stride` is not 1 or 2, or if a stride-1 block changes width.
    #[must_use]
    pub fn new(
        in_channels: usize,
        hidden: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        use_se: bool,
        use_hs: bool,
    ) -> Self {
        assert!(
            stride == 1 || stride == 2,
            "MixerBlock stride must be 1 or 2, got {stride}"
        );

        let token_mixer = if stride == 2 {
            let pad = (kernel_size - 1) / 2;
            TokenMixer::Downsample {
                depthwise: RepStage::ConvNorm(ConvNorm::with_options(
                    in_channels,
                    in_channels,
                    (kernel_size, kernel_size),
                    (2, 2),
                    (pad, pad),
                    (1, 1),
                    in_channels,
                    1.0,
                )),
                se: use_se.then(|| SqueezeExcite::new(in_channels, 0.25)),
                pointwise: RepStage::ConvNorm(ConvNorm::new(in_channels, out_channels)),
            }
        } else {
            assert_eq!(
                in_channels, out_channels,
                "stride-1 MixerBlock must preserve width"
            );
            TokenMixer::Reparam {
                mixer: RepStage::Depthwise(RepDepthwise::new(in_channels)),
                se: use_se.then(|| SqueezeExcite::new(in_channels, 0.25)),
            }
        };

        // Stride-2 blocks mix channels at the downsampled width.
        let mixer_width = if stride == 2 { out_channels } else { in_channels };
        let mixer_hidden = if stride == 2 { 2 * out_channels } else { hidden };
        let channel_mixer = Residual::new(Branch::Opaque(Box::new(FeedForward::new(
            mixer_width,
            mixer_hidden,
            mixer_width,
            use_hs,
        ))));

        Self {
            token_mixer,
            channel_mixer,
            in_channels,
            out_channels,
            stride,
        }
    }

    /// Input width of the block.
    #[must_use]
    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Output width of the block.
    #[must_use]
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Spatial stride of the block.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }
}

impl Module for MixerBlock {
    fn forward(&self, input: &Tensor) -> Tensor {
        self.channel_mixer.forward(&self.token_mixer.forward(input))
    }

    fn parameters(&self) -> Vec<Parameter> {
        let mut params = self.token_mixer.parameters();
        params.extend(self.channel_mixer.parameters());
        params
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        let mut params = HashMap::new();
        prefixed_parameters(&mut params, "token_mixer", &self.token_mixer);
        prefixed_parameters(&mut params, "channel_mixer", &self.channel_mixer);
        params
    }

    fn set_training(&mut self, training: bool) {
        self.token_mixer.set_training(training);
        self.channel_mixer.set_training(training);
    }

    fn is_training(&self) -> bool {
        self.channel_mixer.is_training()
    }

    fn name(&self) -> &'static str {
        "MixerBlock"
    }
}

// =============================================================================
// RepViT
// =============================================================================

/// RepViT face-embedding backbone.
///
/// 112x112x3 crops pass through a strided patch-embedding stem, the
/// configured mixer stages, a separable neck, and a global depthwise head
/// producing one embedding row per input image.
pub struct RepViT {
    /// Patch-embedding convolution; GELU follows in the forward pass.
    pub stem: RepStage,
    stem_act: GELU,
    /// Mixer stages, one per configuration row.
    pub blocks: Vec<MixerBlock>,
    /// 1x1 separable projection to the head width.
    pub neck: ConvBlock,
    /// Global depthwise embedding head.
    pub head: GdcHead,
    embedding_dim: usize,
}

impl RepViT {
    /// Assembles a backbone from stage configuration rows.
    ///
    /// Output widths round to multiples of 8; the first row's raw width
    /// doubles as the stem width, as in the published tables.
    ///
    /// # Panics
    /// If `cfgs` is empty or a row violates the block constraints.
    #[must_use]
    pub fn new(cfgs: &[StageConfig], embedding_dim: usize) -> Self {
        assert!(!cfgs.is_empty(), "RepViT needs at least one stage row");

        let stem_width = cfgs[0].channels;
        let stem = RepStage::ConvNorm(ConvNorm::with_options(
            3,
            stem_width,
            (2, 2),
            (2, 2),
            (0, 0),
            (1, 1),
            1,
            1.0,
        ));

        let mut blocks = Vec::with_capacity(cfgs.len());
        let mut width = stem_width;
        for cfg in cfgs {
            let out = make_divisible(cfg.channels as f64, 8, None);
            let hidden = make_divisible(width as f64 * cfg.expansion, 8, None);
            blocks.push(MixerBlock::new(
                width, hidden, out, cfg.kernel, cfg.stride, cfg.use_se, cfg.use_hs,
            ));
            width = out;
        }

        Self {
            stem,
            stem_act: GELU::new(),
            blocks,
            neck: ConvBlock::new(width, HEAD_WIDTH),
            head: GdcHead::new(HEAD_WIDTH, embedding_dim),
            embedding_dim,
        }
    }

    /// Width of the embedding produced by the forward pass.
    #[must_use]
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }
}

impl Module for RepViT {
    fn forward(&self, input: &Tensor) -> Tensor {
        let mut features = self.stem_act.forward(&self.stem.forward(input));
        for block in &self.blocks {
            features = block.forward(&features);
        }
        let features = self.neck.forward(&features);
        self.head.forward(&features)
    }

    fn parameters(&self) -> Vec<Parameter> {
        let mut params = self.stem.parameters();
        for block in &self.blocks {
            params.extend(block.parameters());
        }
        params.extend(self.neck.parameters());
        params.extend(self.head.parameters());
        params
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        let mut params = HashMap::new();
        prefixed_parameters(&mut params, "stem", &self.stem);
        for (index, block) in self.blocks.iter().enumerate() {
            prefixed_parameters(&mut params, &format!("blocks.{index}"), block);
        }
        prefixed_parameters(&mut params, "neck", &self.neck);
        prefixed_parameters(&mut params, "head", &self.head);
        params
    }

    fn set_training(&mut self, training: bool) {
        self.stem.set_training(training);
        for block in &mut self.blocks {
            block.set_training(training);
        }
        self.neck.set_training(training);
        self.head.set_training(training);
    }

    fn is_training(&self) -> bool {
        self.head.is_training()
    }

    fn name(&self) -> &'static str {
        "RepViT"
    }
}

// =============================================================================
// Tests
// =============================================================================
