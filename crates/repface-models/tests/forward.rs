//! End-to-end backbone tests: stage geometry, eval determinism, and the
//! parity of the re-parameterized inference path.

use repface_models::{build, make_divisible, RepViT, StageConfig, TokenMixer};
use repface_nn::{Module, GELU};
use repface_tensor::{Error, Tensor};

/// Narrow four-stage table with the same 112 -> 7 resolution walk as the
/// published variants.
fn tiny_table() -> Vec<StageConfig> {
    let row = |channels: usize, stride: usize| StageConfig {
        kernel: 3,
        expansion: 2.0,
        channels,
        use_se: false,
        use_hs: false,
        stride,
    };
    vec![row(8, 1), row(16, 2), row(32, 2), row(32, 2)]
}

/// Collapses every fusable stage of the backbone, bottom-up.
fn reparameterize(model: &mut RepViT) {
    model.stem.reparameterize();
    for block in &mut model.blocks {
        match &mut block.token_mixer {
            TokenMixer::Downsample {
                depthwise,
                pointwise,
                ..
            } => {
                depthwise.reparameterize();
                pointwise.reparameterize();
            }
            TokenMixer::Reparam { mixer, .. } => mixer.reparameterize(),
        }
    }
    model.neck.conv.reparameterize();
    model.head.depthwise.reparameterize();
}

fn assert_close(expected: &[f32], actual: &[f32], tolerance: f32) {
    assert_eq!(expected.len(), actual.len());
    for (e, a) in expected.iter().zip(actual) {
        assert!(
            (e - a).abs() < tolerance,
            "expected {e}, got {a} (tolerance {tolerance})"
        );
    }
}

#[test]
fn tiny_backbone_walks_the_resolution_ladder() {
    let mut model = RepViT::new(&tiny_table(), 64);
    model.eval();

    let act = GELU::new();
    let mut features = act.forward(&model.stem.forward(&Tensor::randn(&[1, 3, 112, 112])));
    assert_eq!(features.shape(), &[1, 8, 56, 56]);

    let expected = [
        [1, 8, 56, 56],
        [1, 16, 28, 28],
        [1, 32, 14, 14],
        [1, 32, 7, 7],
    ];
    for (block, shape) in model.blocks.iter().zip(&expected) {
        features = block.forward(&features);
        assert_eq!(features.shape(), shape);
    }

    features = model.neck.forward(&features);
    assert_eq!(features.shape(), &[1, 512, 7, 7]);

    let embedding = model.head.forward(&features);
    assert_eq!(embedding.shape(), &[1, 64]);
}

#[test]
fn eval_forward_is_deterministic() {
    let mut model = RepViT::new(&tiny_table(), 32);
    model.eval();

    let input = Tensor::randn(&[2, 3, 112, 112]);
    let first = model.forward(&input);
    let second = model.forward(&input);
    assert_eq!(first.to_vec(), second.to_vec());
    assert_eq!(first.shape(), &[2, 32]);
}

#[test]
fn reparameterized_tiny_backbone_matches_eval_output() {
    let mut model = RepViT::new(&tiny_table(), 32);
    model.eval();

    let input = Tensor::randn(&[1, 3, 112, 112]);
    let baseline = model.forward(&input);
    let params_before = model.num_parameters();

    reparameterize(&mut model);

    assert!(model.stem.is_fused());
    assert!(model.neck.conv.is_fused());
    assert!(model.head.depthwise.is_fused());
    for block in &model.blocks {
        match &block.token_mixer {
            TokenMixer::Downsample {
                depthwise,
                pointwise,
                ..
            } => {
                assert!(depthwise.is_fused());
                assert!(pointwise.is_fused());
            }
            TokenMixer::Reparam { mixer, .. } => assert!(mixer.is_fused()),
        }
    }
    assert!(model.num_parameters() < params_before);

    let fused = model.forward(&input);
    assert_close(&baseline.to_vec(), &fused.to_vec(), 1e-3);
}

#[test]
fn m0_9_maps_face_crops_to_embeddings() {
    let mut model = build("repvit_m0_9", 512).unwrap();
    model.eval();

    let input = Tensor::randn(&[1, 3, 112, 112]);
    let baseline = model.forward(&input);
    assert_eq!(baseline.shape(), &[1, 512]);

    reparameterize(&mut model);
    let fused = model.forward(&input);
    assert_eq!(fused.shape(), &[1, 512]);
    assert_close(&baseline.to_vec(), &fused.to_vec(), 1e-3);
}

#[test]
fn parameter_keys_follow_the_module_tree() {
    let model = RepViT::new(&tiny_table(), 32);
    let named = model.named_parameters();

    assert!(named.contains_key("stem.conv.weight"));
    assert!(named.contains_key("stem.norm.bias"));
    // stride-1 stage holds the multi-branch depthwise mixer
    assert!(named.contains_key("blocks.0.token_mixer.mixer.conv.conv.weight"));
    assert!(named.contains_key("blocks.0.token_mixer.mixer.conv1.bias"));
    // stride-2 stage splits into depthwise + pointwise
    assert!(named.contains_key("blocks.1.token_mixer.depthwise.conv.weight"));
    assert!(named.contains_key("blocks.1.token_mixer.pointwise.norm.weight"));
    // channel mixer sits behind the residual wrapper
    assert!(named.contains_key("blocks.0.channel_mixer.inner.expand.conv.weight"));
    assert!(named.contains_key("blocks.0.channel_mixer.inner.project.norm.weight"));
    assert!(named.contains_key("neck.conv.conv.weight"));
    assert!(named.contains_key("neck.act.weight"));
    assert!(named.contains_key("head.projection.weight"));

    assert_eq!(named.len(), model.parameters().len());
}

#[test]
fn expansion_ratio_flows_into_the_channel_mixer() {
    let cfg = StageConfig {
        kernel: 3,
        expansion: 3.0,
        channels: 8,
        use_se: false,
        use_hs: false,
        stride: 1,
    };
    let model = RepViT::new(&[cfg], 16);
    let named = model.named_parameters();

    // hidden = make_divisible(8 * 3.0, 8) = 24
    let expand = named
        .get("blocks.0.channel_mixer.inner.expand.conv.weight")
        .unwrap();
    assert_eq!(expand.shape(), vec![24, 8, 1, 1]);
}

#[test]
fn make_divisible_matches_the_published_tables() {
    assert_eq!(make_divisible(100.0, 8, None), 104);
    assert_eq!(make_divisible(50.0, 8, None), 48);
    assert_eq!(make_divisible(10.0, 8, None), 16);
    assert_eq!(make_divisible(20.0, 16, None), 32);
    assert_eq!(make_divisible(3.0, 8, None), 8);
    // every m0_9 width is already a multiple of 8
    for width in [48.0, 96.0, 192.0] {
        assert_eq!(make_divisible(width, 8, None), width as usize);
    }
}

#[test]
fn unknown_model_names_are_rejected() {
    match build("mobilenet_v3", 512) {
        Err(Error::UnknownModel(name)) => assert_eq!(name, "mobilenet_v3"),
        Err(other) => panic!("expected UnknownModel, got {other:?}"),
        Ok(_) => panic!("unknown name must not build"),
    }
}
