//! Backbone summary and re-parameterization demo.
//!
//! Builds `repvit_m0_9`, walks a face crop through each stage printing
//! output shapes and parameter counts, then collapses every fusable stage
//! in place and reports forward latency and output drift.

use std::time::Instant;

use repface_models::{build, RepViT, TokenMixer};
use repface_nn::{Module, GELU};
use repface_tensor::Tensor;

fn main() {
    let mut model = build("repvit_m0_9", 512).expect("registered model");
    model.eval();

    let input = Tensor::randn(&[1, 3, 112, 112]);

    println!("repvit_m0_9, embedding 512");
    println!("{:<12} {:>20} {:>12}", "stage", "output", "params");
    summarize(&model, &input);
    println!("total parameters: {}", model.num_parameters());

    let baseline = model.forward(&input);
    let unfused_ms = time_forward(&model, &input);

    reparameterize(&mut model);

    let fused = model.forward(&input);
    let fused_ms = time_forward(&model, &input);

    println!("forward: {unfused_ms:.1} ms unfused, {fused_ms:.1} ms fused");
    println!("fused parameters: {}", model.num_parameters());
    println!("max output drift: {:.2e}", max_abs_diff(&baseline, &fused));
}

fn summarize(model: &RepViT, input: &Tensor) {
    let act = GELU::new();
    let mut features = act.forward(&model.stem.forward(input));
    row("stem", &features, model.stem.num_parameters());

    for (index, block) in model.blocks.iter().enumerate() {
        features = block.forward(&features);
        row(&format!("blocks.{index}"), &features, block.num_parameters());
    }

    features = model.neck.forward(&features);
    row("neck", &features, model.neck.num_parameters());

    let embedding = model.head.forward(&features);
    row("head", &embedding, model.head.num_parameters());
}

fn row(name: &str, output: &Tensor, params: usize) {
    println!(
        "{:<12} {:>20} {:>12}",
        name,
        format!("{:?}", output.shape()),
        params
    );
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

fn time_forward(model: &RepViT, input: &Tensor) -> f64 {
    let runs = 5u32;
    let start = Instant::now();
    for _ in 0..runs {
        let _ = model.forward(input);
    }
    start.elapsed().as_secs_f64() * 1000.0 / f64::from(runs)
}

fn max_abs_diff(a: &Tensor, b: &Tensor) -> f32 {
    a.to_vec()
        .iter()
        .zip(b.to_vec())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}
