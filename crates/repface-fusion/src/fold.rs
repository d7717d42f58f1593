//! Folding Algebra - Shared Re-parameterization Arithmetic
//!
//! The closed-form transforms every fusion in this crate is built from:
//! scaling kernels by frozen batch-norm statistics, zero-padding small
//! kernels onto larger spatial grids, and materializing the identity
//! branch as a centered unit tap.
//!
//! @version 0.1.0
//! @author RepFace Development Team

use repface_nn::layers::BatchNorm2d;
use repface_tensor::Tensor;

/// Per-channel batch-norm scale: `gamma / sqrt(running_var + eps)`.
pub fn bn_scale(gamma: &[f32], running_var: &[f32], eps: f32) -> Vec<f32> {
    assert_eq!(gamma.len(), running_var.len(), "bn_scale length mismatch");
    gamma
        .iter()
        .zip(running_var.iter())
        .map(|(&g, &v)| g / (v + eps).sqrt())
        .collect()
}

/// Folds a batch norm into the convolution it follows.
///
/// With `scale = gamma / sqrt(running_var + eps)`, the fused kernel is the
/// input kernel scaled per output channel and the fused bias is
/// `beta + (bias - running_mean) * scale`, where a missing conv bias
/// contributes zero. Running statistics are read as-is, so the result
/// matches the eval-mode forward pass of the pair.
pub fn fold_conv_bn(weight: &Tensor, bias: Option<&Tensor>, norm: &BatchNorm2d) -> (Tensor, Tensor) {
    let shape = weight.shape().to_vec();
    assert_eq!(shape.len(), 4, "fold_conv_bn expects a (out, in/g, kh, kw) kernel");
    let out_channels = shape[0];
    assert_eq!(
        norm.num_features(),
        out_channels,
        "fold_conv_bn: norm features {} do not match {} output channels",
        norm.num_features(),
        out_channels
    );

    let gamma = norm.weight.data().to_vec();
    let beta = norm.bias.data().to_vec();
    let mean = norm.running_mean().to_vec();
    let var = norm.running_var().to_vec();
    let scale = bn_scale(&gamma, &var, norm.eps());

    let per_channel = shape[1] * shape[2] * shape[3];
    let src = weight.as_slice();
    let mut fused = vec![0.0f32; src.len()];
    for oc in 0..out_channels {
        let start = oc * per_channel;
        for i in 0..per_channel {
            fused[start + i] = src[start + i] * scale[oc];
        }
    }

    let bias_vec = bias.map(Tensor::to_vec);
    let fused_bias: Vec<f32> = (0..out_channels)
        .map(|oc| {
            let b = bias_vec.as_ref().map_or(0.0, |v| v[oc]);
            beta[oc] + (b - mean[oc]) * scale[oc]
        })
        .collect();

    (
        Tensor::from_vec(fused, &shape).unwrap(),
        Tensor::from_vec(fused_bias, &[out_channels]).unwrap(),
    )
}

/// Zero-pads a kernel onto a larger spatial grid, source centered.
///
/// The margins on each axis must be even so the source lands exactly at
/// the center; callers only ever grow odd kernels to odd kernels (1x1 to
/// 3x3 in practice).
pub fn pad_kernel(kernel: &Tensor, target: (usize, usize)) -> Tensor {
    let shape = kernel.shape().to_vec();
    assert_eq!(shape.len(), 4, "pad_kernel expects a (out, in/g, kh, kw) kernel");
    let (kh, kw) = (shape[2], shape[3]);
    let (th, tw) = target;
    assert!(
        th >= kh && tw >= kw,
        "pad_kernel: target {th}x{tw} smaller than source {kh}x{kw}"
    );
    assert!(
        (th - kh) % 2 == 0 && (tw - kw) % 2 == 0,
        "pad_kernel: source {kh}x{kw} cannot be centered in {th}x{tw}"
    );

    let (off_h, off_w) = ((th - kh) / 2, (tw - kw) / 2);
    let src = kernel.as_slice();
    let mut out = vec![0.0f32; shape[0] * shape[1] * th * tw];
    for o in 0..shape[0] {
        for i in 0..shape[1] {
            for r in 0..kh {
                for c in 0..kw {
                    let src_idx = ((o * shape[1] + i) * kh + r) * kw + c;
                    let dst_idx = ((o * shape[1] + i) * th + (r + off_h)) * tw + (c + off_w);
                    out[dst_idx] = src[src_idx];
                }
            }
        }
    }
    Tensor::from_vec(out, &[shape[0], shape[1], th, tw]).unwrap()
}

/// The identity branch as a kernel: a unit tap at the spatial center.
///
/// Built as ones of shape `[out_channels, in_per_group, 1, 1]` zero-padded
/// out to the target extent. This reproduces `+ input` exactly when the
/// convolution is depthwise (one input channel per kernel row).
pub fn identity_kernel(out_channels: usize, in_per_group: usize, target: (usize, usize)) -> Tensor {
    pad_kernel(&Tensor::ones(&[out_channels, in_per_group, 1, 1]), target)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bn_scale() {
        // 2 / sqrt(4 + 0) = 1, 3 / sqrt(9 + 0) = 1
        let scale = bn_scale(&[2.0, 3.0], &[4.0, 9.0], 0.0);
        assert!((scale[0] - 1.0).abs() < 1e-6);
        assert!((scale[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_fold_conv_bn_without_bias() {
        let norm = BatchNorm2d::with_options(2, 0.0, 0.1);
        norm.weight
            .update_data(Tensor::from_vec(vec![2.0, 2.0], &[2]).unwrap());
        norm.bias
            .update_data(Tensor::from_vec(vec![0.5, -0.5], &[2]).unwrap());
        norm.set_running_stats(
            Tensor::from_vec(vec![1.0, 2.0], &[2]).unwrap(),
            Tensor::from_vec(vec![4.0, 4.0], &[2]).unwrap(),
        );

        let weight = Tensor::ones(&[2, 1, 1, 1]);
        let (w, b) = fold_conv_bn(&weight, None, &norm);

        // scale = 2 / sqrt(4) = 1
        assert_eq!(w.to_vec(), vec![1.0, 1.0]);
        // b = beta - mean * scale
        assert!((b.to_vec()[0] - (0.5 - 1.0)).abs() < 1e-6);
        assert!((b.to_vec()[1] - (-0.5 - 2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_fold_conv_bn_with_bias() {
        let norm = BatchNorm2d::with_options(1, 0.0, 0.1);
        norm.set_running_stats(
            Tensor::from_vec(vec![3.0], &[1]).unwrap(),
            Tensor::from_vec(vec![1.0], &[1]).unwrap(),
        );

        let weight = Tensor::full(&[1, 1, 1, 1], 2.0);
        let bias = Tensor::from_vec(vec![5.0], &[1]).unwrap();
        let (w, b) = fold_conv_bn(&weight, Some(&bias), &norm);

        // scale = 1, b = 0 + (5 - 3) * 1 = 2
        assert_eq!(w.to_vec(), vec![2.0]);
        assert!((b.to_vec()[0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_pad_kernel_centers_source() {
        let kernel = Tensor::from_vec(vec![7.0, 9.0], &[2, 1, 1, 1]).unwrap();
        let padded = pad_kernel(&kernel, (3, 3));

        assert_eq!(padded.shape(), &[2, 1, 3, 3]);
        assert_eq!(padded.get(&[0, 0, 1, 1]).unwrap(), 7.0);
        assert_eq!(padded.get(&[1, 0, 1, 1]).unwrap(), 9.0);
        assert_eq!(padded.get(&[0, 0, 0, 0]).unwrap(), 0.0);
        assert_eq!(padded.sum(), 16.0);
    }

    #[test]
    fn test_pad_kernel_noop_at_target_size() {
        let kernel = Tensor::randn(&[2, 1, 3, 3]);
        let padded = pad_kernel(&kernel, (3, 3));
        assert_eq!(padded.to_vec(), kernel.to_vec());
    }

    #[test]
    #[should_panic(expected = "cannot be centered")]
    fn test_pad_kernel_rejects_uneven_margin() {
        let kernel = Tensor::ones(&[1, 1, 2, 2]);
        let _ = pad_kernel(&kernel, (3, 3));
    }

    #[test]
    fn test_identity_kernel() {
        let identity = identity_kernel(3, 1, (3, 3));
        assert_eq!(identity.shape(), &[3, 1, 3, 3]);
        // One center tap per channel, nothing else
        assert_eq!(identity.sum(), 3.0);
        for ch in 0..3 {
            assert_eq!(identity.get(&[ch, 0, 1, 1]).unwrap(), 1.0);
        }
    }
}
