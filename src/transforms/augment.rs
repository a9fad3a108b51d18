//! Differentiable augmentation of discriminator inputs
//!
//! A policy is a comma-separated list of ops (`color`, `translation`,
//! `cutout`). Every op is built from tensor arithmetic and indexing, so
//! gradients flow back to generated samples. The empty policy is the identity.

use std::str::FromStr;

use tch::{Device, Kind, Tensor};

use crate::error::{Error, Result};

const TRANSLATION_RATIO: f64 = 0.125;
const CUTOUT_RATIO: f64 = 0.5;

/// One augmentation op
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugmentOp {
    /// Random brightness, saturation and contrast
    Color,
    /// Random shift by up to 1/8 of each side, zero padded
    Translation,
    /// Zero a random square of half the image size
    Cutout,
}

impl FromStr for AugmentOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "color" => Ok(AugmentOp::Color),
            "translation" => Ok(AugmentOp::Translation),
            "cutout" => Ok(AugmentOp::Cutout),
            other => Err(Error::UnknownAugmentation(other.to_string())),
        }
    }
}

/// Parse a comma-separated policy
pub fn parse_policy(policy: &str) -> Result<Vec<AugmentOp>> {
    policy
        .split(',')
        .map(str::trim)
        .filter(|op| !op.is_empty())
        .map(AugmentOp::from_str)
        .collect()
}

/// Apply `policy` to a batch of shape `[B, C, H, W]`
pub fn augment(x: &Tensor, policy: &str) -> Result<Tensor> {
    let ops = parse_policy(policy)?;
    ops.iter().try_fold(x.shallow_clone(), |x, op| match op {
        AugmentOp::Color => Ok(rand_contrast(&rand_saturation(&rand_brightness(&x)))),
        AugmentOp::Translation => rand_translation(&x, TRANSLATION_RATIO),
        AugmentOp::Cutout => rand_cutout(&x, CUTOUT_RATIO),
    })
}

fn per_sample_uniform(x: &Tensor) -> Tensor {
    Tensor::rand([x.size()[0], 1, 1, 1], (Kind::Float, x.device()))
}

fn rand_brightness(x: &Tensor) -> Tensor {
    x + (per_sample_uniform(x) - 0.5)
}

fn rand_saturation(x: &Tensor) -> Tensor {
    let mean = x.mean_dim([1i64].as_slice(), true, Kind::Float);
    (x - &mean) * (per_sample_uniform(x) * 2.0) + mean
}

fn rand_contrast(x: &Tensor) -> Tensor {
    let mean = x.mean_dim([1i64, 2, 3].as_slice(), true, Kind::Float);
    (x - &mean) * (per_sample_uniform(x) + 0.5) + mean
}

/// Random integers in `[0, high)`, one per sample
fn random_offsets(high: i64, n: i64) -> Result<Vec<i64>> {
    let offsets = Tensor::randint(high.max(1), [n], (Kind::Int64, Device::Cpu));
    Ok(Vec::<i64>::try_from(offsets)?)
}

fn rand_translation(x: &Tensor, ratio: f64) -> Result<Tensor> {
    let size = x.size();
    let (n, h, w) = (size[0], size[2], size[3]);
    let shift_h = (h as f64 * ratio + 0.5) as i64;
    let shift_w = (w as f64 * ratio + 0.5) as i64;

    let padded = x.zero_pad2d(shift_w, shift_w, shift_h, shift_h);
    let starts_h = random_offsets(2 * shift_h + 1, n)?;
    let starts_w = random_offsets(2 * shift_w + 1, n)?;

    let shifted: Vec<Tensor> = (0..n)
        .map(|i| {
            padded
                .get(i)
                .narrow(1, starts_h[i as usize], h)
                .narrow(2, starts_w[i as usize], w)
        })
        .collect();

    Ok(Tensor::stack(&shifted, 0))
}

fn rand_cutout(x: &Tensor, ratio: f64) -> Result<Tensor> {
    let size = x.size();
    let (n, h, w) = (size[0], size[2], size[3]);
    let cut_h = (h as f64 * ratio + 0.5) as i64;
    let cut_w = (w as f64 * ratio + 0.5) as i64;

    // Centres may fall one past the edge when the cut size is even
    let centres_h = random_offsets(h + (1 - cut_h % 2), n)?;
    let centres_w = random_offsets(w + (1 - cut_w % 2), n)?;

    let mut mask = vec![1f32; (n * h * w) as usize];
    for i in 0..n as usize {
        let top = (centres_h[i] - cut_h / 2).clamp(0, h);
        let bottom = (centres_h[i] - cut_h / 2 + cut_h).clamp(0, h);
        let left = (centres_w[i] - cut_w / 2).clamp(0, w);
        let right = (centres_w[i] - cut_w / 2 + cut_w).clamp(0, w);

        for row in top..bottom {
            for col in left..right {
                mask[i * (h * w) as usize + (row * w + col) as usize] = 0.0;
            }
        }
    }

    let mask = Tensor::from_slice(&mask)
        .view([n, 1, h, w])
        .to_device(x.device());
    Ok(x * mask)
}
