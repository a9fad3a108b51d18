//! Class-conditional affine normalization
//!
//! Normalizes activations without learned affine parameters, then applies a
//! per-class gain and bias looked up from two embedding tables:
//! `out = norm(x) * (1 + gain[y]) + bias[y]`.

use tch::{nn, nn::Module, Tensor};

use super::init::WeightInit;
use crate::error::{Error, Result};

const DEFAULT_NUM_GROUPS: i64 = 16;

/// How group normalization picks its group count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSpec {
    /// Fixed number of channels per group
    ChannelsPerGroup(i64),
    /// Fixed number of groups
    Groups(i64),
}

impl GroupSpec {
    pub fn num_groups(&self, channels: i64) -> i64 {
        match *self {
            GroupSpec::ChannelsPerGroup(n) => (channels / n.max(1)).max(1),
            GroupSpec::Groups(n) => n.max(1),
        }
    }
}

/// Normalization applied before the conditional affine step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormStyle {
    /// Batch statistics, running estimates in eval
    Batch,
    /// Per-sample, per-channel statistics
    Instance,
    /// Group statistics
    Group(GroupSpec),
    /// No normalization
    Identity,
    /// Unrecognized style name; fails on first forward
    Unrecognized(String),
}

impl NormStyle {
    /// Parse a style name such as `bn`, `in`, `gn_ch_8`, `grp_4` or `nonorm`
    pub fn parse(style: &str) -> Self {
        match style {
            "bn" => return NormStyle::Batch,
            "in" => return NormStyle::Instance,
            "nonorm" | "none" => return NormStyle::Identity,
            "gn" => return NormStyle::Group(GroupSpec::Groups(DEFAULT_NUM_GROUPS)),
            _ => {}
        }

        let count = style.rsplit('_').next().and_then(|n| n.parse::<i64>().ok());
        match count {
            Some(n) if n > 0 && style.contains("ch") => NormStyle::Group(GroupSpec::ChannelsPerGroup(n)),
            Some(n) if n > 0 && style.contains("grp") => NormStyle::Group(GroupSpec::Groups(n)),
            _ => NormStyle::Unrecognized(style.to_string()),
        }
    }
}

/// Conditional affine normalization layer
#[derive(Debug)]
pub struct ConditionalAffineNorm {
    gain: nn::Embedding,
    bias: nn::Embedding,
    running_mean: Tensor,
    running_var: Tensor,
    style: NormStyle,
    channels: i64,
    momentum: f64,
    eps: f64,
}

impl ConditionalAffineNorm {
    /// Create a conditional norm for `channels` feature maps and `num_classes` labels
    ///
    /// The embedding tables use the network's weight init. Running statistics
    /// are registered as non-trainable variables.
    pub fn new(
        p: &nn::Path,
        channels: i64,
        num_classes: i64,
        style: NormStyle,
        init: WeightInit,
        eps: f64,
    ) -> Self {
        let dims = [num_classes, channels];
        let fallback = nn::Init::Randn {
            mean: 0.0,
            stdev: 1.0,
        };
        let config = nn::EmbeddingConfig {
            ws_init: init.resolve(&dims, fallback),
            ..Default::default()
        };

        let gain = nn::embedding(p / "gain", num_classes, channels, config);
        let bias = nn::embedding(p / "bias", num_classes, channels, config);
        let running_mean = p.zeros_no_train("stored_mean", &[channels]);
        let running_var = p.ones_no_train("stored_var", &[channels]);

        Self {
            gain,
            bias,
            running_mean,
            running_var,
            style,
            channels,
            momentum: 0.1,
            eps,
        }
    }

    /// Per-sample gain and bias, shaped `[B, C, 1, 1]`
    pub fn affine_params(&self, y: &Tensor) -> (Tensor, Tensor) {
        let batch = y.size()[0];
        let gain = (self.gain.forward(y) + 1.0).view([batch, self.channels, 1, 1]);
        let bias = self.bias.forward(y).view([batch, self.channels, 1, 1]);
        (gain, bias)
    }

    /// Normalize `x` (`[B, C, H, W]`) conditioned on labels `y` (`[B]`, int64)
    pub fn forward_t(&self, x: &Tensor, y: &Tensor, train: bool) -> Result<Tensor> {
        let normed = match &self.style {
            NormStyle::Batch => x.batch_norm(
                None::<&Tensor>,
                None,
                Some(&self.running_mean),
                Some(&self.running_var),
                train,
                self.momentum,
                self.eps,
                false,
            ),
            NormStyle::Instance => x.instance_norm(
                None::<&Tensor>,
                None,
                Some(&self.running_mean),
                Some(&self.running_var),
                train,
                self.momentum,
                self.eps,
                false,
            ),
            NormStyle::Group(groups) => {
                x.f_group_norm(groups.num_groups(self.channels), None::<&Tensor>, None, self.eps, false)?
            }
            NormStyle::Identity => x.shallow_clone(),
            NormStyle::Unrecognized(style) => return Err(Error::UnknownNormStyle(style.clone())),
        };

        let (gain, bias) = self.affine_params(y);
        Ok(normed * gain + bias)
    }

    pub fn style(&self) -> &NormStyle {
        &self.style
    }

    pub fn running_mean(&self) -> &Tensor {
        &self.running_mean
    }

    pub fn num_params(&self) -> usize {
        self.gain.ws.numel() + self.bias.ws.numel()
    }
}
