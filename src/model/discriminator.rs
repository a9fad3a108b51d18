//! Discriminator network for the latent conditional GAN
//!
//! Residual blocks downsample the input, ReLU and spatial sum pooling give a
//! feature vector, and the score is a linear term plus a class projection:
//! `out = linear(h) + sum(embed(y) * h)`.

use serde::{Deserialize, Serialize};
use tch::{nn, Kind, Tensor};
use tracing::info;

use super::blocks::DBlock;
use crate::error::{Error, Result};
use crate::layers::{SnEmbedding, SnLayerSpec, SnLinear, SpectralNormConfig, WeightInit};
use crate::utils::config::validate_schedule;

/// Discriminator network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscriminatorConfig {
    /// Number of classes
    pub num_classes: i64,
    /// Input channels of each residual block (first one is the image channels)
    pub in_channels: Vec<i64>,
    /// Output channels of each residual block
    pub out_channels: Vec<i64>,
    /// Whether each block halves the resolution
    pub downsample: Vec<bool>,
    /// Hidden width of blocks follows the output channels
    pub wide: bool,
    /// Weight init style (`ortho`, `N02`, `glorot`/`xavier`)
    pub init: String,
    /// Power-iteration settings
    pub spectral_norm: SpectralNormConfig,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            num_classes: 10,
            in_channels: vec![8, 64, 128],
            out_channels: vec![64, 128, 256],
            downsample: vec![true, true, false],
            wide: true,
            init: "ortho".to_string(),
            spectral_norm: SpectralNormConfig::default(),
        }
    }
}

impl DiscriminatorConfig {
    /// Check class count, the block channel schedule and downsample flags
    pub fn validate(&self) -> Result<()> {
        if self.num_classes <= 0 {
            return Err(Error::ConfigError("Number of classes must be > 0".to_string()));
        }
        validate_schedule("discriminator", &self.in_channels, &self.out_channels)?;
        if self.downsample.len() != self.in_channels.len() {
            return Err(Error::ConfigError(
                "Discriminator needs one downsample flag per block".to_string(),
            ));
        }
        self.spectral_norm.validate()
    }
}

/// Projection discriminator
#[derive(Debug)]
pub struct Discriminator {
    config: DiscriminatorConfig,
    blocks: Vec<DBlock>,
    linear: SnLinear,
    embedding: SnEmbedding,
    num_params: usize,
}

impl Discriminator {
    /// Create a new discriminator, rejecting an invalid configuration
    pub fn new(vs: &nn::Path, config: DiscriminatorConfig) -> Result<Self> {
        config.validate()?;

        let init = WeightInit::from_style(&config.init);
        let layers = SnLayerSpec::new(config.spectral_norm, init);

        let blocks: Vec<DBlock> = config
            .in_channels
            .iter()
            .zip(&config.out_channels)
            .zip(&config.downsample)
            .enumerate()
            .map(|(i, ((&in_c, &out_c), &down))| {
                DBlock::new(&(vs / "blocks" / i), in_c, out_c, &layers, config.wide, i > 0, down)
            })
            .collect();

        let features = config.out_channels.last().copied().unwrap_or(config.in_channels[0]);
        let linear = layers.linear(vs / "linear", features, 1);
        let embedding = layers.embedding(vs / "embed", config.num_classes, features);

        let num_params = blocks.iter().map(DBlock::num_params).sum::<usize>()
            + linear.num_params()
            + embedding.num_params();
        info!("Discriminator parameters: {}", num_params);

        Ok(Self {
            config,
            blocks,
            linear,
            embedding,
            num_params,
        })
    }

    /// Score images conditioned on labels
    ///
    /// # Arguments
    ///
    /// * `x` - Tensor of shape (batch_size, channels, height, width)
    /// * `y` - Int64 labels of shape (batch_size)
    /// * `train` - Whether power-iteration estimates advance
    ///
    /// # Returns
    ///
    /// Unbounded scores of shape (batch_size, 1)
    pub fn forward_t(&self, x: &Tensor, y: &Tensor, train: bool) -> Tensor {
        let h = self
            .blocks
            .iter()
            .fold(x.shallow_clone(), |h, block| block.forward_t(&h, train));

        let h = h.relu().sum_dim_intlist([2i64, 3].as_slice(), false, Kind::Float);

        let out = self.linear.forward_t(&h, train);
        let projection = (self.embedding.forward_t(y, train) * &h).sum_dim_intlist(
            [1i64].as_slice(),
            true,
            Kind::Float,
        );

        out + projection
    }

    pub fn num_params(&self) -> usize {
        self.num_params
    }

    /// Get configuration
    pub fn config(&self) -> &DiscriminatorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tch::{nn::VarStore, Device};

    fn small_config() -> DiscriminatorConfig {
        DiscriminatorConfig {
            num_classes: 3,
            in_channels: vec![5, 16],
            out_channels: vec![16, 32],
            downsample: vec![true, true],
            ..Default::default()
        }
    }

    #[test]
    fn test_discriminator_output_shape() {
        let vs = VarStore::new(Device::Cpu);
        let disc = Discriminator::new(&vs.root(), small_config()).unwrap();

        let x = Tensor::randn([3, 5, 16, 16], (Kind::Float, Device::Cpu));
        let y = Tensor::from_slice(&[0i64, 1, 2]);

        assert_eq!(disc.forward_t(&x, &y, true).size(), vec![3, 1]);
    }

    #[test]
    fn test_projection_depends_on_label() {
        let vs = VarStore::new(Device::Cpu);
        let disc = Discriminator::new(&vs.root(), small_config()).unwrap();

        let x = Tensor::randn([1, 5, 16, 16], (Kind::Float, Device::Cpu));
        let x = Tensor::cat(&[&x, &x], 0);
        let y = Tensor::from_slice(&[0i64, 1]);

        let out = disc.forward_t(&x, &y, false);
        assert_ne!(out.double_value(&[0, 0]), out.double_value(&[1, 0]));
    }

    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_param_count_is_logged() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || Capture(writer.clone()))
            .finish();

        let vs = VarStore::new(Device::Cpu);
        let disc = tracing::subscriber::with_default(subscriber, || {
            Discriminator::new(&vs.root(), small_config()).unwrap()
        });

        let logs = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(logs.contains(&format!("Discriminator parameters: {}", disc.num_params())));
    }

    #[test]
    fn test_param_count_matches_var_store() {
        let vs = VarStore::new(Device::Cpu);
        let disc = Discriminator::new(&vs.root(), small_config()).unwrap();

        let trainable: usize = vs.trainable_variables().iter().map(Tensor::numel).sum();
        assert_eq!(disc.num_params(), trainable);
    }
}
