//! Generator network for the latent conditional GAN
//!
//! Maps a latent vector and a class label to a multi-channel image (or
//! autoencoder latent map). A spectrally normalized linear layer seeds a 4x4
//! feature map, residual blocks double the resolution, and a plain
//! batch-norm / ReLU / 3x3 conv / tanh head produces the output channels.

use serde::{Deserialize, Serialize};
use tch::{nn, nn::ModuleT, Tensor};
use tracing::info;

use super::blocks::{ConditionalNormSpec, GBlock};
use crate::error::{Error, Result};
use crate::layers::{NormStyle, SnConv2d, SnLayerSpec, SnLinear, SpectralNormConfig, WeightInit};
use crate::utils::config::validate_schedule;

/// Spatial size of the seed feature map
pub const BOTTOM_WIDTH: i64 = 4;

/// Generator network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Size of the latent vector
    pub latent_dim: i64,
    /// Number of classes
    pub num_classes: i64,
    /// Output channels (spectral bands or autoencoder latent channels)
    pub bands: i64,
    /// Input channels of each residual block
    pub in_channels: Vec<i64>,
    /// Output channels of each residual block
    pub out_channels: Vec<i64>,
    /// Upsampling factor applied by every block
    pub upsample_factor: i64,
    /// Conditional norm style (`bn`, `in`, `gn_ch_<n>`, `grp_<n>`, `nonorm`)
    pub norm_style: String,
    /// Weight init style (`ortho`, `N02`, `glorot`/`xavier`)
    pub init: String,
    /// Epsilon for every batch norm
    pub bn_eps: f64,
    /// Power-iteration settings
    pub spectral_norm: SpectralNormConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            latent_dim: 128,
            num_classes: 10,
            bands: 8,
            in_channels: vec![256, 256, 128],
            out_channels: vec![256, 128, 64],
            upsample_factor: 2,
            norm_style: "bn".to_string(),
            init: "ortho".to_string(),
            bn_eps: 1e-5,
            spectral_norm: SpectralNormConfig::default(),
        }
    }
}

impl GeneratorConfig {
    /// Check sizes and the block channel schedule
    pub fn validate(&self) -> Result<()> {
        if self.latent_dim <= 0 || self.num_classes <= 0 || self.bands <= 0 {
            return Err(Error::ConfigError(format!(
                "latent_dim, num_classes and bands must be > 0, got {}, {}, {}",
                self.latent_dim, self.num_classes, self.bands
            )));
        }
        if self.upsample_factor < 1 {
            return Err(Error::ConfigError("Upsample factor must be >= 1".to_string()));
        }
        validate_schedule("generator", &self.in_channels, &self.out_channels)?;
        self.spectral_norm.validate()
    }

    /// Output resolution: 4 doubled once per block
    pub fn resolution(&self) -> i64 {
        BOTTOM_WIDTH * self.upsample_factor.pow(self.in_channels.len() as u32)
    }
}

/// Class-conditional residual generator
#[derive(Debug)]
pub struct Generator {
    config: GeneratorConfig,
    linear: SnLinear,
    blocks: Vec<GBlock>,
    output_bn: nn::BatchNorm,
    output_conv: SnConv2d,
    num_params: usize,
}

impl Generator {
    /// Create a new generator, rejecting an invalid configuration
    pub fn new(vs: &nn::Path, config: GeneratorConfig) -> Result<Self> {
        config.validate()?;

        let init = WeightInit::from_style(&config.init);
        let layers = SnLayerSpec::new(config.spectral_norm, init);
        let norm = ConditionalNormSpec {
            num_classes: config.num_classes,
            style: NormStyle::parse(&config.norm_style),
            init,
            eps: config.bn_eps,
        };

        let seed_channels = config.in_channels[0];
        let linear = layers.linear(
            vs / "linear",
            config.latent_dim,
            seed_channels * BOTTOM_WIDTH * BOTTOM_WIDTH,
        );

        let blocks: Vec<GBlock> = config
            .in_channels
            .iter()
            .zip(&config.out_channels)
            .enumerate()
            .map(|(i, (&in_c, &out_c))| {
                GBlock::new(
                    &(vs / "blocks" / i),
                    in_c,
                    out_c,
                    Some(config.upsample_factor),
                    &layers,
                    &norm,
                )
            })
            .collect();

        let last_channels = *config.out_channels.last().unwrap_or(&seed_channels);
        let bn_config = nn::BatchNormConfig {
            eps: config.bn_eps,
            ..Default::default()
        };
        let output_bn = nn::batch_norm2d(vs / "output_bn", last_channels, bn_config);
        let output_conv = layers.conv3x3(vs / "output_conv", last_channels, config.bands);

        let num_params = linear.num_params()
            + blocks.iter().map(GBlock::num_params).sum::<usize>()
            + output_conv.num_params();
        info!("Generator parameters: {}", num_params);

        Ok(Self {
            config,
            linear,
            blocks,
            output_bn,
            output_conv,
            num_params,
        })
    }

    /// Generate images from latents and labels
    ///
    /// # Arguments
    ///
    /// * `z` - Tensor of shape (batch_size, latent_dim)
    /// * `y` - Int64 labels of shape (batch_size)
    /// * `train` - Training mode (batch statistics, power-iteration updates)
    ///
    /// # Returns
    ///
    /// Tensor of shape (batch_size, bands, resolution, resolution) in [-1, 1]
    pub fn forward_t(&self, z: &Tensor, y: &Tensor, train: bool) -> Result<Tensor> {
        let batch_size = z.size()[0];

        let h = self.linear.forward_t(z, train);
        let h = h.view([batch_size, -1, BOTTOM_WIDTH, BOTTOM_WIDTH]);

        let h = self
            .blocks
            .iter()
            .try_fold(h, |h, block| block.forward_t(&h, y, train))?;

        let h = self.output_bn.forward_t(&h, train).relu();
        Ok(self.output_conv.forward_t(&h, train).tanh())
    }

    /// Number of parameters in convolution, linear and embedding layers
    pub fn num_params(&self) -> usize {
        self.num_params
    }

    /// Get configuration
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::VarStore, Device, Kind};

    fn small_config() -> GeneratorConfig {
        GeneratorConfig {
            latent_dim: 8,
            num_classes: 3,
            bands: 5,
            in_channels: vec![16, 16],
            out_channels: vec![16, 8],
            ..Default::default()
        }
    }

    #[test]
    fn test_generator_output_shape() {
        let vs = VarStore::new(Device::Cpu);
        let gen = Generator::new(&vs.root(), small_config()).unwrap();

        let z = Tensor::randn([2, 8], (Kind::Float, Device::Cpu));
        let y = Tensor::from_slice(&[0i64, 2]);
        let out = gen.forward_t(&z, &y, true).unwrap();

        assert_eq!(out.size(), vec![2, 5, 16, 16]);
        assert_eq!(gen.config().resolution(), 16);
    }

    #[test]
    fn test_generator_output_range() {
        let vs = VarStore::new(Device::Cpu);
        let gen = Generator::new(&vs.root(), small_config()).unwrap();

        let z = Tensor::randn([2, 8], (Kind::Float, Device::Cpu));
        let y = Tensor::from_slice(&[1i64, 1]);
        let out = gen.forward_t(&z, &y, true).unwrap();

        assert!(out.max().double_value(&[]) <= 1.0);
        assert!(out.min().double_value(&[]) >= -1.0);
    }

    #[test]
    fn test_param_count_excludes_output_bn() {
        let vs = VarStore::new(Device::Cpu);
        let gen = Generator::new(&vs.root(), small_config()).unwrap();

        let trainable: usize = vs.trainable_variables().iter().map(Tensor::numel).sum();
        assert_eq!(gen.num_params() + 2 * 8, trainable);
    }

    #[test]
    fn test_unknown_norm_style_errors() {
        let vs = VarStore::new(Device::Cpu);
        let config = GeneratorConfig {
            norm_style: "foo".to_string(),
            ..small_config()
        };
        let gen = Generator::new(&vs.root(), config).unwrap();

        let z = Tensor::randn([2, 8], (Kind::Float, Device::Cpu));
        let y = Tensor::from_slice(&[0i64, 1]);
        assert!(gen.forward_t(&z, &y, true).is_err());
    }
}
