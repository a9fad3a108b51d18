//! Frozen spectral autoencoder
//!
//! Compresses hyperspectral images into a few latent channels so the GAN can
//! work in a smaller space. The autoencoder is pretrained elsewhere and only
//! loaded here; its parameters never receive gradients.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tch::{nn, nn::Module, nn::VarStore, Device, Tensor};

use crate::error::Result;
use crate::utils::checkpoint::{load_var_store, tagged_file_name};

/// Maps images to latent maps and back
pub trait LatentCodec {
    /// Image -> latent, without gradient tracking
    fn encode(&self, images: &Tensor) -> Tensor;

    /// Latent -> image, without gradient tracking
    fn decode(&self, latent: &Tensor) -> Tensor;

    /// Channels of the latent map
    fn latent_channels(&self) -> i64;
}

/// Autoencoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoencoderConfig {
    /// Spectral bands of the input images
    pub bands: i64,
    /// Width of the first encoder layer
    pub features: i64,
    /// Directory holding `encoder[_E].pt` and `decoder[_E].pt`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights_dir: Option<String>,
    /// Epoch tag of the weights to load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<usize>,
}

impl Default for AutoencoderConfig {
    fn default() -> Self {
        Self {
            bands: 31,
            features: 64,
            weights_dir: None,
            epoch: None,
        }
    }
}

impl AutoencoderConfig {
    /// Encoder channel schedule, input bands first
    pub fn encoder_channels(&self) -> Vec<i64> {
        let f = self.features;
        vec![self.bands, f, f, f / 2, f / 2, f / 4, f / 8]
    }

    pub fn latent_channels(&self) -> i64 {
        self.features / 8
    }
}

/// 3x3 convolutions with ReLU between them; `final_relu` adds one after the last
fn conv_stack(p: nn::Path, channels: &[i64], final_relu: bool) -> nn::Sequential {
    let conv_config = nn::ConvConfig {
        padding: 1,
        ..Default::default()
    };
    let last = channels.len().saturating_sub(2);

    channels
        .windows(2)
        .enumerate()
        .fold(nn::seq(), |seq, (i, pair)| {
            let seq = seq.add(nn::conv2d(&p / i, pair[0], pair[1], 3, conv_config));
            if i < last || final_relu {
                seq.add_fn(|x| x.relu())
            } else {
                seq
            }
        })
}

/// 3x3 convolutional autoencoder over spectral bands
pub struct SpectralAutoencoder {
    config: AutoencoderConfig,
    encoder: nn::Sequential,
    decoder: nn::Sequential,
    enc_vs: VarStore,
    dec_vs: VarStore,
}

impl SpectralAutoencoder {
    /// Build a frozen autoencoder with freshly initialized weights
    pub fn new(config: AutoencoderConfig, device: Device) -> Self {
        let mut enc_vs = VarStore::new(device);
        let mut dec_vs = VarStore::new(device);

        let channels = config.encoder_channels();
        let reversed: Vec<i64> = channels.iter().rev().copied().collect();

        // Latents are unbounded; decoded images are non-negative
        let encoder = conv_stack(enc_vs.root() / "encoder", &channels, false);
        let decoder = conv_stack(dec_vs.root() / "decoder", &reversed, true);

        enc_vs.freeze();
        dec_vs.freeze();

        Self {
            config,
            encoder,
            decoder,
            enc_vs,
            dec_vs,
        }
    }

    /// Build the autoencoder and load its weights if a directory is configured
    pub fn from_config(config: AutoencoderConfig, device: Device) -> Result<Self> {
        let mut autoencoder = Self::new(config.clone(), device);
        if let Some(dir) = &config.weights_dir {
            autoencoder.load(Path::new(dir), config.epoch)?;
        }
        Ok(autoencoder)
    }

    /// Save encoder and decoder weights to `dir`
    pub fn save(&self, dir: &Path, epoch: Option<usize>) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.enc_vs.save(dir.join(tagged_file_name("encoder", epoch)))?;
        self.dec_vs.save(dir.join(tagged_file_name("decoder", epoch)))?;
        Ok(())
    }

    /// Load encoder and decoder weights from `dir`
    pub fn load(&mut self, dir: &Path, epoch: Option<usize>) -> Result<()> {
        load_var_store(&mut self.enc_vs, &dir.join(tagged_file_name("encoder", epoch)))?;
        load_var_store(&mut self.dec_vs, &dir.join(tagged_file_name("decoder", epoch)))?;
        Ok(())
    }

    pub fn config(&self) -> &AutoencoderConfig {
        &self.config
    }
}

impl LatentCodec for SpectralAutoencoder {
    fn encode(&self, images: &Tensor) -> Tensor {
        tch::no_grad(|| self.encoder.forward(images))
    }

    fn decode(&self, latent: &Tensor) -> Tensor {
        tch::no_grad(|| self.decoder.forward(latent))
    }

    fn latent_channels(&self) -> i64 {
        self.config.latent_channels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    fn small_config() -> AutoencoderConfig {
        AutoencoderConfig {
            bands: 6,
            features: 16,
            ..Default::default()
        }
    }

    #[test]
    fn test_channel_schedule() {
        let config = AutoencoderConfig::default();
        assert_eq!(config.encoder_channels(), vec![31, 64, 64, 32, 32, 16, 8]);
        assert_eq!(config.latent_channels(), 8);
    }

    #[test]
    fn test_encode_decode_shapes() {
        let ae = SpectralAutoencoder::new(small_config(), Device::Cpu);
        let x = Tensor::rand([2, 6, 8, 8], (Kind::Float, Device::Cpu));

        let latent = ae.encode(&x);
        assert_eq!(latent.size(), vec![2, 2, 8, 8]);
        assert!(!latent.requires_grad());

        assert_eq!(ae.decode(&latent).size(), vec![2, 6, 8, 8]);
    }

    #[test]
    fn test_latent_can_be_negative() {
        let ae = SpectralAutoencoder::new(small_config(), Device::Cpu);

        // Push the last encoder conv strictly negative; its input is post-ReLU
        tch::no_grad(|| {
            for (name, mut var) in ae.enc_vs.variables() {
                if name.starts_with("encoder.5.") {
                    let _ = var.fill_(-1.0);
                }
            }
        });

        let x = Tensor::rand([2, 6, 8, 8], (Kind::Float, Device::Cpu));
        let latent = ae.encode(&x);
        assert!(latent.max().double_value(&[]) <= -1.0);

        let decoded = ae.decode(&latent);
        assert!(decoded.min().double_value(&[]) >= 0.0);
    }

    #[test]
    fn test_parameters_are_frozen() {
        let ae = SpectralAutoencoder::new(small_config(), Device::Cpu);
        for var in ae.enc_vs.trainable_variables() {
            assert!(!var.requires_grad());
        }
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let ae = SpectralAutoencoder::new(small_config(), Device::Cpu);
        ae.save(dir.path(), Some(3)).unwrap();
        assert!(dir.path().join("encoder_3.pt").exists());

        let mut other = SpectralAutoencoder::new(small_config(), Device::Cpu);
        other.load(dir.path(), Some(3)).unwrap();

        let x = Tensor::rand([1, 6, 4, 4], (Kind::Float, Device::Cpu));
        assert!(ae.encode(&x).equal(&other.encode(&x)));
    }

    #[test]
    fn test_missing_weights_fail() {
        let dir = tempfile::tempdir().unwrap();
        let mut ae = SpectralAutoencoder::new(small_config(), Device::Cpu);
        assert!(ae.load(dir.path(), None).is_err());
    }
}
