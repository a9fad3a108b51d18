//! Configuration management
//!
//! Provides unified configuration for networks, training and the optional
//! autoencoder, loadable from TOML or JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::{AutoencoderConfig, DiscriminatorConfig, GeneratorConfig};
use crate::training::TrainingConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Device: "cpu" or "cuda"
    pub device: String,
    /// Generator configuration
    pub generator: GeneratorConfig,
    /// Discriminator configuration
    pub discriminator: DiscriminatorConfig,
    /// Training configuration
    pub training: TrainingConfig,
    /// Frozen autoencoder; when set the GAN works in its latent space
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoencoder: Option<AutoencoderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: "cpu".to_string(),
            generator: GeneratorConfig::default(),
            discriminator: DiscriminatorConfig::default(),
            training: TrainingConfig::default(),
            autoencoder: None,
        }
    }
}

fn bail<T>(msg: impl Into<String>) -> Result<T> {
    Err(Error::ConfigError(msg.into()))
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from TOML file
    pub fn from_toml(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to TOML file
    pub fn save_toml(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn from_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to JSON file
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get device from configuration
    pub fn get_device(&self) -> tch::Device {
        match self.device.to_lowercase().as_str() {
            "cuda" | "gpu" => {
                if tch::Cuda::is_available() {
                    tch::Device::Cuda(0)
                } else {
                    tracing::warn!("CUDA requested but not available, falling back to CPU");
                    tch::Device::Cpu
                }
            }
            _ => tch::Device::Cpu,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let gen = &self.generator;
        let dis = &self.discriminator;
        let training = &self.training;

        gen.validate()?;
        dis.validate()?;

        if gen.num_classes != dis.num_classes {
            return bail(format!(
                "Generator has {} classes but discriminator has {}",
                gen.num_classes, dis.num_classes
            ));
        }
        if dis.in_channels[0] != gen.bands {
            return bail(format!(
                "Discriminator expects {} input channels but generator produces {}",
                dis.in_channels[0], gen.bands
            ));
        }
        if let Some(ae) = &self.autoencoder {
            if ae.latent_channels() != gen.bands {
                return bail(format!(
                    "Autoencoder latent has {} channels but generator produces {}",
                    ae.latent_channels(),
                    gen.bands
                ));
            }
        }

        if training.epochs == 0 {
            return bail("Number of epochs must be > 0");
        }
        if training.batch_size.gen <= 0 || training.batch_size.dis <= 0 {
            return bail("Batch sizes must be > 0");
        }
        if training.latent_var <= 0.0 {
            return bail("Latent standard deviation must be > 0");
        }
        crate::transforms::parse_policy(&training.augment_policy)?;

        Ok(())
    }
}

/// Block channel schedule: non-empty, equal lengths, each input equal to the previous output
pub(crate) fn validate_schedule(name: &str, in_channels: &[i64], out_channels: &[i64]) -> Result<()> {
    if in_channels.is_empty() || in_channels.len() != out_channels.len() {
        return bail(format!(
            "{} channel schedule must be non-empty with matching lengths",
            name
        ));
    }
    if in_channels[1..] != out_channels[..out_channels.len() - 1] {
        return bail(format!(
            "{} block inputs must match previous block outputs",
            name
        ));
    }
    Ok(())
}

/// Create default configuration file if it doesn't exist
pub fn ensure_config_exists(path: &Path) -> Result<Config> {
    let is_toml = path.extension().map(|e| e == "toml").unwrap_or(false);

    if path.exists() {
        if is_toml {
            Config::from_toml(path)
        } else {
            Config::from_json(path)
        }
    } else {
        let config = Config::default();
        if is_toml {
            config.save_toml(path)?;
        } else {
            config.save_json(path)?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::HingeMargin;

    #[test]
    fn test_config_default_is_valid() {
        let config = Config::default();
        assert_eq!(config.generator.latent_dim, 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let loaded: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.generator.in_channels, loaded.generator.in_channels);
        assert_eq!(config.training.batch_size, loaded.training.batch_size);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.training.margin = HingeMargin::Adaptive {
            base: 1.0,
            sensitivity: 0.25,
            min: 0.5,
            max: 1.5,
        };
        config.autoencoder = Some(AutoencoderConfig::default());
        config.save_toml(&path).unwrap();

        let loaded = Config::from_toml(&path).unwrap();
        assert_eq!(loaded.training.margin, config.training.margin);
        assert_eq!(loaded.autoencoder.map(|a| a.bands), Some(31));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.discriminator.num_classes = 3;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.generator.out_channels[0] = 7;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.discriminator.in_channels[0] = 3;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.training.augment_policy = "color,warp".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_autoencoder_must_match_bands() {
        let mut config = Config::default();
        config.autoencoder = Some(AutoencoderConfig::default());
        assert!(config.validate().is_ok());

        config.autoencoder = Some(AutoencoderConfig {
            features: 32,
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ensure_config_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let created = ensure_config_exists(&path).unwrap();
        assert!(path.exists());

        let loaded = ensure_config_exists(&path).unwrap();
        assert_eq!(created.training.epochs, loaded.training.epochs);
    }
}
