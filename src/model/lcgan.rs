//! Latent conditional GAN wrapper
//!
//! Owns both networks, their variable stores and the optional frozen
//! autoencoder, and provides the joint forward pass used by the trainer.

use std::path::Path;

use tch::{nn, nn::VarStore, Device, Tensor};

use super::autoencoder::LatentCodec;
use super::discriminator::{Discriminator, DiscriminatorConfig};
use super::generator::{Generator, GeneratorConfig};
use crate::error::{Error, Result};
use crate::training::OptimizerConfig;
use crate::transforms::{augment, DomainTransform};
use crate::utils::checkpoint::{load_var_store, tagged_file_name};

/// Which network a call refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Generator,
    Discriminator,
}

/// Options for a joint forward pass
#[derive(Clone, Copy)]
pub struct ForwardOptions<'a> {
    /// Track gradients through the generator
    pub train_generator: bool,
    /// Training mode for both networks (batch statistics, power iteration)
    pub train: bool,
    /// Augmentation policy applied to discriminator inputs
    pub policy: &'a str,
    /// Optional transform applied to generated images before scoring
    pub domain: Option<&'a dyn DomainTransform>,
}

impl Default for ForwardOptions<'_> {
    fn default() -> Self {
        Self {
            train_generator: false,
            train: true,
            policy: "",
            domain: None,
        }
    }
}

/// Complete latent conditional GAN
pub struct Lcgan {
    /// Generator network
    pub generator: Generator,
    /// Discriminator network
    pub discriminator: Discriminator,
    /// Variable store for generator
    pub gen_vs: VarStore,
    /// Variable store for discriminator
    pub dis_vs: VarStore,
    /// Device (CPU/GPU)
    pub device: Device,
    codec: Option<Box<dyn LatentCodec>>,
}

impl Lcgan {
    /// Create a new model
    ///
    /// # Arguments
    ///
    /// * `gen_config` - Generator configuration
    /// * `dis_config` - Discriminator configuration
    /// * `device` - Device to create model on
    ///
    /// Fails with a configuration error if either network's schedule is invalid.
    pub fn new(gen_config: GeneratorConfig, dis_config: DiscriminatorConfig, device: Device) -> Result<Self> {
        let gen_vs = VarStore::new(device);
        let dis_vs = VarStore::new(device);

        let generator = Generator::new(&gen_vs.root(), gen_config)?;
        let discriminator = Discriminator::new(&dis_vs.root(), dis_config)?;

        Ok(Self {
            generator,
            discriminator,
            gen_vs,
            dis_vs,
            device,
            codec: None,
        })
    }

    /// Attach a frozen autoencoder; real images are encoded before scoring
    pub fn with_codec(mut self, codec: Box<dyn LatentCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn codec(&self) -> Option<&dyn LatentCodec> {
        self.codec.as_deref()
    }

    /// Enable or disable gradient tracking for one network's parameters
    pub fn set_trainable(&mut self, network: Network, trainable: bool) {
        let vs = match network {
            Network::Generator => &mut self.gen_vs,
            Network::Discriminator => &mut self.dis_vs,
        };
        if trainable {
            vs.unfreeze();
        } else {
            vs.freeze();
        }
    }

    /// Build an Adam optimizer over one network's trainable parameters
    pub fn optimizer(&self, network: Network, config: &OptimizerConfig) -> Result<nn::Optimizer> {
        let vs = match network {
            Network::Generator => &self.gen_vs,
            Network::Discriminator => &self.dis_vs,
        };
        let adam = nn::Adam {
            beta1: config.beta1,
            beta2: config.beta2,
            wd: config.weight_decay,
            eps: config.eps,
            amsgrad: false,
        };
        Ok(nn::OptimizerConfig::build(adam, vs, config.lr)?)
    }

    /// Map real images into the space the discriminator scores
    pub fn encode(&self, images: &Tensor) -> Tensor {
        match &self.codec {
            Some(codec) => codec.encode(images),
            None => images.shallow_clone(),
        }
    }

    fn generate_for(&self, z: &Tensor, gy: &Tensor, opts: &ForwardOptions) -> Result<Tensor> {
        let generated = if opts.train_generator {
            self.generator.forward_t(z, gy, opts.train)?
        } else {
            tch::no_grad(|| self.generator.forward_t(z, gy, opts.train))?
        };

        Ok(match opts.domain {
            Some(domain) => domain.apply(&generated),
            None => generated,
        })
    }

    /// Score generated samples only
    ///
    /// # Returns
    ///
    /// Discriminator scores of shape (batch_size, 1)
    pub fn score_generated(&self, z: &Tensor, gy: &Tensor, opts: &ForwardOptions) -> Result<Tensor> {
        let generated = self.generate_for(z, gy, opts)?;
        let inputs = augment(&generated, opts.policy)?;
        Ok(self.discriminator.forward_t(&inputs, gy, opts.train))
    }

    /// Score generated and real samples in one discriminator pass
    ///
    /// Generated and real batches are concatenated so both see the same
    /// augmentation draw and power-iteration step, then split again.
    ///
    /// # Returns
    ///
    /// Tuple of (fake scores, real scores)
    pub fn score_pair(
        &self,
        z: &Tensor,
        gy: &Tensor,
        x: &Tensor,
        dy: &Tensor,
        opts: &ForwardOptions,
    ) -> Result<(Tensor, Tensor)> {
        let generated = self.generate_for(z, gy, opts)?;
        let real = self.encode(x);

        let n_fake = generated.size()[0];
        let n_real = real.size()[0];
        if generated.size()[1..] != real.size()[1..] {
            return Err(Error::ConfigError(format!(
                "generated samples {:?} and real samples {:?} differ in shape",
                generated.size(),
                real.size()
            )));
        }

        let inputs = augment(&Tensor::cat(&[&generated, &real], 0), opts.policy)?;
        let labels = Tensor::cat(&[gy, dy], 0);
        let scores = self.discriminator.forward_t(&inputs, &labels, opts.train);

        Ok((scores.narrow(0, 0, n_fake), scores.narrow(0, n_fake, n_real)))
    }

    /// Generate samples in eval mode, decoded to image space if a codec is attached
    pub fn generate(&self, z: &Tensor, y: &Tensor) -> Result<Tensor> {
        let samples = tch::no_grad(|| self.generator.forward_t(z, y, false))?;
        Ok(match &self.codec {
            Some(codec) => codec.decode(&samples),
            None => samples,
        })
    }

    /// Save both networks to `dir` as `generator[_E].pt` and `discriminator[_E].pt`
    pub fn save(&self, dir: &Path, epoch: Option<usize>) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.gen_vs.save(dir.join(tagged_file_name("generator", epoch)))?;
        self.dis_vs.save(dir.join(tagged_file_name("discriminator", epoch)))?;
        Ok(())
    }

    /// Load both networks from `dir`
    pub fn load(&mut self, dir: &Path, epoch: Option<usize>) -> Result<()> {
        load_var_store(&mut self.gen_vs, &dir.join(tagged_file_name("generator", epoch)))?;
        load_var_store(&mut self.dis_vs, &dir.join(tagged_file_name("discriminator", epoch)))?;
        Ok(())
    }

    /// Get latent dimension
    pub fn latent_dim(&self) -> i64 {
        self.generator.config().latent_dim
    }

    /// Get number of classes
    pub fn num_classes(&self) -> i64 {
        self.generator.config().num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    fn small_model() -> Lcgan {
        let gen_config = GeneratorConfig {
            latent_dim: 8,
            num_classes: 2,
            bands: 4,
            in_channels: vec![16, 16],
            out_channels: vec![16, 8],
            ..Default::default()
        };
        let dis_config = DiscriminatorConfig {
            num_classes: 2,
            in_channels: vec![4, 16],
            out_channels: vec![16, 32],
            downsample: vec![true, true],
            ..Default::default()
        };
        Lcgan::new(gen_config, dis_config, Device::Cpu).unwrap()
    }

    #[test]
    fn test_score_pair_splits_batches() {
        let model = small_model();
        let z = Tensor::randn([2, 8], (Kind::Float, Device::Cpu));
        let gy = Tensor::from_slice(&[0i64, 1]);
        let x = Tensor::randn([3, 4, 16, 16], (Kind::Float, Device::Cpu));
        let dy = Tensor::from_slice(&[1i64, 0, 1]);

        let (fake, real) = model
            .score_pair(&z, &gy, &x, &dy, &ForwardOptions::default())
            .unwrap();

        assert_eq!(fake.size(), vec![2, 1]);
        assert_eq!(real.size(), vec![3, 1]);
    }

    #[test]
    fn test_generator_detached_unless_training_it() {
        let model = small_model();
        let z = Tensor::randn([2, 8], (Kind::Float, Device::Cpu));
        let gy = Tensor::from_slice(&[0i64, 1]);

        let opts = ForwardOptions::default();
        let generated = model.generate_for(&z, &gy, &opts).unwrap();
        assert!(!generated.requires_grad());

        let opts = ForwardOptions {
            train_generator: true,
            ..Default::default()
        };
        let generated = model.generate_for(&z, &gy, &opts).unwrap();
        assert!(generated.requires_grad());
    }

    #[test]
    fn test_set_trainable() {
        let mut model = small_model();
        model.set_trainable(Network::Generator, false);
        assert!(model.gen_vs.trainable_variables().iter().all(|v| !v.requires_grad()));

        model.set_trainable(Network::Generator, true);
        assert!(model.gen_vs.trainable_variables().iter().all(|v| v.requires_grad()));
    }

    #[test]
    fn test_mismatched_shapes_rejected() {
        let model = small_model();
        let z = Tensor::randn([2, 8], (Kind::Float, Device::Cpu));
        let gy = Tensor::from_slice(&[0i64, 1]);
        let x = Tensor::randn([2, 3, 16, 16], (Kind::Float, Device::Cpu));

        let result = model.score_pair(&z, &gy, &x, &gy, &ForwardOptions::default());
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_empty_schedule_is_rejected() {
        let gen_config = GeneratorConfig {
            in_channels: vec![],
            out_channels: vec![],
            ..Default::default()
        };
        let result = Lcgan::new(gen_config, DiscriminatorConfig::default(), Device::Cpu);
        assert!(matches!(result, Err(Error::ConfigError(_))));

        let dis_config = DiscriminatorConfig {
            in_channels: vec![],
            out_channels: vec![],
            downsample: vec![],
            ..Default::default()
        };
        let result = Lcgan::new(GeneratorConfig::default(), dis_config, Device::Cpu);
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let model = small_model();
        model.save(dir.path(), Some(5)).unwrap();
        assert!(dir.path().join("generator_5.pt").exists());
        assert!(dir.path().join("discriminator_5.pt").exists());

        let mut other = small_model();
        other.load(dir.path(), Some(5)).unwrap();
        assert!(other.load(dir.path(), None).is_err());
    }
}
