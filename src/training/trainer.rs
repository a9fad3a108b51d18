//! Adversarial training loop
//!
//! One step trains the discriminator on micro-batches of the real batch (one
//! generator-sized slice at a time, fresh latents per slice), then trains the
//! generator once. Parameter gradients of the network not being trained are
//! switched off for the duration of each phase.

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tch::{nn, Kind, Tensor};
use tracing::{debug, info};

use super::ema::{EmaConfig, EmaLosses, DIS_FAKE, DIS_REAL, GENERATOR_LOSS};
use super::losses::{hinge_discriminator_loss, hinge_generator_loss, HingeMargin};
use super::metrics::{EpochAccumulator, MetricsSink, StepMetrics, TrainingMetrics};
use super::sampler::Sampler;
use crate::data::DataLoader;
use crate::error::{Error, Result};
use crate::model::{ForwardOptions, Lcgan, Network};
use crate::transforms::DomainTransform;
use crate::utils::checkpoint::save_checkpoint;
use crate::utils::samples::SampleRenderer;

/// Batch sizes for the two networks
///
/// Real batches are `dis` samples; the discriminator sees them in slices of
/// `gen` samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSize {
    pub gen: i64,
    pub dis: i64,
}

/// Adam settings for one network
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
}

impl OptimizerConfig {
    pub fn with_lr(lr: f64) -> Self {
        Self {
            lr,
            beta1: 0.5,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        }
    }
}

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of training epochs
    pub epochs: usize,
    /// Seed for latent and label samplers
    pub seed: u64,
    /// Switch off gradients of the network not being trained
    pub toggle_grads: bool,
    /// Augmentation policy for discriminator inputs (empty for none)
    pub augment_policy: String,
    /// Mean of the latent distribution
    pub latent_mean: f64,
    /// Standard deviation of the latent distribution
    pub latent_var: f64,
    /// Render fixed samples every N epochs (0 disables)
    pub sample_every: usize,
    /// Save checkpoint every N epochs (0 disables)
    pub checkpoint_every: usize,
    /// Directory for checkpoints and samples
    pub save_path: String,
    pub batch_size: BatchSize,
    pub gen_optimizer: OptimizerConfig,
    pub dis_optimizer: OptimizerConfig,
    pub margin: HingeMargin,
    pub ema: EmaConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            seed: 0,
            toggle_grads: true,
            augment_policy: String::new(),
            latent_mean: 0.0,
            latent_var: 1.0,
            sample_every: 1,
            checkpoint_every: 25,
            save_path: "runs/lcgan".to_string(),
            batch_size: BatchSize { gen: 16, dis: 32 },
            gen_optimizer: OptimizerConfig::with_lr(5e-5),
            dis_optimizer: OptimizerConfig::with_lr(2e-4),
            margin: HingeMargin::default(),
            ema: EmaConfig::default(),
        }
    }
}

/// Discriminator-phase results for one micro-batch, or averaged over several
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiscriminatorStats {
    pub loss_real: f64,
    pub loss_fake: f64,
    pub real: f64,
    pub fake: f64,
}

impl DiscriminatorStats {
    /// Field-wise mean, `None` for an empty slice
    pub fn average(slices: &[DiscriminatorStats]) -> Option<Self> {
        if slices.is_empty() {
            return None;
        }
        let n = slices.len() as f64;
        let sum = slices.iter().fold(Self::default(), |acc, s| Self {
            loss_real: acc.loss_real + s.loss_real,
            loss_fake: acc.loss_fake + s.loss_fake,
            real: acc.real + s.real,
            fake: acc.fake + s.fake,
        });
        Some(Self {
            loss_real: sum.loss_real / n,
            loss_fake: sum.loss_fake / n,
            real: sum.real / n,
            fake: sum.fake / n,
        })
    }
}

/// Adversarial trainer
pub struct Trainer {
    model: Lcgan,
    config: TrainingConfig,
    gen_opt: nn::Optimizer,
    dis_opt: nn::Optimizer,
    z: Sampler,
    y: Sampler,
    fixed_z: Sampler,
    fixed_y: Sampler,
    ema: EmaLosses,
    domain: Option<Box<dyn DomainTransform>>,
    metrics: TrainingMetrics,
    last_slices: Vec<DiscriminatorStats>,
    iteration: usize,
}

impl Trainer {
    /// Create a trainer, building both optimizers and seeding all samplers
    ///
    /// Latent and label samplers use `seed` and `seed + 1`; the fixed
    /// samples used for rendering use `seed + 2` and `seed + 3`.
    pub fn new(model: Lcgan, config: TrainingConfig) -> Result<Self> {
        if config.batch_size.gen <= 0 || config.batch_size.dis <= 0 {
            return Err(Error::ConfigError(format!(
                "batch sizes must be > 0, got {:?}",
                config.batch_size
            )));
        }

        let gen_opt = model.optimizer(Network::Generator, &config.gen_optimizer)?;
        let dis_opt = model.optimizer(Network::Discriminator, &config.dis_optimizer)?;

        let device = model.device;
        let batch_size = config.batch_size.gen;
        let (latent_dim, num_classes) = (model.latent_dim(), model.num_classes());
        let (mean, var, seed) = (config.latent_mean, config.latent_var, config.seed);

        let z = Sampler::latent(batch_size, latent_dim, mean, var, seed, device)?;
        let y = Sampler::labels(batch_size, num_classes, seed.wrapping_add(1), device)?;
        let mut fixed_z = Sampler::latent(batch_size, latent_dim, mean, var, seed.wrapping_add(2), device)?;
        let mut fixed_y = Sampler::labels(batch_size, num_classes, seed.wrapping_add(3), device)?;
        fixed_z.sample_();
        fixed_y.sample_();

        Ok(Self {
            model,
            ema: EmaLosses::new(config.ema),
            config,
            gen_opt,
            dis_opt,
            z,
            y,
            fixed_z,
            fixed_y,
            domain: None,
            metrics: TrainingMetrics::new(),
            last_slices: Vec::new(),
            iteration: 0,
        })
    }

    /// Apply `domain` to generated samples before they are scored
    pub fn with_domain_transform(mut self, domain: Box<dyn DomainTransform>) -> Self {
        self.domain = Some(domain);
        self
    }

    fn toggle(&mut self, train_generator: bool) {
        if self.config.toggle_grads {
            self.model.set_trainable(Network::Generator, train_generator);
            self.model.set_trainable(Network::Discriminator, !train_generator);
        }
    }

    /// One full training step: discriminator phase then generator phase
    ///
    /// # Arguments
    ///
    /// * `images` - Real batch of shape (dis_batch_size, channels, height, width)
    /// * `labels` - Labels of the real batch
    /// * `iteration` - Global iteration, used by the loss EMAs
    pub fn train_step(&mut self, images: &Tensor, labels: &Tensor, iteration: usize) -> Result<StepMetrics> {
        self.gen_opt.zero_grad();
        self.dis_opt.zero_grad();

        let dis = self.discriminator_phase(images, labels, iteration)?;
        let gen_loss = self.generator_phase(iteration)?;

        Ok(StepMetrics {
            gen_loss,
            dis_loss_real: dis.loss_real,
            dis_loss_fake: dis.loss_fake,
            dis_real: dis.real,
            dis_fake: dis.fake,
        })
    }

    /// Update the discriminator once per generator-sized slice of the real batch
    ///
    /// Generator parameters receive no gradient. The returned statistics are
    /// averaged over slices.
    pub fn discriminator_phase(&mut self, images: &Tensor, labels: &Tensor, iteration: usize) -> Result<DiscriminatorStats> {
        self.toggle(false);

        let images = images.to_device(self.model.device);
        let labels = labels.to_kind(Kind::Int64).to_device(self.model.device);
        let margin = self.config.margin.resolve(&self.ema);
        let slice = self.config.batch_size.gen;

        let mut slices = Vec::new();

        for (x, dy) in images.split(slice, 0).iter().zip(labels.split(slice, 0).iter()) {
            self.z.sample_();
            self.y.sample_();

            let opts = ForwardOptions {
                train_generator: false,
                train: true,
                policy: &self.config.augment_policy,
                domain: self.domain.as_deref(),
            };
            let (fake, real) = self
                .model
                .score_pair(self.z.current(), self.y.current(), x, dy, &opts)?;

            let (loss_real, loss_fake) = hinge_discriminator_loss(&fake, &real, margin);

            self.dis_opt.zero_grad();
            (&loss_real + &loss_fake).backward();
            self.dis_opt.step();

            slices.push(DiscriminatorStats {
                loss_real: loss_real.double_value(&[]),
                loss_fake: loss_fake.double_value(&[]),
                real: real.mean(Kind::Float).double_value(&[]),
                fake: fake.mean(Kind::Float).double_value(&[]),
            });
        }

        let stats = DiscriminatorStats::average(&slices)
            .ok_or_else(|| Error::ConfigError("empty real batch".to_string()))?;
        self.last_slices = slices;

        self.ema.update(stats.real, DIS_REAL, iteration);
        self.ema.update(stats.fake, DIS_FAKE, iteration);

        Ok(stats)
    }

    /// Update the generator once on a fresh latent batch
    ///
    /// Discriminator parameters receive no gradient.
    pub fn generator_phase(&mut self, iteration: usize) -> Result<f64> {
        self.toggle(true);

        let margin = self.config.margin.resolve(&self.ema);

        self.gen_opt.zero_grad();
        self.z.sample_();
        self.y.sample_();

        let opts = ForwardOptions {
            train_generator: true,
            train: true,
            policy: &self.config.augment_policy,
            domain: self.domain.as_deref(),
        };
        let fake = self
            .model
            .score_generated(self.z.current(), self.y.current(), &opts)?;

        let loss = hinge_generator_loss(&fake, margin);
        loss.backward();
        self.gen_opt.step();

        let value = loss.double_value(&[]);
        self.ema.update(value, GENERATOR_LOSS, iteration);

        Ok(value)
    }

    /// Train for the configured number of epochs
    ///
    /// # Arguments
    ///
    /// * `data_loader` - DataLoader yielding (images, labels) batches
    /// * `sink` - Optional extra receiver of per-epoch averages
    /// * `renderer` - Optional receiver of fixed-latent samples
    ///
    /// # Returns
    ///
    /// Training metrics
    pub fn train(
        &mut self,
        data_loader: &mut DataLoader,
        mut sink: Option<&mut dyn MetricsSink>,
        mut renderer: Option<&mut dyn SampleRenderer>,
    ) -> Result<&TrainingMetrics> {
        let num_batches = data_loader.num_batches();
        let save_path = Path::new(&self.config.save_path).to_path_buf();

        info!(
            "Starting training for {} epochs, {} batches per epoch",
            self.config.epochs, num_batches
        );

        std::fs::create_dir_all(&save_path)?;

        for epoch in 1..=self.config.epochs {
            let averages = self.train_epoch(data_loader, epoch)?;

            self.metrics.record_epoch(epoch, &averages)?;
            if let Some(sink) = sink.as_deref_mut() {
                sink.record_epoch(epoch, &averages)?;
            }

            info!(
                "Epoch {}/{}: G_loss={:.4}, D_loss_real={:.4}, D_loss_fake={:.4}, D_real={:.4}, D_fake={:.4}",
                epoch,
                self.config.epochs,
                averages.get("gen_loss").copied().unwrap_or(f64::NAN),
                averages.get("dis_loss_real").copied().unwrap_or(f64::NAN),
                averages.get("dis_loss_fake").copied().unwrap_or(f64::NAN),
                averages.get("dis_real").copied().unwrap_or(f64::NAN),
                averages.get("dis_fake").copied().unwrap_or(f64::NAN),
            );

            if self.config.sample_every > 0 && epoch % self.config.sample_every == 0 {
                if let Some(renderer) = renderer.as_deref_mut() {
                    let samples = self.sample_fixed()?;
                    renderer.render(epoch, &samples)?;
                }
            }

            if self.config.checkpoint_every > 0 && epoch % self.config.checkpoint_every == 0 {
                save_checkpoint(&self.model, &self.metrics, epoch, &save_path)?;
            }
        }

        self.metrics.save_csv(&save_path.join("training_metrics.csv"))?;

        Ok(&self.metrics)
    }

    /// Run one pass over the data loader and return per-key averages
    pub fn train_epoch(
        &mut self,
        data_loader: &mut DataLoader,
        epoch: usize,
    ) -> Result<std::collections::BTreeMap<String, f64>> {
        let pb = ProgressBar::new(data_loader.num_batches() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .map_err(|e| Error::ConfigError(e.to_string()))?
                .progress_chars("##-"),
        );

        let mut accumulator = EpochAccumulator::new();

        for (images, labels) in data_loader.iter() {
            let metrics = self.train_step(&images, &labels, self.iteration)?;
            self.iteration += 1;
            accumulator.add(&metrics);

            pb.set_message(format!(
                "G: {:.4}, D_real: {:.4}, D_fake: {:.4}",
                metrics.gen_loss, metrics.dis_loss_real, metrics.dis_loss_fake
            ));
            pb.inc(1);
        }

        pb.finish_and_clear();
        debug!("Epoch {} finished after {} steps", epoch, accumulator.len());

        Ok(accumulator.averages())
    }

    /// Samples from the fixed latents and labels, in eval mode
    pub fn sample_fixed(&self) -> Result<Tensor> {
        self.model.generate(self.fixed_z.current(), self.fixed_y.current())
    }

    pub fn model(&self) -> &Lcgan {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Lcgan {
        &mut self.model
    }

    pub fn ema(&self) -> &EmaLosses {
        &self.ema
    }

    /// Latent sampler, holding the most recent draw
    pub fn latent_sampler(&self) -> &Sampler {
        &self.z
    }

    /// Label sampler, holding the most recent draw
    pub fn label_sampler(&self) -> &Sampler {
        &self.y
    }

    /// Per-micro-batch statistics of the most recent discriminator phase
    pub fn last_discriminator_slices(&self) -> &[DiscriminatorStats] {
        &self.last_slices
    }

    /// Get training metrics
    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    /// Get configuration
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Global iteration counter
    pub fn iteration(&self) -> usize {
        self.iteration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_config_default() {
        let config = TrainingConfig::default();
        assert_eq!(config.epochs, 100);
        assert_eq!(config.batch_size.gen, 16);
        assert!(config.toggle_grads);
        assert_eq!(config.margin, HingeMargin::Fixed { value: 1.0 });
    }

    #[test]
    fn test_discriminator_stats_average() {
        assert_eq!(DiscriminatorStats::average(&[]), None);

        let slices = [
            DiscriminatorStats {
                loss_real: 1.0,
                loss_fake: 0.5,
                real: 2.0,
                fake: -1.0,
            },
            DiscriminatorStats {
                loss_real: 0.0,
                loss_fake: 1.5,
                real: 0.0,
                fake: -3.0,
            },
        ];
        let mean = DiscriminatorStats::average(&slices).unwrap();

        assert_eq!(mean.loss_real, 0.5);
        assert_eq!(mean.loss_fake, 1.0);
        assert_eq!(mean.real, 1.0);
        assert_eq!(mean.fake, -2.0);
    }

    #[test]
    fn test_training_config_json_roundtrip() {
        let config = TrainingConfig {
            margin: HingeMargin::Adaptive {
                base: 1.0,
                sensitivity: 0.5,
                min: 0.5,
                max: 2.0,
            },
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let loaded: TrainingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.margin, config.margin);
        assert_eq!(loaded.gen_optimizer, config.gen_optimizer);
    }
}
