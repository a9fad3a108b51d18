//! Seeded samplers for latents and labels
//!
//! Each sampler owns its own RNG and a tensor that is refilled in place by
//! [`Sampler::sample_`], so reruns with the same seed draw identical batches.

use rand::{distributions::Uniform, rngs::StdRng, SeedableRng};
use rand_distr::{Distribution as _, Normal};
use tch::{Device, Kind, Tensor};

use crate::error::{Error, Result};

/// What a sampler draws
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distribution {
    /// Gaussian with `var` used as the standard deviation
    Normal { mean: f64, var: f64 },
    /// Uniform class index in `[0, num_categories)`
    Categorical { num_categories: i64 },
    /// Always class 0, for two-class comparison setups
    Comparison { num_categories: i64 },
}

impl Distribution {
    /// Parse a distribution kind (`normal`, `categorical`, `comparison`)
    pub fn from_kind(kind: &str, mean: f64, var: f64, num_categories: i64) -> Result<Self> {
        match kind {
            "normal" => Ok(Distribution::Normal { mean, var }),
            "categorical" => Ok(Distribution::Categorical { num_categories }),
            "comparison" => Ok(Distribution::Comparison { num_categories }),
            other => Err(Error::UnknownDistribution(other.to_string())),
        }
    }
}

enum Draw {
    Normal(Normal<f64>),
    Categorical(Uniform<i64>),
    Zero,
}

/// A fixed-shape tensor refilled from a seeded distribution
pub struct Sampler {
    distribution: Distribution,
    draw: Draw,
    shape: Vec<i64>,
    device: Device,
    rng: StdRng,
    current: Tensor,
}

impl Sampler {
    pub fn new(distribution: Distribution, shape: &[i64], seed: u64, device: Device) -> Result<Self> {
        let (draw, kind) = match distribution {
            Distribution::Normal { mean, var } => {
                let normal = Normal::new(mean, var)
                    .map_err(|e| Error::ConfigError(format!("invalid normal distribution: {}", e)))?;
                (Draw::Normal(normal), Kind::Float)
            }
            Distribution::Categorical { num_categories } => {
                if num_categories <= 0 {
                    return Err(Error::ConfigError(format!(
                        "number of categories must be > 0, got {}",
                        num_categories
                    )));
                }
                (Draw::Categorical(Uniform::new(0, num_categories)), Kind::Int64)
            }
            Distribution::Comparison { .. } => (Draw::Zero, Kind::Int64),
        };

        Ok(Self {
            distribution,
            draw,
            shape: shape.to_vec(),
            device,
            rng: StdRng::seed_from_u64(seed),
            current: Tensor::zeros(shape, (kind, device)),
        })
    }

    /// Latent sampler of shape `[batch_size, latent_dim]`
    pub fn latent(batch_size: i64, latent_dim: i64, mean: f64, var: f64, seed: u64, device: Device) -> Result<Self> {
        Self::new(Distribution::Normal { mean, var }, &[batch_size, latent_dim], seed, device)
    }

    /// Label sampler of shape `[batch_size]`
    ///
    /// Two-class setups sample the comparison label (always 0).
    pub fn labels(batch_size: i64, num_classes: i64, seed: u64, device: Device) -> Result<Self> {
        let distribution = if num_classes == 2 {
            Distribution::Comparison {
                num_categories: num_classes,
            }
        } else {
            Distribution::Categorical {
                num_categories: num_classes,
            }
        };
        Self::new(distribution, &[batch_size], seed, device)
    }

    /// Refill the tensor with a fresh draw
    pub fn sample_(&mut self) -> &Tensor {
        let numel: i64 = self.shape.iter().product();

        self.current = match &self.draw {
            Draw::Normal(normal) => {
                let values: Vec<f32> = (0..numel).map(|_| normal.sample(&mut self.rng) as f32).collect();
                Tensor::from_slice(&values).view(self.shape.as_slice()).to_device(self.device)
            }
            Draw::Categorical(uniform) => {
                let values: Vec<i64> = (0..numel).map(|_| uniform.sample(&mut self.rng)).collect();
                Tensor::from_slice(&values).view(self.shape.as_slice()).to_device(self.device)
            }
            Draw::Zero => Tensor::zeros(self.shape.as_slice(), (Kind::Int64, self.device)),
        };

        &self.current
    }

    /// Most recent draw (zeros before the first call to `sample_`)
    pub fn current(&self) -> &Tensor {
        &self.current
    }

    pub fn distribution(&self) -> Distribution {
        self.distribution
    }

    pub fn batch_size(&self) -> i64 {
        self.shape[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_draws() {
        let mut a = Sampler::latent(4, 8, 0.0, 1.0, 42, Device::Cpu).unwrap();
        let mut b = Sampler::latent(4, 8, 0.0, 1.0, 42, Device::Cpu).unwrap();

        for _ in 0..3 {
            let xa = a.sample_().shallow_clone();
            assert!(xa.equal(b.sample_()));
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let mut a = Sampler::latent(4, 8, 0.0, 1.0, 1, Device::Cpu).unwrap();
        let mut b = Sampler::latent(4, 8, 0.0, 1.0, 2, Device::Cpu).unwrap();

        let xa = a.sample_().shallow_clone();
        assert!(!xa.equal(b.sample_()));
    }

    #[test]
    fn test_normal_moments() {
        let mut sampler = Sampler::latent(100, 100, 0.5, 2.0, 3, Device::Cpu).unwrap();
        let z = sampler.sample_();

        assert_eq!(z.kind(), Kind::Float);
        assert!((z.mean(Kind::Float).double_value(&[]) - 0.5).abs() < 0.1);
        assert!((z.std(true).double_value(&[]) - 2.0).abs() < 0.1);
    }

    #[test]
    fn test_categorical_range() {
        let mut sampler = Sampler::labels(500, 5, 7, Device::Cpu).unwrap();
        let y = sampler.sample_().shallow_clone();

        assert_eq!(y.kind(), Kind::Int64);
        assert_eq!(y.size(), vec![500]);
        assert!(y.min().int64_value(&[]) >= 0);
        assert!(y.max().int64_value(&[]) < 5);
        assert!(matches!(sampler.distribution(), Distribution::Categorical { .. }));
    }

    #[test]
    fn test_two_classes_use_comparison() {
        let mut sampler = Sampler::labels(16, 2, 0, Device::Cpu).unwrap();
        let y = sampler.sample_().shallow_clone();

        assert!(matches!(sampler.distribution(), Distribution::Comparison { .. }));
        assert_eq!(y.abs().sum(Kind::Int64).int64_value(&[]), 0);
    }

    #[test]
    fn test_from_kind() {
        assert!(matches!(
            Distribution::from_kind("normal", 0.0, 1.0, 0),
            Ok(Distribution::Normal { .. })
        ));
        assert!(matches!(
            Distribution::from_kind("poisson", 0.0, 1.0, 0),
            Err(Error::UnknownDistribution(_))
        ));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(Sampler::latent(2, 2, 0.0, -1.0, 0, Device::Cpu).is_err());
        assert!(Sampler::labels(2, 0, 0, Device::Cpu).is_err());
    }
}
