//! # Latent Conditional GAN for Hyperspectral Imagery
//!
//! This crate provides a class-conditional GAN with spectrally normalized
//! layers for generating synthetic hyperspectral image cubes, optionally in
//! the latent space of a frozen spectral autoencoder.
//!
//! ## Modules
//!
//! - `layers`: spectral normalization, conditional affine norm, weight init
//! - `model`: generator, discriminator, autoencoder and the `Lcgan` wrapper
//! - `transforms`: differentiable augmentation and domain transforms
//! - `training`: hinge losses, samplers, EMAs and the training loop
//! - `data`: DataLoader for labelled image cubes
//! - `utils`: configuration, checkpoints and sample rendering

pub mod data;
pub mod error;
pub mod layers;
pub mod model;
pub mod training;
pub mod transforms;
pub mod utils;

pub use data::DataLoader;
pub use error::{Error, Result};
pub use layers::{ConditionalAffineNorm, SpectralNorm, SpectralNormConfig};
pub use model::{Discriminator, Generator, Lcgan, SpectralAutoencoder};
pub use training::{Trainer, TrainingConfig, TrainingMetrics};
pub use utils::{load_checkpoint, save_checkpoint, Config};
