//! Network architecture
//!
//! - `Generator`: class-conditional residual generator
//! - `Discriminator`: projection discriminator
//! - `SpectralAutoencoder`: frozen latent codec
//! - `Lcgan`: wrapper tying both networks together

pub mod autoencoder;
pub mod blocks;
pub mod discriminator;
pub mod generator;
pub mod lcgan;

pub use autoencoder::{AutoencoderConfig, LatentCodec, SpectralAutoencoder};
pub use blocks::{DBlock, GBlock};
pub use discriminator::{Discriminator, DiscriminatorConfig};
pub use generator::{Generator, GeneratorConfig};
pub use lcgan::{ForwardOptions, Lcgan, Network};
