//! Normalized building blocks shared by both networks

pub mod conditional_norm;
pub mod init;
pub mod sn_layers;
pub mod spectral_norm;

pub use conditional_norm::{ConditionalAffineNorm, GroupSpec, NormStyle};
pub use init::WeightInit;
pub use sn_layers::{SnConv2d, SnEmbedding, SnLayerSpec, SnLinear, SpectralNormed, WeightedLayer};
pub use spectral_norm::{power_iteration, PowerIteration, SpectralNorm, SpectralNormConfig};
