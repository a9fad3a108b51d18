//! Training module
//!
//! This module provides:
//! - Adversarial training loop with micro-batched discriminator updates
//! - Hinge losses and margin scheduling
//! - Seeded samplers, loss EMAs and epoch metrics

pub mod ema;
pub mod losses;
pub mod metrics;
pub mod sampler;
pub mod trainer;

pub use ema::{EmaConfig, EmaLosses};
pub use losses::{hinge_discriminator_loss, hinge_generator_loss, HingeMargin};
pub use metrics::{EpochAccumulator, MetricsSink, StepMetrics, TrainingMetrics};
pub use sampler::{Distribution, Sampler};
pub use trainer::{BatchSize, DiscriminatorStats, OptimizerConfig, Trainer, TrainingConfig};
