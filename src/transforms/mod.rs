//! Differentiable transforms on discriminator inputs

pub mod augment;
pub mod domain;

pub use augment::{augment, parse_policy, AugmentOp};
pub use domain::{BandProjection, DomainTransform};
