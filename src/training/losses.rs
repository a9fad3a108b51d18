//! Hinge losses for adversarial training
//!
//! Discriminator scores are scaled by a margin `m` before the hinge, so the
//! discriminator is satisfied once `real > 1/m` and `fake < -1/m`.

use serde::{Deserialize, Serialize};
use tch::{Kind, Tensor};

use super::ema::{EmaLosses, GENERATOR_LOSS};

/// Discriminator hinge loss
///
/// # Arguments
///
/// * `fake` - Discriminator scores on generated samples
/// * `real` - Discriminator scores on real samples
/// * `margin` - Score scale applied inside the hinge
///
/// # Returns
///
/// Tuple of scalar losses (real, fake)
pub fn hinge_discriminator_loss(fake: &Tensor, real: &Tensor, margin: f64) -> (Tensor, Tensor) {
    let loss_real = (real * (-margin) + 1.0).relu().mean(Kind::Float);
    let loss_fake = (fake * margin + 1.0).relu().mean(Kind::Float);
    (loss_real, loss_fake)
}

/// Generator hinge loss: `-mean(m * fake)`
pub fn hinge_generator_loss(fake: &Tensor, margin: f64) -> Tensor {
    -(fake * margin).mean(Kind::Float)
}

/// Margin used by both hinge losses
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HingeMargin {
    /// Constant margin
    Fixed { value: f64 },
    /// `base * (1 + sensitivity * tanh(ema_gen_loss))`, clamped to `[min, max]`
    Adaptive {
        base: f64,
        sensitivity: f64,
        min: f64,
        max: f64,
    },
}

impl Default for HingeMargin {
    fn default() -> Self {
        HingeMargin::Fixed { value: 1.0 }
    }
}

impl HingeMargin {
    /// Margin for the current step given the tracked losses
    pub fn resolve(&self, ema: &EmaLosses) -> f64 {
        match *self {
            HingeMargin::Fixed { value } => value,
            HingeMargin::Adaptive {
                base,
                sensitivity,
                min,
                max,
            } => {
                let trend = ema.get(GENERATOR_LOSS).tanh();
                (base * (1.0 + sensitivity * trend)).clamp(min, max)
            }
        }
    }
}
