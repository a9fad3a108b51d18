//! Weight initialization styles
//!
//! Both networks pick one style by name and apply it to every convolution,
//! linear and embedding weight they create.

use tch::nn::Init;
use tracing::warn;

/// Initialization applied to layer weights at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightInit {
    /// Orthogonal matrix with unit gain
    Orthogonal,
    /// Normal with mean 0 and std 0.02
    Normal02,
    /// Glorot/Xavier uniform
    XavierUniform,
    /// Layer's own default
    Default,
}

impl WeightInit {
    /// Parse an init style name
    ///
    /// Unrecognized names log a warning and keep each layer's default.
    pub fn from_style(style: &str) -> Self {
        match style {
            "ortho" | "orthogonal" => WeightInit::Orthogonal,
            "N02" => WeightInit::Normal02,
            "glorot" | "xavier" => WeightInit::XavierUniform,
            "default" => WeightInit::Default,
            other => {
                warn!("Init style '{}' not recognized, keeping layer defaults", other);
                WeightInit::Default
            }
        }
    }

    /// Concrete initializer for a weight of shape `dims`
    ///
    /// `fallback` is what the layer would use on its own.
    pub fn resolve(self, dims: &[i64], fallback: Init) -> Init {
        match self {
            WeightInit::Orthogonal => Init::Orthogonal { gain: 1.0 },
            WeightInit::Normal02 => Init::Randn {
                mean: 0.0,
                stdev: 0.02,
            },
            WeightInit::XavierUniform => {
                let (fan_in, fan_out) = fans(dims);
                let bound = (6.0 / (fan_in + fan_out).max(1) as f64).sqrt();
                Init::Uniform {
                    lo: -bound,
                    up: bound,
                }
            }
            WeightInit::Default => fallback,
        }
    }
}

/// Fan-in and fan-out of a weight shaped `[out, in, k...]`
pub fn fans(dims: &[i64]) -> (i64, i64) {
    let receptive: i64 = dims.iter().skip(2).product();
    let fan_out = dims.first().copied().unwrap_or(1) * receptive;
    let fan_in = dims.get(1).copied().unwrap_or(1) * receptive;
    (fan_in, fan_out)
}

/// Uniform in ±1/sqrt(fan_in), used for conv/linear weights and biases
pub fn fan_in_uniform(fan_in: i64) -> Init {
    let bound = 1.0 / (fan_in.max(1) as f64).sqrt();
    Init::Uniform {
        lo: -bound,
        up: bound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_names() {
        assert_eq!(WeightInit::from_style("ortho"), WeightInit::Orthogonal);
        assert_eq!(WeightInit::from_style("N02"), WeightInit::Normal02);
        assert_eq!(WeightInit::from_style("glorot"), WeightInit::XavierUniform);
        assert_eq!(WeightInit::from_style("xavier"), WeightInit::XavierUniform);
        assert_eq!(WeightInit::from_style("kaiming"), WeightInit::Default);
    }

    #[test]
    fn test_fans() {
        assert_eq!(fans(&[64, 32, 3, 3]), (288, 576));
        assert_eq!(fans(&[10, 20]), (20, 10));
    }

    #[test]
    fn test_xavier_bound() {
        match WeightInit::XavierUniform.resolve(&[10, 20], fan_in_uniform(20)) {
            Init::Uniform { lo, up } => {
                assert!((up - (6.0f64 / 30.0).sqrt()).abs() < 1e-12);
                assert_eq!(lo, -up);
            }
            other => panic!("unexpected init {:?}", other),
        }
    }
}
