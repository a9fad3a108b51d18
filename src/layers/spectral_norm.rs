//! Spectral normalization via power iteration
//!
//! Every learnable convolution, linear and embedding layer in both networks
//! divides its weight by an estimate of the weight's largest singular value.
//! The estimate is refined by one (or more) power-iteration steps per forward
//! pass, with Gram-Schmidt deflation when several singular pairs are tracked.
//!
//! The numeric part ([`power_iteration`]) is pure: it never touches the stored
//! estimates. Refreshing the stored `u` vectors is a separate, explicit step
//! ([`SpectralNorm::commit`]) that only runs in training mode.

use serde::{Deserialize, Serialize};
use tch::{nn, Kind, Tensor};

use crate::error::{Error, Result};

/// Power-iteration settings shared by all spectrally normalized layers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralNormConfig {
    /// Number of singular pairs tracked per layer
    pub num_svs: usize,
    /// Power-iteration passes per forward call
    pub num_itrs: usize,
    /// Floor for norms and singular values
    pub eps: f64,
}

impl Default for SpectralNormConfig {
    fn default() -> Self {
        Self {
            num_svs: 1,
            num_itrs: 1,
            eps: 1e-8,
        }
    }
}

impl SpectralNormConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_svs == 0 || self.num_itrs == 0 {
            return Err(Error::ConfigError(
                "Spectral norm needs at least one singular value and one iteration".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of one power-iteration pass
///
/// `us` and `vs` are detached row vectors of shape `[1, rows]` and
/// `[1, cols]`. `svs` are scalar tensors that stay attached to the weight's
/// autograd graph.
#[derive(Debug)]
pub struct PowerIteration {
    pub us: Vec<Tensor>,
    pub vs: Vec<Tensor>,
    pub svs: Vec<Tensor>,
}

/// Projection of `x` onto `y`: `(x·yᵗ)·y / (y·yᵗ)`
pub fn proj(x: &Tensor, y: &Tensor, eps: f64) -> Tensor {
    let coeff = x.matmul(&y.tr()) / y.matmul(&y.tr()).clamp_min(eps);
    coeff * y
}

/// Orthogonalize `x` against every vector in `ys`
pub fn gram_schmidt(x: Tensor, ys: &[Tensor], eps: f64) -> Tensor {
    ys.iter().fold(x, |x, y| &x - proj(&x, y, eps))
}

/// L2-normalize with a floor on the norm, so zero vectors stay zero
pub fn normalize(x: &Tensor, eps: f64) -> Tensor {
    x / x.norm().clamp_min(eps)
}

/// One power-iteration pass over `w` (shape `[rows, cols]`) starting from `us`
///
/// Vectors are iterated in order; each new `v_i` and `u_i` is deflated
/// against the vectors already produced in this pass.
pub fn power_iteration(w: &Tensor, us: &[Tensor], eps: f64) -> PowerIteration {
    let mut out = PowerIteration {
        us: Vec::with_capacity(us.len()),
        vs: Vec::with_capacity(us.len()),
        svs: Vec::with_capacity(us.len()),
    };

    for u in us {
        let (v, u) = tch::no_grad(|| {
            let v = normalize(&gram_schmidt(u.matmul(w), &out.vs, eps), eps);
            let u = normalize(&gram_schmidt(v.matmul(&w.tr()), &out.us, eps), eps);
            (v, u)
        });

        // Only this product is differentiable with respect to `w`
        let sv = v.matmul(&w.tr()).matmul(&u.tr()).squeeze();

        out.vs.push(v);
        out.us.push(u);
        out.svs.push(sv);
    }

    out
}

/// Stored singular-vector estimates for one weight tensor
///
/// `u<i>` and `sv<i>` are registered as non-trainable variables so they are
/// saved with checkpoints but never seen by the optimizer.
#[derive(Debug)]
pub struct SpectralNorm {
    us: Vec<Tensor>,
    svs: Vec<Tensor>,
    config: SpectralNormConfig,
    transpose: bool,
}

impl SpectralNorm {
    /// Register estimates for a weight whose 2D view has `num_outputs` rows
    pub fn new(p: &nn::Path, num_outputs: i64, config: SpectralNormConfig, transpose: bool) -> Self {
        let num_svs = config.num_svs.max(1);

        let us = (0..num_svs)
            .map(|i| {
                let mut u = p.zeros_no_train(&format!("u{}", i), &[1, num_outputs]);
                let init = Tensor::randn([1, num_outputs], (Kind::Float, p.device()));
                tch::no_grad(|| u.copy_(&init));
                u
            })
            .collect();

        let svs = (0..num_svs)
            .map(|i| p.ones_no_train(&format!("sv{}", i), &[1]))
            .collect();

        Self {
            us,
            svs,
            config: SpectralNormConfig { num_svs, ..config },
            transpose,
        }
    }

    /// Reshape a weight to `[outDim, flattenedInDim]`, transposed if configured
    pub fn weight_matrix(&self, weight: &Tensor) -> Tensor {
        let w = weight.reshape([weight.size()[0], -1]);
        if self.transpose {
            w.tr()
        } else {
            w
        }
    }

    /// Run `num_itrs` passes from the stored vectors without mutating them
    pub fn estimate(&self, w_mat: &Tensor) -> PowerIteration {
        let mut estimate = power_iteration(w_mat, &self.us, self.config.eps);
        for _ in 1..self.config.num_itrs {
            let us: Vec<Tensor> = estimate.us.iter().map(Tensor::shallow_clone).collect();
            estimate = power_iteration(w_mat, &us, self.config.eps);
        }
        estimate
    }

    /// Overwrite the stored estimates with the result of a pass
    pub fn commit(&self, estimate: &PowerIteration) {
        tch::no_grad(|| {
            for (stored, u) in self.us.iter().zip(&estimate.us) {
                stored.shallow_clone().copy_(u);
            }
            for (stored, sv) in self.svs.iter().zip(&estimate.svs) {
                stored.shallow_clone().copy_(&sv.detach().reshape([1]));
            }
        });
    }

    /// Spectrally normalized weight `W / sv_0`
    ///
    /// Stored estimates are refreshed only when `train` is set.
    pub fn normalize(&self, weight: &Tensor, train: bool) -> Tensor {
        let estimate = self.estimate(&self.weight_matrix(weight));
        if train {
            self.commit(&estimate);
        }
        weight / estimate.svs[0].clamp_min(self.config.eps)
    }

    /// Stored left singular vectors
    pub fn u(&self) -> &[Tensor] {
        &self.us
    }

    /// Last singular values recorded in training mode
    pub fn singular_values(&self) -> Vec<f64> {
        self.svs.iter().map(|sv| sv.double_value(&[0])).collect()
    }

    pub fn config(&self) -> &SpectralNormConfig {
        &self.config
    }
}
