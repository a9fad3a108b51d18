//! Spectrally normalized convolution, linear and embedding layers
//!
//! A base layer only knows how to apply itself with a given weight. The
//! [`SpectralNormed`] wrapper supplies that weight after normalization, so the
//! same power-iteration logic serves all three layer kinds.

use tch::{nn, nn::Init, Tensor};

use super::init::{fan_in_uniform, WeightInit};
use super::spectral_norm::{SpectralNorm, SpectralNormConfig};

/// A layer whose output can be computed from an externally supplied weight
pub trait WeightedLayer {
    /// The raw (unnormalized) weight
    fn weight(&self) -> &Tensor;

    /// Apply the layer using `weight` instead of the stored one
    fn forward_with_weight(&self, xs: &Tensor, weight: &Tensor) -> Tensor;

    /// Number of trainable parameters
    fn num_params(&self) -> usize;
}

/// 2D convolution with stride 1
#[derive(Debug)]
pub struct Conv2dBase {
    pub ws: Tensor,
    pub bs: Option<Tensor>,
    padding: i64,
}

impl Conv2dBase {
    pub fn new(p: &nn::Path, in_channels: i64, out_channels: i64, ksize: i64, padding: i64, init: WeightInit) -> Self {
        let dims = [out_channels, in_channels, ksize, ksize];
        let fan_in = in_channels * ksize * ksize;
        let ws = p.var("weight", &dims, init.resolve(&dims, fan_in_uniform(fan_in)));
        let bs = Some(p.var("bias", &[out_channels], fan_in_uniform(fan_in)));
        Self { ws, bs, padding }
    }
}

impl WeightedLayer for Conv2dBase {
    fn weight(&self) -> &Tensor {
        &self.ws
    }

    fn forward_with_weight(&self, xs: &Tensor, weight: &Tensor) -> Tensor {
        xs.conv2d(weight, self.bs.as_ref(), [1, 1], [self.padding, self.padding], [1, 1], 1)
    }

    fn num_params(&self) -> usize {
        self.ws.numel() + self.bs.as_ref().map_or(0, Tensor::numel)
    }
}

/// Fully connected layer
#[derive(Debug)]
pub struct LinearBase {
    pub ws: Tensor,
    pub bs: Option<Tensor>,
}

impl LinearBase {
    pub fn new(p: &nn::Path, in_features: i64, out_features: i64, init: WeightInit) -> Self {
        let dims = [out_features, in_features];
        let ws = p.var("weight", &dims, init.resolve(&dims, fan_in_uniform(in_features)));
        let bs = Some(p.var("bias", &[out_features], fan_in_uniform(in_features)));
        Self { ws, bs }
    }
}

impl WeightedLayer for LinearBase {
    fn weight(&self) -> &Tensor {
        &self.ws
    }

    fn forward_with_weight(&self, xs: &Tensor, weight: &Tensor) -> Tensor {
        let out = xs.matmul(&weight.tr());
        match &self.bs {
            Some(bs) => out + bs,
            None => out,
        }
    }

    fn num_params(&self) -> usize {
        self.ws.numel() + self.bs.as_ref().map_or(0, Tensor::numel)
    }
}

/// Lookup table from class index to a dense vector
#[derive(Debug)]
pub struct EmbeddingBase {
    pub ws: Tensor,
}

impl EmbeddingBase {
    pub fn new(p: &nn::Path, num_embeddings: i64, embedding_dim: i64, init: WeightInit) -> Self {
        let dims = [num_embeddings, embedding_dim];
        let fallback = Init::Randn {
            mean: 0.0,
            stdev: 1.0,
        };
        let ws = p.var("weight", &dims, init.resolve(&dims, fallback));
        Self { ws }
    }
}

impl WeightedLayer for EmbeddingBase {
    fn weight(&self) -> &Tensor {
        &self.ws
    }

    fn forward_with_weight(&self, xs: &Tensor, weight: &Tensor) -> Tensor {
        Tensor::embedding(weight, xs, -1, false, false)
    }

    fn num_params(&self) -> usize {
        self.ws.numel()
    }
}

/// Any [`WeightedLayer`] whose weight is divided by its top singular value
#[derive(Debug)]
pub struct SpectralNormed<L: WeightedLayer> {
    layer: L,
    sn: SpectralNorm,
}

impl<L: WeightedLayer> SpectralNormed<L> {
    pub fn new(p: &nn::Path, layer: L, config: SpectralNormConfig) -> Self {
        let num_outputs = layer.weight().size()[0];
        let sn = SpectralNorm::new(p, num_outputs, config, false);
        Self { layer, sn }
    }

    /// Forward pass; `train` controls whether the stored estimates advance
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let weight = self.sn.normalize(self.layer.weight(), train);
        self.layer.forward_with_weight(xs, &weight)
    }

    pub fn layer(&self) -> &L {
        &self.layer
    }

    pub fn spectral_norm(&self) -> &SpectralNorm {
        &self.sn
    }

    pub fn num_params(&self) -> usize {
        self.layer.num_params()
    }
}

pub type SnConv2d = SpectralNormed<Conv2dBase>;
pub type SnLinear = SpectralNormed<LinearBase>;
pub type SnEmbedding = SpectralNormed<EmbeddingBase>;

/// Shared settings for building the spectrally normalized layers of a network
#[derive(Debug, Clone, Copy)]
pub struct SnLayerSpec {
    pub sn: SpectralNormConfig,
    pub init: WeightInit,
}

impl SnLayerSpec {
    pub fn new(sn: SpectralNormConfig, init: WeightInit) -> Self {
        Self { sn, init }
    }

    /// 3x3 convolution, padding 1
    pub fn conv3x3(&self, p: nn::Path, in_channels: i64, out_channels: i64) -> SnConv2d {
        let layer = Conv2dBase::new(&p, in_channels, out_channels, 3, 1, self.init);
        SpectralNormed::new(&p, layer, self.sn)
    }

    /// 1x1 convolution, no padding
    pub fn conv1x1(&self, p: nn::Path, in_channels: i64, out_channels: i64) -> SnConv2d {
        let layer = Conv2dBase::new(&p, in_channels, out_channels, 1, 0, self.init);
        SpectralNormed::new(&p, layer, self.sn)
    }

    pub fn linear(&self, p: nn::Path, in_features: i64, out_features: i64) -> SnLinear {
        let layer = LinearBase::new(&p, in_features, out_features, self.init);
        SpectralNormed::new(&p, layer, self.sn)
    }

    pub fn embedding(&self, p: nn::Path, num_embeddings: i64, embedding_dim: i64) -> SnEmbedding {
        let layer = EmbeddingBase::new(&p, num_embeddings, embedding_dim, self.init);
        SpectralNormed::new(&p, layer, self.sn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::VarStore, Device, Kind};

    fn layer_spec() -> SnLayerSpec {
        SnLayerSpec::new(SpectralNormConfig::default(), WeightInit::Orthogonal)
    }

    #[test]
    fn test_conv_shapes() {
        let vs = VarStore::new(Device::Cpu);
        let conv = layer_spec().conv3x3(vs.root() / "conv", 4, 8);
        let sc = layer_spec().conv1x1(vs.root() / "sc", 4, 8);

        let xs = Tensor::randn([2, 4, 6, 6], (Kind::Float, Device::Cpu));
        assert_eq!(conv.forward_t(&xs, true).size(), vec![2, 8, 6, 6]);
        assert_eq!(sc.forward_t(&xs, true).size(), vec![2, 8, 6, 6]);
        assert_eq!(conv.num_params(), 8 * 4 * 9 + 8);
    }

    #[test]
    fn test_linear_and_embedding_shapes() {
        let vs = VarStore::new(Device::Cpu);
        let linear = layer_spec().linear(vs.root() / "linear", 5, 3);
        let embed = layer_spec().embedding(vs.root() / "embed", 4, 6);

        let xs = Tensor::randn([7, 5], (Kind::Float, Device::Cpu));
        assert_eq!(linear.forward_t(&xs, false).size(), vec![7, 3]);

        let ys = Tensor::from_slice(&[0i64, 3, 1]);
        assert_eq!(embed.forward_t(&ys, false).size(), vec![3, 6]);
    }

    #[test]
    fn test_buffers_are_not_trainable() {
        let vs = VarStore::new(Device::Cpu);
        let _linear = layer_spec().linear(vs.root() / "linear", 5, 3);

        // weight + bias; u0 and sv0 are buffers
        assert_eq!(vs.trainable_variables().len(), 2);
        assert_eq!(vs.variables().len(), 4);
    }

    #[test]
    fn test_linear_output_is_bounded() {
        let vs = VarStore::new(Device::Cpu);
        let config = SpectralNormConfig {
            num_itrs: 100,
            ..Default::default()
        };
        let linear = SnLayerSpec::new(config, WeightInit::Normal02).linear(vs.root() / "l", 16, 16);

        // Without bias the normalized map cannot stretch its input
        let xs = Tensor::randn([32, 16], (Kind::Float, Device::Cpu));
        let bias = linear.layer().bs.as_ref().map(Tensor::shallow_clone);
        let out = match bias {
            Some(bs) => linear.forward_t(&xs, true) - bs,
            None => linear.forward_t(&xs, true),
        };
        let ratio = out.norm_scalaropt_dim(2, [1i64].as_slice(), false)
            / xs.norm_scalaropt_dim(2, [1i64].as_slice(), false);
        assert!(ratio.max().double_value(&[]) <= 1.0 + 1e-3);
    }
}
