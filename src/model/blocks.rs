//! Residual blocks for the generator and discriminator

use tch::{nn, Tensor};

use crate::error::Result;
use crate::layers::{ConditionalAffineNorm, NormStyle, SnConv2d, SnLayerSpec, WeightInit};

/// Nearest-neighbour upsampling by an integer factor
pub fn upsample_nearest(x: &Tensor, factor: i64) -> Tensor {
    let size = x.size();
    x.upsample_nearest2d([size[2] * factor, size[3] * factor], None::<f64>, None::<f64>)
}

/// 2x2 average pooling
pub fn downsample(x: &Tensor) -> Tensor {
    x.avg_pool2d_default(2)
}

/// Settings for the conditional norms inside generator blocks
#[derive(Debug, Clone)]
pub struct ConditionalNormSpec {
    pub num_classes: i64,
    pub style: NormStyle,
    pub init: WeightInit,
    pub eps: f64,
}

impl ConditionalNormSpec {
    pub fn build(&self, p: nn::Path, channels: i64) -> ConditionalAffineNorm {
        ConditionalAffineNorm::new(&p, channels, self.num_classes, self.style.clone(), self.init, self.eps)
    }
}

/// Generator residual block
///
/// ```text
/// h = relu(bn1(x, y)) -> upsample -> conv3x3 -> relu(bn2(., y)) -> conv3x3
/// out = h + shortcut(upsample(x))
/// ```
#[derive(Debug)]
pub struct GBlock {
    conv1: SnConv2d,
    conv2: SnConv2d,
    conv_sc: Option<SnConv2d>,
    bn1: ConditionalAffineNorm,
    bn2: ConditionalAffineNorm,
    upsample: Option<i64>,
}

impl GBlock {
    pub fn new(
        p: &nn::Path,
        in_channels: i64,
        out_channels: i64,
        upsample: Option<i64>,
        layers: &SnLayerSpec,
        norm: &ConditionalNormSpec,
    ) -> Self {
        let learnable_sc = in_channels != out_channels || upsample.is_some();

        Self {
            conv1: layers.conv3x3(p / "conv1", in_channels, out_channels),
            conv2: layers.conv3x3(p / "conv2", out_channels, out_channels),
            conv_sc: learnable_sc.then(|| layers.conv1x1(p / "conv_sc", in_channels, out_channels)),
            bn1: norm.build(p / "bn1", in_channels),
            bn2: norm.build(p / "bn2", out_channels),
            upsample,
        }
    }

    pub fn forward_t(&self, x: &Tensor, y: &Tensor, train: bool) -> Result<Tensor> {
        let mut h = self.bn1.forward_t(x, y, train)?.relu();
        let mut x = x.shallow_clone();

        if let Some(factor) = self.upsample {
            h = upsample_nearest(&h, factor);
            x = upsample_nearest(&x, factor);
        }

        let h = self.conv1.forward_t(&h, train);
        let h = self.bn2.forward_t(&h, y, train)?.relu();
        let h = self.conv2.forward_t(&h, train);

        let x = match &self.conv_sc {
            Some(conv_sc) => conv_sc.forward_t(&x, train),
            None => x,
        };

        Ok(h + x)
    }

    pub fn num_params(&self) -> usize {
        self.conv1.num_params()
            + self.conv2.num_params()
            + self.conv_sc.as_ref().map_or(0, SnConv2d::num_params)
            + self.bn1.num_params()
            + self.bn2.num_params()
    }
}

/// Discriminator residual block
///
/// With preactivation the input is passed through ReLU first and the
/// shortcut convolves before pooling; otherwise the shortcut pools first.
#[derive(Debug)]
pub struct DBlock {
    conv1: SnConv2d,
    conv2: SnConv2d,
    conv_sc: Option<SnConv2d>,
    preactivation: bool,
    downsample: bool,
}

impl DBlock {
    pub fn new(
        p: &nn::Path,
        in_channels: i64,
        out_channels: i64,
        layers: &SnLayerSpec,
        wide: bool,
        preactivation: bool,
        downsample: bool,
    ) -> Self {
        let hidden = if wide { out_channels } else { in_channels };
        let learnable_sc = in_channels != out_channels || downsample;

        Self {
            conv1: layers.conv3x3(p / "conv1", in_channels, hidden),
            conv2: layers.conv3x3(p / "conv2", hidden, out_channels),
            conv_sc: learnable_sc.then(|| layers.conv1x1(p / "conv_sc", in_channels, out_channels)),
            preactivation,
            downsample,
        }
    }

    fn shortcut(&self, x: &Tensor, train: bool) -> Tensor {
        let pool = |x: Tensor| if self.downsample { downsample(&x) } else { x };
        match (&self.conv_sc, self.preactivation) {
            (Some(conv_sc), true) => pool(conv_sc.forward_t(x, train)),
            (Some(conv_sc), false) => conv_sc.forward_t(&pool(x.shallow_clone()), train),
            (None, _) => pool(x.shallow_clone()),
        }
    }

    pub fn forward_t(&self, x: &Tensor, train: bool) -> Tensor {
        let h = if self.preactivation { x.relu() } else { x.shallow_clone() };
        let h = self.conv1.forward_t(&h, train).relu();
        let h = self.conv2.forward_t(&h, train);
        let h = if self.downsample { downsample(&h) } else { h };
        h + self.shortcut(x, train)
    }

    pub fn num_params(&self) -> usize {
        self.conv1.num_params()
            + self.conv2.num_params()
            + self.conv_sc.as_ref().map_or(0, SnConv2d::num_params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::SpectralNormConfig;
    use tch::{nn::VarStore, Device, Kind};

    fn layers() -> SnLayerSpec {
        SnLayerSpec::new(SpectralNormConfig::default(), WeightInit::Orthogonal)
    }

    fn norm() -> ConditionalNormSpec {
        ConditionalNormSpec {
            num_classes: 3,
            style: NormStyle::Batch,
            init: WeightInit::Orthogonal,
            eps: 1e-5,
        }
    }

    #[test]
    fn test_gblock_upsamples() {
        let vs = VarStore::new(Device::Cpu);
        let block = GBlock::new(&vs.root(), 8, 4, Some(2), &layers(), &norm());

        let x = Tensor::randn([2, 8, 4, 4], (Kind::Float, Device::Cpu));
        let y = Tensor::from_slice(&[0i64, 2]);
        let out = block.forward_t(&x, &y, true).unwrap();

        assert_eq!(out.size(), vec![2, 4, 8, 8]);
    }

    #[test]
    fn test_gblock_identity_shortcut() {
        let vs = VarStore::new(Device::Cpu);
        let block = GBlock::new(&vs.root(), 4, 4, None, &layers(), &norm());
        assert!(block.conv_sc.is_none());

        let x = Tensor::randn([2, 4, 4, 4], (Kind::Float, Device::Cpu));
        let y = Tensor::from_slice(&[1i64, 1]);
        assert_eq!(block.forward_t(&x, &y, false).unwrap().size(), vec![2, 4, 4, 4]);
    }

    #[test]
    fn test_dblock_downsamples() {
        let vs = VarStore::new(Device::Cpu);
        let block = DBlock::new(&vs.root(), 3, 8, &layers(), true, false, true);

        let x = Tensor::randn([2, 3, 8, 8], (Kind::Float, Device::Cpu));
        assert_eq!(block.forward_t(&x, true).size(), vec![2, 8, 4, 4]);
    }

    #[test]
    fn test_dblock_without_downsample() {
        let vs = VarStore::new(Device::Cpu);
        let block = DBlock::new(&vs.root(), 8, 8, &layers(), false, true, false);
        assert!(block.conv_sc.is_none());

        let x = Tensor::randn([2, 8, 4, 4], (Kind::Float, Device::Cpu));
        assert_eq!(block.forward_t(&x, true).size(), vec![2, 8, 4, 4]);
    }

    #[test]
    fn test_upsample_nearest_repeats_pixels() {
        let x = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0]).view([1, 1, 2, 2]);
        let up = upsample_nearest(&x, 2);

        assert_eq!(up.size(), vec![1, 1, 4, 4]);
        assert_eq!(up.double_value(&[0, 0, 0, 1]), 1.0);
        assert_eq!(up.double_value(&[0, 0, 3, 3]), 4.0);
    }
}
