//! Domain transforms applied to generated samples before scoring

use tch::{Device, Kind, Tensor};

/// Differentiable map from generator output to discriminator input space
pub trait DomainTransform {
    fn apply(&self, images: &Tensor) -> Tensor;

    fn out_channels(&self) -> i64;
}

/// Fixed projection averaging contiguous band ranges into fewer channels
///
/// Band `b` of `bands` goes to output channel `b * out_channels / bands`.
#[derive(Debug)]
pub struct BandProjection {
    weight: Tensor,
    out_channels: i64,
}

impl BandProjection {
    pub fn new(bands: i64, out_channels: i64, device: Device) -> Self {
        let out_channels = out_channels.clamp(1, bands.max(1));
        let group = |b: i64| b * out_channels / bands;

        let mut counts = vec![0i64; out_channels as usize];
        for b in 0..bands {
            counts[group(b) as usize] += 1;
        }

        let mut weights = vec![0f32; (out_channels * bands) as usize];
        for b in 0..bands {
            let g = group(b);
            weights[(g * bands + b) as usize] = 1.0 / counts[g as usize] as f32;
        }

        let weight = Tensor::from_slice(&weights)
            .view([out_channels, bands, 1, 1])
            .to_kind(Kind::Float)
            .to_device(device);

        Self {
            weight,
            out_channels,
        }
    }

    /// Three-channel false-colour view of a hyperspectral cube
    pub fn rgb(bands: i64, device: Device) -> Self {
        Self::new(bands, 3, device)
    }
}

impl DomainTransform for BandProjection {
    fn apply(&self, images: &Tensor) -> Tensor {
        images.conv2d(&self.weight, None::<&Tensor>, [1, 1], [0, 0], [1, 1], 1)
    }

    fn out_channels(&self) -> i64 {
        self.out_channels
    }
}
