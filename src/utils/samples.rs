//! Sinks for periodically generated samples

use std::path::{Path, PathBuf};

use tch::Tensor;

use crate::error::Result;

/// Receives a batch of generated samples at the end of an epoch
pub trait SampleRenderer {
    fn render(&mut self, epoch: usize, samples: &Tensor) -> Result<()>;
}

/// Writes samples as `<dir>/images/generated_EEEE.pt`
#[derive(Debug, Clone)]
pub struct TensorFileRenderer {
    dir: PathBuf,
}

impl TensorFileRenderer {
    pub fn new(save_path: &Path) -> Self {
        Self {
            dir: save_path.join("images"),
        }
    }

    pub fn path_for(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("generated_{:04}.pt", epoch))
    }
}

impl SampleRenderer for TensorFileRenderer {
    fn render(&mut self, epoch: usize, samples: &Tensor) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(epoch);
        samples.to_device(tch::Device::Cpu).save(&path)?;
        tracing::debug!("Saved samples to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn test_renderer_writes_tensor() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = TensorFileRenderer::new(dir.path());
        let samples = Tensor::rand([2, 3, 4, 4], (Kind::Float, Device::Cpu));

        renderer.render(7, &samples).unwrap();

        let path = dir.path().join("images").join("generated_0007.pt");
        assert_eq!(renderer.path_for(7), path);
        let loaded = Tensor::load(&path).unwrap();
        assert!(loaded.equal(&samples));
    }
}
