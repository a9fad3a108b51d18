//! DataLoader for batching labelled image cubes
//!
//! Provides batching for GAN training with support for:
//! - Seeded shuffling
//! - Drop last incomplete batch
//! - Iteration over (images, labels) tensor pairs

use ndarray::{Array4, ArrayView4, Axis};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rand::distributions::{Distribution, Uniform};
use tch::Tensor;

use crate::error::{Error, Result};

/// DataLoader over images of shape (num_samples, bands, height, width)
pub struct DataLoader {
    /// Full dataset
    images: Array4<f32>,
    /// Class label per image
    labels: Vec<i64>,
    /// Batch size
    batch_size: usize,
    /// Whether to shuffle data each epoch
    shuffle: bool,
    /// Whether to drop the last incomplete batch
    drop_last: bool,
    /// Current indices for iteration
    indices: Vec<usize>,
    /// Current position in iteration
    current_idx: usize,
    rng: StdRng,
}

impl DataLoader {
    /// Create a new DataLoader
    ///
    /// # Arguments
    ///
    /// * `images` - 4D array of shape (num_samples, bands, height, width)
    /// * `labels` - One class index per sample
    /// * `batch_size` - Number of samples per batch
    /// * `shuffle` - Whether to shuffle data each epoch
    /// * `drop_last` - Whether to drop incomplete final batch
    /// * `seed` - Seed for shuffling
    pub fn new(
        images: Array4<f32>,
        labels: Vec<i64>,
        batch_size: usize,
        shuffle: bool,
        drop_last: bool,
        seed: u64,
    ) -> Result<Self> {
        let num_samples = images.shape()[0];
        if labels.len() != num_samples {
            return Err(Error::ConfigError(format!(
                "{} images but {} labels",
                num_samples,
                labels.len()
            )));
        }
        if batch_size == 0 {
            return Err(Error::ConfigError("Batch size must be > 0".to_string()));
        }

        let mut loader = Self {
            images,
            labels,
            batch_size,
            shuffle,
            drop_last,
            indices: (0..num_samples).collect(),
            current_idx: 0,
            rng: StdRng::seed_from_u64(seed),
        };

        if shuffle {
            loader.shuffle_indices();
        }

        Ok(loader)
    }

    /// Random images in [-1, 1] with uniformly drawn labels, for smoke runs
    pub fn synthetic(
        num_samples: usize,
        bands: usize,
        size: usize,
        num_classes: i64,
        batch_size: usize,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let pixel = Uniform::new(-1.0f32, 1.0);
        let class = Uniform::new(0, num_classes.max(1));

        let images = Array4::from_shape_simple_fn((num_samples, bands, size, size), || pixel.sample(&mut rng));
        let labels = (0..num_samples).map(|_| class.sample(&mut rng)).collect();

        Self::new(images, labels, batch_size, true, true, seed.wrapping_add(1))
    }

    /// Get the number of batches per epoch
    pub fn num_batches(&self) -> usize {
        let num_samples = self.num_samples();
        if self.drop_last {
            num_samples / self.batch_size
        } else {
            (num_samples + self.batch_size - 1) / self.batch_size
        }
    }

    /// Get total number of samples
    pub fn num_samples(&self) -> usize {
        self.images.shape()[0]
    }

    /// Get number of spectral bands
    pub fn bands(&self) -> usize {
        self.images.shape()[1]
    }

    /// Shuffle indices for a new epoch
    fn shuffle_indices(&mut self) {
        self.indices.shuffle(&mut self.rng);
    }

    /// Reset for new epoch
    pub fn reset(&mut self) {
        self.current_idx = 0;
        if self.shuffle {
            self.shuffle_indices();
        }
    }

    /// Get next batch as (images, labels)
    ///
    /// Returns None when epoch is complete
    pub fn next_batch(&mut self) -> Option<(Tensor, Tensor)> {
        let num_samples = self.indices.len();
        let start = self.current_idx;

        if start >= num_samples {
            return None;
        }

        let end = (start + self.batch_size).min(num_samples);
        let actual_batch_size = end - start;

        // Skip incomplete batch if drop_last
        if self.drop_last && actual_batch_size < self.batch_size {
            return None;
        }

        let shape = self.images.shape();
        let dims = [actual_batch_size as i64, shape[1] as i64, shape[2] as i64, shape[3] as i64];

        let mut pixels = Vec::with_capacity(actual_batch_size * shape[1] * shape[2] * shape[3]);
        let mut labels = Vec::with_capacity(actual_batch_size);
        for &data_idx in &self.indices[start..end] {
            pixels.extend(self.images.index_axis(Axis(0), data_idx).iter().copied());
            labels.push(self.labels[data_idx]);
        }

        self.current_idx = end;
        Some((Tensor::from_slice(&pixels).view(dims), Tensor::from_slice(&labels)))
    }

    /// Iterate over all batches of one epoch
    pub fn iter(&mut self) -> DataLoaderIter<'_> {
        self.reset();
        DataLoaderIter { loader: self }
    }

    /// Get a view of the underlying images
    pub fn images(&self) -> ArrayView4<'_, f32> {
        self.images.view()
    }
}

/// Iterator adapter for DataLoader
pub struct DataLoaderIter<'a> {
    loader: &'a mut DataLoader,
}

impl<'a> Iterator for DataLoaderIter<'a> {
    type Item = (Tensor, Tensor);

    fn next(&mut self) -> Option<Self::Item> {
        self.loader.next_batch()
    }
}
