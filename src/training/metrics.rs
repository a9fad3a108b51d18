//! Training metrics for monitoring GAN progress
//!
//! Per-step values are accumulated by key over an epoch; epoch averages are
//! handed to a [`MetricsSink`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Scalars returned by one training step
///
/// Discriminator quantities are averaged over the step's micro-batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StepMetrics {
    pub gen_loss: f64,
    pub dis_loss_real: f64,
    pub dis_loss_fake: f64,
    /// Mean discriminator score on real samples
    pub dis_real: f64,
    /// Mean discriminator score on generated samples
    pub dis_fake: f64,
}

impl StepMetrics {
    /// Named values, in a fixed order
    pub fn entries(&self) -> [(&'static str, f64); 5] {
        [
            ("gen_loss", self.gen_loss),
            ("dis_loss_real", self.dis_loss_real),
            ("dis_loss_fake", self.dis_loss_fake),
            ("dis_real", self.dis_real),
            ("dis_fake", self.dis_fake),
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.entries().iter().all(|(_, v)| v.is_finite())
    }
}

/// Sums step metrics by key over one epoch
#[derive(Debug, Clone, Default)]
pub struct EpochAccumulator {
    sums: BTreeMap<String, f64>,
    count: usize,
}

impl EpochAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, metrics: &StepMetrics) {
        for (key, value) in metrics.entries() {
            *self.sums.entry(key.to_string()).or_insert(0.0) += value;
        }
        self.count += 1;
    }

    /// Per-key averages (empty if no step was recorded)
    pub fn averages(&self) -> BTreeMap<String, f64> {
        if self.count == 0 {
            return BTreeMap::new();
        }
        self.sums
            .iter()
            .map(|(key, sum)| (key.clone(), sum / self.count as f64))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Receives per-epoch averages
pub trait MetricsSink {
    fn record_epoch(&mut self, epoch: usize, averages: &BTreeMap<String, f64>) -> Result<()>;
}

/// In-memory metrics history with CSV persistence
#[derive(Debug, Clone, Default)]
pub struct TrainingMetrics {
    /// Epoch numbers in recording order
    pub epochs: Vec<usize>,
    /// Per-epoch averages, aligned with `epochs`
    pub history: Vec<BTreeMap<String, f64>>,
}

impl TrainingMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Get number of recorded epochs
    pub fn num_epochs(&self) -> usize {
        self.epochs.len()
    }

    /// Latest value recorded for `key`
    pub fn latest(&self, key: &str) -> Option<f64> {
        self.history.last().and_then(|m| m.get(key).copied())
    }

    /// All recorded values for `key`
    pub fn series(&self, key: &str) -> Vec<f64> {
        self.history.iter().filter_map(|m| m.get(key).copied()).collect()
    }

    /// Moving average over the last `window` values of `key`
    pub fn moving_average(&self, key: &str, window: usize) -> f64 {
        moving_average(&self.series(key), window)
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .history
            .iter()
            .flat_map(|m| m.keys().cloned())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Save metrics to CSV file (`epoch` column plus one column per key)
    pub fn save_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        let keys = self.keys();

        let mut header = vec!["epoch".to_string()];
        header.extend(keys.iter().cloned());
        writer.write_record(&header)?;

        for (epoch, values) in self.epochs.iter().zip(&self.history) {
            let mut row = vec![epoch.to_string()];
            row.extend(
                keys.iter()
                    .map(|k| values.get(k).map(|v| v.to_string()).unwrap_or_default()),
            );
            writer.write_record(&row)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Load metrics from CSV file
    pub fn load_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let mut metrics = Self::new();

        for result in reader.records() {
            let record = result?;
            let epoch = record
                .get(0)
                .and_then(|e| e.parse::<usize>().ok())
                .ok_or_else(|| Error::ConfigError(format!("bad epoch in {}", path.display())))?;

            let values = headers
                .iter()
                .zip(record.iter())
                .skip(1)
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| {
                    v.parse::<f64>()
                        .map(|v| (k.to_string(), v))
                        .map_err(|e| Error::ConfigError(format!("bad value for {}: {}", k, e)))
                })
                .collect::<Result<BTreeMap<_, _>>>()?;

            metrics.epochs.push(epoch);
            metrics.history.push(values);
        }

        Ok(metrics)
    }
}

impl MetricsSink for TrainingMetrics {
    fn record_epoch(&mut self, epoch: usize, averages: &BTreeMap<String, f64>) -> Result<()> {
        self.epochs.push(epoch);
        self.history.push(averages.clone());
        Ok(())
    }
}

/// Calculate moving average of last `window` values
fn moving_average(values: &[f64], window: usize) -> f64 {
    if values.is_empty() || window == 0 {
        return 0.0;
    }

    let n = window.min(values.len());
    let sum: f64 = values.iter().rev().take(n).sum();
    sum / n as f64
}
