//! Checkpoint save/load utilities
//!
//! Weights are stored as one `.pt` file per network. Loading is strict:
//! every variable must be present with the exact shape, and the file may not
//! carry extra tensors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tch::{nn::VarStore, Tensor};

use crate::error::{Error, Result};
use crate::model::Lcgan;
use crate::training::TrainingMetrics;

/// `name.pt` or `name_<epoch>.pt`
pub fn tagged_file_name(name: &str, epoch: Option<usize>) -> String {
    match epoch {
        Some(epoch) => format!("{}_{}.pt", name, epoch),
        None => format!("{}.pt", name),
    }
}

/// Load a var store from `path`, rejecting missing, extra or reshaped tensors
pub fn load_var_store(vs: &mut VarStore, path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::CheckpointError(format!(
            "{} does not exist",
            path.display()
        )));
    }

    let stored: HashMap<String, Tensor> = Tensor::load_multi(path)?.into_iter().collect();
    let expected = vs.variables();

    for (name, var) in &expected {
        match stored.get(name) {
            Some(tensor) if tensor.size() == var.size() => {}
            Some(tensor) => {
                return Err(Error::CheckpointError(format!(
                    "{}: shape mismatch for '{}', expected {:?}, found {:?}",
                    path.display(),
                    name,
                    var.size(),
                    tensor.size()
                )))
            }
            None => {
                return Err(Error::CheckpointError(format!(
                    "{}: missing variable '{}'",
                    path.display(),
                    name
                )))
            }
        }
    }

    if let Some(extra) = stored.keys().find(|name| !expected.contains_key(*name)) {
        return Err(Error::CheckpointError(format!(
            "{}: unexpected variable '{}'",
            path.display(),
            extra
        )));
    }

    vs.load(path)?;
    Ok(())
}

/// Checkpoint metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Epoch the checkpoint was taken at
    pub epoch: usize,
    /// Epoch-average generator loss
    pub gen_loss: f64,
    /// Epoch-average discriminator loss on real inputs
    pub dis_loss_real: f64,
    /// Epoch-average discriminator loss on generated inputs
    pub dis_loss_fake: f64,
    /// Timestamp of checkpoint
    pub timestamp: String,
    /// Model configuration (as JSON)
    pub config: String,
}

/// Save a complete checkpoint (weights, metadata and metrics history)
///
/// # Arguments
///
/// * `model` - Model to save
/// * `metrics` - Training metrics so far
/// * `epoch` - Current epoch number
/// * `dir` - Directory under which `checkpoint_epoch_EEEE/` is created
///
/// # Returns
///
/// Path to the checkpoint directory
pub fn save_checkpoint(model: &Lcgan, metrics: &TrainingMetrics, epoch: usize, dir: &Path) -> Result<PathBuf> {
    let checkpoint_dir = dir.join(format!("checkpoint_epoch_{:04}", epoch));
    std::fs::create_dir_all(&checkpoint_dir)?;

    model.save(&checkpoint_dir, None)?;

    let meta = CheckpointMeta {
        epoch,
        gen_loss: metrics.latest("gen_loss").unwrap_or(0.0),
        dis_loss_real: metrics.latest("dis_loss_real").unwrap_or(0.0),
        dis_loss_fake: metrics.latest("dis_loss_fake").unwrap_or(0.0),
        timestamp: chrono::Utc::now().to_rfc3339(),
        config: serde_json::json!({
            "generator": model.generator.config(),
            "discriminator": model.discriminator.config(),
        })
        .to_string(),
    };

    let meta_json = serde_json::to_string_pretty(&meta)?;
    std::fs::write(checkpoint_dir.join("meta.json"), meta_json)?;

    metrics.save_csv(&checkpoint_dir.join("metrics.csv"))?;

    tracing::info!("Saved checkpoint to {}", checkpoint_dir.display());
    Ok(checkpoint_dir)
}

/// Load checkpoint metadata
pub fn load_checkpoint_meta(checkpoint_dir: &Path) -> Result<CheckpointMeta> {
    let content = std::fs::read_to_string(checkpoint_dir.join("meta.json"))?;
    Ok(serde_json::from_str(&content)?)
}

/// Load a complete checkpoint
///
/// # Returns
///
/// Tuple of (epoch, metrics)
pub fn load_checkpoint(model: &mut Lcgan, checkpoint_dir: &Path) -> Result<(usize, TrainingMetrics)> {
    model.load(checkpoint_dir, None)?;
    let meta = load_checkpoint_meta(checkpoint_dir)?;

    let metrics_path = checkpoint_dir.join("metrics.csv");
    let metrics = if metrics_path.exists() {
        TrainingMetrics::load_csv(&metrics_path)?
    } else {
        TrainingMetrics::new()
    };

    tracing::info!(
        "Loaded checkpoint from {} (epoch {})",
        checkpoint_dir.display(),
        meta.epoch
    );
    Ok((meta.epoch, metrics))
}

/// All `checkpoint_epoch_*` directories under `dir`, oldest first
pub fn list_checkpoints(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut checkpoints: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.starts_with("checkpoint_epoch_"))
                .unwrap_or(false)
        })
        .map(|e| e.path())
        .collect();

    checkpoints.sort();
    checkpoints
}

/// Find the latest `checkpoint_epoch_*` directory
pub fn find_latest_checkpoint(dir: &Path) -> Option<PathBuf> {
    list_checkpoints(dir).pop()
}
