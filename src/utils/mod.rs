//! Utility module with helper functions
//!
//! This module provides:
//! - Configuration handling
//! - Checkpoint save/load utilities
//! - Sample rendering sinks

pub mod checkpoint;
pub mod config;
pub mod samples;

pub use checkpoint::{load_checkpoint, save_checkpoint};
pub use config::{ensure_config_exists, Config};
pub use samples::{SampleRenderer, TensorFileRenderer};
