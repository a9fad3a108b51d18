//! Data module
//!
//! This module provides the DataLoader that batches labelled image cubes.

mod loader;

pub use loader::{DataLoader, DataLoaderIter};
