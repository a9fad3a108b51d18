//! Error types for the LCGAN library

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or inconsistent configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Normalization style string not understood by a conditional norm
    #[error("Unknown normalization style: {0}")]
    UnknownNormStyle(String),

    /// Sampler distribution kind not understood
    #[error("Distribution type not recognized: {0}")]
    UnknownDistribution(String),

    /// Augmentation policy contains an unknown op
    #[error("Unknown augmentation op: {0}")]
    UnknownAugmentation(String),

    /// Checkpoint missing or incompatible with the current model
    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    /// libtorch error
    #[error("Tensor error: {0}")]
    TensorError(#[from] tch::TchError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialize error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Whether the error stems from configuration (as opposed to runtime I/O)
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::ConfigError(_)
                | Error::UnknownNormStyle(_)
                | Error::UnknownDistribution(_)
                | Error::UnknownAugmentation(_)
        )
    }
}
