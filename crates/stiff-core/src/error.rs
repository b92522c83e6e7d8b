//! Error types for core stiffgrid types.

use thiserror::Error;

use crate::types::CellId;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating a `BalanceConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors raised when assembling an owned cell field.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("cell {cell} has {found} species, mechanism has {expected}")]
    SpeciesMismatch {
        cell: CellId,
        expected: usize,
        found: usize,
    },
}
