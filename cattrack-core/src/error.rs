//! Error taxonomy for the risk pipeline
//!
//! - `Format` propagates: a miscoded severity must fail loudly.
//! - `Geometry` is contained to a single polygon and reported as a warning.
//! - `Configuration` is fatal at startup.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A risk label that is neither a known categorical token nor a number.
    #[error("format error: {0}")]
    Format(String),

    /// A polygon that cannot be used for containment tests.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// A contract violation in thresholds, offsets or market definitions.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    pub fn format(msg: impl Into<String>) -> Self {
        CoreError::Format(msg.into())
    }

    pub fn geometry(msg: impl Into<String>) -> Self {
        CoreError::Geometry(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        CoreError::Configuration(msg.into())
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
