use std::collections::TryReserveError;
use thiserror::Error;

/// A scan that produced no usable inventory. The caller keeps its previous one.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no socket table could be read under {0}")]
    Unavailable(String),

    #[error("record buffer exhausted: {0}")]
    Exhausted(#[from] TryReserveError),
}
