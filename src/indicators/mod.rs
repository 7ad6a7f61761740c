// Technical indicators module
// Moving averages over the bar window

pub mod moving_average;

pub use moving_average::{calculate_ema, calculate_sma};

use crate::data::SourceError;
use thiserror::Error;

/// Why an indicator reading could not be produced
#[derive(Debug, Error)]
pub enum IndicatorError {
    /// Window holds fewer bars than the requested period (or period is 0)
    #[error("Insufficient data: requested {requested} bars, window holds {available}")]
    InsufficientData { requested: usize, available: usize },

    #[error(transparent)]
    Source(#[from] SourceError),
}
