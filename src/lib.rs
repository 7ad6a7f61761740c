// Core modules
pub mod api;
pub mod clock;
pub mod config;
pub mod data;
pub mod db;
pub mod execution;
pub mod indicators;
pub mod models;

// Re-export commonly used types
pub use api::*;
pub use clock::{Clock, ClockTime, ManualClock, SystemClock};
pub use data::{BarSource, SourceError};
pub use execution::{BarWindow, IndicatorFeed, UpdateOutcome};
pub use indicators::IndicatorError;
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
