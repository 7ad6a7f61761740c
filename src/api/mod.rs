pub mod alpaca;

pub use alpaca::{AlpacaClient, CancelStatus, OrderError};
