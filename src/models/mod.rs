pub mod order;

use crate::clock::ClockTime;
use serde::{Deserialize, Serialize};

pub use order::{
    ListOrders, NewOrder, Order, OrderClass, OrderQueryStatus, OrderSide, OrderStatus, OrderType,
    ReplaceOrder, SortDirection, StopLoss, TakeProfit, TimeInForce,
};

/// One-minute OHLC aggregate of trade prices for a ticker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub ticker: String,
    pub hour: u32,
    pub minute: u32,
    pub open: f64,
    pub close: f64,
    pub low: f64,
    pub high: f64,
}

impl Bar {
    /// The minute this bar covers
    pub fn time(&self) -> ClockTime {
        ClockTime::new(self.hour as i32, self.minute)
    }
}

/// A single executed trade
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeTick {
    pub ticker: String,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub price: f64,
}
