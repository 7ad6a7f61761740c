use super::{aggregate_ticks, BarSource, SourceError};
use crate::models::{Bar, TradeTick};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type MinuteKey = (String, u32, u32);

#[derive(Default)]
struct TickBook {
    prices: HashMap<MinuteKey, Vec<f64>>,
    unavailable: bool,
}

/// Thread-safe in-memory tick store
///
/// Keeps every recorded price per ticker-minute in arrival order and builds
/// bars from them on fetch. Clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryTickStore {
    book: Arc<RwLock<TickBook>>,
}

impl InMemoryTickStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trade
    pub fn record(&self, tick: TradeTick) -> Result<(), String> {
        self.record_price(&tick.ticker, tick.hour, tick.minute, tick.price)
    }

    /// Record a trade price without a tick struct
    pub fn record_price(&self, ticker: &str, hour: u32, minute: u32, price: f64) -> Result<(), String> {
        let mut book = self.book.write().map_err(|e| e.to_string())?;

        book.prices
            .entry((ticker.to_string(), hour, minute))
            .or_default()
            .push(price);

        Ok(())
    }

    /// Drop every trade recorded for one ticker-minute
    pub fn clear_minute(&self, ticker: &str, hour: u32, minute: u32) -> Result<(), String> {
        let mut book = self.book.write().map_err(|e| e.to_string())?;
        book.prices.remove(&(ticker.to_string(), hour, minute));
        Ok(())
    }

    /// Number of trades recorded for one ticker-minute
    pub fn tick_count(&self, ticker: &str, hour: u32, minute: u32) -> Result<usize, String> {
        let book = self.book.read().map_err(|e| e.to_string())?;
        Ok(book
            .prices
            .get(&(ticker.to_string(), hour, minute))
            .map(|p| p.len())
            .unwrap_or(0))
    }

    /// Simulate a storage outage: every fetch fails while set
    pub fn set_unavailable(&self, unavailable: bool) {
        let mut book = self.book.write().unwrap_or_else(|e| e.into_inner());
        book.unavailable = unavailable;
    }
}

impl BarSource for InMemoryTickStore {
    async fn fetch(&self, ticker: &str, hour: u32, minute: u32) -> Result<Option<Bar>, SourceError> {
        let book = self
            .book
            .read()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        if book.unavailable {
            return Err(SourceError::Unavailable("tick store offline".to_string()));
        }

        Ok(book
            .prices
            .get(&(ticker.to_string(), hour, minute))
            .and_then(|prices| aggregate_ticks(ticker, hour, minute, prices.iter().copied())))
    }
}
