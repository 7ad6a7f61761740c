use super::{BarWindow, UpdateOutcome};
use crate::clock::{Clock, SystemClock};
use crate::data::{BarSource, SourceError};
use crate::indicators::{calculate_ema, calculate_sma, IndicatorError};

/// Keeps a bar window fresh for one ticker and serves moving averages from it
///
/// Every reading refreshes the window first, so values always reflect the
/// latest bar the source can provide.
pub struct IndicatorFeed<S, C = SystemClock> {
    ticker: String,
    source: S,
    clock: C,
    window: BarWindow,
}

impl<S: BarSource> IndicatorFeed<S, SystemClock> {
    /// Create a feed driven by the system wall clock
    pub fn new(ticker: impl Into<String>, capacity: usize, source: S) -> Self {
        Self::with_clock(ticker, capacity, source, SystemClock)
    }
}

impl<S: BarSource, C: Clock> IndicatorFeed<S, C> {
    pub fn with_clock(ticker: impl Into<String>, capacity: usize, source: S, clock: C) -> Self {
        Self {
            ticker: ticker.into(),
            source,
            clock,
            window: BarWindow::new(capacity),
        }
    }

    /// Update the window without reading any indicator
    pub async fn refresh(&mut self) -> Result<UpdateOutcome, SourceError> {
        let outcome = self
            .window
            .update(&self.ticker, &self.source, &self.clock)
            .await?;

        tracing::debug!(
            ticker = %self.ticker,
            outcome = ?outcome,
            len = self.window.len(),
            "Window updated"
        );

        Ok(outcome)
    }

    /// Simple moving average of the `period` newest closes
    pub async fn sma(&mut self, period: usize) -> Result<f64, IndicatorError> {
        self.refresh().await?;
        calculate_sma(&self.window, period).ok_or_else(|| self.insufficient(period))
    }

    /// Exponential moving average of the `period` newest closes
    pub async fn ema(&mut self, period: usize) -> Result<f64, IndicatorError> {
        self.refresh().await?;
        calculate_ema(&self.window, period).ok_or_else(|| self.insufficient(period))
    }

    fn insufficient(&self, period: usize) -> IndicatorError {
        IndicatorError::InsufficientData {
            requested: period,
            available: self.window.len(),
        }
    }

    pub fn window(&self) -> &BarWindow {
        &self.window
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}
