use crate::clock::{Clock, ClockTime};
use crate::data::{BarSource, SourceError};
use crate::models::Bar;
use std::collections::VecDeque;

/// What a call to [`BarWindow::update`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Older bars were prepended while the window was still filling
    Filled { added: usize },
    /// The newest bar was re-read for the still-forming minute
    Refreshed,
    /// The oldest bar was evicted and a new minute appended
    Rolled,
    /// No data for the candidate minute; the window is unchanged
    Deferred,
}

/// Fixed-capacity, time-ordered window of one-minute bars
///
/// Bars are kept oldest (front) to newest (back). While filling, the window
/// walks backward in time from "now" and prepends. Once full it either
/// rewrites the newest bar in place (same minute, candle still forming) or
/// slides forward by one bar when the minute rolls over.
#[derive(Debug, Clone)]
pub struct BarWindow {
    bars: VecDeque<Bar>,
    capacity: usize,
    last_observed: Option<ClockTime>,
}

impl BarWindow {
    /// Create an empty window
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of bars to keep
    pub fn new(capacity: usize) -> Self {
        Self {
            bars: VecDeque::with_capacity(capacity),
            capacity,
            last_observed: None,
        }
    }

    /// Build a window from already-known bars, oldest first
    ///
    /// Only the newest `capacity` bars are kept and the newest one's minute
    /// becomes the last observed minute.
    pub fn from_bars(capacity: usize, bars: impl IntoIterator<Item = Bar>) -> Self {
        let mut window = Self::new(capacity);
        for bar in bars {
            window.bars.push_back(bar);
            if window.bars.len() > capacity {
                window.bars.pop_front();
            }
        }
        window.last_observed = window.bars.back().map(Bar::time);
        window
    }

    /// Bring the window up to date for `ticker`
    ///
    /// On `Err` the window is exactly as it was before the call.
    pub async fn update<S, C>(
        &mut self,
        ticker: &str,
        source: &S,
        clock: &C,
    ) -> Result<UpdateOutcome, SourceError>
    where
        S: BarSource,
        C: Clock,
    {
        if self.capacity == 0 {
            return Ok(UpdateOutcome::Deferred);
        }

        if self.is_full() {
            self.advance(ticker, source, clock.now()).await
        } else {
            self.fill(ticker, source, clock).await
        }
    }

    async fn fill<S, C>(
        &mut self,
        ticker: &str,
        source: &S,
        clock: &C,
    ) -> Result<UpdateOutcome, SourceError>
    where
        S: BarSource,
        C: Clock,
    {
        let mut cursor = match self.bars.front() {
            Some(oldest) => {
                let mut time = oldest.time();
                time.decrement();
                time
            }
            None => clock.now(),
        };

        // Staged newest-first, committed only once the walk ends cleanly
        let missing = self.capacity - self.bars.len();
        let mut staged = Vec::with_capacity(missing);
        while staged.len() < missing {
            match fetch_at(source, ticker, cursor).await? {
                Some(bar) => staged.push(bar),
                None => {
                    tracing::debug!(ticker, minute = %cursor, "No data while filling, pausing");
                    break;
                }
            }
            cursor.decrement();
        }

        if staged.is_empty() {
            return Ok(UpdateOutcome::Deferred);
        }

        if self.bars.is_empty() {
            self.last_observed = staged.first().map(Bar::time);
        }

        let added = staged.len();
        for bar in staged {
            self.bars.push_front(bar);
        }

        tracing::debug!(ticker, added, len = self.bars.len(), capacity = self.capacity, "Filled window");

        Ok(UpdateOutcome::Filled { added })
    }

    async fn advance<S>(
        &mut self,
        ticker: &str,
        source: &S,
        now: ClockTime,
    ) -> Result<UpdateOutcome, SourceError>
    where
        S: BarSource,
    {
        match self.last_observed {
            Some(last) if now == last => {
                let Some(bar) = fetch_at(source, ticker, now).await? else {
                    return Ok(UpdateOutcome::Deferred);
                };
                if let Some(newest) = self.bars.back_mut() {
                    *newest = bar;
                }
                Ok(UpdateOutcome::Refreshed)
            }
            _ => {
                let Some(bar) = fetch_at(source, ticker, now).await? else {
                    tracing::debug!(ticker, minute = %now, "No data for new minute, deferring rollover");
                    return Ok(UpdateOutcome::Deferred);
                };

                self.bars.pop_front();
                self.bars.push_back(bar);
                self.last_observed = Some(now);

                tracing::debug!(ticker, minute = %now, "Rolled window forward");

                Ok(UpdateOutcome::Rolled)
            }
        }
    }

    /// Newest (still possibly forming) bar
    pub fn newest(&self) -> Option<&Bar> {
        self.bars.back()
    }

    /// Oldest bar
    pub fn oldest(&self) -> Option<&Bar> {
        self.bars.front()
    }

    /// Bars from newest to oldest
    pub fn iter_from_newest(&self) -> impl Iterator<Item = &Bar> + '_ {
        self.bars.iter().rev()
    }

    /// Bars from oldest to newest
    pub fn iter_from_oldest(&self) -> impl Iterator<Item = &Bar> + '_ {
        self.bars.iter()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.bars.len() == self.capacity
    }

    /// Minute of the most recent refresh, `None` until the first bar lands
    pub fn last_observed(&self) -> Option<ClockTime> {
        self.last_observed
    }
}

/// Query the source for one minute; hours outside the day count as gaps
async fn fetch_at<S: BarSource>(
    source: &S,
    ticker: &str,
    time: ClockTime,
) -> Result<Option<Bar>, SourceError> {
    if !time.is_trading_hour() {
        return Ok(None);
    }
    source.fetch(ticker, time.hour as u32, time.minute).await
}
