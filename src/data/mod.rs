// Bar sources: where the window gets its one-minute bars from
pub mod memory;
pub mod synthetic;

pub use memory::InMemoryTickStore;
pub use synthetic::SyntheticTickGenerator;

use crate::models::Bar;
use std::future::Future;
use thiserror::Error;

/// Failure to reach the underlying tick storage
///
/// A minute without trades is NOT an error, sources report it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bar source unavailable: {0}")]
    Unavailable(String),
}

/// Builds one-minute bars for a ticker on request
///
/// Implementations do not retry; the window leaves itself untouched on error
/// and the caller decides when to try again.
pub trait BarSource: Send + Sync {
    /// Bar for `ticker` at `hour:minute`, or `None` if nothing traded
    fn fetch(
        &self,
        ticker: &str,
        hour: u32,
        minute: u32,
    ) -> impl Future<Output = Result<Option<Bar>, SourceError>> + Send;

    /// All bars in the inclusive range, oldest first, skipping empty minutes
    ///
    /// Minutes past 23:59 are never queried.
    fn fetch_range(
        &self,
        ticker: &str,
        hour_start: u32,
        minute_start: u32,
        hour_end: u32,
        minute_end: u32,
    ) -> impl Future<Output = Result<Vec<Bar>, SourceError>> + Send {
        async move {
            let start = minute_of_day(hour_start, minute_start);
            let end = minute_of_day(hour_end, minute_end).min(LAST_MINUTE_OF_DAY);

            let mut bars = Vec::new();
            for offset in start..=end {
                let (hour, minute) = ((offset / 60) as u32, (offset % 60) as u32);
                if let Some(bar) = self.fetch(ticker, hour, minute).await? {
                    bars.push(bar);
                }
            }

            Ok(bars)
        }
    }
}

const LAST_MINUTE_OF_DAY: u64 = 23 * 60 + 59;

fn minute_of_day(hour: u32, minute: u32) -> u64 {
    u64::from(hour) * 60 + u64::from(minute)
}

/// Aggregate trade prices (in arrival order) into an OHLC bar
///
/// Returns `None` when no prices are given.
pub fn aggregate_ticks<I>(ticker: &str, hour: u32, minute: u32, prices: I) -> Option<Bar>
where
    I: IntoIterator<Item = f64>,
{
    let mut prices = prices.into_iter();
    let open = prices.next()?;

    let (close, low, high) = prices.fold((open, open, open), |(_, low, high), price| {
        (price, low.min(price), high.max(price))
    });

    Some(Bar {
        ticker: ticker.to_string(),
        hour,
        minute,
        open,
        close,
        low,
        high,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_ticks() {
        let bar = aggregate_ticks("AAPL", 9, 30, vec![100.0, 101.5, 99.0, 100.5]).unwrap();

        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.close, 100.5);
        assert_eq!(bar.low, 99.0);
        assert_eq!(bar.high, 101.5);
        assert_eq!((bar.hour, bar.minute), (9, 30));
    }

    #[test]
    fn test_aggregate_single_tick() {
        let bar = aggregate_ticks("AAPL", 9, 30, [42.0]).unwrap();
        assert_eq!((bar.open, bar.close, bar.low, bar.high), (42.0, 42.0, 42.0, 42.0));
    }

    #[test]
    fn test_aggregate_no_ticks() {
        assert!(aggregate_ticks("AAPL", 9, 30, Vec::new()).is_none());
    }

    #[tokio::test]
    async fn test_fetch_range_skips_gaps_across_hours() {
        let store = InMemoryTickStore::new();
        store.record_price("AAPL", 9, 58, 100.0).unwrap();
        store.record_price("AAPL", 10, 0, 101.0).unwrap();
        store.record_price("AAPL", 10, 1, 102.0).unwrap();
        store.record_price("AAPL", 10, 2, 103.0).unwrap();

        let bars = store.fetch_range("AAPL", 9, 58, 10, 1).await.unwrap();
        let minutes: Vec<_> = bars.iter().map(|b| (b.hour, b.minute)).collect();

        assert_eq!(minutes, vec![(9, 58), (10, 0), (10, 1)]);
    }

    #[tokio::test]
    async fn test_fetch_range_inverted_is_empty() {
        let store = InMemoryTickStore::new();
        store.record_price("AAPL", 9, 30, 100.0).unwrap();

        let bars = store.fetch_range("AAPL", 10, 0, 9, 0).await.unwrap();
        assert!(bars.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_range_stops_at_end_of_day() {
        let store = InMemoryTickStore::new();
        store.record_price("AAPL", 23, 59, 100.0).unwrap();

        let bars = store.fetch_range("AAPL", 23, 58, u32::MAX, u32::MAX).await.unwrap();
        let minutes: Vec<_> = bars.iter().map(|b| (b.hour, b.minute)).collect();
        assert_eq!(minutes, vec![(23, 59)]);

        let bars = store.fetch_range("AAPL", u32::MAX, 0, u32::MAX, 59).await.unwrap();
        assert!(bars.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_range_propagates_failure() {
        let store = InMemoryTickStore::new();
        store.set_unavailable(true);

        let result = store.fetch_range("AAPL", 9, 30, 9, 35).await;
        assert!(matches!(result, Err(SourceError::Unavailable(_))));
    }
}
