use crate::execution::BarWindow;

/// Whether the window holds enough bars for a `period`-bar average
fn covers(window: &BarWindow, period: usize) -> bool {
    period > 0 && period <= window.capacity() && period <= window.len()
}

/// Calculate Simple Moving Average (SMA) of the `period` newest closes
pub fn calculate_sma(window: &BarWindow, period: usize) -> Option<f64> {
    if !covers(window, period) {
        return None;
    }

    let sum: f64 = window.iter_from_newest().take(period).map(|bar| bar.close).sum();
    Some(sum / period as f64)
}

/// Calculate Exponential Moving Average (EMA) of the `period` newest closes
///
/// Each step weighs the current close by `k = 2 / (period + 1)` and adds the
/// result for the older bars; the oldest of the `period` bars contributes
/// `k * close` and ends the walk. `k` is taken from the requested period at
/// every step and the older result is not damped by `(1 - k)`, so this is
/// `k` times the sum of the closes rather than the textbook EMA.
pub fn calculate_ema(window: &BarWindow, period: usize) -> Option<f64> {
    if !covers(window, period) {
        return None;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);

    // Walk newest to oldest, accumulating instead of recursing
    let ema = window
        .iter_from_newest()
        .take(period)
        .fold(0.0, |acc, bar| acc + bar.close * multiplier);

    Some(ema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Bar;

    fn window_of(capacity: usize, closes: &[f64]) -> BarWindow {
        let bars = closes.iter().enumerate().map(|(i, &close)| Bar {
            ticker: "AAPL".to_string(),
            hour: 9,
            minute: 30 + i as u32,
            open: close,
            close,
            low: close,
            high: close,
        });
        BarWindow::from_bars(capacity, bars)
    }

    /// Recursive form of the EMA walk, for cross-checking the fold
    fn recursive_ema(newest_first: &[f64], k: f64) -> f64 {
        match newest_first {
            [] => 0.0,
            [oldest] => oldest * k,
            [close, older @ ..] => close * k + recursive_ema(older, k),
        }
    }

    #[test]
    fn test_sma() {
        let window = window_of(5, &[100.0, 102.0, 104.0, 106.0, 108.0]);
        assert_eq!(calculate_sma(&window, 5), Some(104.0));
        assert_eq!(calculate_sma(&window, 2), Some(107.0));
        assert_eq!(calculate_sma(&window, 1), Some(108.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let window = window_of(5, &[100.0, 102.0]);
        assert!(calculate_sma(&window, 3).is_none());
        assert!(calculate_sma(&window, 0).is_none());
    }

    #[test]
    fn test_sma_period_beyond_capacity() {
        let window = window_of(3, &[100.0, 102.0, 104.0]);
        assert!(calculate_sma(&window, 4).is_none());
    }

    #[test]
    fn test_ema_single_bar_is_close() {
        // k = 2 / 2 = 1
        let window = window_of(3, &[100.0, 102.0, 104.0]);
        assert_eq!(calculate_ema(&window, 1), Some(104.0));
    }

    #[test]
    fn test_ema_known_values() {
        // k = 0.5 at every step: 104 * 0.5 + 102 * 0.5 + 100 * 0.5
        let window = window_of(3, &[100.0, 102.0, 104.0]);
        assert_eq!(calculate_ema(&window, 3), Some(153.0));

        // Two newest bars with k = 2/3
        let ema = calculate_ema(&window, 2).unwrap();
        assert!((ema - (104.0 + 102.0) * 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_ema_weight_not_decayed() {
        // Textbook EMA over these closes would be 102.5; every close keeps k here
        let window = window_of(3, &[100.0, 102.0, 104.0]);
        let ema = calculate_ema(&window, 3).unwrap();
        assert!((ema - 102.5).abs() > 1.0);
    }

    #[test]
    fn test_ema_matches_recursive_walk() {
        let closes = [100.0, 102.0, 101.0, 103.0, 105.0, 104.0, 106.0, 108.0, 107.0, 109.0];
        let window = window_of(10, &closes);

        for period in 1..=10 {
            let k = 2.0 / (period as f64 + 1.0);
            let newest_first: Vec<f64> = closes.iter().rev().take(period).copied().collect();

            let ema = calculate_ema(&window, period).unwrap();
            assert!((ema - recursive_ema(&newest_first, k)).abs() < 1e-9, "period {}", period);
        }
    }

    #[test]
    fn test_ema_ignores_bars_older_than_period() {
        let window = window_of(5, &[1000.0, 1000.0, 100.0, 102.0, 104.0]);
        assert_eq!(calculate_ema(&window, 3), Some(153.0));
    }

    #[test]
    fn test_ema_insufficient_data() {
        let window = window_of(5, &[100.0, 102.0]);
        assert!(calculate_ema(&window, 3).is_none());
        assert!(calculate_ema(&window, 0).is_none());
    }
}
