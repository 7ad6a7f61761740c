use crate::clock::ClockTime;
use crate::models::TradeTick;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generates random-walk trade ticks for dry runs
///
/// Seeded, so the same seed replays the same tape.
pub struct SyntheticTickGenerator {
    rng: StdRng,
    price: f64,
    /// Per-tick move as a fraction of price (0.001 = ±0.1%)
    volatility: f64,
    /// Chance that a whole minute has no trades
    gap_probability: f64,
}

impl SyntheticTickGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64, base_price: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            price: base_price,
            volatility: 0.001,
            gap_probability: 0.0,
        }
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    pub fn with_gap_probability(mut self, probability: f64) -> Self {
        self.gap_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Last generated price
    pub fn price(&self) -> f64 {
        self.price
    }

    /// Next tick at `time`, moving the walk one step
    ///
    /// Returns `None` for times outside a trading day.
    pub fn next_tick(&mut self, ticker: &str, time: ClockTime) -> Option<TradeTick> {
        if !time.is_trading_hour() {
            return None;
        }

        let change = self.price * self.rng.gen_range(-self.volatility..=self.volatility);
        // Keep the walk strictly positive
        self.price = (self.price + change).max(0.01);

        Some(TradeTick {
            ticker: ticker.to_string(),
            hour: time.hour as u32,
            minute: time.minute,
            second: time.second,
            price: self.price,
        })
    }

    /// A full minute of ticks, or an empty vec when the minute is a gap
    pub fn generate_minute(&mut self, ticker: &str, time: ClockTime, ticks: usize) -> Vec<TradeTick> {
        if self.rng.gen_bool(self.gap_probability) {
            return Vec::new();
        }

        let step = (60 / ticks.max(1)).max(1) as u32;
        (0..ticks)
            .filter_map(|i| {
                let at = ClockTime::with_second(time.hour, time.minute, (i as u32 * step).min(59));
                self.next_tick(ticker, at)
            })
            .collect()
    }

    /// `minutes` minutes of history ending at (and including) `end`, oldest first
    pub fn generate_history(
        &mut self,
        ticker: &str,
        end: ClockTime,
        minutes: usize,
        ticks_per_minute: usize,
    ) -> Vec<TradeTick> {
        let mut start = end;
        for _ in 1..minutes {
            start.decrement();
        }

        let mut ticks = Vec::with_capacity(minutes * ticks_per_minute);
        let mut cursor = start;
        for _ in 0..minutes {
            ticks.extend(self.generate_minute(ticker, cursor, ticks_per_minute));
            cursor.increment();
        }

        ticks
    }
}
