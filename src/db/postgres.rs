use crate::data::{aggregate_ticks, BarSource, SourceError};
use crate::models::{Bar, TradeTick};
use crate::Result;
use chrono::{Local, NaiveDate};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

/// Postgres-backed trade tick store
///
/// Ticks are keyed by ticker, trading date, hour and minute. Unless pinned
/// with [`PostgresTickStore::for_date`], every read and write uses the local
/// date at the time of the call, so a long-running session follows midnight.
/// Bars are built on fetch from the ticks of the requested minute.
pub struct PostgresTickStore {
    pool: PgPool,
    pinned_date: Option<NaiveDate>,
}

impl PostgresTickStore {
    /// Connect to Postgres and run migrations
    ///
    /// # Arguments
    /// * `database_url` - Postgres connection URL
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres at {}", database_url);

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool, following the local date
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            pinned_date: None,
        }
    }

    /// Read and write ticks of a fixed trading date (e.g. for replays)
    pub fn for_date(mut self, trade_date: NaiveDate) -> Self {
        self.pinned_date = Some(trade_date);
        self
    }

    /// Trading date used by the next read or write
    pub fn trade_date(&self) -> NaiveDate {
        resolve_trade_date(self.pinned_date, Local::now().date_naive())
    }

    /// Persist one trade
    pub async fn record_tick(&self, tick: &TradeTick) -> Result<()> {
        let price = Decimal::from_f64(tick.price).ok_or("Tick price is not a finite number")?;
        let (hour, minute, second) = time_columns(tick.hour, tick.minute, tick.second)
            .ok_or("Tick time is outside 00:00:00-23:59:59")?;

        sqlx::query(
            r#"
            INSERT INTO trade_ticks (ticker, trade_date, hour, minute, second, price)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&tick.ticker)
        .bind(self.trade_date())
        .bind(hour)
        .bind(minute)
        .bind(second)
        .bind(price)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            "Saved tick {} {:02}:{:02}:{:02} @ {}",
            tick.ticker,
            tick.hour,
            tick.minute,
            tick.second,
            tick.price
        );

        Ok(())
    }

    /// Delete ticks older than `keep_days` trading dates
    pub async fn prune(&self, keep_days: i64) -> Result<u64> {
        let cutoff = self.trade_date() - chrono::Duration::days(keep_days);

        let result = sqlx::query("DELETE FROM trade_ticks WHERE trade_date < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        tracing::info!("Pruned {} ticks older than {}", result.rows_affected(), cutoff);

        Ok(result.rows_affected())
    }
}

fn resolve_trade_date(pinned: Option<NaiveDate>, today: NaiveDate) -> NaiveDate {
    pinned.unwrap_or(today)
}

/// SMALLINT column values for a time of day, `None` if it is not one
fn time_columns(hour: u32, minute: u32, second: u32) -> Option<(i16, i16, i16)> {
    if hour > 23 || minute > 59 || second > 59 {
        return None;
    }
    Some((hour as i16, minute as i16, second as i16))
}

fn price_to_f64(price: Decimal) -> std::result::Result<f64, SourceError> {
    price
        .to_f64()
        .ok_or_else(|| SourceError::Unavailable(format!("Stored price {} does not fit in an f64", price)))
}

impl BarSource for PostgresTickStore {
    async fn fetch(&self, ticker: &str, hour: u32, minute: u32) -> std::result::Result<Option<Bar>, SourceError> {
        // No row can hold a time outside the day
        let Some((hour_column, minute_column, _)) = time_columns(hour, minute, 0) else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT price
            FROM trade_ticks
            WHERE ticker = $1 AND trade_date = $2 AND hour = $3 AND minute = $4
            ORDER BY second ASC, id ASC
            "#,
        )
        .bind(ticker)
        .bind(self.trade_date())
        .bind(hour_column)
        .bind(minute_column)
        .fetch_all(&self.pool)
        .await?;

        let mut prices = Vec::with_capacity(rows.len());
        for row in rows {
            let price: Decimal = row.try_get("price")?;
            prices.push(price_to_f64(price)?);
        }

        Ok(aggregate_ticks(ticker, hour, minute, prices))
    }
}
