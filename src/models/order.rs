use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
    TrailingStop,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    Day,
    Gtc,
    Opg,
    Cls,
    Ioc,
    Fok,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderClass {
    /// The broker reports simple orders with an empty class
    #[default]
    #[serde(alias = "")]
    Simple,
    Bracket,
    Oco,
    Oto,
}

impl OrderClass {
    pub fn is_simple(&self) -> bool {
        matches!(self, OrderClass::Simple)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    DoneForDay,
    Canceled,
    Expired,
    Replaced,
    PendingCancel,
    PendingReplace,
    PendingNew,
    Accepted,
    AcceptedForBidding,
    Stopped,
    Rejected,
    Suspended,
    Calculated,
    Held,
}

/// Status filter for listing orders
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderQueryStatus {
    #[default]
    Open,
    Closed,
    All,
}

impl OrderQueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderQueryStatus::Open => "open",
            OrderQueryStatus::Closed => "closed",
            OrderQueryStatus::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[serde(rename = "asc")]
    Ascending,
    #[default]
    #[serde(rename = "desc")]
    Descending,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        }
    }
}

/// An order as reported by the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub client_order_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub filled_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub symbol: String,
    pub qty: Option<Decimal>,
    #[serde(default)]
    pub filled_qty: Decimal,
    pub filled_avg_price: Option<Decimal>,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub side: OrderSide,
    pub time_in_force: TimeInForce,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub status: OrderStatus,
    #[serde(default)]
    pub extended_hours: bool,
    #[serde(default)]
    pub order_class: OrderClass,
    /// Bracket/OCO child orders, only present when requested with `nested`
    #[serde(default)]
    pub legs: Option<Vec<Order>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TakeProfit {
    pub limit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StopLoss {
    pub stop_price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
}

/// Request body for submitting an order
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewOrder {
    pub symbol: String,
    pub qty: Decimal,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub extended_hours: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
    #[serde(skip_serializing_if = "OrderClass::is_simple")]
    pub order_class: OrderClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<TakeProfit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<StopLoss>,
}

impl NewOrder {
    /// Day market order
    pub fn market(symbol: impl Into<String>, qty: Decimal, side: OrderSide) -> Self {
        Self {
            symbol: symbol.into(),
            qty,
            side,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Day,
            limit_price: None,
            stop_price: None,
            extended_hours: false,
            client_order_id: None,
            order_class: OrderClass::Simple,
            take_profit: None,
            stop_loss: None,
        }
    }

    /// Day limit order
    pub fn limit(symbol: impl Into<String>, qty: Decimal, side: OrderSide, limit_price: Decimal) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
            ..Self::market(symbol, qty, side)
        }
    }

    pub fn time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    pub fn client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }

    /// Attach take-profit and stop-loss legs, turning this into a bracket order
    pub fn bracket(mut self, take_profit: TakeProfit, stop_loss: StopLoss) -> Self {
        self.order_class = OrderClass::Bracket;
        self.take_profit = Some(take_profit);
        self.stop_loss = Some(stop_loss);
        self
    }
}

/// Request body for replacing an open order
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReplaceOrder {
    pub qty: Decimal,
    pub time_in_force: TimeInForce,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

/// Query for listing orders
#[derive(Debug, Clone)]
pub struct ListOrders {
    pub status: OrderQueryStatus,
    pub limit: u32,
    pub after: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub direction: SortDirection,
    pub nested: bool,
}

impl Default for ListOrders {
    fn default() -> Self {
        Self {
            status: OrderQueryStatus::Open,
            limit: 50,
            after: None,
            until: None,
            direction: SortDirection::Descending,
            nested: false,
        }
    }
}

impl ListOrders {
    /// Query-string pairs, optional filters are left out when unset
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("status", self.status.as_str().to_string()),
            ("limit", self.limit.to_string()),
            ("direction", self.direction.as_str().to_string()),
        ];
        if let Some(after) = self.after {
            pairs.push(("after", after.to_rfc3339()));
        }
        if let Some(until) = self.until {
            pairs.push(("until", until.to_rfc3339()));
        }
        if self.nested {
            pairs.push(("nested", "true".to_string()));
        }
        pairs
    }
}
