use crate::config::AlpacaSettings;
use crate::models::{ListOrders, NewOrder, Order, ReplaceOrder};
use governor::{Quota, RateLimiter};
use reqwest::{header, Client, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

// Trading API allows 200 requests per minute per account
const RATE_LIMIT_RPM: NonZeroU32 = match NonZeroU32::new(200) {
    Some(rpm) => rpm,
    None => panic!("rate limit must be non-zero"),
};
const REQUEST_TIMEOUT_SECS: u64 = 30;

type AlpacaRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Errors returned by the order API client
#[derive(Debug, Error)]
pub enum OrderError {
    /// Network failure, timeout or TLS error
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The broker answered with a non-success status
    #[error("Call to {url} returned an HTTP {status}: {body}")]
    Api {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Call to {url} returned an empty response")]
    EmptyResponse { url: String },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid credentials: {0}")]
    Credentials(#[from] header::InvalidHeaderValue),
}

/// Per-order result of a bulk cancel
#[derive(Debug, Clone, Deserialize)]
pub struct CancelStatus {
    pub id: Uuid,
    pub status: u16,
    #[serde(default)]
    pub body: Option<Order>,
}

/// Client for the Alpaca trading API (orders only)
///
/// Cloneable; clones share the connection pool and rate limiter.
#[derive(Clone)]
pub struct AlpacaClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<AlpacaRateLimiter>,
}

impl AlpacaClient {
    /// Build a client that authenticates every request with the key headers
    pub fn new(settings: &AlpacaSettings) -> Result<Self, OrderError> {
        let mut key_id = header::HeaderValue::from_str(settings.key_id.expose_secret())?;
        key_id.set_sensitive(true);
        let mut secret_key = header::HeaderValue::from_str(settings.secret_key.expose_secret())?;
        secret_key.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert("APCA-API-KEY-ID", key_id);
        headers.insert("APCA-API-SECRET-KEY", secret_key);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(RATE_LIMIT_RPM))),
        })
    }

    fn orders_url(&self) -> String {
        format!("{}/v2/orders", self.base_url)
    }

    fn order_url(&self, id: &str) -> String {
        format!("{}/v2/orders/{}", self.base_url, id)
    }

    /// Fetch one order by broker id
    /// Endpoint: GET /v2/orders/{id}
    pub async fn get_order(&self, id: &str, nested: bool) -> Result<Order, OrderError> {
        let url = self.order_url(id);
        let mut request = self.client.get(&url);
        if nested {
            request = request.query(&[("nested", "true")]);
        }

        let (status, body) = self.execute(request, &url).await?;
        decode(&url, status, body)
    }

    /// Fetch one order by the id the client assigned on submit
    /// Endpoint: GET /v2/orders:by_client_order_id
    pub async fn get_order_by_client_id(&self, client_order_id: &str) -> Result<Order, OrderError> {
        let url = format!("{}/v2/orders:by_client_order_id", self.base_url);
        let request = self
            .client
            .get(&url)
            .query(&[("client_order_id", client_order_id)]);

        let (status, body) = self.execute(request, &url).await?;
        decode(&url, status, body)
    }

    /// List orders
    /// Endpoint: GET /v2/orders
    pub async fn list_orders(&self, query: &ListOrders) -> Result<Vec<Order>, OrderError> {
        let url = self.orders_url();
        let request = self.client.get(&url).query(&query.query_pairs());

        let (status, body) = self.execute(request, &url).await?;
        decode(&url, status, body)
    }

    /// Submit a new order
    /// Endpoint: POST /v2/orders
    pub async fn submit_order(&self, order: &NewOrder) -> Result<Order, OrderError> {
        let url = self.orders_url();
        tracing::info!(
            symbol = %order.symbol,
            qty = %order.qty,
            side = ?order.side,
            order_type = ?order.order_type,
            "Submitting order"
        );

        let (status, body) = self.execute(self.client.post(&url).json(order), &url).await?;
        decode(&url, status, body)
    }

    /// Replace quantity, prices or time in force of an open order
    /// Endpoint: PATCH /v2/orders/{id}
    pub async fn replace_order(&self, id: &str, replace: &ReplaceOrder) -> Result<Order, OrderError> {
        let url = self.order_url(id);
        let (status, body) = self.execute(self.client.patch(&url).json(replace), &url).await?;
        decode(&url, status, body)
    }

    /// Cancel every open order
    /// Endpoint: DELETE /v2/orders (answers 200 or 207 multi-status)
    pub async fn cancel_orders(&self) -> Result<Vec<CancelStatus>, OrderError> {
        let url = self.orders_url();
        let (status, body) = self.execute(self.client.delete(&url), &url).await?;
        decode(&url, status, body)
    }

    /// Cancel one order and return its latest state
    /// Endpoint: DELETE /v2/orders/{id}
    pub async fn cancel_order(&self, id: &str) -> Result<Order, OrderError> {
        let url = self.order_url(id);
        let (status, body) = self.execute(self.client.delete(&url), &url).await?;

        // 204 carries no body, look the order up instead
        if status == StatusCode::NO_CONTENT {
            return self.get_order(id, false).await;
        }

        decode(&url, status, body)
    }

    async fn execute(&self, request: RequestBuilder, url: &str) -> Result<(StatusCode, String), OrderError> {
        self.rate_limiter.until_ready().await;

        tracing::debug!("Making request to: {}", url);
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        Ok((status, body))
    }
}

fn decode<T: DeserializeOwned>(url: &str, status: StatusCode, body: String) -> Result<T, OrderError> {
    if !status.is_success() {
        tracing::warn!("Call to {} returned an HTTP {}", url, status);
        return Err(OrderError::Api {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    if body.trim().is_empty() {
        return Err(OrderError::EmptyResponse {
            url: url.to_string(),
        });
    }

    tracing::debug!("Response from {}: {}", url, body);
    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderQueryStatus, OrderSide, OrderStatus, TimeInForce};
    use mockito::{Matcher, Server};
    use rust_decimal::Decimal;
    use secrecy::SecretString;
    use serde_json::json;

    const ORDER_ID: &str = "904837e3-3b76-47ec-b432-046db621571b";

    fn order_json(status: &str) -> serde_json::Value {
        json!({
            "id": ORDER_ID,
            "client_order_id": "my-order-1",
            "created_at": "2021-03-16T18:38:01.942282Z",
            "updated_at": "2021-03-16T18:38:01.942282Z",
            "submitted_at": "2021-03-16T18:38:01.937734Z",
            "filled_at": null,
            "expired_at": null,
            "canceled_at": null,
            "failed_at": null,
            "symbol": "AAPL",
            "qty": "10",
            "filled_qty": "0",
            "filled_avg_price": null,
            "order_class": "",
            "type": "market",
            "side": "buy",
            "time_in_force": "day",
            "limit_price": null,
            "stop_price": null,
            "status": status,
            "extended_hours": false,
            "legs": null
        })
    }

    fn client_for(server: &Server) -> AlpacaClient {
        let settings = AlpacaSettings {
            base_url: server.url(),
            key_id: SecretString::new("test-key".into()),
            secret_key: SecretString::new("test-secret".into()),
        };
        AlpacaClient::new(&settings).unwrap()
    }

    #[tokio::test]
    async fn test_get_order_sends_credentials() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", format!("/v2/orders/{}", ORDER_ID).as_str())
            .match_header("apca-api-key-id", "test-key")
            .match_header("apca-api-secret-key", "test-secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(order_json("new").to_string())
            .create_async()
            .await;

        let order = client_for(&server).get_order(ORDER_ID, false).await.unwrap();

        mock.assert_async().await;
        assert_eq!(order.symbol, "AAPL");
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.qty, Some(Decimal::from(10)));
    }

    #[tokio::test]
    async fn test_get_order_by_client_id() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/orders:by_client_order_id")
            .match_query(Matcher::UrlEncoded(
                "client_order_id".into(),
                "my-order-1".into(),
            ))
            .with_status(200)
            .with_body(order_json("new").to_string())
            .create_async()
            .await;

        let order = client_for(&server)
            .get_order_by_client_id("my-order-1")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(order.client_order_id, "my-order-1");
    }

    #[tokio::test]
    async fn test_list_orders_query() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/orders")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("status".into(), "closed".into()),
                Matcher::UrlEncoded("limit".into(), "5".into()),
                Matcher::UrlEncoded("direction".into(), "desc".into()),
            ]))
            .with_status(200)
            .with_body(json!([order_json("filled"), order_json("canceled")]).to_string())
            .create_async()
            .await;

        let query = ListOrders {
            status: OrderQueryStatus::Closed,
            limit: 5,
            ..Default::default()
        };
        let orders = client_for(&server).list_orders(&query).await.unwrap();

        mock.assert_async().await;
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].status, OrderStatus::Filled);
        assert_eq!(orders[1].status, OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn test_submit_order_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/orders")
            .match_body(Matcher::PartialJson(json!({
                "symbol": "AAPL",
                "qty": "10",
                "side": "buy",
                "type": "market",
                "time_in_force": "gtc",
                "client_order_id": "my-order-1"
            })))
            .with_status(200)
            .with_body(order_json("accepted").to_string())
            .create_async()
            .await;

        let order = NewOrder::market("AAPL", Decimal::from(10), OrderSide::Buy)
            .time_in_force(TimeInForce::Gtc)
            .client_order_id("my-order-1");
        let submitted = client_for(&server).submit_order(&order).await.unwrap();

        mock.assert_async().await;
        assert_eq!(submitted.status, OrderStatus::Accepted);
    }

    #[tokio::test]
    async fn test_replace_order() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PATCH", format!("/v2/orders/{}", ORDER_ID).as_str())
            .match_body(Matcher::PartialJson(json!({ "qty": "5", "time_in_force": "day" })))
            .with_status(200)
            .with_body(order_json("replaced").to_string())
            .create_async()
            .await;

        let replace = ReplaceOrder {
            qty: Decimal::from(5),
            time_in_force: TimeInForce::Day,
            limit_price: None,
            stop_price: None,
            client_order_id: None,
        };
        let order = client_for(&server).replace_order(ORDER_ID, &replace).await.unwrap();

        mock.assert_async().await;
        assert_eq!(order.status, OrderStatus::Replaced);
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", format!("/v2/orders/{}", ORDER_ID).as_str())
            .with_status(403)
            .with_body(r#"{"code":40310000,"message":"forbidden"}"#)
            .create_async()
            .await;

        let result = client_for(&server).get_order(ORDER_ID, false).await;

        match result {
            Err(OrderError::Api { status, body, .. }) => {
                assert_eq!(status, 403);
                assert!(body.contains("forbidden"));
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_success_body() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", format!("/v2/orders/{}", ORDER_ID).as_str())
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let result = client_for(&server).get_order(ORDER_ID, false).await;
        assert!(matches!(result, Err(OrderError::EmptyResponse { .. })));
    }

    #[tokio::test]
    async fn test_cancel_order_no_content_refetches() {
        let mut server = Server::new_async().await;
        let path = format!("/v2/orders/{}", ORDER_ID);
        let delete = server
            .mock("DELETE", path.as_str())
            .with_status(204)
            .create_async()
            .await;
        let get = server
            .mock("GET", path.as_str())
            .with_status(200)
            .with_body(order_json("pending_cancel").to_string())
            .create_async()
            .await;

        let order = client_for(&server).cancel_order(ORDER_ID).await.unwrap();

        delete.assert_async().await;
        get.assert_async().await;
        assert_eq!(order.status, OrderStatus::PendingCancel);
    }

    #[tokio::test]
    async fn test_cancel_orders_multi_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/v2/orders")
            .with_status(207)
            .with_body(
                json!([{ "id": ORDER_ID, "status": 200, "body": order_json("pending_cancel") }])
                    .to_string(),
            )
            .create_async()
            .await;

        let results = client_for(&server).cancel_orders().await.unwrap();

        mock.assert_async().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, 200);
        assert_eq!(
            results[0].body.as_ref().map(|o| o.status),
            Some(OrderStatus::PendingCancel)
        );
    }
}
