//! HTTP access to the marketplace backend.
//!
//! The backend is not uniform about envelopes: list and detail endpoints
//! return bare records, mutations answer `{success, message}`, and the
//! user/item/message endpoints wrap their payload as
//! `{success, message, data}`. [`interpret_ack`] and [`interpret_payload`]
//! normalize the three shapes, and transport or logical failures all end up as
//! a [`ClientError`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::ClientConfig,
    errors::ClientError,
    favorites::ItemSummary,
    messages::{Message, NewMessage},
    orders::{ItemId, Order, OrderPage, Rating},
    session::{TokenStore, Viewer},
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const DEFAULT_FAILURE: &str = "Operation failed";

/// The backend's order operations.
///
/// Every method either takes effect on the server and returns `Ok`, or
/// returns an error and has changed nothing.
#[async_trait]
pub trait OrderService: Send + Sync {
    async fn purchased_orders(&self, page: u32, size: u32) -> Result<OrderPage, ClientError>;
    async fn sold_orders(&self, page: u32, size: u32) -> Result<OrderPage, ClientError>;
    async fn order_detail(&self, order_id: &str) -> Result<Order, ClientError>;
    async fn buy_item(&self, item_id: ItemId) -> Result<(), ClientError>;
    async fn seller_confirm(&self, order_id: &str) -> Result<(), ClientError>;
    async fn cancel(&self, order_id: &str, reason: Option<&str>) -> Result<(), ClientError>;
    async fn buyer_complete(&self, order_id: &str) -> Result<(), ClientError>;
    async fn seller_complete(&self, order_id: &str) -> Result<(), ClientError>;
    async fn buyer_rate_seller(&self, order_id: &str, rating: Rating) -> Result<(), ClientError>;
    async fn seller_rate_buyer(&self, order_id: &str, rating: Rating) -> Result<(), ClientError>;
}

#[async_trait]
pub trait FavoriteService: Send + Sync {
    async fn is_favorite(&self, item_id: ItemId) -> Result<bool, ClientError>;
    async fn add_favorite(&self, item_id: ItemId) -> Result<(), ClientError>;
    async fn remove_favorite(&self, item_id: ItemId) -> Result<(), ClientError>;
    async fn favorites(&self) -> Result<Vec<ItemSummary>, ClientError>;
}

/// Token plus profile returned by a successful login.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginGrant {
    pub token: String,
    #[serde(default)]
    pub user_info: Option<Viewer>,
}

/// `success: true` is the only acknowledgment; anything else did not take effect.
pub fn interpret_ack(body: &Value) -> Result<(), ClientError> {
    match body.get("success") {
        Some(Value::Bool(true)) => Ok(()),
        Some(Value::Bool(false)) => Err(ClientError::Rejected(failure_message(body))),
        _ => Err(ClientError::Malformed(
            "acknowledgment has no boolean `success` field".into(),
        )),
    }
}

/// Decodes `T` from either a `{success, data}` envelope or a bare record.
pub fn interpret_payload<T: DeserializeOwned>(mut body: Value) -> Result<T, ClientError> {
    if body.get("success") == Some(&Value::Bool(false)) {
        return Err(ClientError::Rejected(failure_message(&body)));
    }
    let enveloped = body.get("success") == Some(&Value::Bool(true))
        && body.get("data").is_some_and(|d| !d.is_null());
    let payload = if enveloped {
        body.get_mut("data").map(Value::take).unwrap_or(Value::Null)
    } else {
        body
    };
    serde_json::from_value(payload).map_err(|e| ClientError::Malformed(e.to_string()))
}

fn failure_message(body: &Value) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_FAILURE)
        .to_string()
}

async fn read_body(resp: Response) -> Result<Value, ClientError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ClientError::Unauthorized);
    }
    let bytes = resp.bytes().await?;
    let body = serde_json::from_slice::<Value>(&bytes);
    if !status.is_success() {
        // business errors also come back as 4xx with a `success: false` body
        if let Ok(v) = &body {
            if v.get("success") == Some(&Value::Bool(false)) {
                return Err(ClientError::Rejected(failure_message(v)));
            }
        }
        return Err(ClientError::Http(status.as_u16()));
    }
    body.map_err(|e| ClientError::Malformed(e.to_string()))
}

/// The one HTTP client every view shares.
///
/// Cloning is cheap; clones share the connection pool and the token store.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    prefix: String,
    tokens: Arc<TokenStore>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, tokens: Arc<TokenStore>) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(config.timeout()).build()?;
        Ok(ApiClient {
            http,
            prefix: config.api_prefix(),
            tokens,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}{}", self.prefix, path);
        debug!("{} {} [{}]", method, url, request_id);
        let builder = self
            .http
            .request(method, url)
            .header(REQUEST_ID_HEADER, request_id);
        match self.tokens.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn call(&self, builder: RequestBuilder) -> Result<Value, ClientError> {
        let resp = builder.send().await?;
        read_body(resp).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let body = self.call(self.request(Method::GET, path)).await?;
        interpret_payload(body)
    }

    async fn post_ack(&self, path: &str, payload: Value) -> Result<(), ClientError> {
        let body = self
            .call(self.request(Method::POST, path).json(&payload))
            .await?;
        interpret_ack(&body).inspect_err(|e| warn!("POST {} failed: {}", path, e))
    }

    async fn delete_ack(&self, path: &str) -> Result<(), ClientError> {
        let body = self.call(self.request(Method::DELETE, path)).await?;
        interpret_ack(&body).inspect_err(|e| warn!("DELETE {} failed: {}", path, e))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginGrant, ClientError> {
        let body = self
            .call(
                self.request(Method::POST, "/login")
                    .json(&json!({ "email": email, "password": password })),
            )
            .await?;
        interpret_payload(body)
    }

    pub async fn current_user(&self) -> Result<Viewer, ClientError> {
        self.get("/user/current").await
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        self.post_ack("/logout", json!({})).await
    }

    /// Root messages of an item, each with its replies.
    pub async fn item_messages(&self, item_id: ItemId) -> Result<Vec<Message>, ClientError> {
        self.get(&format!("/messages/item/{}", item_id)).await
    }

    pub async fn post_message(&self, message: &NewMessage) -> Result<Message, ClientError> {
        let body = self
            .call(self.request(Method::POST, "/messages").json(message))
            .await?;
        interpret_payload(body)
    }

    pub async fn delete_message(&self, message_id: i64) -> Result<(), ClientError> {
        self.delete_ack(&format!("/messages/{}", message_id)).await
    }
}

#[async_trait]
impl OrderService for ApiClient {
    async fn purchased_orders(&self, page: u32, size: u32) -> Result<OrderPage, ClientError> {
        self.get(&format!("/order/purchased/{}/{}", page, size))
            .await
    }

    async fn sold_orders(&self, page: u32, size: u32) -> Result<OrderPage, ClientError> {
        self.get(&format!("/order/sold/{}/{}", page, size)).await
    }

    async fn order_detail(&self, order_id: &str) -> Result<Order, ClientError> {
        let body = self
            .call(
                self.request(Method::POST, "/order")
                    .json(&json!({ "orderId": order_id })),
            )
            .await?;
        interpret_payload(body)
    }

    async fn buy_item(&self, item_id: ItemId) -> Result<(), ClientError> {
        self.post_ack(&format!("/order/buy/{}", item_id), json!({}))
            .await
    }

    async fn seller_confirm(&self, order_id: &str) -> Result<(), ClientError> {
        self.post_ack("/order/confirm", json!({ "orderId": order_id }))
            .await
    }

    async fn cancel(&self, order_id: &str, reason: Option<&str>) -> Result<(), ClientError> {
        let mut payload = json!({ "orderId": order_id });
        if let Some(reason) = reason {
            payload["cancelReason"] = json!(reason);
        }
        self.post_ack("/order/cancel", payload).await
    }

    async fn buyer_complete(&self, order_id: &str) -> Result<(), ClientError> {
        self.post_ack("/order/buyer/complete", json!({ "orderId": order_id }))
            .await
    }

    async fn seller_complete(&self, order_id: &str) -> Result<(), ClientError> {
        self.post_ack("/order/seller/complete", json!({ "orderId": order_id }))
            .await
    }

    // `/order/seller/credit` stores the seller's credit, i.e. the buyer's rating of the seller
    async fn buyer_rate_seller(&self, order_id: &str, rating: Rating) -> Result<(), ClientError> {
        self.post_ack(
            "/order/seller/credit",
            json!({ "orderId": order_id, "credit": rating.value() }),
        )
        .await
    }

    async fn seller_rate_buyer(&self, order_id: &str, rating: Rating) -> Result<(), ClientError> {
        self.post_ack(
            "/order/buyer/credit",
            json!({ "orderId": order_id, "credit": rating.value() }),
        )
        .await
    }
}

#[async_trait]
impl FavoriteService for ApiClient {
    async fn is_favorite(&self, item_id: ItemId) -> Result<bool, ClientError> {
        self.get(&format!("/items/{}/favorite/check", item_id))
            .await
    }

    async fn add_favorite(&self, item_id: ItemId) -> Result<(), ClientError> {
        self.post_ack(&format!("/items/{}/favorite", item_id), json!({}))
            .await
    }

    async fn remove_favorite(&self, item_id: ItemId) -> Result<(), ClientError> {
        self.delete_ack(&format!("/items/{}/favorite", item_id))
            .await
    }

    async fn favorites(&self) -> Result<Vec<ItemSummary>, ClientError> {
        self.get("/items/favorites/user").await
    }
}
