//! In-process stand-in for the marketplace backend.
//!
//! Mirrors the backend's order rules and response shapes closely enough to
//! drive the real HTTP client: bare pages and orders, `{success, message}`
//! acknowledgments, `{success, data}` envelopes for users and items.

#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use campus_market::{
    api::ApiClient,
    config::ClientConfig,
    orders::{Credit, ItemRef, Order, OrderStatus, Rating, UserId, UserRef},
    session::TokenStore,
};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const ALICE: UserId = 7;
pub const BOB: UserId = 9;
pub const ALICE_TOKEN: &str = "token-alice";
pub const BOB_TOKEN: &str = "token-bob";

#[derive(Default)]
pub struct MockState {
    pub orders: Mutex<Vec<Order>>,
    pub favorites: Mutex<HashSet<(UserId, i64)>>,
    pub messages: Mutex<Vec<Value>>,
    /// `Authorization` header of every request, in arrival order.
    pub auth_headers: Mutex<Vec<Option<String>>>,
    pub request_ids: Mutex<Vec<String>>,
    /// When set, order mutations answer without a `success` flag.
    pub malformed_acks: AtomicBool,
}

impl MockState {
    pub fn order(&self, order_id: &str) -> Option<Order> {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.order_id == order_id)
            .cloned()
    }

    pub fn insert(&self, order: Order) {
        self.orders.lock().unwrap().push(order);
    }
}

pub fn user(id: UserId) -> UserRef {
    let (name, phone) = if id == ALICE {
        ("alice", "555-0100")
    } else {
        ("bob", "555-0199")
    };
    UserRef {
        user_id: id,
        username: name.into(),
        phone: Some(phone.into()),
    }
}

/// An order from Alice (buyer) to Bob (seller).
pub fn order(id: &str, status: OrderStatus, buyer_done: bool, seller_done: bool) -> Order {
    Order {
        order_id: id.into(),
        buyer: user(ALICE),
        seller: user(BOB),
        item: ItemRef {
            item_id: 42,
            item_name: "Desk lamp".into(),
            image_url: Some("/img/42.png".into()),
            price: Some(Decimal::new(3550, 2)),
        },
        order_amount: Decimal::new(3550, 2),
        order_status: status,
        if_buyer_confirm: buyer_done,
        if_seller_confirm: seller_done,
        create_time: chrono::NaiveDate::from_ymd_opt(2025, 5, 20)
            .and_then(|d| d.and_hms_opt(10, 0, 0)),
        confirm_time: None,
        finish_time: None,
        cancel_time: None,
        cancel_reason: None,
        buyer_credit: None,
        seller_credit: None,
    }
}

type Shared = Arc<MockState>;

fn caller(state: &MockState, headers: &HeaderMap) -> Option<UserId> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    if let Some(id) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
        state.request_ids.lock().unwrap().push(id.to_string());
    }
    state.auth_headers.lock().unwrap().push(auth.clone());
    match auth.as_deref() {
        Some("Bearer token-alice") => Some(ALICE),
        Some("Bearer token-bob") => Some(BOB),
        _ => None,
    }
}

fn fail(message: &str) -> Response {
    Json(json!({ "success": false, "message": message })).into_response()
}

fn not_logged_in() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "message": "not logged in or token invalid" })),
    )
        .into_response()
}

fn ack(state: &MockState) -> Response {
    if state.malformed_acks.load(Ordering::SeqCst) {
        return Json(json!({ "ok": true })).into_response();
    }
    Json(json!({ "success": true })).into_response()
}

fn order_id(body: &Value) -> String {
    body["orderId"].as_str().unwrap_or_default().to_string()
}

fn now() -> Option<chrono::NaiveDateTime> {
    Some(chrono::Local::now().naive_local())
}

async fn login(Json(body): Json<Value>) -> Response {
    let (token, id) = match (body["email"].as_str(), body["password"].as_str()) {
        (Some("alice@campus.edu"), Some("secret")) => (ALICE_TOKEN, ALICE),
        (Some("bob@campus.edu"), Some("secret")) => (BOB_TOKEN, BOB),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "message": "Invalid email or password" })),
            )
                .into_response();
        }
    };
    let u = user(id);
    Json(json!({
        "success": true,
        "message": "login succeeded",
        "data": {
            "success": true,
            "token": token,
            "userInfo": {
                "userId": id,
                "username": u.username,
                "email": format!("{}@campus.edu", u.username),
                "role": "USER"
            }
        }
    }))
    .into_response()
}

async fn current_user(State(state): State<Shared>, headers: HeaderMap) -> Response {
    match caller(&state, &headers) {
        Some(id) => {
            let u = user(id);
            Json(json!({
                "success": true,
                "data": { "userId": id, "username": u.username, "phone": u.phone }
            }))
            .into_response()
        }
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "token expired" })),
        )
            .into_response(),
    }
}

async fn logout(State(state): State<Shared>, headers: HeaderMap) -> Response {
    caller(&state, &headers);
    Json(json!({ "success": true })).into_response()
}

fn page_of(state: &MockState, page: usize, size: usize, pick: impl Fn(&Order) -> bool) -> Value {
    let mine: Vec<Order> = state
        .orders
        .lock()
        .unwrap()
        .iter()
        .filter(|o| pick(o))
        .cloned()
        .collect();
    let start = (page * size).min(mine.len());
    let end = (start + size).min(mine.len());
    json!({
        "content": &mine[start..end],
        "last": end >= mine.len(),
        "number": page,
        "size": size,
        "totalElements": mine.len(),
    })
}

async fn purchased(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((page, size)): Path<(usize, usize)>,
) -> Response {
    let Some(me) = caller(&state, &headers) else {
        return not_logged_in();
    };
    Json(page_of(&state, page, size, |o| o.buyer.user_id == me)).into_response()
}

async fn sold(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((page, size)): Path<(usize, usize)>,
) -> Response {
    let Some(me) = caller(&state, &headers) else {
        return not_logged_in();
    };
    Json(page_of(&state, page, size, |o| o.seller.user_id == me)).into_response()
}

async fn detail(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    caller(&state, &headers);
    match state.order(&order_id(&body)) {
        Some(order) => Json(order).into_response(),
        None => fail("order not found"),
    }
}

async fn buy(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
) -> Response {
    let Some(me) = caller(&state, &headers) else {
        return not_logged_in();
    };
    if me == BOB {
        return fail("cannot buy your own item");
    }
    let mut orders = state.orders.lock().unwrap();
    let id = format!("ORD{}", 1000 + orders.len());
    let mut created = order(&id, OrderStatus::PendingSellerConfirmation, false, false);
    created.item.item_id = item_id;
    orders.push(created);
    Json(json!({ "success": true })).into_response()
}

/// Applies `f` to the order named in `body`; `f` returns an error message to reject.
fn mutate(
    state: &MockState,
    headers: &HeaderMap,
    body: &Value,
    f: impl FnOnce(UserId, &mut Order) -> Result<(), &'static str>,
) -> Response {
    let Some(me) = caller(state, headers) else {
        return not_logged_in();
    };
    let id = order_id(body);
    let outcome = {
        let mut orders = state.orders.lock().unwrap();
        match orders.iter_mut().find(|o| o.order_id == id) {
            Some(order) => f(me, order),
            None => Err("order not found"),
        }
    };
    match outcome {
        Ok(()) => ack(state),
        Err(message) => fail(message),
    }
}

async fn confirm(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    mutate(&state, &headers, &body, |me, o| {
        if o.seller.user_id != me || o.order_status != OrderStatus::PendingSellerConfirmation {
            return Err("order cannot be confirmed");
        }
        o.order_status = OrderStatus::Confirmed;
        o.confirm_time = now();
        Ok(())
    })
}

async fn cancel(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let reason = body["cancelReason"].as_str().map(String::from);
    mutate(&state, &headers, &body, |_, o| {
        if o.order_status.is_terminal() {
            return Err("order can no longer be cancelled");
        }
        o.order_status = OrderStatus::Cancelled;
        o.cancel_time = now();
        o.cancel_reason = reason;
        Ok(())
    })
}

fn complete(o: &mut Order, buyer_side: bool) -> Result<(), &'static str> {
    if !matches!(
        o.order_status,
        OrderStatus::Confirmed | OrderStatus::AwaitingMutualCompletion
    ) {
        return Err("order is not awaiting completion");
    }
    if buyer_side {
        o.if_buyer_confirm = true;
    } else {
        o.if_seller_confirm = true;
    }
    o.finish_time = now();
    o.order_status = if o.if_buyer_confirm && o.if_seller_confirm {
        OrderStatus::Completed
    } else {
        OrderStatus::AwaitingMutualCompletion
    };
    Ok(())
}

async fn buyer_complete(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    mutate(&state, &headers, &body, |_, o| complete(o, true))
}

async fn seller_complete(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    mutate(&state, &headers, &body, |_, o| complete(o, false))
}

fn credit(body: &Value) -> Option<Credit> {
    let raw = u8::try_from(body["credit"].as_u64()?).ok()?;
    Rating::try_from(raw).ok().map(|rating| Credit { rating })
}

async fn buyer_credit(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let c = credit(&body);
    mutate(&state, &headers, &body, |_, o| {
        if o.order_status != OrderStatus::Completed {
            return Err("order is not completed");
        }
        o.buyer_credit = Some(c.ok_or("invalid credit")?);
        Ok(())
    })
}

async fn seller_credit(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let c = credit(&body);
    mutate(&state, &headers, &body, |_, o| {
        if o.order_status != OrderStatus::Completed {
            return Err("order is not completed");
        }
        o.seller_credit = Some(c.ok_or("invalid credit")?);
        Ok(())
    })
}

async fn favorite_check(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
) -> Response {
    let Some(me) = caller(&state, &headers) else {
        return not_logged_in();
    };
    let saved = state.favorites.lock().unwrap().contains(&(me, item_id));
    Json(json!({ "success": true, "message": "ok", "data": saved })).into_response()
}

async fn favorite_add(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
) -> Response {
    let Some(me) = caller(&state, &headers) else {
        return not_logged_in();
    };
    state.favorites.lock().unwrap().insert((me, item_id));
    Json(json!({ "success": true, "message": "saved", "data": null })).into_response()
}

async fn favorite_remove(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
) -> Response {
    let Some(me) = caller(&state, &headers) else {
        return not_logged_in();
    };
    state.favorites.lock().unwrap().remove(&(me, item_id));
    Json(json!({ "success": true, "message": "removed", "data": null })).into_response()
}

async fn favorite_list(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let Some(me) = caller(&state, &headers) else {
        return not_logged_in();
    };
    let items: Vec<Value> = state
        .favorites
        .lock()
        .unwrap()
        .iter()
        .filter(|(u, _)| *u == me)
        .map(|(_, item)| json!({ "itemId": item, "title": format!("item {}", item), "price": 10 }))
        .collect();
    Json(json!({ "success": true, "data": items })).into_response()
}

async fn item_messages(State(state): State<Shared>, Path(item_id): Path<i64>) -> Response {
    let all = state.messages.lock().unwrap().clone();
    let roots: Vec<Value> = all
        .iter()
        .filter(|m| m["itemId"] == json!(item_id) && m["parentId"] == json!(0))
        .map(|root| {
            let mut root = root.clone();
            let replies: Vec<Value> = all
                .iter()
                .filter(|m| m["parentId"] == root["messageId"])
                .cloned()
                .collect();
            root["replies"] = json!(replies);
            root
        })
        .collect();
    Json(json!({ "success": true, "data": roots })).into_response()
}

async fn post_message(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(me) = caller(&state, &headers) else {
        return not_logged_in();
    };
    let mut messages = state.messages.lock().unwrap();
    let created = json!({
        "messageId": messages.len() as i64 + 1,
        "itemId": body["itemId"],
        "content": body["content"],
        "userId": me,
        "username": user(me).username,
        "parentId": body["parentId"],
        "createTime": "2025-05-20T10:15:00",
        "replies": null
    });
    messages.push(created.clone());
    Json(json!({ "success": true, "message": "posted", "data": created })).into_response()
}

async fn delete_message(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if caller(&state, &headers).is_none() {
        return not_logged_in();
    }
    let mut messages = state.messages.lock().unwrap();
    let before = messages.len();
    messages.retain(|m| m["messageId"] != json!(id));
    if messages.len() == before {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "message": "message not found" })),
        )
            .into_response();
    }
    Json(json!({ "success": true, "data": null })).into_response()
}

pub fn router(state: Shared) -> Router {
    Router::new()
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/user/current", get(current_user))
        .route("/api/order", post(detail))
        .route("/api/order/purchased/{page}/{size}", get(purchased))
        .route("/api/order/sold/{page}/{size}", get(sold))
        .route("/api/order/buy/{item_id}", post(buy))
        .route("/api/order/confirm", post(confirm))
        .route("/api/order/cancel", post(cancel))
        .route("/api/order/buyer/complete", post(buyer_complete))
        .route("/api/order/seller/complete", post(seller_complete))
        .route("/api/order/buyer/credit", post(buyer_credit))
        .route("/api/order/seller/credit", post(seller_credit))
        .route("/api/items/{item_id}/favorite/check", get(favorite_check))
        .route(
            "/api/items/{item_id}/favorite",
            post(favorite_add).delete(favorite_remove),
        )
        .route("/api/items/favorites/user", get(favorite_list))
        .route("/api/messages", post(post_message))
        .route("/api/messages/item/{item_id}", get(item_messages))
        .route("/api/messages/{id}", delete(delete_message))
        .with_state(state)
}

/// Serves the mock on an ephemeral port; returns its base URL.
pub async fn spawn_backend(state: Shared) -> (String, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state);
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), handle)
}

/// A client for `base` signed in with `token` (or anonymous).
pub fn client(base: &str, token: Option<&str>) -> ApiClient {
    let tokens = Arc::new(TokenStore::in_memory());
    tokens.set(token.map(String::from)).unwrap();
    ApiClient::new(&ClientConfig::for_base_url(base), tokens).unwrap()
}
