//! In-memory imitation of the Drip v2 REST API.
//!
//! Serves the subscriber, batch, event and tag endpoints under
//! `/v2/{account_id}/...`, checks Basic auth against a configured API key,
//! and keeps every accepted request in a shared `Store` so tests can assert
//! exactly what a client put on the wire.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{delete, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{info, warn};

const JSON_API: &str = "application/vnd.api+json";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriberInput {
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub custom_fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscribersRequest {
    pub subscribers: Vec<SubscriberInput>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchesRequest {
    pub batches: Vec<SubscribersRequest>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub action: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventsRequest {
    pub events: Vec<EventInput>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TagInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub tag: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TagsRequest {
    pub tags: Vec<TagInput>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// A subscriber as the mock remembers it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredSubscriber {
    pub email: String,
    pub custom_fields: Map<String, Value>,
    pub tags: BTreeSet<String>,
}

/// One authorized request, as received.
#[derive(Clone, Debug, Serialize)]
pub struct ReceivedRequest {
    pub method: String,
    pub account_id: String,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Debug, Default)]
pub struct Store {
    /// Keyed by `(account_id, email)`.
    pub subscribers: BTreeMap<(String, String), StoredSubscriber>,
    pub events: Vec<(String, EventInput)>,
    pub requests: Vec<ReceivedRequest>,
}

impl Store {
    pub fn subscriber(&self, account_id: &str, email: &str) -> Option<&StoredSubscriber> {
        self.subscribers.get(&(account_id.to_string(), email.to_string()))
    }

    fn upsert(&mut self, account_id: &str, input: &SubscriberInput) -> StoredSubscriber {
        let entry = self
            .subscribers
            .entry((account_id.to_string(), input.email.clone()))
            .or_insert_with(|| StoredSubscriber {
                email: input.email.clone(),
                ..Default::default()
            });
        for (key, value) in &input.custom_fields {
            entry.custom_fields.insert(key.clone(), value.clone());
        }
        entry.tags.extend(input.tags.iter().cloned());
        entry.clone()
    }
}

pub type Db = Arc<RwLock<Store>>;

#[derive(Clone)]
struct AppState {
    api_key: Arc<str>,
    db: Db,
}

pub fn app(api_key: &str) -> Router {
    app_with_db(api_key, Db::default())
}

/// Router backed by a caller-owned store, so the caller can inspect it.
pub fn app_with_db(api_key: &str, db: Db) -> Router {
    let state = AppState {
        api_key: Arc::from(api_key),
        db,
    };
    Router::new()
        .route("/v2/{account_id}/subscribers", post(upsert_subscribers))
        .route("/v2/{account_id}/subscribers/batches", post(batch_subscribers))
        .route("/v2/{account_id}/events", post(record_events))
        .route("/v2/{account_id}/tags", post(apply_tags))
        .route(
            "/v2/{account_id}/subscribers/{email}/tags/{tag}",
            delete(remove_tag),
        )
        .with_state(state)
}

pub async fn run(listener: TcpListener, api_key: &str) -> Result<(), std::io::Error> {
    run_with_db(listener, api_key, Db::default()).await
}

pub async fn run_with_db(listener: TcpListener, api_key: &str, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_db(api_key, db)).await
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

type Rejection = (StatusCode, Json<Value>);

fn reject(status: StatusCode, code: &str, message: &str) -> Rejection {
    (
        status,
        Json(json!({"errors": [{"code": code, "message": message}]})),
    )
}

/// Checks Basic auth (API key as username) and the JSON:API `Accept` header.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Rejection> {
    let username = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|encoded| STANDARD.decode(encoded).ok())
        .and_then(|raw| String::from_utf8(raw).ok())
        .and_then(|creds| creds.split_once(':').map(|(user, _)| user.to_string()));

    if username.as_deref() != Some(&*state.api_key) {
        warn!("rejected request with bad credentials");
        return Err(reject(
            StatusCode::UNAUTHORIZED,
            "authentication_error",
            "The API key is invalid",
        ));
    }

    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
    if accept != Some(JSON_API) {
        return Err(reject(
            StatusCode::NOT_ACCEPTABLE,
            "accept_error",
            "Accept must be application/vnd.api+json",
        ));
    }
    Ok(())
}

fn validate_subscriber(input: &SubscriberInput) -> Result<(), Rejection> {
    if input.email.trim().is_empty() {
        return Err(reject(
            StatusCode::UNPROCESSABLE_ENTITY,
            "presence_error",
            "Email is required",
        ));
    }
    if let Some(key) = input.custom_fields.keys().find(|key| is_reserved_key(key)) {
        return Err(reject(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_custom_field",
            &format!("Custom field identifier {key:?} contains reserved characters"),
        ));
    }
    Ok(())
}

fn is_reserved_key(key: &str) -> bool {
    key.contains('$') || key.contains(' ') || key.chars().any(char::is_uppercase)
}

fn record<B: Serialize>(store: &mut Store, method: &str, account_id: &str, path: &str, body: Option<&B>) {
    store.requests.push(ReceivedRequest {
        method: method.to_string(),
        account_id: account_id.to_string(),
        path: path.to_string(),
        body: body.and_then(|b| serde_json::to_value(b).ok()),
    });
}

async fn upsert_subscribers(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<SubscribersRequest>,
) -> Result<Json<Value>, Rejection> {
    authorize(&state, &headers)?;
    let mut store = state.db.write().await;
    record(&mut *store, "POST", &account_id, "/subscribers", Some(&input));
    for sub in &input.subscribers {
        validate_subscriber(sub)?;
    }
    let stored: Vec<StoredSubscriber> = input
        .subscribers
        .iter()
        .map(|sub| store.upsert(&account_id, sub))
        .collect();
    info!(%account_id, count = stored.len(), "subscribers upserted");
    Ok(Json(json!({ "subscribers": stored })))
}

async fn batch_subscribers(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<BatchesRequest>,
) -> Result<(StatusCode, Json<Value>), Rejection> {
    authorize(&state, &headers)?;
    let mut store = state.db.write().await;
    record(&mut *store, "POST", &account_id, "/subscribers/batches", Some(&input));
    let subscribers: Vec<&SubscriberInput> = input
        .batches
        .iter()
        .flat_map(|batch| batch.subscribers.iter())
        .collect();
    for sub in &subscribers {
        validate_subscriber(sub)?;
    }
    for sub in &subscribers {
        store.upsert(&account_id, sub);
    }
    info!(%account_id, count = subscribers.len(), "batch processed");
    Ok((StatusCode::CREATED, Json(json!({}))))
}

async fn record_events(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<EventsRequest>,
) -> Result<StatusCode, Rejection> {
    authorize(&state, &headers)?;
    let mut store = state.db.write().await;
    record(&mut *store, "POST", &account_id, "/events", Some(&input));
    if input
        .events
        .iter()
        .any(|e| e.email.trim().is_empty() || e.action.trim().is_empty())
    {
        return Err(reject(
            StatusCode::UNPROCESSABLE_ENTITY,
            "presence_error",
            "Email and action are required",
        ));
    }
    for event in input.events {
        info!(%account_id, action = %event.action, "event recorded");
        store.events.push((account_id.clone(), event));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn apply_tags(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<TagsRequest>,
) -> Result<StatusCode, Rejection> {
    authorize(&state, &headers)?;
    let mut store = state.db.write().await;
    record(&mut *store, "POST", &account_id, "/tags", Some(&input));
    if input
        .tags
        .iter()
        .any(|t| t.email.trim().is_empty() || t.tag.trim().is_empty())
    {
        return Err(reject(
            StatusCode::UNPROCESSABLE_ENTITY,
            "presence_error",
            "Email and tag are required",
        ));
    }
    for TagInput { email, tag } in input.tags {
        let sub = SubscriberInput {
            email,
            tags: vec![tag],
            ..Default::default()
        };
        store.upsert(&account_id, &sub);
    }
    Ok(StatusCode::CREATED)
}

async fn remove_tag(
    State(state): State<AppState>,
    Path((account_id, email, tag)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, Rejection> {
    authorize(&state, &headers)?;
    let mut store = state.db.write().await;
    let path = format!("/subscribers/{email}/tags/{tag}");
    record::<Value>(&mut *store, "DELETE", &account_id, &path, None);
    match store.subscribers.get_mut(&(account_id.clone(), email)) {
        Some(sub) => {
            sub.tags.remove(&tag);
            info!(%account_id, %tag, "tag removed");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(reject(
            StatusCode::NOT_FOUND,
            "not_found_error",
            "The subscriber could not be found",
        )),
    }
}
