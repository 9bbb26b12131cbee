use crate::coordinator::Coordinator;
use crate::models::ThresholdLevel;
use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

#[derive(Debug, Deserialize)]
struct TopicParams {
    topic: String,
}

#[derive(Debug, Deserialize)]
struct TopicBody {
    topic: String,
}

#[derive(Debug, Deserialize)]
struct ThresholdsBody {
    topic: String,
    levels: Vec<ThresholdLevel>,
}

async fn require_api_key(req: Request, next: Next) -> Result<Response, StatusCode> {
    let path = req.uri().path();
    if path.starts_with("/health") || path.starts_with("/live") {
        return Ok(next.run(req).await);
    }

    let expected = std::env::var("VIGIL_API_KEY").unwrap_or_default();
    if expected.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/topics", get(get_topics))
        .route("/topics/subscribe", post(subscribe))
        .route("/topics/unsubscribe", post(unsubscribe))
        .route("/live", get(get_live))
        .route("/thresholds", put(put_thresholds))
        .with_state(app_state)
        .layer(middleware::from_fn(require_api_key))
}

// GET /topics (liste des topics abonnés + état de connexion)
async fn get_topics(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "topics": app.coordinator.subscribed_topics(),
        "connection": format!("{:?}", app.coordinator.connection_state()),
    }))
}

// POST /topics/subscribe {"topic": "sensors/a"} — fire-and-forget, idempotent
async fn subscribe(
    State(app): State<AppState>,
    Json(body): Json<TopicBody>,
) -> (StatusCode, Json<serde_json::Value>) {
    app.coordinator.subscribe_to_topic(&body.topic).await;
    let subscribed = app.coordinator.is_topic_subscribed(&body.topic);
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "topic": body.topic, "subscribed": subscribed })),
    )
}

async fn unsubscribe(
    State(app): State<AppState>,
    Json(body): Json<TopicBody>,
) -> (StatusCode, Json<serde_json::Value>) {
    app.coordinator.unsubscribe_from_topic(&body.topic).await;
    let subscribed = app.coordinator.is_topic_subscribed(&body.topic);
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "topic": body.topic, "subscribed": subscribed })),
    )
}

// GET /live?topic=sensors/a (dernier payload brut, décodable ou non)
async fn get_live(
    State(app): State<AppState>,
    Query(params): Query<TopicParams>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let Some(live) = app.coordinator.get_latest_live_message(&params.topic) else {
        return Err(StatusCode::NOT_FOUND);
    };
    Ok(Json(serde_json::json!({
        "message": { "message": live.message },
        "timestamp": live.timestamp.format(&Rfc3339).unwrap_or_default(),
    })))
}

// PUT /thresholds {"topic": "...", "levels": [{color, value, resetValue}]}
async fn put_thresholds(
    State(app): State<AppState>,
    Json(body): Json<ThresholdsBody>,
) -> (StatusCode, Json<serde_json::Value>) {
    match app.coordinator.update_thresholds(&body.topic, body.levels).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "ok": true, "topic": body.topic })),
        ),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "ok": false, "msg": e.to_string() })),
        ),
    }
}
