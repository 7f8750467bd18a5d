//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to [`SessionService`](crate::services::SessionService).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::api::response::{api_error, api_ok, api_success};
use crate::api::AppState;
use crate::constants::SERVICE_ID;
use crate::error::SessionResult;
use crate::session::{LoopMode, Requester};
use crate::track::GroupId;
use crate::transport::TransportTarget;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct JoinRequest {
    target: String,
}

#[derive(Deserialize)]
struct PlayRequest {
    query: String,
    requester: String,
    /// Where to auto-join when the group is not connected yet.
    #[serde(default)]
    target: Option<String>,
}

#[derive(Deserialize)]
struct VolumeRequest {
    /// Signed so out-of-range values reach validation instead of failing to parse.
    volume: i64,
}

#[derive(Deserialize)]
struct LoopRequest {
    mode: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/groups", get(list_groups))
        .route("/api/groups/{group}", get(get_status))
        .route("/api/groups/{group}/queue", get(get_queue))
        .route("/api/groups/{group}/queue/{position}", delete(remove_entry))
        .route("/api/groups/{group}/current", get(get_current))
        .route("/api/groups/{group}/join", post(join))
        .route("/api/groups/{group}/play", post(play))
        .route("/api/groups/{group}/pause", post(pause))
        .route("/api/groups/{group}/resume", post(resume))
        .route("/api/groups/{group}/skip", post(skip))
        .route("/api/groups/{group}/stop", post(stop))
        .route("/api/groups/{group}/shuffle", post(shuffle))
        .route("/api/groups/{group}/leave", post(leave))
        .route("/api/groups/{group}/volume", post(set_volume))
        .route("/api/groups/{group}/loop", post(set_loop))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Queries
// ─────────────────────────────────────────────────────────────────────────────

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "sessions": state.sessions.registry().len(),
        "limits": {
            "idleTimeoutSecs": state.config.idle_timeout_secs
        }
    }))
}

async fn list_groups(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.sessions.statuses())
}

async fn get_status(Path(group): Path<String>, State(state): State<AppState>) -> Response {
    match state.sessions.status(&GroupId::from(group.as_str())) {
        Some(status) => api_success(status).into_response(),
        None => api_error(
            StatusCode::NOT_FOUND,
            "session_not_found",
            format!("No session for group {}", group),
        )
        .into_response(),
    }
}

async fn get_queue(Path(group): Path<String>, State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.sessions.list_queue(&GroupId::from(group)))
}

async fn get_current(
    Path(group): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let track = state.sessions.current_track(&GroupId::from(group));
    api_success(json!({ "track": track }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

async fn join(
    Path(group): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<JoinRequest>,
) -> SessionResult<impl IntoResponse> {
    state
        .sessions
        .join(&GroupId::from(group), TransportTarget(payload.target))
        .await?;
    Ok(api_ok())
}

async fn play(
    Path(group): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<PlayRequest>,
) -> SessionResult<impl IntoResponse> {
    let mut requester = Requester::new(payload.requester);
    if let Some(target) = payload.target {
        requester = requester.with_target(target);
    }
    let track = state
        .sessions
        .play(&GroupId::from(group), &payload.query, requester)
        .await?;
    Ok(api_success(json!({ "track": track })))
}

async fn pause(
    Path(group): Path<String>,
    State(state): State<AppState>,
) -> SessionResult<impl IntoResponse> {
    state.sessions.pause(&GroupId::from(group)).await?;
    Ok(api_ok())
}

async fn resume(
    Path(group): Path<String>,
    State(state): State<AppState>,
) -> SessionResult<impl IntoResponse> {
    state.sessions.resume(&GroupId::from(group)).await?;
    Ok(api_ok())
}

async fn skip(
    Path(group): Path<String>,
    State(state): State<AppState>,
) -> SessionResult<impl IntoResponse> {
    state.sessions.skip(&GroupId::from(group)).await?;
    Ok(api_ok())
}

async fn stop(
    Path(group): Path<String>,
    State(state): State<AppState>,
) -> SessionResult<impl IntoResponse> {
    state.sessions.stop(&GroupId::from(group)).await?;
    Ok(api_ok())
}

async fn shuffle(
    Path(group): Path<String>,
    State(state): State<AppState>,
) -> SessionResult<impl IntoResponse> {
    state.sessions.shuffle(&GroupId::from(group)).await?;
    Ok(api_ok())
}

async fn leave(
    Path(group): Path<String>,
    State(state): State<AppState>,
) -> SessionResult<impl IntoResponse> {
    state.sessions.leave(&GroupId::from(group)).await?;
    Ok(api_ok())
}

async fn remove_entry(
    Path((group, position)): Path<(String, usize)>,
    State(state): State<AppState>,
) -> SessionResult<impl IntoResponse> {
    let removed = state
        .sessions
        .remove(&GroupId::from(group), position)
        .await?;
    Ok(api_success(json!({ "removed": removed })))
}

async fn set_volume(
    Path(group): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<VolumeRequest>,
) -> SessionResult<impl IntoResponse> {
    state
        .sessions
        .set_volume(&GroupId::from(group), payload.volume)
        .await?;
    Ok(api_success(json!({ "volume": payload.volume })))
}

async fn set_loop(
    Path(group): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<LoopRequest>,
) -> SessionResult<impl IntoResponse> {
    let mode: LoopMode = payload.mode.parse()?;
    state.sessions.set_loop(&GroupId::from(group), mode).await?;
    Ok(api_success(json!({ "mode": mode })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::events::NoopEventEmitter;
    use crate::runtime::TokioSpawner;
    use crate::services::{SessionRegistry, SessionService};
    use crate::test_support::{candidate, session_deps, test_config, MockCatalog, MockTransport};

    fn app() -> (Router, Arc<MockCatalog>) {
        let catalog = Arc::new(MockCatalog::new());
        let config = test_config();
        let sessions = Arc::new(SessionService::new(
            Arc::new(SessionRegistry::new()),
            session_deps(
                catalog.clone(),
                Arc::new(MockTransport::new()),
                Arc::new(NoopEventEmitter),
                config.clone(),
            ),
            TokioSpawner::current(),
        ));
        let state = AppState {
            sessions,
            config: Arc::new(config),
        };
        (create_router(state), catalog)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => request
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_service() {
        let (app, _) = app();
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], SERVICE_ID);
        assert_eq!(body["sessions"], 0);
    }

    #[tokio::test]
    async fn play_then_query_current_and_status() {
        let (app, catalog) = app();
        catalog.add("song-a", vec![candidate("song-a-match")]);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/groups/g1/play",
            Some(json!({ "query": "song-a", "requester": "userX", "target": "voice-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["track"]["title"], "song-a-match");

        let (_, body) = send(&app, Method::GET, "/api/groups/g1/current", None).await;
        assert_eq!(body["track"]["requester"], "userX");

        let (_, body) = send(&app, Method::GET, "/api/groups/g1", None).await;
        assert_eq!(body["playback"], "playing");
        assert_eq!(body["connection"], "connected");
    }

    #[tokio::test]
    async fn unknown_group_status_is_not_found() {
        let (app, _) = app();
        let (status, body) = send(&app, Method::GET, "/api/groups/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "session_not_found");
    }

    #[tokio::test]
    async fn volume_out_of_range_is_bad_request() {
        let (app, _) = app();
        for volume in [101, -1] {
            let (status, body) = send(
                &app,
                Method::POST,
                "/api/groups/g1/volume",
                Some(json!({ "volume": volume })),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "out_of_range");
        }
    }

    #[tokio::test]
    async fn invalid_loop_mode_is_bad_request() {
        let (app, _) = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/groups/g1/loop",
            Some(json!({ "mode": "forever" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_mode");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/groups/g1/loop",
            Some(json!({ "mode": "queue" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "queue");
    }

    #[tokio::test]
    async fn pause_without_playback_is_conflict() {
        let (app, _) = app();
        let (status, body) = send(&app, Method::POST, "/api/groups/g1/pause", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "nothing_playing");
    }

    #[tokio::test]
    async fn no_match_is_not_found() {
        let (app, _) = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/groups/g1/play",
            Some(json!({ "query": "unknown", "requester": "u", "target": "voice-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "no_match");
    }

    #[tokio::test]
    async fn remove_and_leave_round_trip() {
        let (app, catalog) = app();
        for title in ["a", "b"] {
            catalog.add(title, vec![candidate(title)]);
            send(
                &app,
                Method::POST,
                "/api/groups/g1/play",
                Some(json!({ "query": title, "requester": "u", "target": "voice-1" })),
            )
            .await;
        }

        let (status, body) = send(&app, Method::DELETE, "/api/groups/g1/queue/0", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"]["title"], "b");

        let (status, _) = send(&app, Method::DELETE, "/api/groups/g1/queue/0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::POST, "/api/groups/g1/leave", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&app, Method::GET, "/api/groups", None).await;
        assert_eq!(body, json!([]));
    }
}
