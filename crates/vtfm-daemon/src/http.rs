use crate::coordinator::{CoordinatorError, CoordinatorHandle};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use vtfm_proto::catalog::{QualityId, StationId};
use vtfm_proto::protocol::PlayerState;

#[derive(Clone)]
struct HttpState {
    coordinator: CoordinatorHandle,
}

#[derive(Serialize)]
struct ApiError {
    error: String,
}

struct ApiFailure(CoordinatorError);

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = match self.0 {
            CoordinatorError::UnknownStation(_) | CoordinatorError::UnknownQuality(_) => {
                StatusCode::NOT_FOUND
            }
            CoordinatorError::Engine(_) => StatusCode::BAD_GATEWAY,
            CoordinatorError::Closed => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ApiError {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<CoordinatorError> for ApiFailure {
    fn from(e: CoordinatorError) -> Self {
        ApiFailure(e)
    }
}

type ApiResult = Result<Json<PlayerState>, ApiFailure>;

pub fn router(coordinator: CoordinatorHandle) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/toggle", get(toggle).post(toggle))
        .route("/api/stop", get(stop).post(stop))
        .route("/api/station/:id", get(change_station).post(change_station))
        .route("/api/quality/:id", get(change_quality).post(change_quality))
        .layer(CorsLayer::permissive())
        .with_state(HttpState { coordinator })
}

pub fn start_server(
    bind_address: String,
    port: u16,
    coordinator: CoordinatorHandle,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(coordinator);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_state(State(state): State<HttpState>) -> ApiResult {
    Ok(Json(state.coordinator.snapshot().await?))
}

async fn toggle(State(state): State<HttpState>) -> ApiResult {
    info!("HTTP API: Toggle playback");
    Ok(Json(state.coordinator.toggle_playback().await?))
}

async fn stop(State(state): State<HttpState>) -> ApiResult {
    info!("HTTP API: Stop");
    Ok(Json(state.coordinator.stop().await?))
}

async fn change_station(State(state): State<HttpState>, Path(id): Path<StationId>) -> ApiResult {
    info!("HTTP API: Station {}", id);
    Ok(Json(state.coordinator.change_station(id).await?))
}

async fn change_quality(State(state): State<HttpState>, Path(id): Path<QualityId>) -> ApiResult {
    info!("HTTP API: Quality {}", id);
    Ok(Json(state.coordinator.change_quality(id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{Coordinator, CoordinatorParts, CoordinatorSettings};
    use crate::testing::{FakeEngine, ScriptedTitles};
    use std::sync::Arc;
    use tokio::sync::broadcast;
    use vtfm_proto::catalog::Catalog;
    use vtfm_proto::store::MemoryStore;

    struct Api {
        base: String,
        client: reqwest::Client,
        engine: Arc<FakeEngine>,
        coordinator: CoordinatorHandle,
    }

    async fn spawn_api() -> Api {
        let engine = Arc::new(FakeEngine::default());
        let (broadcast_tx, _) = broadcast::channel(64);
        let parts = CoordinatorParts {
            catalog: Arc::new(Catalog::builtin()),
            engine: engine.clone(),
            store: Arc::new(MemoryStore::new()),
            titles: Arc::new(ScriptedTitles::default()),
            broadcast_tx,
        };
        let (coordinator, _task) = Coordinator::spawn(parts, CoordinatorSettings::default()).await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(coordinator.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Api {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            engine,
            coordinator,
        }
    }

    #[tokio::test]
    async fn test_state_endpoint() {
        let api = spawn_api().await;
        let resp = api
            .client
            .get(format!("{}/api/state", api.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["selection"]["station"], "111");
        assert_eq!(body["selection"]["quality"], "2");
        assert_eq!(body["load_state"], "Empty");
        assert_eq!(body["stations"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_station_switch_returns_new_state() {
        let api = spawn_api().await;
        let resp = api
            .client
            .post(format!("{}/api/station/222", api.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["selection"]["station"], "222");
        assert_eq!(body["load_state"], "Loaded");
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let api = spawn_api().await;
        for path in ["/api/station/999", "/api/quality/7"] {
            let resp = api
                .client
                .get(format!("{}{}", api.base, path))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND, "{path}");
            let body: serde_json::Value = resp.json().await.unwrap();
            assert!(body["error"].as_str().unwrap().starts_with("unknown"));
        }
        assert!(api.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_is_bad_gateway() {
        let api = spawn_api().await;
        api.engine.update(|s| s.fail_reset = true);

        let resp = api
            .client
            .post(format!("{}/api/toggle", api.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_stopped_coordinator_is_internal_error() {
        let api = spawn_api().await;
        api.coordinator.shutdown().await;

        let resp = api
            .client
            .get(format!("{}/api/stop", api.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_cors_headers_present() {
        let api = spawn_api().await;
        let resp = api
            .client
            .get(format!("{}/api/state", api.base))
            .header("Origin", "http://example.test")
            .send()
            .await
            .unwrap();
        assert!(resp
            .headers()
            .contains_key("access-control-allow-origin"));
    }
}
