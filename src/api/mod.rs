//! Relay Hub REST API
//!
//! HTTP control plane and WebSocket endpoint, built with Axum.
//!
//! # Endpoints
//!
//! ## Devices
//! - `POST /api/devices/register` - Register a device, returns its WebSocket URL
//! - `GET /api/devices` - List connected devices
//! - `POST /api/devices/:id/notify` - Send a notification to one device
//!
//! ## Clients
//! - `POST /api/broadcast` - Broadcast an event to every client
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health` - Status and connection counts
//!
//! ## WebSocket
//! - `GET /ws?type=device&deviceId=ID` - Device session
//! - `GET /ws?type=client&clientId=ID` - Client session (also served at `/`)
//!
//! # Example
//!
//! ```rust,no_run
//! use relay_hub::api::{serve, AppState};
//! use relay_hub::config::ServerConfig;
//! use relay_hub::websocket::HubConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let state = AppState::new(config.clone(), HubConfig::default());
//!     serve(state, &config).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::websocket::websocket_handler;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/devices/register", post(routes::devices::register_device))
        .route("/devices", get(routes::devices::list_devices))
        .route("/devices/:id/notify", post(routes::devices::notify_device))
        .route("/broadcast", post(routes::broadcast::broadcast));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/", get(routes::health::health));

    let cors = cors_layer(&state.config);
    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health_routes)
        .route("/ws", get(websocket_handler))
        .route("/", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::permissive().allow_origin(AllowOrigin::list(origins))
    }
}

/// Start the API server
///
/// Every realtime session is closed once the server stops accepting requests.
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<(), ApiError> {
    let hub = Arc::clone(&state.hub);
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Relay hub listening on {}", addr);
    tracing::info!("WebSocket endpoint: {}", config.ws_url());

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&hub)))
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Relay hub shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal, then close realtime sessions so the
/// connection drain can finish
async fn shutdown_signal(hub: Arc<crate::websocket::RelayHub>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
    hub.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::{HubConfig, Outbound, ServerMessage, SessionIdentity, Transport};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    fn create_test_app() -> (Router, Arc<crate::websocket::RelayHub>) {
        let state = AppState::new(ServerConfig::default(), HubConfig::default());
        let hub = Arc::clone(&state.hub);
        (build_router(state), hub)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let (app, _hub) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health/live")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_counts() {
        let (app, hub) = create_test_app();
        let (transport, _rx) = Transport::channel();
        hub.open_session(SessionIdentity::device("D1", None), transport);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["devices"], 1);
        assert_eq!(body["clients"], 0);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_register_device() {
        let (app, hub) = create_test_app();

        let response = app
            .oneshot(post_json(
                "/api/devices/register",
                r#"{"deviceId": "D1", "metadata": {"firmware": "1.2.0"}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["device"]["id"], "D1");
        assert_eq!(body["device"]["metadata"]["firmware"], "1.2.0");
        assert!(body["device"]["registeredAt"].is_string());
        assert_eq!(body["wsUrl"], "ws://localhost:8080/ws");
        assert_eq!(hub.device_count(), 0);
    }

    #[tokio::test]
    async fn test_register_device_missing_id() {
        let (app, _hub) = create_test_app();

        let response = app
            .oneshot(post_json("/api/devices/register", r#"{"metadata": {}}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Device ID required");
    }

    #[tokio::test]
    async fn test_list_devices() {
        let (app, hub) = create_test_app();
        let (transport, _rx) = Transport::channel();
        hub.open_session(SessionIdentity::device("D1", None), transport);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/devices")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["devices"][0]["id"], "D1");
        assert!(body["devices"][0]["lastSeen"].is_string());
    }

    #[tokio::test]
    async fn test_notify_unknown_device() {
        let (app, _hub) = create_test_app();

        let response = app
            .oneshot(post_json(
                "/api/devices/D9/notify",
                r#"{"event": "sync", "data": {}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Device not connected");
    }

    #[tokio::test]
    async fn test_notify_connected_device() {
        let (app, hub) = create_test_app();
        let (transport, mut rx) = Transport::channel();
        hub.open_session(SessionIdentity::device("D1", None), transport);

        let response = app
            .oneshot(post_json(
                "/api/devices/D1/notify",
                r#"{"event": "sync", "data": {"full": true}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body, json!({"success": true, "sent": true}));

        match rx.try_recv().unwrap() {
            Outbound::Frame(frame) => assert_eq!(
                frame.message,
                ServerMessage::Notification {
                    event: Some(json!("sync")),
                    data: Some(json!({"full": true})),
                }
            ),
            Outbound::Close => panic!("Expected notification frame"),
        }
    }

    #[tokio::test]
    async fn test_notify_relays_explicit_null() {
        let (app, hub) = create_test_app();
        let (transport, mut rx) = Transport::channel();
        hub.open_session(SessionIdentity::device("D1", None), transport);

        let response = app
            .oneshot(post_json(
                "/api/devices/D1/notify",
                r#"{"event": "sync", "data": null}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        match rx.try_recv().unwrap() {
            Outbound::Frame(frame) => {
                let value = serde_json::to_value(&frame).unwrap();
                assert_eq!(value.get("data"), Some(&Value::Null));
            }
            Outbound::Close => panic!("Expected notification frame"),
        }
    }

    #[tokio::test]
    async fn test_broadcast() {
        let (app, hub) = create_test_app();
        let (t1, _rx1) = Transport::channel();
        let (t2, _rx2) = Transport::channel();
        hub.open_session(SessionIdentity::client("C1"), t1);
        hub.open_session(SessionIdentity::client("C2"), t2);

        let response = app
            .oneshot(post_json(
                "/api/broadcast",
                r#"{"event": "maintenance", "data": {"in": 60}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body, json!({"success": true, "sent": 2, "recipients": 2}));
    }
}
