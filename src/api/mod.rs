//! REST API layer: route handlers, DTOs, OpenAPI document, app assembly.

pub mod dto;
pub mod handlers;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// OpenAPI description of the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "signal-relay",
        description = "Array upload/retrieval over HTTP and a broadcast signal stream over WebSocket (`/ws/stream`)."
    ),
    paths(
        handlers::arrays::upload_array,
        handlers::arrays::list_arrays,
        handlers::arrays::get_array,
        handlers::arrays::download_array,
        handlers::control::start_streaming,
        handlers::control::stop_streaming,
        handlers::system::health_handler,
    ),
    tags(
        (name = "Arrays", description = "Uploaded array storage"),
        (name = "Control", description = "Broadcast stream control"),
        (name = "System", description = "Health"),
    )
)]
pub struct ApiDoc;

/// Builds the REST router (no state attached).
pub fn build_router() -> Router<AppState> {
    handlers::routes()
}

/// Assembles the complete application: REST routes, the streaming
/// WebSocket endpoint, API docs, and the HTTP middleware stack.
pub fn build_app(state: AppState, max_upload_bytes: usize) -> Router {
    let router = build_router().route("/ws/stream", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    #[cfg(not(feature = "swagger-ui"))]
    let router = router.route(
        "/api-docs/openapi.json",
        get(|| async { axum::Json(ApiDoc::openapi()) }),
    );

    router
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::DEFAULT_MAX_UPLOAD_BYTES;
    use crate::domain::GeneratorConfig;

    fn app() -> (Router, AppState) {
        let Ok(state) = AppState::new(GeneratorConfig::default()) else {
            panic!("valid state");
        };
        (build_app(state.clone(), DEFAULT_MAX_UPLOAD_BYTES), state)
    }

    async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let Ok(request) = Request::builder().method(method).uri(uri).body(Body::empty()) else {
            panic!("valid request");
        };
        let Ok(response) = app.oneshot(request).await else {
            panic!("router is infallible");
        };
        let status = response.status();
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
            panic!("readable body");
        };
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[test]
    fn openapi_lists_every_path() {
        let doc = ApiDoc::openapi();
        for path in [
            "/upload",
            "/arrays",
            "/array/{index}",
            "/array/{index}/npy",
            "/control/start",
            "/control/stop",
            "/health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[tokio::test]
    async fn health_reports_initial_state() {
        let (app, _state) = app();
        let (status, body) = send(app, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["streaming"], false);
        assert_eq!(body["connections"], 0);
        assert_eq!(body["arrays_stored"], 0);
    }

    #[tokio::test]
    async fn control_endpoints_toggle_stream() {
        let (app, state) = app();

        let (status, body) = send(app.clone(), "POST", "/control/start").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "streaming started");
        assert!(state.stream.is_active());

        let (_, health) = send(app.clone(), "GET", "/health").await;
        assert_eq!(health["streaming"], true);

        let (status, body) = send(app, "POST", "/control/stop").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "streaming stopped");
        assert!(!state.stream.is_active());
    }

    #[tokio::test]
    async fn missing_array_is_404() {
        let (app, _state) = app();
        let (status, body) = send(app, "GET", "/array/3").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], 2001);
    }

    #[tokio::test]
    async fn empty_listing() {
        let (app, _state) = app();
        let (status, body) = send(app, "GET", "/arrays").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"count": 0, "arrays": []}));
    }
}
