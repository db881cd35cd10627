// Stepwise - Java Execution Visualizer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! HTTP request boundary

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use eyre::Result;
use serde_json::json;
use std::fmt::Display;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use stepwise_common::{ErrorResponse, TraceRequest};
use stepwise_engine::{Tracer, TracerConfig};

/// State shared by every request
#[derive(Clone)]
struct ServerState {
    /// Tracer whose session pool bounds concurrent runs
    tracer: Tracer,
}

/// Build the router: `POST /run`, `GET /health`, permissive CORS.
///
/// The CORS layer answers every `OPTIONS` request itself.
pub fn router(tracer: Tracer) -> Router {
    Router::new()
        .route("/run", post(run_trace))
        .route("/health", get(health_check))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(ServerState { tracer })
}

/// Serve until Ctrl+C
pub async fn start_server(host: &str, port: u16, config: TracerConfig) -> Result<()> {
    let sessions = config.max_sessions;
    let app = router(Tracer::new(config));

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!(addr = %listener.local_addr()?, sessions, "Stepwise server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, shutting down...");
        })
        .await?;

    Ok(())
}

async fn run_trace(State(state): State<ServerState>, body: String) -> Response {
    let request = match TraceRequest::from_json(&body) {
        Ok(request) => request,
        Err(e) => return bad_request(e),
    };

    info!(title = %request.title, inputs = request.inputs.len(), "trace requested");
    match state.tracer.trace_document(&request).await {
        Ok(document) => Json(document).into_response(),
        Err(e) => {
            warn!(error = %e, "trace failed");
            bad_request(e)
        }
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

fn bad_request(error: impl Display) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(error))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use stepwise_common::logging;
    use tower::ServiceExt;

    fn app() -> Router {
        router(Tracer::new(TracerConfig::default().with_java_home("/nonexistent/jdk")))
    }

    async fn send(request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    fn post_run(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/run")
            .header("origin", "http://localhost:5173")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn error_of(body: &[u8]) -> String {
        let value: Value = serde_json::from_slice(body).unwrap();
        value["error"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        logging::ensure_test_logging(None);
        info!("Running test");

        let (status, _, body) = send(Request::builder().uri("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_invalid_payload() {
        logging::ensure_test_logging(None);
        info!("Running test");

        let (status, headers, body) = send(post_run("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_of(&body), "Invalid JSON payload");
        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    }

    #[tokio::test]
    async fn test_missing_code() {
        logging::ensure_test_logging(None);
        info!("Running test");

        let (status, _, body) = send(post_run(r#"{"code": "   ", "inputs": []}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_of(&body), "Code is required");
    }

    #[tokio::test]
    async fn test_assembly_error_is_reported() {
        logging::ensure_test_logging(None);
        info!("Running test");

        let (status, _, body) = send(post_run(r#"{"code": "int x = 1;", "inputs": [{"value": "1"}]}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_of(&body), "Could not find an entry method to run.");
    }

    #[tokio::test]
    async fn test_no_inputs_yields_empty_document() {
        logging::ensure_test_logging(None);
        info!("Running test");

        let (status, _, body) = send(post_run(r#"{"code": "int f() { return 1; }"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            serde_json::from_slice::<Value>(&body).unwrap(),
            json!({"title": "Java Visualizer", "language": "Java", "code": "int f() { return 1; }", "inputs": []})
        );
    }

    #[tokio::test]
    async fn test_preflight_and_wrong_method() {
        logging::ensure_test_logging(None);
        info!("Running test");

        let preflight = Request::builder()
            .method("OPTIONS")
            .uri("/run")
            .header("origin", "http://localhost:5173")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = send(preflight).await;
        assert!(status.is_success());
        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
        let methods = headers.get("access-control-allow-methods").unwrap().to_str().unwrap().to_string();
        assert!(methods.contains("POST") && methods.contains("OPTIONS"));

        let bare = Request::builder().method("OPTIONS").uri("/run").body(Body::empty()).unwrap();
        let (status, _, _) = send(bare).await;
        assert!(status.is_success());

        let get_run = Request::builder().method("GET").uri("/run").body(Body::empty()).unwrap();
        let (status, _, _) = send(get_run).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
