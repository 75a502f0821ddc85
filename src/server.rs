//! Local edge simulator
//!
//! Converts each HTTP request into an [`EdgeRequest`], runs the authorizer
//! the way the edge substrate would, and on allow serves the file from the
//! configured site root.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::authorizer::{Authorizer, Decision};
use crate::config::ServerConfig;
use crate::edge::{EdgeRequest, EdgeResponse};
use crate::{Error, Result};

/// Shared handler state
struct AppState {
    authorizer: Arc<Authorizer>,
    root: PathBuf,
}

/// Router guarding the files under `root`
pub fn router(authorizer: Arc<Authorizer>, root: PathBuf) -> Router {
    let state = Arc::new(AppState { authorizer, root });
    Router::new()
        .fallback(handle)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until Ctrl+C / SIGTERM
pub async fn run(config: &ServerConfig, authorizer: Arc<Authorizer>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid listen address: {e}")))?;

    let app = router(authorizer, config.root.clone());
    let listener = TcpListener::bind(addr).await?;

    info!(
        address = %addr,
        root = %config.root.display(),
        "Edge simulator listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    info!("Edge simulator stopped");
    Ok(())
}

async fn handle(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let edge = to_edge_request(&request);
    match state.authorizer.authorize(&edge).await {
        Decision::Allow => serve_file(&state.root, request.uri().path()).await,
        Decision::Deny { response, .. } => render(&response),
    }
}

/// Describe an incoming request the way the edge substrate does
fn to_edge_request(request: &Request) -> EdgeRequest {
    let mut edge = EdgeRequest::new(request.method().as_str(), request.uri().path());
    edge.querystring = request.uri().query().unwrap_or_default().to_string();
    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            edge = edge.with_header(name.as_str(), value);
        }
    }
    edge
}

/// Turn an edge-generated response descriptor into an HTTP response
fn render(response: &EdgeResponse) -> Response {
    let status = response
        .status
        .parse::<u16>()
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let body = if response.body_encoding == "base64" {
        STANDARD.decode(&response.body).unwrap_or_default()
    } else {
        response.body.clone().into_bytes()
    };

    let mut builder = Response::builder().status(status);
    for entry in response.headers.values().flatten() {
        builder = builder.header(&entry.key, &entry.value);
    }
    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn serve_file(root: &Path, path: &str) -> Response {
    let relative = if path == "/" {
        "index.html"
    } else {
        path.trim_start_matches('/')
    };
    if relative.split('/').any(|segment| segment == "..") {
        return text_response(StatusCode::NOT_FOUND, "404 Not Found");
    }

    let file_path = root.join(relative);
    match tokio::fs::read(&file_path).await {
        Ok(contents) => {
            let content_type = if relative.ends_with(".html") {
                "text/html"
            } else {
                "text/plain"
            };
            (StatusCode::OK, [(CONTENT_TYPE, content_type)], contents).into_response()
        }
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::IsADirectory) => {
            text_response(StatusCode::NOT_FOUND, "404 Not Found")
        }
        Err(e) => {
            error!(path = %file_path.display(), error = %e, "Failed to read file");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "500 Internal Error")
        }
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response {
    (status, [(CONTENT_TYPE, "text/plain")], body).into_response()
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{self, HeaderValue};

    #[test]
    fn edge_request_carries_path_query_and_headers() {
        let request = http::Request::builder()
            .method("POST")
            .uri("/docs/page.html?x=1&y=2")
            .header("Cookie", "a=1")
            .header("X-Trace", "abc")
            .body(Body::empty())
            .unwrap();

        let edge = to_edge_request(&request);
        assert_eq!(edge.method, "POST");
        assert_eq!(edge.uri, "/docs/page.html");
        assert_eq!(edge.querystring, "x=1&y=2");
        assert_eq!(edge.header("cookie"), Some("a=1"));
        assert_eq!(edge.header("x-trace"), Some("abc"));
    }

    #[test]
    fn renders_unauthorized_descriptor() {
        let response = render(&EdgeResponse::unauthorized());
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(CONTENT_TYPE),
            Some(&HeaderValue::from_static("text/plain"))
        );
    }

    #[tokio::test]
    async fn serves_index_and_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("index.html"), "<h1>hi</h1>")
            .await
            .unwrap();
        tokio::fs::create_dir(dir.path().join("sub")).await.unwrap();

        let index = serve_file(dir.path(), "/").await;
        assert_eq!(index.status(), StatusCode::OK);
        assert_eq!(
            index.headers().get(CONTENT_TYPE),
            Some(&HeaderValue::from_static("text/html"))
        );

        assert_eq!(serve_file(dir.path(), "/missing.txt").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(serve_file(dir.path(), "/sub").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            serve_file(dir.path(), "/../etc/passwd").await.status(),
            StatusCode::NOT_FOUND
        );
    }
}
