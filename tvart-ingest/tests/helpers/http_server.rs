//! Canned HTTP endpoints on 127.0.0.1
//!
//! Every path gets its own handler; anything else is a 404. Requests are
//! counted across all paths, misses included.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct Route {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Route {
    pub fn ok(content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type,
            body,
        }
    }

    pub fn png(body: Vec<u8>) -> Self {
        Self::ok("image/png", body)
    }

    pub fn html(body: &str) -> Self {
        Self::ok("text/html; charset=utf-8", body.as_bytes().to_vec())
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::ok("application/json", value.to_string().into_bytes())
    }

    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: status.to_string().into_bytes(),
        }
    }
}

impl IntoResponse for Route {
    fn into_response(self) -> Response {
        (self.status, [(header::CONTENT_TYPE, self.content_type)], self.body).into_response()
    }
}

pub struct TestServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start(routes: Vec<(&str, Route)>) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));

        let mut app = Router::new();
        for (path, route) in routes {
            let counter = hits.clone();
            app = app.route(
                path,
                any(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let route = route.clone();
                    async move { route }
                }),
            );
        }
        let counter = hits.clone();
        let app = app.fallback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Route::status(StatusCode::NOT_FOUND) }
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test server stopped");
        });

        Self { addr, hits, handle }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Requests served so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
