//! Request metrics middleware
//!
//! Records a counter and latency histogram per request. The endpoint label
//! is the matched route template (`/api/papers/{id}`) rather than the raw
//! path, which keeps label cardinality bounded.

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use plasmahub_common::metrics::RequestMetrics;

pub async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let method = request.method().to_string();

    let tracker = RequestMetrics::start(&method, &endpoint);
    let response = next.run(request).await;
    tracker.finish(response.status().as_u16());

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_track_requests_passes_response_through() {
        let app = Router::new()
            .route("/api/trends", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(track_requests));

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/api/trends")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
