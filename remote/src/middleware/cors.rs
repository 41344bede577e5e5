use axum::http::{HeaderName, Method};
use tower_http::cors::{Any, CorsLayer};

/// Browser-based MCP clients connect from arbitrary origins.
///
/// - Origins: any
/// - Methods: GET, POST, OPTIONS
/// - Headers: Authorization, Content-Type
pub fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("authorization"),
            HeaderName::from_static("content-type"),
        ])
        .max_age(std::time::Duration::from_secs(3600))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    async fn ok() -> StatusCode {
        StatusCode::OK
    }

    #[tokio::test]
    async fn preflight_allows_any_origin() {
        let app = Router::new()
            .route("/mcp", post(ok))
            .layer(super::build_cors_layer());

        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/mcp")
                    .header("origin", "https://claude.ai")
                    .header("access-control-request-method", "POST")
                    .header("access-control-request-headers", "authorization,content-type")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers
                .get("access-control-allow-origin")
                .expect("allow-origin header should exist"),
            "*"
        );
        let methods = headers
            .get("access-control-allow-methods")
            .expect("allow-methods header should exist")
            .to_str()
            .unwrap();
        assert!(methods.contains("POST"));
        assert!(methods.contains("OPTIONS"));
    }
}
