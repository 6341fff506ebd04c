#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;

    use crate::tests::{body_json, send, test_app};

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn text(resp: axum::http::Response<Body>) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_healthz_endpoint() {
        let (app, _) = test_app().await;
        let response = send(&app, get("/healthz")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, "ok");
    }

    #[tokio::test]
    async fn test_readyz_endpoint() {
        let (app, _) = test_app().await;
        let response = send(&app, get("/readyz")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, "ready");
    }

    #[tokio::test]
    async fn test_readyz_reports_closed_pool() {
        let (app, state) = test_app().await;
        state.db.close().await;
        let response = send(&app, get("/readyz")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(text(response).await.starts_with("not ready"));
    }

    #[tokio::test]
    async fn test_version_endpoint() {
        let (app, _) = test_app().await;
        let response = send(&app, get("/version")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["name"], "media-dl-manager");
        assert!(json["version"].is_string());
        assert!(json["build"]["profile"].is_string());
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (app, state) = test_app().await;
        state.metrics.inc_searches();

        let response = send(&app, get("/metrics")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["downloads_started"], 0);
        assert_eq!(json["downloads_running"], 0);
        assert_eq!(json["searches"], 1);
        assert!(json.get("uptime_seconds").is_some());
    }

    #[tokio::test]
    async fn test_prometheus_metrics_endpoint() {
        let (app, _) = test_app().await;
        let response = send(&app, get("/metrics/prometheus")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/plain")));

        let body = text(response).await;
        for metric in [
            "mediadl_downloads_started 0",
            "mediadl_downloads_completed 0",
            "mediadl_downloads_running 0",
            "mediadl_api_requests 0",
            "# TYPE mediadl_uptime_seconds gauge",
        ] {
            assert!(body.contains(metric), "missing {}", metric);
        }
    }

    #[tokio::test]
    async fn test_probes_need_no_session() {
        let (app, _) = test_app().await;
        for uri in ["/healthz", "/readyz", "/metrics", "/version"] {
            assert_eq!(send(&app, get(uri)).await.status(), StatusCode::OK, "{}", uri);
        }
    }
}
