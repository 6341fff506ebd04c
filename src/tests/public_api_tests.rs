#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};

    use crate::tests::{body_json, dashboard, login, send, test_app, test_app_with, test_config, wait_for_status};

    fn v1(method: &str, uri: &str, key: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri).header("authorization", format!("Bearer {}", key));
        match body {
            Some(v) => builder.header("content-type", "application/json").body(Body::from(v.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn track() -> Value {
        json!({ "url": "https://open.spotify.com/track/abc", "platform": "spotify", "title": "My Song!" })
    }

    #[tokio::test]
    async fn test_missing_or_malformed_header_is_401() {
        let (app, _) = test_app().await;

        let req = Request::builder().method("POST").uri("/api/v1/download").body(Body::empty()).unwrap();
        let resp = send(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["error"]["message"], "Missing or invalid API key");

        let req = Request::builder()
            .uri("/api/v1/download/abc")
            .header("authorization", "Token sk-123")
            .body(Body::empty())
            .unwrap();
        let resp = send(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["error"]["message"], "Missing or invalid API key");
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_keys_are_401() {
        let (app, state) = test_app().await;
        let (_, user_id) = login(&app, "inactive@example.com").await;

        let resp = send(&app, v1("POST", "/api/v1/download", "sk-unknown", Some(track()))).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["error"]["message"], "Invalid API key");

        let key = state.storage.create_api_key(&user_id, "off", 10, false).await.unwrap();
        let resp = send(&app, v1("POST", "/api/v1/download", &key.key, Some(track()))).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["error"]["message"], "Invalid API key");
    }

    #[tokio::test]
    async fn test_public_download_flow() {
        let (app, state) = test_app().await;
        let (_, user_id) = login(&app, "api@example.com").await;
        let key = state.storage.create_api_key(&user_id, "ext", 100, true).await.unwrap();

        let resp = send(&app, v1("POST", "/api/v1/download", &key.key, Some(track()))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["status"], "pending");
        assert_eq!(v["message"], "Download request queued successfully");
        let id = v["id"].as_str().unwrap().to_string();

        let row = wait_for_status(&state, &id, "completed").await;
        assert_eq!(row.user_id, user_id);
        assert_eq!(row.api_key_id.as_deref(), Some(key.id.as_str()));

        let resp = send(&app, v1("GET", &format!("/api/v1/download/{}", id), &key.key, None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["status"], "completed");
        assert_eq!(v["progress"], 100);
        assert_eq!(v["fileName"], "My_Song_.mp3");
        assert!(v["fileSize"].as_i64().unwrap() >= 1_000_000);
        assert!(v.get("url").is_none());

        let key = state.storage.get_api_key(&key.id).await.unwrap().unwrap();
        assert_eq!(key.request_count, 2);
        assert!(key.last_used_at.is_some());

        let logs = state.storage.list_logs(50, None).await.unwrap();
        assert!(logs.iter().any(|l| l.message == "API download request received"));
    }

    #[tokio::test]
    async fn test_missing_url_or_platform_is_400() {
        let (app, state) = test_app().await;
        let (_, user_id) = login(&app, "fields@example.com").await;
        let key = state.storage.create_api_key(&user_id, "ext", 100, true).await.unwrap();

        let resp = send(&app, v1("POST", "/api/v1/download", &key.key, Some(json!({ "url": "https://x.y/z" })))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"]["message"], "URL and platform are required");

        let body = json!({ "url": "https://x.y/z", "platform": "vimeo" });
        let resp = send(&app, v1("POST", "/api/v1/download", &key.key, Some(body))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_mistyped_body_gets_envelope() {
        let (app, state) = test_app().await;
        let (_, user_id) = login(&app, "typed@example.com").await;
        let key = state.storage.create_api_key(&user_id, "ext", 100, true).await.unwrap();

        let body = json!({ "url": 5, "platform": "youtube" });
        let resp = send(&app, v1("POST", "/api/v1/download", &key.key, Some(body))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let v = body_json(resp).await;
        assert_eq!(v["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(v["error"]["details"]["fields"][0]["field"], "url");
        assert_eq!(v["status"], 400);
    }

    #[tokio::test]
    async fn test_key_at_limit_gets_429() {
        let (app, state) = test_app().await;
        let (_, user_id) = login(&app, "limit@example.com").await;
        let key = state.storage.create_api_key(&user_id, "small", 2, true).await.unwrap();

        for _ in 0..2 {
            let resp = send(&app, v1("GET", "/api/v1/download/none", &key.key, None)).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        }

        let resp = send(&app, v1("GET", "/api/v1/download/none", &key.key, None)).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let v = body_json(resp).await;
        assert_eq!(v["error"]["code"], "QUOTA_EXCEEDED");
        assert_eq!(v["error"]["message"], "Rate limit exceeded");

        let key = state.storage.get_api_key(&key.id).await.unwrap().unwrap();
        assert_eq!(key.request_count, key.request_limit);

        let stats = state.storage.user_stats().await.unwrap();
        assert_eq!(stats.rate_limited, 1);
    }

    #[tokio::test]
    async fn test_concurrent_consume_never_overruns_limit() {
        let (app, state) = test_app().await;
        let (_, user_id) = login(&app, "race@example.com").await;
        let key = state.storage.create_api_key(&user_id, "race", 5, true).await.unwrap();

        let calls = (0..20).map(|_| {
            let storage = state.storage.clone();
            let id = key.id.clone();
            tokio::spawn(async move { storage.try_consume_api_key(&id).await.unwrap() })
        });
        let results = futures::future::join_all(calls).await;
        let accepted = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();

        assert_eq!(accepted, 5);
        let key = state.storage.get_api_key(&key.id).await.unwrap().unwrap();
        assert_eq!(key.request_count, 5);
    }

    #[tokio::test]
    async fn test_per_ip_window_applies_before_key() {
        let mut cfg = test_config();
        cfg.limits.rate_limit_per_minute = 2;
        let (app, state) = test_app_with(cfg).await;
        let (_, user_id) = login(&app, "ip@example.com").await;
        let key = state.storage.create_api_key(&user_id, "ip", 100, true).await.unwrap();

        for _ in 0..2 {
            let resp = send(&app, v1("GET", "/api/v1/download/none", &key.key, None)).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        }
        let resp = send(&app, v1("GET", "/api/v1/download/none", &key.key, None)).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(resp).await["error"]["code"], "RATE_LIMITED");

        // the rejected call was never counted against the key
        let key = state.storage.get_api_key(&key.id).await.unwrap().unwrap();
        assert_eq!(key.request_count, 2);
    }

    fn v1_from(uri: &str, key: &str, forwarded_for: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("authorization", format!("Bearer {}", key))
            .header("x-forwarded-for", forwarded_for)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_rotating_forwarded_for_shares_one_window() {
        let mut cfg = test_config();
        cfg.limits.rate_limit_per_minute = 2;
        let (app, state) = test_app_with(cfg).await;
        let (_, user_id) = login(&app, "rotate@example.com").await;
        let key = state.storage.create_api_key(&user_id, "rotate", 100, true).await.unwrap();

        let resp = send(&app, v1_from("/api/v1/download/none", &key.key, "203.0.113.1")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = send(&app, v1_from("/api/v1/download/none", &key.key, "203.0.113.2")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = send(&app, v1_from("/api/v1/download/none", &key.key, "203.0.113.3")).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_trusted_proxy_splits_windows_per_client() {
        let mut cfg = test_config();
        cfg.limits.rate_limit_per_minute = 1;
        cfg.server.trust_proxy = true;
        let (app, state) = test_app_with(cfg).await;
        let (_, user_id) = login(&app, "proxy@example.com").await;
        let key = state.storage.create_api_key(&user_id, "proxy", 100, true).await.unwrap();

        let resp = send(&app, v1_from("/api/v1/download/none", &key.key, "203.0.113.1")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = send(&app, v1_from("/api/v1/download/none", &key.key, "203.0.113.2")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = send(&app, v1_from("/api/v1/download/none", &key.key, "203.0.113.1, 10.0.0.1")).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_status_of_foreign_request_is_404() {
        let (app, state) = test_app().await;
        let (_, alice_id) = login(&app, "alice3@example.com").await;
        let (_, bob_id) = login(&app, "bob3@example.com").await;
        let alice_key = state.storage.create_api_key(&alice_id, "a", 100, true).await.unwrap();
        let bob_key = state.storage.create_api_key(&bob_id, "b", 100, true).await.unwrap();

        let resp = send(&app, v1("POST", "/api/v1/download", &alice_key.key, Some(track()))).await;
        let id = body_json(resp).await["id"].as_str().unwrap().to_string();

        let resp = send(&app, v1("GET", &format!("/api/v1/download/{}", id), &bob_key.key, None)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = send(&app, v1("GET", &format!("/api/v1/download/{}", id), &alice_key.key, None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_deleting_key_keeps_requests() {
        let (app, state) = test_app().await;
        let (cookie, user_id) = login(&app, "keep@example.com").await;
        let key = state.storage.create_api_key(&user_id, "tmp", 100, true).await.unwrap();

        let resp = send(&app, v1("POST", "/api/v1/download", &key.key, Some(track()))).await;
        let id = body_json(resp).await["id"].as_str().unwrap().to_string();
        wait_for_status(&state, &id, "completed").await;

        let resp = send(&app, dashboard("DELETE", &format!("/api/api-keys/{}", key.id), &cookie, None)).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let row = state.storage.get_download(&id).await.unwrap().expect("request survives key deletion");
        assert_eq!(row.api_key_id, None);
        assert_eq!(row.user_id, user_id);
    }

    #[tokio::test]
    async fn test_public_search_counts_against_key() {
        let (app, state) = test_app().await;
        let (_, user_id) = login(&app, "psearch@example.com").await;
        let key = state.storage.create_api_key(&user_id, "s", 100, true).await.unwrap();

        let resp = send(&app, v1("GET", "/api/v1/search?q=lofi&platform=youtube", &key.key, None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!([]));

        let key = state.storage.get_api_key(&key.id).await.unwrap().unwrap();
        assert_eq!(key.request_count, 1);
    }
}
