#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tokio::sync::broadcast;

    use crate::tests::{body_json, dashboard, login, send, test_app, test_app_with, test_config, wait_for_status};
    use crate::types::{DownloadEvent, DownloadStatus, NewDownload, Platform};

    fn slow_config() -> crate::config::AppConfig {
        let mut cfg = test_config();
        cfg.simulation.step_delay_ms = 2_000;
        cfg
    }

    fn new_download(user_id: &str, title: Option<&str>) -> NewDownload {
        NewDownload {
            user_id: user_id.to_string(),
            api_key_id: None,
            url: "https://youtu.be/events".into(),
            title: title.map(str::to_string),
            platform: Platform::Youtube,
            metadata: None,
        }
    }

    /// Receives until the job drops its sender.
    async fn drain(mut rx: broadcast::Receiver<DownloadEvent>) -> Vec<DownloadEvent> {
        let mut events = Vec::new();
        let collect = async {
            while let Ok(ev) = rx.recv().await {
                events.push(ev);
            }
        };
        tokio::time::timeout(Duration::from_secs(10), collect).await.expect("job never closed its channel");
        events
    }

    #[tokio::test]
    async fn test_download_runs_to_completion() {
        let (app, state) = test_app().await;
        let (cookie, user_id) = login(&app, "life@example.com").await;

        let body = json!({ "url": "https://www.youtube.com/watch?v=abc", "platform": "YouTube", "title": "Clip-2024" });
        let resp = send(&app, dashboard("POST", "/api/download-requests", &cookie, Some(body))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let created = body_json(resp).await;
        assert_eq!(created["status"], "pending");
        assert_eq!(created["progress"], 0);
        assert_eq!(created["platform"], "youtube");
        let id = created["id"].as_str().unwrap().to_string();

        let row = wait_for_status(&state, &id, "completed").await;
        assert_eq!(row.progress, 100);
        assert_eq!(row.user_id, user_id);
        assert_eq!(row.file_name.as_deref(), Some("Clip_2024.mp4"));
        assert!(row.file_path.as_deref().unwrap().ends_with("Clip_2024.mp4"));
        let size = row.file_size.unwrap();
        assert!((1_000_000..11_000_000).contains(&size));

        let logs = state.storage.list_logs(50, None).await.unwrap();
        for expected in ["Download started", "Download completed", "Download request created"] {
            assert!(logs.iter().any(|l| l.message == expected), "missing log {}", expected);
        }

        let resp = send(&app, dashboard("GET", &format!("/api/download-requests/{}", id), &cookie, None)).await;
        assert_eq!(body_json(resp).await["fileName"], "Clip_2024.mp4");
    }

    #[tokio::test]
    async fn test_untitled_download_defaults() {
        let (app, state) = test_app().await;
        let (cookie, _) = login(&app, "untitled@example.com").await;

        let body = json!({ "url": "https://instagram.com/p/xyz", "platform": "instagram" });
        let resp = send(&app, dashboard("POST", "/api/download-requests", &cookie, Some(body))).await;
        let created = body_json(resp).await;
        assert_eq!(created["title"], "Unknown");

        let row = wait_for_status(&state, created["id"].as_str().unwrap(), "completed").await;
        assert_eq!(row.file_name.as_deref(), Some("download.mp4"));
    }

    #[tokio::test]
    async fn test_progress_is_persisted_while_running() {
        let mut cfg = test_config();
        cfg.simulation.step_delay_ms = 150;
        let (app, state) = test_app_with(cfg).await;
        let (cookie, _) = login(&app, "progress@example.com").await;

        let body = json!({ "url": "https://open.spotify.com/track/1", "platform": "spotify" });
        let resp = send(&app, dashboard("POST", "/api/download-requests", &cookie, Some(body))).await;
        let id = body_json(resp).await["id"].as_str().unwrap().to_string();

        let mut seen = Vec::new();
        for _ in 0..200 {
            let row = state.storage.get_download(&id).await.unwrap().unwrap();
            if row.status == DownloadStatus::InProgress && !seen.contains(&row.progress) {
                seen.push(row.progress);
            }
            if row.status == DownloadStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(seen.iter().any(|p| [20, 40, 60, 80].contains(p)), "observed {:?}", seen);
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(seen, sorted, "progress never goes backwards");
    }

    #[tokio::test]
    async fn test_invalid_inputs_rejected() {
        let (app, _) = test_app().await;
        let (cookie, _) = login(&app, "invalid@example.com").await;

        let body = json!({ "url": "ftp://example.com/a", "platform": "youtube" });
        let resp = send(&app, dashboard("POST", "/api/download-requests", &cookie, Some(body))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"]["details"]["fields"][0]["field"], "url");

        let body = json!({ "url": "https://vimeo.com/1", "platform": "vimeo" });
        let resp = send(&app, dashboard("POST", "/api/download-requests", &cookie, Some(body))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"]["details"]["fields"][0]["field"], "platform");
    }

    #[tokio::test]
    async fn test_disabled_platform_rejected() {
        let (app, state) = test_app().await;
        let (cookie, _) = login(&app, "disabled@example.com").await;
        state.storage.upsert_setting("youtubeEnabled", "false", None).await.unwrap();

        let body = json!({ "url": "https://youtu.be/abc", "platform": "youtube" });
        let resp = send(&app, dashboard("POST", "/api/download-requests", &cookie, Some(body))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"]["message"], "youtube downloads are disabled");

        let body = json!({ "url": "https://open.spotify.com/track/1", "platform": "spotify" });
        let resp = send(&app, dashboard("POST", "/api/download-requests", &cookie, Some(body))).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_download_timeout_setting_fails_job() {
        let (app, state) = test_app_with(slow_config()).await;
        let (_, user_id) = login(&app, "timeout@example.com").await;
        state.storage.upsert_setting("downloadTimeout", "1", None).await.unwrap();

        let row = state
            .downloads
            .start(NewDownload {
                user_id,
                api_key_id: None,
                url: "https://youtu.be/slow".into(),
                title: None,
                platform: Platform::Youtube,
                metadata: None,
            })
            .await
            .unwrap();

        let failed = wait_for_status(&state, &row.id, "failed").await;
        assert_eq!(failed.error_message.as_deref(), Some("Download timed out after 1s"));
        let logs = state.storage.list_logs(20, Some(crate::types::LogLevel::Error)).await.unwrap();
        assert!(logs.iter().any(|l| l.message == "Download failed"));
        assert_eq!(state.metrics.get_snapshot().downloads_failed, 1);
    }

    #[tokio::test]
    async fn test_events_follow_progress_to_completion() {
        let mut cfg = test_config();
        cfg.simulation.step_delay_ms = 20;
        let (app, state) = test_app_with(cfg).await;
        let (_, user_id) = login(&app, "events@example.com").await;

        let row = state.downloads.start(new_download(&user_id, Some("Live Set"))).await.unwrap();
        let rx = state.downloads.subscribe(&row.id).await.expect("job registered by start");
        let events = drain(rx).await;

        assert_eq!(events.len(), 6, "{:?}", events);
        match &events[0] {
            DownloadEvent::Started { id, platform } => {
                assert_eq!(id, &row.id);
                assert_eq!(platform, "youtube");
            }
            other => panic!("expected started, got {:?}", other),
        }
        let progress: Vec<i64> = events[1..5]
            .iter()
            .map(|ev| match ev {
                DownloadEvent::Progress { id, progress } => {
                    assert_eq!(id, &row.id);
                    *progress
                }
                other => panic!("expected progress, got {:?}", other),
            })
            .collect();
        assert_eq!(progress, vec![20, 40, 60, 80]);

        let stored = state.storage.get_download(&row.id).await.unwrap().unwrap();
        match &events[5] {
            DownloadEvent::Completed { id, file_name, file_size } => {
                assert_eq!(id, &row.id);
                assert_eq!(file_name, "Live_Set.mp4");
                assert_eq!(stored.file_name.as_deref(), Some(file_name.as_str()));
                assert_eq!(stored.file_size, Some(*file_size));
            }
            other => panic!("expected completed, got {:?}", other),
        }
        assert!(state.downloads.subscribe(&row.id).await.is_none());
    }

    #[tokio::test]
    async fn test_timeout_emits_failed_event() {
        let (app, state) = test_app_with(slow_config()).await;
        let (_, user_id) = login(&app, "events-timeout@example.com").await;
        state.storage.upsert_setting("downloadTimeout", "1", None).await.unwrap();

        let row = state.downloads.start(new_download(&user_id, None)).await.unwrap();
        let rx = state.downloads.subscribe(&row.id).await.expect("job registered by start");
        let events = drain(rx).await;

        assert!(matches!(events.first(), Some(DownloadEvent::Started { .. })), "{:?}", events);
        assert!(!events.iter().any(|ev| matches!(ev, DownloadEvent::Completed { .. })));
        match events.last() {
            Some(DownloadEvent::Failed { id, message }) => {
                assert_eq!(id, &row.id);
                assert_eq!(message, "Download timed out after 1s");
            }
            other => panic!("expected failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_emits_failed_event() {
        let (app, state) = test_app_with(slow_config()).await;
        let (_, user_id) = login(&app, "events-cancel@example.com").await;

        let row = state.downloads.start(new_download(&user_id, None)).await.unwrap();
        let rx = state.downloads.subscribe(&row.id).await.expect("job registered by start");
        wait_for_status(&state, &row.id, "in_progress").await;
        assert!(state.downloads.cancel(&row.id).await);

        let events = drain(rx).await;
        match events.last() {
            Some(DownloadEvent::Failed { id, message }) => {
                assert_eq!(id, &row.id);
                assert_eq!(message, "Download cancelled");
            }
            other => panic!("expected failed, got {:?}", other),
        }
        assert_eq!(wait_for_status(&state, &row.id, "failed").await.error_message.as_deref(), Some("Download cancelled"));
    }

    #[tokio::test]
    async fn test_sse_stream_carries_events() {
        let mut cfg = test_config();
        cfg.simulation.step_delay_ms = 100;
        let (app, _) = test_app_with(cfg).await;
        let (cookie, _) = login(&app, "sse@example.com").await;

        let body = json!({ "url": "https://open.spotify.com/track/1", "platform": "spotify", "title": "Stream" });
        let resp = send(&app, dashboard("POST", "/api/download-requests", &cookie, Some(body))).await;
        let id = body_json(resp).await["id"].as_str().unwrap().to_string();

        let resp = send(&app, dashboard("GET", &format!("/api/download-requests/{}/events", id), &cookie, None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers()["content-type"].to_str().unwrap().starts_with("text/event-stream"));

        // the body ends once the job finishes and drops its sender
        let bytes = tokio::time::timeout(Duration::from_secs(10), resp.into_body().collect())
            .await
            .expect("stream never ended")
            .unwrap()
            .to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let events: Vec<DownloadEvent> = text
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .filter_map(|data| serde_json::from_str(data).ok())
            .collect();

        let progress: Vec<i64> = events
            .iter()
            .filter_map(|ev| match ev {
                DownloadEvent::Progress { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![20, 40, 60, 80]);
        match events.last() {
            Some(DownloadEvent::Completed { id: done, file_name, .. }) => {
                assert_eq!(done, &id);
                assert_eq!(file_name, "Stream.mp3");
            }
            other => panic!("expected completed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_cancels_running_job() {
        let (app, state) = test_app_with(slow_config()).await;
        let (cookie, _) = login(&app, "cancel@example.com").await;

        let body = json!({ "url": "https://youtu.be/abc", "platform": "youtube" });
        let resp = send(&app, dashboard("POST", "/api/download-requests", &cookie, Some(body))).await;
        let id = body_json(resp).await["id"].as_str().unwrap().to_string();
        wait_for_status(&state, &id, "in_progress").await;
        assert!(state.downloads.subscribe(&id).await.is_some());

        let resp = send(&app, dashboard("DELETE", &format!("/api/download-requests/{}", id), &cookie, None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(state.storage.get_download(&id).await.unwrap().is_none());

        for _ in 0..100 {
            if state.downloads.running().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state.downloads.running().await, 0);

        let resp = send(&app, dashboard("DELETE", &format!("/api/download-requests/{}", id), &cookie, None)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = send(&app, dashboard("GET", &format!("/api/download-requests/{}/events", id), &cookie, None)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_patch_follows_state_machine() {
        let (app, state) = test_app_with(slow_config()).await;
        let (cookie, _) = login(&app, "patch@example.com").await;

        let body = json!({ "url": "https://youtu.be/abc", "platform": "youtube" });
        let resp = send(&app, dashboard("POST", "/api/download-requests", &cookie, Some(body))).await;
        let id = body_json(resp).await["id"].as_str().unwrap().to_string();
        wait_for_status(&state, &id, "in_progress").await;
        let uri = format!("/api/download-requests/{}", id);

        let resp = send(&app, dashboard("PATCH", &uri, &cookie, Some(json!({ "status": "pending" })))).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = send(&app, dashboard("PATCH", &uri, &cookie, Some(json!({ "progress": 150 })))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let patch = json!({ "status": "failed", "errorMessage": "stopped by operator", "title": "Renamed" });
        let resp = send(&app, dashboard("PATCH", &uri, &cookie, Some(patch))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["status"], "failed");
        assert_eq!(v["title"], "Renamed");
        assert_eq!(v["errorMessage"], "stopped by operator");

        // terminal: no way back
        let resp = send(&app, dashboard("PATCH", &uri, &cookie, Some(json!({ "status": "completed" })))).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        // the cancelled job must not overwrite the manual status
        tokio::time::sleep(Duration::from_millis(100)).await;
        let row = state.storage.get_download(&id).await.unwrap().unwrap();
        assert_eq!(row.status, DownloadStatus::Failed);
        assert_eq!(row.error_message.as_deref(), Some("stopped by operator"));

        let resp = send(&app, dashboard("PATCH", "/api/download-requests/missing", &cookie, Some(json!({})))).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_shutdown_fails_running_jobs() {
        let (app, state) = test_app_with(slow_config()).await;
        let (cookie, _) = login(&app, "shutdown@example.com").await;

        let body = json!({ "url": "https://youtu.be/abc", "platform": "youtube" });
        let resp = send(&app, dashboard("POST", "/api/download-requests", &cookie, Some(body))).await;
        let id = body_json(resp).await["id"].as_str().unwrap().to_string();
        wait_for_status(&state, &id, "in_progress").await;

        state.downloads.shutdown(Duration::from_secs(2)).await;
        let row = state.storage.get_download(&id).await.unwrap().unwrap();
        assert_eq!(row.status, DownloadStatus::Failed);
        assert_eq!(row.error_message.as_deref(), Some("Download cancelled"));
    }

    #[tokio::test]
    async fn test_restart_recovery_fails_unfinished_rows() {
        let (app, state) = test_app().await;
        let (_, user_id) = login(&app, "recover@example.com").await;

        // rows without a job, as left behind by a crashed process
        let new = NewDownload {
            user_id,
            api_key_id: None,
            url: "https://youtu.be/old".into(),
            title: Some("old".into()),
            platform: Platform::Youtube,
            metadata: None,
        };
        let stale = state.storage.create_download(&new).await.unwrap();

        assert_eq!(state.downloads.recover_interrupted().await.unwrap(), 1);
        let row = state.storage.get_download(&stale.id).await.unwrap().unwrap();
        assert_eq!(row.status, DownloadStatus::Failed);
        assert_eq!(row.error_message.as_deref(), Some("Interrupted by server restart"));
        assert_eq!(state.downloads.recover_interrupted().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_removes_old_completed_files() {
        let (app, state) = test_app().await;
        let (cookie, user_id) = login(&app, "cleanup@example.com").await;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("old.mp3");
        std::fs::write(&file, b"data").unwrap();

        let new = NewDownload {
            user_id,
            api_key_id: None,
            url: "https://open.spotify.com/track/old".into(),
            title: Some("old".into()),
            platform: Platform::Spotify,
            metadata: None,
        };
        let old = state.storage.create_download(&new).await.unwrap();
        let fresh = state.storage.create_download(&new).await.unwrap();
        sqlx::query(
            "UPDATE download_requests SET status = 'completed', progress = 100, file_size = 10, file_path = ?2, created_at = '2000-01-01T00:00:00Z' WHERE id = ?1",
        )
        .bind(&old.id)
        .bind(file.to_string_lossy().to_string())
        .execute(&state.db)
        .await
        .unwrap();
        sqlx::query("UPDATE download_requests SET status = 'completed', progress = 100, file_size = 20 WHERE id = ?1")
            .bind(&fresh.id)
            .execute(&state.db)
            .await
            .unwrap();

        let resp = send(&app, dashboard("GET", "/api/stats/storage", &cookie, None)).await;
        let stats = body_json(resp).await;
        assert_eq!(stats["totalFiles"], 2);
        assert_eq!(stats["totalSize"], 30);
        assert_eq!(stats["cleanupEligible"], 1);
        assert_eq!(stats["cleanupDays"], 30);

        let resp = send(&app, dashboard("POST", "/api/files/cleanup", &cookie, None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["removed"], 1);
        assert!(!file.exists());
        assert!(state.storage.get_download(&old.id).await.unwrap().is_none());
        assert!(state.storage.get_download(&fresh.id).await.unwrap().is_some());

        let logs = state.storage.list_logs(20, None).await.unwrap();
        assert!(logs.iter().any(|l| l.message == "Storage cleanup"));
    }

    #[tokio::test]
    async fn test_list_limit_and_user_filter() {
        let (app, state) = test_app().await;
        let (cookie, alice_id) = login(&app, "list-a@example.com").await;
        let (_, bob_id) = login(&app, "list-b@example.com").await;

        for (owner, n) in [(&alice_id, 3), (&bob_id, 2)] {
            for i in 0..n {
                let new = NewDownload {
                    user_id: owner.to_string(),
                    api_key_id: None,
                    url: format!("https://youtu.be/{}", i),
                    title: None,
                    platform: Platform::Youtube,
                    metadata: None,
                };
                state.storage.create_download(&new).await.unwrap();
            }
        }

        let resp = send(&app, dashboard("GET", "/api/download-requests", &cookie, None)).await;
        assert_eq!(body_json(resp).await.as_array().unwrap().len(), 5);

        let resp = send(&app, dashboard("GET", "/api/download-requests?limit=2", &cookie, None)).await;
        assert_eq!(body_json(resp).await.as_array().unwrap().len(), 2);

        let resp = send(&app, dashboard("GET", "/api/download-requests?limit=0", &cookie, None)).await;
        assert_eq!(body_json(resp).await.as_array().unwrap().len(), 1);

        let uri = format!("/api/download-requests?userId={}", bob_id);
        let resp = send(&app, dashboard("GET", &uri, &cookie, None)).await;
        let rows = body_json(resp).await;
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r["userEmail"] == "list-b@example.com"));
    }
}
