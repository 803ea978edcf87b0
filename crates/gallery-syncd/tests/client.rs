use gallery_core::fingerprint::fingerprint_bytes;
use gallery_core::{Credentials, LocalAsset, RemoteAsset, State, StateHandle};
use gallery_syncd::{ClientError, ClusterKind, RemoteSyncClient};
use mockito::{Matcher, Server};
use std::time::Duration;

fn logged_in_state(server_url: &str) -> StateHandle {
    let mut state = State::default();
    state.store_credentials(&Credentials {
        server_url: server_url.to_string(),
        access_token: "old-access".to_string(),
        refresh_token: "old-refresh".to_string(),
        expires_at: None,
    });
    StateHandle::in_memory(state)
}

fn client(state: &StateHandle) -> RemoteSyncClient {
    RemoteSyncClient::new(state.clone(), Duration::from_secs(5)).unwrap()
}

const ROTATED_TOKENS: &str = r#"{"access_token":"new-access","refresh_token":"new-refresh"}"#;

#[tokio::test]
async fn test_rejected_token_is_refreshed_and_request_replayed() {
    let mut server = Server::new_async().await;
    let rejected = server
        .mock("GET", "/sync/full")
        .match_header("authorization", "Bearer old-access")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/refresh")
        .match_body(Matcher::PartialJsonString(
            r#"{"refresh_token":"old-refresh"}"#.to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(ROTATED_TOKENS)
        .expect(1)
        .create_async()
        .await;
    let replay = server
        .mock("GET", "/sync/full")
        .match_header("authorization", "Bearer new-access")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("since", "42")
        .with_body(r#"[{"id":"r1","hash":"h1","created_at":300}]"#)
        .expect(1)
        .create_async()
        .await;

    let state = logged_in_state(&server.url());
    let full = client(&state).sync_full().await.unwrap().unwrap();

    assert_eq!(full.assets, vec![RemoteAsset::new("r1", "h1", 300)]);
    assert_eq!(full.watermark, 42);

    let stored = state.credentials().unwrap().unwrap();
    assert_eq!(stored.access_token, "new-access");
    assert_eq!(stored.refresh_token, "new-refresh");

    rejected.assert_async().await;
    refresh.assert_async().await;
    replay.assert_async().await;
}

#[tokio::test]
async fn test_failed_refresh_expires_session_without_replay() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/sync/full")
        .match_header("authorization", "Bearer old-access")
        .with_status(401)
        .create_async()
        .await;
    server
        .mock("POST", "/refresh")
        .with_status(401)
        .create_async()
        .await;
    let replay = server
        .mock("GET", "/sync/full")
        .match_header("authorization", "Bearer new-access")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let state = logged_in_state(&server.url());
    let client = client(&state);
    let events = client.session_events();

    let err = client.sync_full().await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));
    assert!(*events.borrow());
    replay.assert_async().await;
}

#[tokio::test]
async fn test_second_rejection_after_refresh_expires_session() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/faces")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    server
        .mock("POST", "/refresh")
        .with_status(200)
        .with_body(ROTATED_TOKENS)
        .expect(1)
        .create_async()
        .await;

    let state = logged_in_state(&server.url());
    let err = client(&state).list_people().await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));
}

#[tokio::test]
async fn test_concurrent_rejections_share_one_refresh() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/faces")
        .match_header("authorization", "Bearer old-access")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/refresh")
        .with_status(200)
        .with_body(ROTATED_TOKENS)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", "/faces")
        .match_header("authorization", "Bearer new-access")
        .with_status(200)
        .with_body(
            r#"{"known_people":[{"id":"p1","name":"Ada"}],"unknown_people":[{"id":"u7"}]}"#,
        )
        .expect(2)
        .create_async()
        .await;

    let state = logged_in_state(&server.url());
    let client = client(&state);
    let (a, b) = tokio::join!(client.list_people(), client.list_people());

    for people in [a.unwrap(), b.unwrap()] {
        let ids: Vec<&str> = people.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "u7"]);
    }
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_rejections_share_one_failed_refresh() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/faces")
        .match_header("authorization", "Bearer old-access")
        .with_status(401)
        .expect(3)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/refresh")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let state = logged_in_state(&server.url());
    let client = client(&state);
    let events = client.session_events();
    let (a, b, c) = tokio::join!(
        client.list_people(),
        client.list_people(),
        client.list_people()
    );

    for result in [a, b, c] {
        assert!(matches!(result, Err(ClientError::SessionExpired)));
    }
    assert!(*events.borrow());
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_missing_credentials_expire_without_request() {
    let mut server = Server::new_async().await;
    let never = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let state = StateHandle::in_memory(State::default());
    let client = client(&state);
    let events = client.session_events();

    assert!(matches!(
        client.sync_delta(10).await,
        Err(ClientError::SessionExpired)
    ));
    assert!(*events.borrow());
    never.assert_async().await;
}

#[tokio::test]
async fn test_partial_sync_keeps_watermark_without_header() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/sync/partial")
        .match_header("since", "100")
        .with_status(200)
        .with_body(r#"{"uploaded":[{"id":"r9","hash":"h9","created_at":7}],"deleted":["r5"]}"#)
        .create_async()
        .await;

    let state = logged_in_state(&server.url());
    let delta = client(&state).sync_delta(100).await.unwrap().unwrap();

    assert_eq!(delta.uploaded, vec![RemoteAsset::new("r9", "h9", 7)]);
    assert_eq!(delta.deleted, vec!["r5".to_string()]);
    assert_eq!(delta.watermark, 100);
}

#[tokio::test]
async fn test_read_failures_become_empty_results() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let state = logged_in_state(&server.url());
    let client = client(&state);

    assert!(client.sync_full().await.unwrap().is_none());
    assert!(client.sync_delta(5).await.unwrap().is_none());
    assert_eq!(client.resolve_preview_url("r1").await.unwrap(), "");
    assert_eq!(client.resolve_full_url("r1").await.unwrap(), "");
    assert!(client.list_people().await.unwrap().is_empty());
    assert!(client.search("beach", 0, 20).await.unwrap().is_empty());
    assert!(client
        .cluster_previews("c1", 0, 20, ClusterKind::Face)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_listings_hit_expected_paths() {
    let mut server = Server::new_async().await;
    let search = server
        .mock("GET", "/search/sunset")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("page".into(), "2".into()),
            Matcher::UrlEncoded("page_size".into(), "10".into()),
        ]))
        .with_status(200)
        .with_body(r#"[{"id":"r1","preview_url":"https://cdn/r1.jpg"}]"#)
        .create_async()
        .await;
    let cluster = server
        .mock("GET", "/clusters/c9")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;
    let media = server
        .mock("GET", "/media/r1")
        .with_status(200)
        .with_body(r#"{"media_url":"https://cdn/full/r1.jpg","iso":200}"#)
        .create_async()
        .await;
    let preview = server
        .mock("GET", "/preview/r1")
        .with_status(200)
        .with_body(r#"{"preview_url":"https://cdn/r1.jpg"}"#)
        .create_async()
        .await;

    let state = logged_in_state(&server.url());
    let client = client(&state);

    let found = client.search("sunset", 2, 10).await.unwrap();
    assert_eq!(found[0].preview_url, "https://cdn/r1.jpg");
    assert!(client
        .cluster_previews("c9", 0, 50, ClusterKind::Cluster)
        .await
        .unwrap()
        .is_empty());
    let info = client.media_info("r1").await.unwrap().unwrap();
    assert_eq!(info.iso, Some(200));
    assert_eq!(
        client.resolve_preview_url("r1").await.unwrap(),
        "https://cdn/r1.jpg"
    );

    search.assert_async().await;
    cluster.assert_async().await;
    media.assert_async().await;
    preview.assert_async().await;
}

#[tokio::test]
async fn test_upload_sends_digest_and_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("beach.jpg");
    std::fs::write(&path, b"jpeg bytes").unwrap();
    let fingerprint = fingerprint_bytes(b"jpeg bytes");

    let mut server = Server::new_async().await;
    let upload = server
        .mock("POST", "/image/upload")
        .match_header("authorization", "Bearer old-access")
        .match_header("timestamp", "1234")
        .match_header("content-digest", format!("sha-1=:{fingerprint}:").as_str())
        .match_header(
            "content-type",
            Matcher::Regex("^multipart/form-data".to_string()),
        )
        .match_body(Matcher::Regex("jpeg bytes".to_string()))
        .with_status(200)
        .with_body(r#"{"id":"r-new"}"#)
        .expect(1)
        .create_async()
        .await;

    let state = logged_in_state(&server.url());
    let asset = LocalAsset::new("l1", &path, "image/jpeg", 1234).with_fingerprint(&fingerprint);
    let remote_id = client(&state).upload_asset(&asset).await.unwrap();

    assert_eq!(remote_id.as_deref(), Some("r-new"));
    upload.assert_async().await;
}

#[tokio::test]
async fn test_upload_of_missing_file_is_io_error() {
    let server = Server::new_async().await;
    let state = logged_in_state(&server.url());
    let asset = LocalAsset::new("l1", "/definitely/not/here.jpg", "image/jpeg", 1);

    let err = client(&state).upload_asset(&asset).await.unwrap_err();
    assert!(matches!(err, ClientError::Io { .. }));
}

#[tokio::test]
async fn test_login_stores_credentials_and_rejects_bad_password() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/login")
        .match_body(Matcher::PartialJsonString(
            r#"{"username":"ada","password":"secret"}"#.to_string(),
        ))
        .with_status(200)
        .with_body(ROTATED_TOKENS)
        .create_async()
        .await;
    server
        .mock("POST", "/login")
        .match_body(Matcher::PartialJsonString(r#"{"password":"wrong"}"#.to_string()))
        .with_status(401)
        .create_async()
        .await;

    let state = StateHandle::in_memory(State::default());
    let client = client(&state);

    assert!(matches!(
        client.login(&server.url(), "ada", "wrong").await,
        Err(ClientError::InvalidCredentials)
    ));
    assert!(state.credentials().unwrap().is_none());

    let credentials = client.login(&server.url(), "ada", "secret").await.unwrap();
    assert_eq!(credentials.access_token, "new-access");
    let snapshot = state.snapshot().unwrap();
    assert!(snapshot.is_logged_in());
    assert_eq!(snapshot.auth.username.as_deref(), Some("ada"));
}
