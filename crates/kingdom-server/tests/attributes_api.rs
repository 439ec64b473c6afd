#[allow(dead_code)]
mod common;

use kingdom_server::attributes::remote_key;

use common::TestServer;

#[tokio::test]
async fn get_reads_local_save_file() {
    let server = TestServer::new().await;
    server.write_save("Sir Lancelot", "#Character data\nrank=7\nloggedin=false\n");

    let resp = reqwest::get(server.api_url("/players/Sir%20Lancelot/attributes/rank"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["user"], "Sir Lancelot");
    assert_eq!(body["value"], "7");
}

#[tokio::test]
async fn get_missing_file_or_key_is_404() {
    let server = TestServer::new().await;
    server.write_save("bob", "rank=1\n");

    let resp = reqwest::get(server.api_url("/players/alice/attributes/rank"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = reqwest::get(server.api_url("/players/bob/attributes/skill"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("skill"));
}

#[tokio::test]
async fn traversal_usernames_are_rejected() {
    let server = TestServer::new().await;
    std::fs::write(server.players_dir().join("secret.txt"), "token=hunter2\n").unwrap();

    for user in ["..%2Fsecret", "a%5Cb", "x%00"] {
        let resp = reqwest::get(server.api_url(&format!("/players/{user}/attributes/token")))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "{user}");
    }

    // Names outside [a-z0-9_ ] never map to a file.
    let resp = reqwest::get(server.api_url("/players/Jos%C3%A9/attributes/token"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn put_updates_existing_remote_record() {
    let server = TestServer::new().await;
    server
        .remote
        .insert(remote_key("Bob Smith"), "#Player save\nrank=1\n");
    let client = reqwest::Client::new();

    let resp = client
        .put(server.api_url("/players/Bob%20Smith/attributes/rank"))
        .json(&serde_json::json!({ "value": "9" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["updated"], true);

    let record = server.remote.record("player_bob_smith").unwrap();
    assert!(record.contains("rank=9"));
    assert_eq!(server.remote.open_connections(), 0);
}

#[tokio::test]
async fn put_without_remote_record_writes_nothing() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let body: serde_json::Value = client
        .put(server.api_url("/players/ghost/attributes/rank"))
        .json(&serde_json::json!({ "value": "1" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["updated"], false);
    assert!(server.remote.is_empty());
}

#[tokio::test]
async fn remote_write_is_not_visible_locally() {
    let server = TestServer::new().await;
    server.write_save("carol", "rank=1\n");
    server.remote.insert(remote_key("carol"), "rank=1\n");
    let client = reqwest::Client::new();

    client
        .put(server.api_url("/players/carol/attributes/rank"))
        .json(&serde_json::json!({ "value": "5" }))
        .send()
        .await
        .unwrap();

    let body: serde_json::Value = reqwest::get(server.api_url("/players/carol/attributes/rank"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["value"], "1");
}

#[tokio::test]
async fn put_reports_store_outage() {
    let server = TestServer::new().await;
    server.remote.insert(remote_key("dave"), "rank=1\n");
    server.remote.set_failing(true);
    let client = reqwest::Client::new();

    let resp = client
        .put(server.api_url("/players/dave/attributes/rank"))
        .json(&serde_json::json!({ "value": "2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
    assert_eq!(server.remote.open_connections(), 0);
}

#[tokio::test]
async fn overlong_username_is_rejected() {
    let server = TestServer::new().await;
    let resp = reqwest::get(server.api_url("/players/thirteen_chars/attributes/rank"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn attributes_require_token_when_configured() {
    let server = TestServer::with_auth("admin-token").await;
    server.write_save("erin", "rank=2\n");
    let client = reqwest::Client::new();

    let resp = client
        .get(server.api_url("/players/erin/attributes/rank"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(server.api_url("/players/erin/attributes/rank"))
        .bearer_auth("admin-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}
