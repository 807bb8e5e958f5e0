use crate::*;

use ferry_api::{serve_admin_on, ApiState};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

struct Admin {
    base: String,
    http: reqwest::Client,
    shutdown_tx: broadcast::Sender<()>,
    server: JoinHandle<anyhow::Result<()>>,
}

async fn start_admin(hub: &ControlHub) -> Admin {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (shutdown_tx, _) = broadcast::channel(1);
    let state = ApiState::new(hub.clone(), shutdown_tx.clone());
    let server = tokio::spawn(serve_admin_on(listener, state));
    Admin {
        base: format!("http://127.0.0.1:{port}/api"),
        http: reqwest::Client::new(),
        shutdown_tx,
        server,
    }
}

impl Admin {
    async fn get(&self, path: &str) -> (reqwest::StatusCode, Value) {
        let resp = self.http.get(format!("{}{path}", self.base)).send().await.unwrap();
        let status = resp.status();
        let body = resp.json().await.unwrap_or(Value::Null);
        (status, body)
    }
}

#[tokio::test]
async fn test_status_and_share_listing() {
    let hub = new_hub();
    let admin = start_admin(&hub).await;

    let mut owner = Client::connect(&hub);
    let share_id = owner.create_share();
    owner.request(ClientRequest::PublishMetadata {
        share_id,
        metadata: ferry_core::FileMetadata {
            name: "video.mp4".into(),
            size: 1_048_576,
            mime_type: "video/mp4".into(),
        },
    });
    let mut receiver = Client::connect(&hub);
    receiver.join(share_id);

    let (status, body) = admin.get("/status").await;
    assert!(status.is_success());
    assert_eq!(body["connections"], 2);
    assert_eq!(body["share_count"], 1);

    let (_, body) = admin.get("/shares").await;
    let shares = body["shares"].as_array().unwrap();
    assert_eq!(shares.len(), 1);
    assert_eq!(shares[0]["share_id"], share_id.to_string());
    assert_eq!(shares[0]["file_name"], "video.mp4");
    assert_eq!(shares[0]["receivers"], 1);

    let (status, body) = admin.get(&format!("/shares/{share_id}")).await;
    assert!(status.is_success());
    assert_eq!(body["owner"], owner.id.to_string());
    assert_eq!(body["metadata"]["type"], "video/mp4");
    assert_eq!(body["receivers"][0], receiver.id.to_string());
}

#[tokio::test]
async fn test_inspect_errors() {
    let hub = new_hub();
    let admin = start_admin(&hub).await;

    let (status, _) = admin.get("/shares/not-an-id").await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);

    let (status, _) = admin.get(&format!("/shares/{}", ShareId::generate())).await;
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_operator_ends_share() {
    let hub = new_hub();
    let admin = start_admin(&hub).await;

    let mut owner = Client::connect(&hub);
    let share_id = owner.create_share();
    let mut receiver = Client::connect(&hub);
    receiver.join(share_id);

    let url = format!("{}/shares/{share_id}", admin.base);
    let body: Value = admin.http.delete(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(body["ended"], true);
    assert_eq!(
        receiver.drain(),
        vec![ServerMessage::ShareEnded {
            share_id,
            message: "Share closed by operator".into()
        }]
    );
    assert!(hub.registry().is_empty());

    // Ending it again reports nothing ended.
    let body: Value = admin.http.delete(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(body["ended"], false);
}

#[tokio::test]
async fn test_shutdown_stops_server() {
    let hub = new_hub();
    let Admin {
        base,
        http,
        shutdown_tx,
        server,
    } = start_admin(&hub).await;
    let mut observer = shutdown_tx.subscribe();

    let resp = http
        .post(format!("{base}/daemon/shutdown"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    drop(resp);
    drop(http);

    tokio::time::timeout(WAIT, observer.recv())
        .await
        .expect("shutdown not broadcast")
        .unwrap();
    tokio::time::timeout(WAIT, server)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}
