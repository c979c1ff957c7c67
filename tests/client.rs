//! Stream client tests against canned SSE responses served by wiremock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notifyd::client::listener::StreamClient;
use notifyd::client::store::NotificationStore;
use notifyd::models::event::NotificationEvent;
use notifyd::models::message::Message;
use notifyd::wire::encode_data;

fn sse_body(events: &[NotificationEvent]) -> String {
    let mut body = String::from(": connected\n\n");
    for event in events {
        body.push_str(&format!("data: {}\n\n", encode_data(event).unwrap()));
    }
    body
}

fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

/// Start the client in the background; returns the shutdown sender.
fn spawn_client(url: String, store: Arc<NotificationStore>) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let client = StreamClient::new(url, "test-token", store);
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { client.run(rx).await });
    (tx, handle)
}

async fn wait_for_requests(server: &MockServer, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let seen = server.received_requests().await.map(|r| r.len()).unwrap_or(0);
            if seen >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("client did not reconnect in time");
}

#[tokio::test]
async fn test_client_counts_relevant_frames() {
    let server = MockServer::start().await;
    let events = vec![
        NotificationEvent::new_message(Message::broadcast("u1", "c1", "hi")),
        NotificationEvent::new_message(Message::broadcast("u2", "c1", "self")),
        NotificationEvent::new_message(Message::direct("u1", "u2", "for you")),
        NotificationEvent::new_message(Message::direct("u1", "u3", "not for you")),
    ];

    Mock::given(method("GET"))
        .and(path("/api/v1/notifications/stream"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(sse_response(sse_body(&events)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = Arc::new(NotificationStore::new("u2"));
    let mut rx = store.subscribe();
    let (stop, handle) = spawn_client(
        format!("{}/api/v1/notifications/stream", server.uri()),
        store.clone(),
    );

    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.count() >= 2))
        .await
        .expect("frames not applied")
        .unwrap();
    assert_eq!(store.snapshot().count(), 2);
    assert!(store.snapshot().has_unread());

    stop.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("client did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_malformed_frame_is_skipped() {
    let server = MockServer::start().await;
    let good = NotificationEvent::new_message(Message::broadcast("u1", "c1", "ok"));
    let body = format!(
        "data: {{\"type\":\"newMessage\",\"message\":\n\ndata: {}\n\n",
        encode_data(&good).unwrap()
    );

    Mock::given(method("GET"))
        .respond_with(sse_response(body))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = Arc::new(NotificationStore::new("u2"));
    let mut rx = store.subscribe();
    let (stop, _handle) = spawn_client(server.uri(), store.clone());

    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.count() >= 1))
        .await
        .expect("good frame not applied")
        .unwrap();
    assert_eq!(store.snapshot().count(), 1);
    stop.send(true).unwrap();
}

#[tokio::test]
async fn test_no_replay_after_reconnect() {
    let server = MockServer::start().await;
    let first = NotificationEvent::new_message(Message::broadcast("u1", "c1", "first"));

    Mock::given(method("GET"))
        .respond_with(sse_response(sse_body(&[first])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    // Second connection: the server has nothing new for us
    Mock::given(method("GET"))
        .respond_with(sse_response(sse_body(&[])))
        .mount(&server)
        .await;

    let store = Arc::new(NotificationStore::new("u2"));
    let mut rx = store.subscribe();
    let (stop, _handle) = spawn_client(server.uri(), store.clone());

    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.count() == 1))
        .await
        .expect("first frame not applied")
        .unwrap();
    store.mark_as_read();

    wait_for_requests(&server, 2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.snapshot().count(), 0);
    stop.send(true).unwrap();
}

#[tokio::test]
async fn test_unauthorized_is_retried_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let store = Arc::new(NotificationStore::new("u2"));
    let (stop, handle) = spawn_client(server.uri(), store.clone());

    wait_for_requests(&server, 2).await;
    let requests = server.received_requests().await.unwrap();
    // Backoff floor is one second, so two attempts cannot pile up instantly
    assert!(requests.len() <= 3);
    assert_eq!(store.snapshot().count(), 0);

    stop.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("client did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_manual_refresh_applies_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/notifications/unread"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"count": 4})))
        .mount(&server)
        .await;

    let store = Arc::new(NotificationStore::new("u2"));
    let client = StreamClient::new(
        format!("{}/api/v1/notifications/stream", server.uri()),
        "test-token",
        store.clone(),
    );

    let count = client
        .refresh_unread(&format!("{}/api/v1/notifications/unread", server.uri()))
        .await
        .unwrap();
    assert_eq!(count, 4);
    assert_eq!(store.snapshot().count(), 4);
    assert!(store.snapshot().has_unread());
}

#[tokio::test]
async fn test_custom_backoff_delays_reconnect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = Arc::new(NotificationStore::new("u2"));
    let client = StreamClient::new(server.uri(), "test-token", store)
        .with_backoff(Duration::from_secs(3), Duration::from_secs(3));
    let (stop, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { client.run(rx).await });

    wait_for_requests(&server, 1).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    stop.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("client did not stop")
        .unwrap();
}
