use super::connection::timeout_millis;
use super::{Connection, QueueClient};
use crate::broker::Broker;
use crate::config::Settings;
use crate::transport::serve;
use crate::utils::error::ClientError;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};

async fn start_server() -> (String, Arc<Broker>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/", listener.local_addr().unwrap());
    let broker = Arc::new(Broker::new());
    tokio::spawn(serve(listener, broker.clone(), Settings::default()));
    (url, broker)
}

#[tokio::test]
async fn test_connection_operations() {
    let (url, _broker) = start_server().await;
    let conn = Connection::connect(&url).await.unwrap();

    conn.subscribe("inbox", "news").await.unwrap();
    assert_eq!(conn.publish("news", "hello").await.unwrap(), 1);
    assert_eq!(conn.take("inbox", None).await.unwrap(), "hello");
    conn.unsubscribe("inbox", "news").await.unwrap();
}

#[tokio::test]
async fn test_connection_surfaces_not_found() {
    let (url, _broker) = start_server().await;
    let conn = Connection::connect(&url).await.unwrap();

    match conn.publish("news", "hello").await {
        Err(ClientError::Server { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "There are no subscribers for topic: news");
        }
        other => panic!("Expected a server error, got {other:?}"),
    }

    assert!(matches!(
        conn.unsubscribe("ghost", "news").await,
        Err(ClientError::Server { status: 404, .. })
    ));

    conn.subscribe("inbox", "news").await.unwrap();
    assert!(matches!(
        conn.take("inbox", Some(Duration::from_millis(30))).await,
        Err(ClientError::Server { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_connection_rejects_requests_after_close() {
    let (url, _broker) = start_server().await;
    let conn = Connection::connect(&url).await.unwrap();

    conn.close();
    assert!(!conn.is_running());
    assert!(matches!(
        conn.publish("news", "hello").await,
        Err(ClientError::Closed)
    ));
}

#[tokio::test]
async fn test_queue_client_publish_and_retrieve() {
    let (url, _broker) = start_server().await;
    let alice = QueueClient::connect("alice", &url).await.unwrap();
    let bob = QueueClient::connect("bob", &url).await.unwrap();

    alice.subscribe("chat").await.unwrap();
    bob.subscribe("chat").await.unwrap();

    assert_eq!(alice.publish("chat", "hi all").await.unwrap(), 2);

    let to_bob = timeout(Duration::from_secs(2), bob.retrieve()).await.unwrap();
    let to_alice = timeout(Duration::from_secs(2), alice.retrieve()).await.unwrap();
    assert_eq!(to_bob.as_deref(), Some("hi all"));
    assert_eq!(to_alice.as_deref(), Some("hi all"));
}

#[tokio::test]
async fn test_queue_client_preserves_order() {
    let (url, _broker) = start_server().await;
    let client = QueueClient::connect("inbox", &url).await.unwrap();
    client.subscribe("news").await.unwrap();

    for i in 0..10 {
        client.publish("news", &i.to_string()).await.unwrap();
    }
    for i in 0..10 {
        let message = client.retrieve_timeout(Duration::from_secs(2)).await;
        assert_eq!(message, Some(i.to_string()));
    }
}

#[tokio::test]
async fn test_queue_client_retrieve_timeout_on_empty_queue() {
    let (url, _broker) = start_server().await;
    let client = QueueClient::connect("inbox", &url).await.unwrap();
    client.subscribe("news").await.unwrap();

    assert_eq!(client.retrieve_timeout(Duration::from_millis(50)).await, None);
    assert!(client.is_running());
}

#[tokio::test]
async fn test_queue_client_shutdown_leaves_messages_on_server() {
    let (url, broker) = start_server().await;
    let client = QueueClient::connect("inbox", &url).await.unwrap();
    client.subscribe("news").await.unwrap();
    // Let the puller park a take on the empty queue.
    sleep(Duration::from_millis(50)).await;

    assert!(client.shutdown().await.is_empty());
    sleep(Duration::from_millis(100)).await;
    assert!(!client.is_running());

    let producer = Connection::connect(&url).await.unwrap();
    producer.publish("news", "kept").await.unwrap();
    assert_eq!(broker.store.len("inbox"), Some(1));
}

#[tokio::test]
async fn test_queue_client_shutdown_returns_fetched_messages() {
    let (url, broker) = start_server().await;
    let client = QueueClient::connect("inbox", &url).await.unwrap();
    client.subscribe("news").await.unwrap();

    client.publish("news", "a").await.unwrap();
    client.publish("news", "b").await.unwrap();
    // One message fills the local buffer, the other is held by the puller.
    sleep(Duration::from_millis(200)).await;
    assert_eq!(broker.store.len("inbox"), Some(0));

    let unread = client.shutdown().await;
    assert_eq!(unread, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(client.retrieve().await, None);
}

#[tokio::test]
async fn test_queue_client_shutdown_after_partial_retrieve() {
    let (url, broker) = start_server().await;
    let client = QueueClient::connect("inbox", &url).await.unwrap();
    client.subscribe("news").await.unwrap();

    for body in ["a", "b", "c"] {
        client.publish("news", body).await.unwrap();
    }
    assert_eq!(
        client.retrieve_timeout(Duration::from_secs(2)).await.as_deref(),
        Some("a")
    );
    sleep(Duration::from_millis(200)).await;

    assert_eq!(broker.store.len("inbox"), Some(0));

    let unread = client.shutdown().await;
    assert_eq!(unread, vec!["b".to_string(), "c".to_string()]);
}

#[test]
fn test_timeout_millis_saturates_and_never_disables() {
    assert_eq!(timeout_millis(Duration::from_millis(250)), 250);
    assert_eq!(timeout_millis(Duration::from_micros(10)), 1);
    assert_eq!(timeout_millis(Duration::ZERO), 1);
    assert_eq!(timeout_millis(Duration::MAX), u64::MAX);
}
