use crate::support::{self, MockBroker};
use mom_failover::{ReceiveRequest, SessionWrapper, SubscribeInput, TransportError};
use std::time::Duration;
use tower::{Service, ServiceExt};

#[tokio::test]
async fn provider_is_created_on_first_use() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let session = support::session(&broker, &connection);

    assert!(!session.has_session_provider().await);
    assert_eq!(broker.connects(), 0);
    assert_eq!(broker.providers_created(), 0);

    session.producer().await.unwrap();

    assert!(session.has_session_provider().await);
    assert_eq!(broker.connects(), 1);
    assert_eq!(broker.sessions_created(), 1);
    assert_eq!(broker.providers_created(), 1);
}

#[tokio::test]
async fn operations_share_one_provider() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let session = support::session(&broker, &connection);
    let subscription = SubscribeInput::new("orders");

    session.session().await.unwrap();
    session.producer().await.unwrap();
    let consumer = session.consumer(&subscription).await.unwrap();
    session.temporary_queue().await.unwrap();

    assert_eq!(consumer.destination, "orders");
    assert_eq!(broker.providers_created(), 1);
    assert_eq!(broker.operations(), 4);
}

#[tokio::test]
async fn sessions_are_created_in_the_requested_mode() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let transacted = SessionWrapper::new(&connection, true, broker.provider_factory());
    let auto = support::session(&broker, &connection);

    assert!(transacted.is_transacted());
    assert!(transacted.session().await.unwrap().transacted);
    assert!(!auto.session().await.unwrap().transacted);
    assert_ne!(transacted.id(), auto.id());
}

#[tokio::test]
async fn sessions_share_the_connection() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let first = support::session(&broker, &connection);
    let second = support::session(&broker, &connection);

    let a = first.producer().await.unwrap();
    let b = second.producer().await.unwrap();

    assert_eq!(a.connection_id, b.connection_id);
    assert_eq!(broker.connects(), 1);
    assert_eq!(broker.providers_created(), 2);
}

#[tokio::test]
async fn failed_provider_creation_closes_the_raw_session() {
    let broker = MockBroker::new();
    broker.fail_provider_creation(1, TransportError::IllegalState("bad selector".into()));
    let connection = support::connection(&broker, 3);
    let session = support::session(&broker, &connection);

    let error = session.producer().await.unwrap_err();

    assert!(!error.is_retryable());
    assert_eq!(broker.sessions_created(), 1);
    assert_eq!(broker.sessions_closed(), 1);
    assert!(!session.has_session_provider().await);

    session.producer().await.unwrap();
    assert_eq!(broker.providers_created(), 1);
}

#[tokio::test]
async fn stats_follow_the_current_provider() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let session = support::session(&broker, &connection);
    let subscription = SubscribeInput::new("orders");

    assert!(session.stats().await.is_none());

    broker.publish("hello");
    let message = session.receive(&subscription, Duration::ZERO).await.unwrap();
    assert_eq!(message.as_deref(), Some("hello"));

    let stats = session.stats().await.unwrap();
    assert_eq!(stats.receive_count(), 1);
    assert_eq!(stats.received_message_count(), 1);

    connection.invalidate(None).await;
    assert!(session.stats().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn receive_times_out_empty() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let session = support::session(&broker, &connection);
    let subscription = SubscribeInput::new("orders");
    let start = tokio::time::Instant::now();

    let message = session
        .receive(&subscription, Duration::from_millis(250))
        .await
        .unwrap();

    assert!(message.is_none());
    assert!(start.elapsed() >= Duration::from_millis(250));
    let stats = session.stats().await.unwrap();
    assert_eq!(stats.receive_count(), 1);
    assert_eq!(stats.received_message_count(), 0);
}

#[tokio::test]
async fn receive_service_drives_receives() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let session = support::session(&broker, &connection);
    let mut service = session.receive_service();

    broker.publish("first");
    let message = service
        .ready()
        .await
        .unwrap()
        .call(ReceiveRequest::blocking(SubscribeInput::new("orders")))
        .await
        .unwrap();
    assert_eq!(message.as_deref(), Some("first"));

    session.close().await;
    let error = service.ready().await.unwrap_err();
    assert!(error.is_closed());
}

#[tokio::test]
async fn closed_session_rejects_every_operation() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let session = support::session(&broker, &connection);
    let subscription = SubscribeInput::new("orders");
    session.producer().await.unwrap();

    session.close().await;
    session.close().await;

    assert_eq!(broker.providers_closed(), 1);
    assert_eq!(connection.session_count(), 0);
    assert!(session.session().await.unwrap_err().is_closed());
    assert!(session.producer().await.unwrap_err().is_closed());
    assert!(session.consumer(&subscription).await.unwrap_err().is_closed());
    assert!(session
        .receive(&subscription, Duration::from_millis(1))
        .await
        .unwrap_err()
        .is_closed());
    assert!(session.temporary_queue().await.unwrap_err().is_closed());

    // The connection itself stays usable.
    assert!(!connection.is_closing());
    connection.get_connection().await.unwrap();
}

#[tokio::test]
async fn sessions_created_after_close_are_closed() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    connection.close().await;

    let session = support::session(&broker, &connection);

    assert!(session.is_closing());
    assert!(session.producer().await.unwrap_err().is_closed());
    assert_eq!(connection.session_count(), 0);
    assert_eq!(broker.providers_requested(), 0);
}
