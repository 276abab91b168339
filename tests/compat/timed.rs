use crate::support::{self, MockBroker};
use mom_failover::{compat, SessionWrapper, SubscribeInput};
use std::time::Duration;

#[tokio::test]
async fn native_timed_receive_is_preferred() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let session = SessionWrapper::new(&connection, false, broker.timed_provider_factory());
    broker.publish("direct");

    let message = session
        .receive(&SubscribeInput::new("q"), Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(message.as_deref(), Some("direct"));
    assert_eq!(broker.timed_receives(), 1);
    assert_eq!(broker.consumer_receives(), 0);
    assert_eq!(broker.operations(), 0);
}

#[tokio::test(start_paused = true)]
async fn native_timed_receive_times_out_empty() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let session = SessionWrapper::new(&connection, false, broker.timed_provider_factory());
    let raw = session.session().await.unwrap();
    let provider = (broker.timed_provider_factory())(raw).await.unwrap();

    let message = compat::receive_with_timeout(
        &provider,
        &SubscribeInput::new("q"),
        Duration::from_millis(100),
    )
    .await
    .unwrap();

    assert!(message.is_none());
    assert_eq!(broker.timed_receives(), 1);
}
