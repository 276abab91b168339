use crate::support::{self, MockBroker};
use mom_failover::FailoverError;
use std::sync::Arc;

#[tokio::test]
async fn delete_is_rejected_while_open() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let session = support::session(&broker, &connection);
    session.temporary_queue().await.unwrap();

    let error = session.delete_temporary_queue().await.unwrap_err();

    assert!(matches!(error, FailoverError::Precondition(_)));
    assert_eq!(broker.queues_deleted(), 0);

    // The queue is still tracked and goes away on close.
    session.close().await;
    assert_eq!(broker.queues_deleted(), 1);
}

#[tokio::test]
async fn close_deletes_the_queue_before_closing_the_provider() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let session = support::session(&broker, &connection);
    let queue = session.temporary_queue().await.unwrap();

    session.close().await;

    assert_eq!(queue.connection_id, 1);
    assert_eq!(broker.queues_created(), 1);
    assert_eq!(broker.queues_deleted(), 1);
    assert_eq!(broker.providers_closed(), 1);
}

#[tokio::test]
async fn close_without_a_queue_deletes_nothing() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let session = support::session(&broker, &connection);
    session.producer().await.unwrap();

    session.close().await;

    assert_eq!(broker.queues_deleted(), 0);
    assert_eq!(broker.providers_closed(), 1);
}

#[tokio::test]
async fn connection_close_deletes_session_queues() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let first = support::session(&broker, &connection);
    let second = support::session(&broker, &connection);
    first.temporary_queue().await.unwrap();
    second.temporary_queue().await.unwrap();

    connection.close().await;

    assert_eq!(broker.queues_deleted(), 2);
    assert_eq!(broker.providers_closed(), 2);
    assert_eq!(broker.connections_closed(), 1);
}

#[tokio::test]
async fn invalidation_forgets_the_queue_without_deleting_it() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let session = support::session(&broker, &connection);
    session.temporary_queue().await.unwrap();

    connection.invalidate(None).await;
    session.close().await;

    // The queue died with the old connection.
    assert_eq!(broker.queues_deleted(), 0);
}

#[tokio::test]
async fn a_new_queue_is_created_after_failover() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let session = support::session(&broker, &connection);
    let before = session.temporary_queue().await.unwrap();

    connection.invalidate(None).await;
    let after = session.temporary_queue().await.unwrap();

    assert_eq!(before.connection_id, 1);
    assert_eq!(after.connection_id, 2);
    assert_eq!(broker.queues_created(), 2);

    session.close().await;
    assert_eq!(broker.queues_deleted(), 1);
}

#[tokio::test]
async fn delete_after_close_is_a_no_op() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let session = support::session(&broker, &connection);
    session.temporary_queue().await.unwrap();
    session.close().await;

    session.delete_temporary_queue().await.unwrap();

    assert_eq!(broker.queues_deleted(), 1);
}

#[tokio::test]
async fn temporary_queue_is_refused_after_close() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let session = support::session(&broker, &connection);
    session.close().await;

    assert!(session.temporary_queue().await.unwrap_err().is_closed());
    assert_eq!(broker.queues_created(), 0);
}

#[tokio::test]
async fn queue_of_a_discarded_provider_is_not_remembered() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let session = support::session(&broker, &connection);

    let gate = broker.hold_queue_requests();
    let request = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.temporary_queue().await }
    });
    gate.wait_entered().await;

    connection.invalidate(None).await;
    gate.release();
    let queue = request.await.unwrap().unwrap();
    assert_eq!(queue.connection_id, 1);

    // The queue died with the first connection; close has nothing to delete.
    session.close().await;
    assert_eq!(broker.queues_created(), 1);
    assert_eq!(broker.queues_deleted(), 0);
}
