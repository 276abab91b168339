use crate::support::{self, MockBroker, TestConnection};
use futures::future::join_all;
use mom_failover::SubscribeInput;
use std::sync::Arc;
use std::time::Duration;

async fn wait_until_disconnected(connection: &TestConnection) {
    for _ in 0..200 {
        if !connection.is_connected() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("connection was not invalidated");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_connect() {
    let broker = MockBroker::new();
    broker.set_connect_delay(Duration::from_millis(50));
    let connection = support::connection(&broker, 3);

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let connection = Arc::clone(&connection);
            tokio::spawn(async move { connection.get_connection().await })
        })
        .collect();

    let ids: Vec<usize> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().id)
        .collect();

    assert!(ids.iter().all(|id| *id == 1));
    assert_eq!(broker.connects(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_more_than_one_live_connection() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let connection = Arc::clone(&connection);
            tokio::spawn(async move {
                for round in 0..50 {
                    connection.get_connection().await.unwrap();
                    if (worker + round) % 7 == 0 {
                        connection.invalidate(None).await;
                    }
                }
            })
        })
        .collect();

    for handle in join_all(handles).await {
        handle.unwrap();
    }

    assert_eq!(broker.peak_live_connections(), 1);
    assert!(broker.live_connections() <= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broker_failure_invalidates_connection_and_sessions() {
    support::init_tracing();
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let session = support::session(&broker, &connection);
    session.producer().await.unwrap();

    assert!(broker.raise(support::lost("broker restarted")));
    wait_until_disconnected(&connection).await;

    assert!(!session.has_session_provider().await);
    assert_eq!(broker.connections_closed(), 1);

    let producer = session.producer().await.unwrap();
    assert_eq!(producer.connection_id, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_failure_report_is_ignored() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);

    connection.get_connection().await.unwrap();
    let stale = broker.listener().unwrap();

    connection.invalidate(None).await;
    let current = connection.get_connection().await.unwrap();

    stale(support::lost("late report"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(connection.is_connected());
    assert_eq!(current.id, 2);
    assert_eq!(broker.connections_closed(), 1);
    let again = connection.get_connection().await.unwrap();
    assert!(Arc::ptr_eq(&current, &again));
}

#[tokio::test(start_paused = true)]
async fn connection_created_during_close_is_released() {
    let broker = MockBroker::new();
    broker.set_connect_delay(Duration::from_millis(50));
    let connection = support::connection(&broker, 3);

    let pending = tokio::spawn({
        let connection = Arc::clone(&connection);
        async move { connection.get_connection().await }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    connection.close().await;

    let error = pending.await.unwrap().unwrap_err();
    assert!(error.is_closed());
    assert_eq!(broker.connections_created(), 1);
    assert_eq!(broker.connections_closed(), 1);
    assert_eq!(broker.live_connections(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn close_is_terminal_for_concurrent_callers() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let sessions: Vec<_> = (0..4)
        .map(|_| support::session(&broker, &connection))
        .collect();

    let workers: Vec<_> = sessions
        .iter()
        .map(|session| {
            let session = Arc::clone(session);
            tokio::spawn(async move {
                loop {
                    match session.producer().await {
                        Ok(_) => tokio::task::yield_now().await,
                        Err(error) => return error,
                    }
                }
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(20)).await;
    connection.close().await;

    for worker in join_all(workers).await {
        assert!(worker.unwrap().is_closed());
    }
    for session in &sessions {
        assert!(session.is_closing());
        let error = session.consumer(&SubscribeInput::new("q")).await.unwrap_err();
        assert!(error.is_closed());
    }
    assert!(connection.get_connection().await.unwrap_err().is_closed());
    assert_eq!(broker.live_connections(), 0);
}

#[tokio::test]
async fn session_racing_an_invalidation_moves_to_the_new_connection() {
    let broker = MockBroker::new();
    let connection = support::connection(&broker, 3);
    let session = support::session(&broker, &connection);
    assert_eq!(session.producer().await.unwrap().connection_id, 1);

    let gate = broker.hold_provider_closes();
    let invalidation = tokio::spawn({
        let connection = Arc::clone(&connection);
        async move { connection.invalidate(None).await }
    });
    gate.wait_entered().await;

    // The fan-out is parked inside the provider close; the old connection is
    // already out of the slot.
    let producer = session.producer().await.unwrap();
    assert_eq!(producer.connection_id, 2);

    gate.release();
    invalidation.await.unwrap();

    assert_eq!(broker.connections_created(), 2);
    assert_eq!(broker.connections_closed(), 1);
    assert_eq!(broker.live_connections(), 1);
    assert!(session.has_session_provider().await);
    assert_eq!(session.producer().await.unwrap().connection_id, 2);
}
