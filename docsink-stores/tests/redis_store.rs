#![cfg(feature = "redis")]

use docsink::adaptor::SinkAdaptor;
use docsink::apply::{OperationApplier, WriteOutcome};
use docsink::report::{ErrorReporter, create_error_channel};
use docsink::session::{Session, SessionOptions};
use docsink::store::DocumentStore;
use docsink::test_utils::event::{delete_event, insert_event, update_event};
use docsink_stores::redis::RedisConnector;
use docsink_telemetry::tracing::init_test_tracing;
use serde_json::json;
use tokio::sync::mpsc;

const REDIS_ADDRESS_ENV_NAME: &str = "TESTS_REDIS_ADDRESS";

fn redis_address() -> String {
    std::env::var(REDIS_ADDRESS_ENV_NAME).unwrap_or_else(|_| "localhost:6379".to_owned())
}

fn random_collection() -> String {
    format!("docs_{}", std::process::id())
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running redis server"]
async fn events_are_applied_to_redis() {
    init_test_tracing();

    let options = SessionOptions::new(redis_address(), "docsink_tests", random_collection());
    let session = Session::open(&RedisConnector::default(), options)
        .await
        .unwrap();
    let (errors_tx, mut errors_rx) = create_error_channel();
    let applier = OperationApplier::new(ErrorReporter::new("docsink", errors_tx));

    let inserted = applier
        .apply(&session, &insert_event(json!({"id": "1", "x": 1})))
        .await;
    let conflict = applier
        .apply(&session, &insert_event(json!({"id": "1", "x": 2})))
        .await;
    let replaced = applier
        .apply(&session, &update_event(json!({"id": "1", "x": 3})))
        .await;
    let deleted = applier
        .apply(&session, &delete_event(json!({"id": "1"})))
        .await;

    assert!(matches!(inserted, WriteOutcome::Applied(ref ack) if ack.inserted == 1));
    assert!(matches!(conflict, WriteOutcome::Conflict(_)));
    assert!(matches!(replaced, WriteOutcome::Applied(ref ack) if ack.replaced == 1));
    assert!(matches!(deleted, WriteOutcome::Applied(ref ack) if ack.deleted == 1));
    assert!(errors_rx.try_recv().is_err());

    let ack = session
        .client()
        .table_drop("docsink_tests", session.collection())
        .await
        .unwrap();
    assert_eq!(ack.deleted, 0);
    session.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running redis server"]
async fn adaptor_drains_events_into_redis() {
    init_test_tracing();

    let collection = format!("{}_adaptor", random_collection());
    let (errors_tx, mut errors_rx) = create_error_channel();
    let mut adaptor = SinkAdaptor::new(
        "docsink",
        RedisConnector::default(),
        SessionOptions::new(redis_address(), "docsink_tests", collection),
        errors_tx,
    );
    let (events_tx, events_rx) = mpsc::channel(4);

    adaptor.listen(events_rx).await.unwrap();
    events_tx
        .send(insert_event(json!({"id": 1, "name": "a"})))
        .await
        .unwrap();
    events_tx.send(delete_event(json!({}))).await.unwrap();
    drop(events_tx);

    let stats = adaptor.wait().await.unwrap();

    assert_eq!(stats.applied, 1);
    assert_eq!(stats.invalid_identifiers, 1);
    assert_eq!(
        errors_rx.recv().await.unwrap().message,
        "redis error (cannot delete an object with a nil id)"
    );
}
