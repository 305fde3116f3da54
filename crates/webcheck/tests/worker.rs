mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use webcheck::codec::encode_job;
use webcheck::stream::{MemoryStreamStore, StreamStore};
use webcheck::worker::{ConsumerSettings, ReportOutcome, Worker};
use webcheck::{CheckStatus, types::CheckJob};

use common::{executor, job, reporter, spawn_backend, spawn_target_site, wait_for_results};

const STREAM: &str = "check_jobs";
const GROUP: &str = "workers";

fn settings(consumer: &str) -> ConsumerSettings {
    ConsumerSettings {
        stream: STREAM.into(),
        group: GROUP.into(),
        consumer: consumer.into(),
        block: Duration::from_millis(50),
        batch_size: 1,
        idle_sleep: Duration::from_millis(10),
        claim_min_idle: Duration::from_millis(100),
        claim_interval: Duration::from_millis(50),
    }
}

async fn enqueue(store: &MemoryStreamStore, job: &CheckJob) -> String {
    store.append(STREAM, &encode_job(job).unwrap()).await.unwrap()
}

#[actix_web::test]
async fn test_each_entry_is_reported_and_acked_once() {
    let site = spawn_target_site();
    let (backend, received) = spawn_backend();
    let store = MemoryStreamStore::new();
    let worker = Worker::new(Arc::new(store.clone()), executor(), reporter(&backend), settings("worker-a"));
    worker.ensure_group().await.unwrap();

    let mut ids = Vec::new();
    for site_id in 1..=3 {
        ids.push(enqueue(&store, &job(site_id, format!("{site}/"), 5)).await);
    }

    let mut handled = 0;
    while handled < 3 {
        let n = worker.poll_once().await.unwrap();
        assert!(n > 0, "ran out of entries after {handled}");
        handled += n;
    }

    let results = wait_for_results(&received, 3).await;
    let mut site_ids: Vec<i64> = results.iter().map(|r| r.site_id).collect();
    site_ids.sort_unstable();
    assert_eq!(site_ids, vec![1, 2, 3]);
    assert!(results.iter().all(|r| r.status == CheckStatus::Up));

    assert_eq!(store.pending_count(STREAM, GROUP), 0);
    for id in &ids {
        // Already acknowledged by the worker.
        assert!(!store.ack(STREAM, GROUP, id).await.unwrap());
    }
}

#[actix_web::test]
async fn test_down_site_is_still_reported() {
    let (backend, received) = spawn_backend();
    let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let store = MemoryStreamStore::new();
    let worker = Worker::new(Arc::new(store.clone()), executor(), reporter(&backend), settings("worker-a"));
    worker.ensure_group().await.unwrap();
    enqueue(&store, &job(8, format!("http://127.0.0.1:{port}/"), 2)).await;

    let entries = store.read_group(STREAM, GROUP, "worker-a", Duration::from_millis(50), 1).await.unwrap();
    let outcome = worker.handle_entry(&entries[0]).await;

    assert_eq!(outcome, Some(ReportOutcome::Delivered));
    let results = wait_for_results(&received, 1).await;
    assert_eq!(results[0].status, CheckStatus::Down);
    assert_eq!(results[0].status_code, None);
    assert!(results[0].error.is_some());
}

#[actix_web::test]
async fn test_rejected_submission_is_still_acked() {
    let site = spawn_target_site();
    // A backend without the result route answers 404.
    let backend = common::spawn_server(|_| {});
    let store = MemoryStreamStore::new();
    let worker = Worker::new(Arc::new(store.clone()), executor(), reporter(&backend), settings("worker-a"));
    worker.ensure_group().await.unwrap();
    enqueue(&store, &job(1, format!("{site}/"), 5)).await;

    let entries = store.read_group(STREAM, GROUP, "worker-a", Duration::from_millis(50), 1).await.unwrap();
    let outcome = worker.handle_entry(&entries[0]).await;

    assert_eq!(outcome, Some(ReportOutcome::Rejected(404)));
    assert_eq!(store.pending_count(STREAM, GROUP), 0);
}

#[actix_web::test]
async fn test_crashed_consumer_entries_are_claimed() {
    let site = spawn_target_site();
    let (backend, received) = spawn_backend();
    let store = MemoryStreamStore::new();
    store.create_group(STREAM, GROUP).await.unwrap();
    let id = enqueue(&store, &job(4, format!("{site}/"), 5)).await;

    // "worker-dead" takes the entry and never acknowledges it.
    let taken = store.read_group(STREAM, GROUP, "worker-dead", Duration::from_millis(50), 1).await.unwrap();
    assert_eq!(taken.len(), 1);

    let survivor = Worker::new(Arc::new(store.clone()), executor(), reporter(&backend), settings("worker-b"));
    assert_eq!(survivor.claim_stale().await.unwrap(), 0, "entry is not idle long enough yet");
    assert_eq!(survivor.poll_once().await.unwrap(), 0, "claimed entries are not new entries");

    actix_web::rt::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(survivor.claim_stale().await.unwrap(), 1);

    let results = wait_for_results(&received, 1).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].site_id, 4);
    assert_eq!(store.pending_count(STREAM, GROUP), 0);
    assert_eq!(store.delivery_count(STREAM, GROUP, &id), None);
}

#[actix_web::test]
async fn test_run_consumes_until_cancelled() {
    let site = spawn_target_site();
    let (backend, received) = spawn_backend();
    let store = MemoryStreamStore::new();
    let worker = Worker::new(Arc::new(store.clone()), executor(), reporter(&backend), settings("worker-a"));
    let cancel = CancellationToken::new();

    let driver = async {
        // The group is created by the worker; entries appended after that are picked up.
        actix_web::rt::time::sleep(Duration::from_millis(100)).await;
        enqueue(&store, &job(1, format!("{site}/"), 5)).await;
        enqueue(&store, &job(2, format!("{site}/"), 5)).await;
        let results = wait_for_results(&received, 2).await;
        cancel.cancel();
        results
    };

    let (run, results) = tokio::join!(worker.run(cancel.clone()), driver);

    run.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(store.pending_count(STREAM, GROUP), 0);
}
