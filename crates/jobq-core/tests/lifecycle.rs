//! End-to-end scenarios over a real [`Store`] (spec §8): round trip,
//! backoff/DLQ transitions, lease expiry, and terminal-state stability.

use std::time::Duration;

use chrono::Utc;
use jobq_core::{retry, JobState, Store};

async fn store() -> Store {
    Store::connect_in_memory().await.expect("in-memory store")
}

#[tokio::test]
async fn round_trip_enqueue_claim_settle_success() {
    let store = store().await;
    let id = store.enqueue("echo ok", 3).await.unwrap();

    let claimed = store
        .claim_one("worker-a", Utc::now(), Duration::from_secs(60))
        .await
        .unwrap()
        .expect("job should be claimable");
    assert_eq!(claimed.id, id);
    assert_eq!(claimed.command, "echo ok");
    assert_eq!(claimed.state, JobState::Running);

    store.settle_success(id, "worker-a").await.unwrap();

    let jobs = store.list(None).await.unwrap();
    let job = jobs.into_iter().find(|j| j.id == id).unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert!(job.claimed_by.is_none());
}

#[tokio::test]
async fn settle_failure_schedules_retry_with_future_next_run_at() {
    let store = store().await;
    let id = store.enqueue("exit 1", 3).await.unwrap();
    let before = Utc::now();

    let job = store
        .claim_one("worker-a", before, Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();

    let decision = retry::decide(before, job.attempts + 1, job.max_retries, 2, 3600);
    assert!(!decision.to_dlq);

    store
        .settle_failure(id, "worker-a", "rc=1", decision.next_run_at, decision.to_dlq)
        .await
        .unwrap();

    let jobs = store.list(None).await.unwrap();
    let job = jobs.into_iter().find(|j| j.id == id).unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 1);
    assert!(job.next_run_at > before);
    assert_eq!(job.last_error.as_deref(), Some("rc=1"));
}

#[tokio::test]
async fn dlq_threshold_after_max_retries_exceeded() {
    let store = store().await;
    let max_retries = 2;
    let id = store.enqueue("exit 1", max_retries).await.unwrap();

    // Three failures: the spec's "M+1" DLQ-threshold property.
    for _ in 0..3 {
        let job = store
            .claim_one("worker-a", Utc::now(), Duration::from_secs(60))
            .await
            .unwrap()
            .expect("job must be claimable between failures");
        let decision = retry::decide(Utc::now(), job.attempts + 1, job.max_retries, 2, 3600);
        store
            .settle_failure(id, "worker-a", "rc=1", decision.next_run_at, decision.to_dlq)
            .await
            .unwrap();
    }

    let jobs = store.list(Some(JobState::Dlq)).await.unwrap();
    let job = jobs.into_iter().find(|j| j.id == id).expect("job should be in dlq");
    assert_eq!(job.attempts, 3);
    assert!(job.last_error.as_deref().unwrap().contains("rc=1"));
}

#[tokio::test]
async fn completed_jobs_are_never_mutated_by_further_claims() {
    let store = store().await;
    let id = store.enqueue("echo ok", 3).await.unwrap();
    let job = store.claim_one("worker-a", Utc::now(), Duration::from_secs(60)).await.unwrap().unwrap();
    store.settle_success(job.id, "worker-a").await.unwrap();

    // A completed job is not pending and its lease has not expired, so the
    // claim scan must never pick it back up.
    let reclaimed = store.claim_one("worker-b", Utc::now(), Duration::from_secs(60)).await.unwrap();
    assert!(reclaimed.is_none());

    let jobs = store.list(None).await.unwrap();
    let job = jobs.into_iter().find(|j| j.id == id).unwrap();
    assert_eq!(job.state, JobState::Completed);
}

#[tokio::test]
async fn dlq_retry_resets_attempts_and_requeues() {
    let store = store().await;
    let id = store.enqueue("exit 1", 0).await.unwrap();

    let job = store.claim_one("worker-a", Utc::now(), Duration::from_secs(60)).await.unwrap().unwrap();
    let decision = retry::decide(Utc::now(), job.attempts + 1, job.max_retries, 2, 3600);
    assert!(decision.to_dlq);
    store
        .settle_failure(id, "worker-a", "rc=1", decision.next_run_at, decision.to_dlq)
        .await
        .unwrap();

    store.dlq_retry(id).await.unwrap();

    let jobs = store.list(None).await.unwrap();
    let job = jobs.into_iter().find(|j| j.id == id).unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 0);
    assert!(job.claimed_by.is_none());

    // And it becomes claimable again immediately.
    let reclaimed = store.claim_one("worker-b", Utc::now(), Duration::from_secs(60)).await.unwrap();
    assert_eq!(reclaimed.unwrap().id, id);
}

#[tokio::test]
async fn dlq_retry_rejects_non_dlq_jobs() {
    let store = store().await;
    let id = store.enqueue("echo ok", 3).await.unwrap();
    let err = store.dlq_retry(id).await.unwrap_err();
    assert!(matches!(err, jobq_core::JobqError::NotInDlq(job_id) if job_id == id));
}

#[tokio::test]
async fn lease_expiry_allows_reclaim_by_another_worker() {
    let store = store().await;
    let id = store.enqueue("sleep 100", 3).await.unwrap();

    let now = Utc::now();
    let first = store.claim_one("worker-a", now, Duration::from_secs(1)).await.unwrap().unwrap();
    assert_eq!(first.id, id);

    // Before the lease expires, no one else can claim it.
    let too_soon = store.claim_one("worker-b", now, Duration::from_secs(1)).await.unwrap();
    assert!(too_soon.is_none());

    // After the lease has expired, another worker reclaims the same row.
    let later = now + chrono::Duration::seconds(5);
    let reclaimed = store
        .claim_one("worker-b", later, Duration::from_secs(60))
        .await
        .unwrap()
        .expect("job must be reclaimable after lease expiry");
    assert_eq!(reclaimed.id, id);
    assert_eq!(reclaimed.claimed_by.as_deref(), Some("worker-b"));

    // worker-a's lease was stolen; its settle call must be rejected.
    let err = store.settle_success(id, "worker-a").await.unwrap_err();
    assert!(matches!(err, jobq_core::JobqError::LeaseStolen { .. }));
}

#[tokio::test]
async fn heartbeat_extends_lease_and_is_noop_after_steal() {
    let store = store().await;
    let id = store.enqueue("sleep 100", 3).await.unwrap();
    let now = Utc::now();
    store.claim_one("worker-a", now, Duration::from_secs(60)).await.unwrap().unwrap();

    let extended = now + chrono::Duration::seconds(120);
    store.heartbeat(id, "worker-a", extended).await.unwrap();

    let jobs = store.list(None).await.unwrap();
    let job = jobs.into_iter().find(|j| j.id == id).unwrap();
    assert_eq!(job.lease_deadline.unwrap(), extended);

    // Once stolen, heartbeats from the original owner are silent no-ops.
    let later = now + chrono::Duration::seconds(9999);
    store.claim_one("worker-b", later, Duration::from_secs(60)).await.unwrap();
    store.heartbeat(id, "worker-a", extended).await.unwrap();
}

#[tokio::test]
async fn attempts_never_decrease_except_via_dlq_retry() {
    let store = store().await;
    let id = store.enqueue("exit 1", 5).await.unwrap();

    let mut last_attempts = 0;
    for _ in 0..3 {
        let job = store.claim_one("worker-a", Utc::now(), Duration::from_secs(60)).await.unwrap().unwrap();
        let decision = retry::decide(Utc::now(), job.attempts + 1, job.max_retries, 2, 3600);
        store
            .settle_failure(id, "worker-a", "rc=1", decision.next_run_at, decision.to_dlq)
            .await
            .unwrap();
        let jobs = store.list(None).await.unwrap();
        let job = jobs.into_iter().find(|j| j.id == id).unwrap();
        assert!(job.attempts >= last_attempts);
        last_attempts = job.attempts;
    }
    assert_eq!(last_attempts, 3);
}

#[tokio::test]
async fn ties_on_next_run_at_break_on_ascending_id() {
    let store = store().await;
    let now = Utc::now();
    let first = store.enqueue("echo 1", 3).await.unwrap();
    let second = store.enqueue("echo 2", 3).await.unwrap();
    assert!(second > first);

    let claimed = store.claim_one("worker-a", now, Duration::from_secs(60)).await.unwrap().unwrap();
    assert_eq!(claimed.id, first, "FIFO tie-break must favor the lower id");
}

#[tokio::test]
async fn config_get_set_round_trip() {
    let store = store().await;
    assert_eq!(store.config_get("poll_interval_ms").await.unwrap(), Some("500".to_string()));
    store.config_set("poll_interval_ms", "250").await.unwrap();
    assert_eq!(store.config_get("poll_interval_ms").await.unwrap(), Some("250".to_string()));
    assert_eq!(store.config_get("does_not_exist").await.unwrap(), None);
}

#[tokio::test]
async fn worker_register_is_upsert_on_reused_id() {
    let store = store().await;
    store.workers_register("worker-a", 111).await.unwrap();
    store.workers_register("worker-a", 222).await.unwrap();

    let workers = store.workers_list().await.unwrap();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0].pid, 222);
}
