//! Persisted batch queue.

use imagesuggest_db::test_fixtures::TestDatabase;
use imagesuggest_db::{JobQueue, JobStatus, RunConfig, RunState};

#[tokio::test]
#[ignore] // Requires DATABASE_URL with a reachable Postgres
async fn test_push_claim_complete() {
    let test_db = TestDatabase::new().await;
    let queue = test_db.db.job_queue();

    let mut state = RunState::new(RunConfig::default());
    state.last_page_id = 500;
    state.job_number = 3;
    state.record_notified(8);

    let id = queue.push(&state).await.unwrap();
    assert_eq!(queue.pending_count().await.unwrap(), 1);

    let claimed = queue.claim_next().await.unwrap().expect("batch should be claimable");
    assert_eq!(claimed.id, id);
    assert_eq!(claimed.status, JobStatus::Running);
    assert_eq!(claimed.state, state);
    assert!(claimed.started_at.is_some());

    assert!(queue.claim_next().await.unwrap().is_none());
    assert_eq!(queue.pending_count().await.unwrap(), 0);

    queue.complete(id).await.unwrap();

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with a reachable Postgres
async fn test_claims_oldest_first_and_fail_records_error() {
    let test_db = TestDatabase::new().await;
    let queue = test_db.db.job_queue();

    let mut first = RunState::default();
    first.job_number = 1;
    let mut second = RunState::default();
    second.job_number = 2;

    let first_id = queue.push(&first).await.unwrap();
    queue.push(&second).await.unwrap();

    let claimed = queue.claim_next().await.unwrap().unwrap();
    assert_eq!(claimed.id, first_id);
    assert_eq!(claimed.state.job_number, 1);

    queue.fail(first_id, "search unreachable").await.unwrap();
    let message: Option<String> =
        sqlx::query_scalar("SELECT error_message FROM job_queue WHERE id = $1")
            .bind(first_id)
            .fetch_one(&test_db.pool)
            .await
            .unwrap();
    assert_eq!(message.as_deref(), Some("search unreachable"));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with a reachable Postgres
async fn test_unreadable_payload_is_failed_on_claim() {
    let test_db = TestDatabase::new().await;
    let queue = test_db.db.job_queue();

    let id = uuid::Uuid::now_v7();
    sqlx::query(
        "INSERT INTO job_queue (id, job_type, status, payload, created_at)
         VALUES ($1, $2, 'pending', $3, NOW())",
    )
    .bind(id)
    .bind(imagesuggest_db::defaults::NOTIFICATIONS_JOB_TYPE)
    .bind(serde_json::json!({ "lastPageId": "not a number" }))
    .execute(&test_db.pool)
    .await
    .unwrap();

    assert!(queue.claim_next().await.is_err());

    let (status, message): (String, Option<String>) =
        sqlx::query_as("SELECT status, error_message FROM job_queue WHERE id = $1")
            .bind(id)
            .fetch_one(&test_db.pool)
            .await
            .unwrap();
    assert_eq!(status, "failed");
    assert!(message.unwrap().starts_with("Unreadable job payload"));
    assert!(queue.claim_next().await.unwrap().is_none());

    test_db.cleanup().await;
}
