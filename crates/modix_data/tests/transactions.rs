use async_trait::async_trait;
use modix_data::{
    open_store_in_memory, DbError, DeletedMessageCreationData, DeletedMessageRepository,
    ErrorPhase, HandlerError, ModerationActionCreationData, ModerationActionEventHandler,
    ModerationActionEventHandlers, RepoError, SqliteDeletedMessageRepository, StoreSession,
    StoreTransaction,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const BLOCK_BACK_LINK_SQL: &str = "
    CREATE TRIGGER block_action_back_link
    BEFORE UPDATE OF deleted_message_id ON moderation_actions
    BEGIN
        SELECT RAISE(ABORT, 'back-link rejected');
    END;";

#[derive(Default)]
struct CountingHandler {
    calls: AtomicUsize,
}

#[async_trait]
impl ModerationActionEventHandler for CountingHandler {
    async fn on_moderation_action_created(
        &self,
        _moderation_action_id: i64,
        _data: &ModerationActionCreationData,
    ) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn payload(message_id: u64) -> DeletedMessageCreationData {
    DeletedMessageCreationData {
        message_id,
        channel_id: 2,
        guild_id: 1,
        author_id: 3,
        content: "off-topic".to_string(),
        created_by_id: 4,
        reason: "rule 2".to_string(),
    }
}

async fn count(session: &StoreSession, table: &str) -> i64 {
    session
        .with_connection(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
                row.get(0)
            })
        })
        .await
        .unwrap()
}

async fn count_in(tx: &mut StoreTransaction, table: &str) -> i64 {
    tx.with_connection(|conn| {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
            row.get(0)
        })
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn second_begin_waits_until_first_transaction_finishes() {
    let session = open_store_in_memory().unwrap();

    let first = session.begin_transaction().await.unwrap();
    assert!(session.transaction_active());

    let blocked = timeout(Duration::from_millis(50), session.begin_transaction()).await;
    assert!(blocked.is_err(), "second transaction must not start while the first is live");

    first.commit().await.unwrap();
    assert!(!session.transaction_active());

    let second = timeout(Duration::from_secs(5), session.begin_transaction())
        .await
        .expect("connection should be free after commit")
        .unwrap();
    second.rollback().await.unwrap();
}

#[tokio::test]
async fn waiting_begin_resumes_when_holder_commits() {
    let session = open_store_in_memory().unwrap();
    let first = session.begin_transaction().await.unwrap();

    let waiter = {
        let session = session.clone();
        tokio::spawn(async move {
            let tx = session.begin_transaction().await.unwrap();
            tx.commit().await.unwrap();
        })
    };
    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());

    first.commit().await.unwrap();
    timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap();
}

#[tokio::test]
async fn rollback_discards_create_made_inside_transaction() {
    let session = open_store_in_memory().unwrap();
    let repo = SqliteDeletedMessageRepository::new(session.clone(), Default::default());

    let mut tx = repo.begin_create_transaction().await.unwrap();
    repo.create_in(&mut tx, &payload(10)).await.unwrap();
    assert_eq!(count_in(&mut tx, "deleted_messages").await, 1);
    tx.rollback().await.unwrap();

    assert!(repo.read(10).await.unwrap().is_none());
    assert_eq!(count(&session, "moderation_actions").await, 0);
}

#[tokio::test]
async fn commit_persists_creates_made_inside_transaction() {
    let session = open_store_in_memory().unwrap();
    let repo = SqliteDeletedMessageRepository::new(session.clone(), Default::default());

    let mut tx = repo.begin_create_transaction().await.unwrap();
    repo.create_in(&mut tx, &payload(11)).await.unwrap();
    repo.create_in(&mut tx, &payload(12)).await.unwrap();
    tx.commit().await.unwrap();

    let stored = repo.read(12).await.unwrap().unwrap();
    assert_eq!(stored.create_action.deleted_message_id, Some(12));
    assert_eq!(repo.search_by_guild(1).await.unwrap().len(), 2);
    assert_eq!(count(&session, "moderation_actions").await, 2);
}

#[tokio::test]
async fn failed_create_inside_transaction_keeps_earlier_writes() {
    let session = open_store_in_memory().unwrap();
    let repo = SqliteDeletedMessageRepository::new(session.clone(), Default::default());

    let mut tx = repo.begin_create_transaction().await.unwrap();
    repo.create_in(&mut tx, &payload(13)).await.unwrap();
    assert!(matches!(
        repo.create_in(&mut tx, &payload(13)).await,
        Err(RepoError::Db(_))
    ));
    tx.commit().await.unwrap();

    assert!(repo.read(13).await.unwrap().is_some());
    assert_eq!(count(&session, "moderation_actions").await, 1);
}

#[tokio::test]
async fn dropped_transaction_rolls_back_and_frees_the_connection() {
    let session = open_store_in_memory().unwrap();
    let repo = SqliteDeletedMessageRepository::new(session.clone(), Default::default());

    let mut tx = repo.begin_create_transaction().await.unwrap();
    repo.create_in(&mut tx, &payload(14)).await.unwrap();
    drop(tx);
    assert!(!session.transaction_active());

    let next = timeout(Duration::from_secs(5), session.begin_transaction())
        .await
        .expect("connection should be released after drop")
        .unwrap();
    next.rollback().await.unwrap();

    assert!(repo.read(14).await.unwrap().is_none());
    assert_eq!(count(&session, "moderation_actions").await, 0);
}

#[tokio::test]
async fn bare_create_after_dropped_transaction_is_kept() {
    let session = open_store_in_memory().unwrap();
    let repo = SqliteDeletedMessageRepository::new(session.clone(), Default::default());

    let mut tx = repo.begin_create_transaction().await.unwrap();
    repo.create_in(&mut tx, &payload(50)).await.unwrap();
    drop(tx);

    repo.create(&payload(51)).await.unwrap();
    tokio::task::yield_now().await;

    assert!(repo.read(51).await.unwrap().is_some());
    assert!(repo.read(50).await.unwrap().is_none());
    assert_eq!(count(&session, "moderation_actions").await, 1);
}

#[tokio::test]
async fn bare_create_waits_for_other_callers_transaction() {
    let session = open_store_in_memory().unwrap();
    let holder = SqliteDeletedMessageRepository::new(session.clone(), Default::default());
    let bystander = SqliteDeletedMessageRepository::new(session.clone(), Default::default());

    let mut tx = holder.begin_create_transaction().await.unwrap();
    let bare = tokio::spawn(async move {
        let result = bystander.create(&payload(60)).await;
        (bystander, result)
    });
    tokio::task::yield_now().await;
    assert!(!bare.is_finished(), "bare create must not run inside another transaction");

    holder.create_in(&mut tx, &payload(61)).await.unwrap();
    tx.rollback().await.unwrap();

    let (bystander, result) = timeout(Duration::from_secs(5), bare).await.unwrap().unwrap();
    result.unwrap();
    assert!(bystander.read(60).await.unwrap().is_some());
    assert!(holder.read(61).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_back_link_without_transaction_leaves_unlinked_action() {
    let session = open_store_in_memory().unwrap();
    let observer = Arc::new(CountingHandler::default());
    let handlers = ModerationActionEventHandlers::new().with(observer.clone());
    let repo = SqliteDeletedMessageRepository::new(session.clone(), handlers);
    session
        .with_connection(|conn| conn.execute_batch(BLOCK_BACK_LINK_SQL))
        .await
        .unwrap();

    let err = repo.create(&payload(70)).await.unwrap_err();

    assert!(matches!(err, RepoError::Db(_)), "unexpected error: {err}");
    assert_eq!(err.phase(), ErrorPhase::Store);
    assert_eq!(observer.calls.load(Ordering::SeqCst), 0);

    // The insert committed on its own; only the back-link is missing.
    let stored = repo.read(70).await.unwrap().unwrap();
    assert_eq!(stored.create_action.deleted_message_id, None);
    assert_eq!(count(&session, "moderation_actions").await, 1);
}

#[tokio::test]
async fn failed_back_link_inside_transaction_rolls_back_cleanly() {
    let session = open_store_in_memory().unwrap();
    let observer = Arc::new(CountingHandler::default());
    let handlers = ModerationActionEventHandlers::new().with(observer.clone());
    let repo = SqliteDeletedMessageRepository::new(session.clone(), handlers);
    session
        .with_connection(|conn| conn.execute_batch(BLOCK_BACK_LINK_SQL))
        .await
        .unwrap();

    let mut tx = repo.begin_create_transaction().await.unwrap();
    let err = repo.create_in(&mut tx, &payload(71)).await.unwrap_err();
    assert_eq!(err.phase(), ErrorPhase::Store);
    tx.rollback().await.unwrap();

    assert_eq!(observer.calls.load(Ordering::SeqCst), 0);
    assert!(repo.read(71).await.unwrap().is_none());
    assert_eq!(count(&session, "moderation_actions").await, 0);
    assert_eq!(count(&session, "deleted_messages").await, 0);
}

#[tokio::test]
async fn transaction_handle_runs_statements_on_its_connection() {
    let session = open_store_in_memory().unwrap();

    let mut tx = session.begin_transaction().await.unwrap();
    tx.with_connection(|conn| {
        conn.execute(
            "INSERT INTO guild_users (guild_id, user_id, username, discriminator, nickname)
             VALUES (1, 2, 'mod', '0001', NULL);",
            [],
        )
    })
    .await
    .unwrap();
    let autocommit = tx
        .with_connection(|conn| Ok::<_, rusqlite::Error>(conn.is_autocommit()))
        .await
        .unwrap();
    assert!(!autocommit);
    tx.rollback().await.unwrap();

    assert_eq!(count(&session, "guild_users").await, 0);
}

#[tokio::test]
async fn closed_session_rejects_new_transactions() {
    let session = open_store_in_memory().unwrap();
    let repo = SqliteDeletedMessageRepository::new(session.clone(), Default::default());

    session.close();
    assert!(session.is_closed());

    assert!(matches!(
        session.begin_transaction().await,
        Err(DbError::SessionClosed)
    ));
    assert!(matches!(
        repo.begin_create_transaction().await,
        Err(RepoError::Db(DbError::SessionClosed))
    ));

    // Bare calls keep working.
    repo.create(&payload(15)).await.unwrap();
    assert!(repo.read(15).await.unwrap().is_some());
}

#[tokio::test]
async fn close_rejects_waiting_begin_but_lets_live_transaction_finish() {
    let session = open_store_in_memory().unwrap();
    let repo = SqliteDeletedMessageRepository::new(session.clone(), Default::default());

    let mut tx = repo.begin_create_transaction().await.unwrap();
    let waiter = {
        let session = session.clone();
        tokio::spawn(async move { session.begin_transaction().await.map(|_| ()) })
    };
    tokio::task::yield_now().await;

    session.close();
    repo.create_in(&mut tx, &payload(16)).await.unwrap();
    tx.commit().await.unwrap();

    let waited = timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap();
    assert!(matches!(waited, Err(DbError::SessionClosed)));
    assert!(repo.read(16).await.unwrap().is_some());
}
