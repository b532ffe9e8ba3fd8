use modix_data::db::migrations::latest_version;
use modix_data::db::{open_store, open_store_from_config, open_store_in_memory, DbError};
use modix_data::{StoreConfig, StoreSession};
use rusqlite::Connection;
use std::time::Duration;

#[tokio::test]
async fn open_store_in_memory_applies_all_migrations() {
    let session = open_store_in_memory().unwrap();

    assert_eq!(schema_version(&session).await, latest_version());
    for table in [
        "moderation_actions",
        "deleted_messages",
        "guild_users",
        "guild_roles",
        "promotion_actions",
        "promotion_campaigns",
        "promotion_comments",
    ] {
        assert_table_exists(&session, table).await;
    }
}

#[tokio::test]
async fn opened_store_enforces_foreign_keys() {
    let session = open_store_in_memory().unwrap();

    let enabled: i64 = session
        .with_connection(|conn| conn.query_row("PRAGMA foreign_keys;", [], |row| row.get(0)))
        .await
        .unwrap();
    assert_eq!(enabled, 1);
}

#[tokio::test]
async fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("modix.db");

    let first = open_store(&path).unwrap();
    assert_eq!(schema_version(&first).await, latest_version());
    drop(first);

    let second = open_store(&path).unwrap();
    assert_eq!(schema_version(&second).await, latest_version());
    assert_table_exists(&second, "deleted_messages").await;
}

#[tokio::test]
async fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_store(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn open_store_from_config_uses_configured_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("configured.db");
    let config = StoreConfig {
        database_path: Some(path.clone()),
        busy_timeout: Duration::from_millis(250),
        ..StoreConfig::default()
    };

    let session = open_store_from_config(&config).unwrap();
    assert_eq!(schema_version(&session).await, latest_version());
    assert!(path.exists());
}

async fn schema_version(session: &StoreSession) -> u32 {
    session
        .with_connection(|conn| conn.query_row("PRAGMA user_version;", [], |row| row.get(0)))
        .await
        .unwrap()
}

async fn assert_table_exists(session: &StoreSession, table_name: &str) {
    let exists: i64 = session
        .with_connection(|conn| {
            conn.query_row(
                "SELECT EXISTS(
                    SELECT 1
                    FROM sqlite_master
                    WHERE type = 'table' AND name = ?1
                );",
                [table_name],
                |row| row.get(0),
            )
        })
        .await
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
