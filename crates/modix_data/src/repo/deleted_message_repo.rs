//! Deleted message repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Record moderator-deleted messages together with the moderation action
//!   that removed them.
//! - Notify moderation action observers once both records are stored.
//!
//! # Invariants
//! - Creation order is fixed: insert action and message, patch the action's
//!   back-link with the message id, then notify observers.
//! - The action/message inserts are atomic (one savepoint). The back-link
//!   patch is a separate write; without an explicit transaction a failure
//!   between the two leaves an action whose `deleted_message_id` is unset.
//! - Observer failures surface as `RepoError::Notify` after the writes
//!   committed.
//! - `create` never joins another caller's transaction; it waits while one
//!   is live. Writes that belong to a transaction go through `create_in`.

use async_trait::async_trait;
use chrono::Utc;
use log::{error, info, warn};
use rusqlite::{params, Connection, Row};
use std::time::Instant;

use crate::db::{StoreScope, StoreSession, StoreTransaction};
use crate::events::ModerationActionEventHandlers;
use crate::model::moderation::{
    DeletedMessageCreationData, DeletedMessageEntity, ModerationActionCreationData,
};
use crate::model::{snowflake_from_db, snowflake_to_db};
use crate::repo::moderation_action_repo::{parse_moderation_action_row, ACTION_COLUMNS_SQL};
use crate::repo::{RepoError, RepoResult};

const DELETED_MESSAGE_SELECT_SQL: &str = "
    m.message_id AS message_id,
    m.guild_id AS guild_id,
    m.channel_id AS channel_id,
    m.author_id AS author_id,
    m.content AS content,
    m.reason AS reason,
    m.create_action_id AS create_action_id";

/// Repository interface for deleted messages.
#[async_trait]
pub trait DeletedMessageRepository {
    /// Opens a transaction for batching creations through [`Self::create_in`].
    ///
    /// Completes once no other transaction is live on the session.
    async fn begin_create_transaction(&self) -> RepoResult<StoreTransaction>;

    /// Stores a deleted message and its `MessageDeleted` action, then
    /// notifies observers.
    ///
    /// The insert and the back-link patch commit separately.
    async fn create(&self, data: &DeletedMessageCreationData) -> RepoResult<()>;

    /// Same as [`Self::create`], with both writes inside `tx`.
    ///
    /// Observers are notified before `tx` is committed.
    async fn create_in(
        &self,
        tx: &mut StoreTransaction,
        data: &DeletedMessageCreationData,
    ) -> RepoResult<()>;

    /// Loads one deleted message with its create action.
    async fn read(&self, message_id: u64) -> RepoResult<Option<DeletedMessageEntity>>;

    /// Lists a guild's deleted messages, most recently deleted first.
    async fn search_by_guild(&self, guild_id: u64) -> RepoResult<Vec<DeletedMessageEntity>>;
}

/// SQLite-backed deleted message repository.
pub struct SqliteDeletedMessageRepository {
    session: StoreSession,
    handlers: ModerationActionEventHandlers,
}

impl SqliteDeletedMessageRepository {
    pub fn new(session: StoreSession, handlers: ModerationActionEventHandlers) -> Self {
        Self { session, handlers }
    }

    /// Observers notified by [`DeletedMessageRepository::create`].
    pub fn handlers(&self) -> &ModerationActionEventHandlers {
        &self.handlers
    }

    async fn create_within(
        &self,
        mut scope: StoreScope<'_>,
        data: &DeletedMessageCreationData,
    ) -> RepoResult<()> {
        let started_at = Instant::now();

        if let Err(err) = data.validate() {
            warn!(
                "event=deleted_message_create module=repo status=rejected error_code=invalid_argument field={}",
                err.field
            );
            return Err(err.into());
        }

        // Held in memory until both writes succeed.
        let mut entity = data.to_entity(Utc::now());

        let action_id = scope
            .with_connection(|conn| insert_message_with_action(conn, &entity))
            .await
            .map_err(|err| {
                error!(
                    "event=deleted_message_create module=repo status=error step=insert message_id={} error={}",
                    entity.message_id, err
                );
                err
            })?;
        entity.create_action_id = action_id;
        entity.create_action.id = action_id;

        scope
            .with_connection(|conn| link_action_to_message(conn, action_id, entity.message_id))
            .await
            .map_err(|err| {
                error!(
                    "event=deleted_message_create module=repo status=error step=link message_id={} action_id={} error={}",
                    entity.message_id, action_id, err
                );
                err
            })?;
        entity.create_action.deleted_message_id = Some(entity.message_id);

        let snapshot = ModerationActionCreationData::from_entity(&entity.create_action);
        self.handlers
            .notify(action_id, &snapshot)
            .await
            .map_err(|source| RepoError::Notify {
                moderation_action_id: action_id,
                source,
            })?;

        info!(
            "event=deleted_message_create module=repo status=ok message_id={} action_id={} guild_id={} in_transaction={} handlers={} duration_ms={}",
            entity.message_id,
            action_id,
            entity.guild_id,
            scope.in_transaction(),
            self.handlers.len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }
}

#[async_trait]
impl DeletedMessageRepository for SqliteDeletedMessageRepository {
    async fn begin_create_transaction(&self) -> RepoResult<StoreTransaction> {
        Ok(self.session.begin_transaction().await?)
    }

    async fn create(&self, data: &DeletedMessageCreationData) -> RepoResult<()> {
        self.create_within(StoreScope::Session(&self.session), data)
            .await
    }

    async fn create_in(
        &self,
        tx: &mut StoreTransaction,
        data: &DeletedMessageCreationData,
    ) -> RepoResult<()> {
        self.create_within(StoreScope::Transaction(tx), data).await
    }

    async fn read(&self, message_id: u64) -> RepoResult<Option<DeletedMessageEntity>> {
        self.session
            .with_connection(|conn| -> RepoResult<Option<DeletedMessageEntity>> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DELETED_MESSAGE_SELECT_SQL}, {ACTION_COLUMNS_SQL}
                     FROM deleted_messages m
                     JOIN moderation_actions a ON a.id = m.create_action_id
                     WHERE m.message_id = ?1;"
                ))?;
                let mut rows = stmt.query(params![snowflake_to_db(message_id)])?;
                match rows.next()? {
                    Some(row) => Ok(Some(parse_deleted_message_row(row)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn search_by_guild(&self, guild_id: u64) -> RepoResult<Vec<DeletedMessageEntity>> {
        self.session
            .with_connection(|conn| -> RepoResult<Vec<DeletedMessageEntity>> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DELETED_MESSAGE_SELECT_SQL}, {ACTION_COLUMNS_SQL}
                     FROM deleted_messages m
                     JOIN moderation_actions a ON a.id = m.create_action_id
                     WHERE m.guild_id = ?1
                     ORDER BY a.id DESC;"
                ))?;
                let mut rows = stmt.query(params![snowflake_to_db(guild_id)])?;
                let mut messages = Vec::new();
                while let Some(row) = rows.next()? {
                    messages.push(parse_deleted_message_row(row)?);
                }
                Ok(messages)
            })
            .await
    }
}

/// Inserts the action, then the message referencing it, in one savepoint.
///
/// Returns the store-generated action id.
fn insert_message_with_action(
    conn: &mut Connection,
    entity: &DeletedMessageEntity,
) -> RepoResult<i64> {
    let action = &entity.create_action;
    let sp = conn.savepoint()?;

    sp.execute(
        "INSERT INTO moderation_actions (
            guild_id,
            type,
            created,
            created_by_id,
            deleted_message_id
        ) VALUES (?1, ?2, ?3, ?4, NULL);",
        params![
            snowflake_to_db(action.guild_id),
            action.kind.as_str(),
            action.created,
            snowflake_to_db(action.created_by_id),
        ],
    )?;
    let action_id = sp.last_insert_rowid();

    sp.execute(
        "INSERT INTO deleted_messages (
            message_id,
            guild_id,
            channel_id,
            author_id,
            content,
            reason,
            create_action_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            snowflake_to_db(entity.message_id),
            snowflake_to_db(entity.guild_id),
            snowflake_to_db(entity.channel_id),
            snowflake_to_db(entity.author_id),
            entity.content.as_str(),
            entity.reason.as_str(),
            action_id,
        ],
    )?;

    sp.commit()?;
    Ok(action_id)
}

fn link_action_to_message(conn: &mut Connection, action_id: i64, message_id: u64) -> RepoResult<()> {
    let changed = conn.execute(
        "UPDATE moderation_actions
         SET deleted_message_id = ?1
         WHERE id = ?2;",
        params![snowflake_to_db(message_id), action_id],
    )?;

    if changed == 0 {
        return Err(RepoError::not_found("moderation action", action_id));
    }
    Ok(())
}

fn parse_deleted_message_row(row: &Row<'_>) -> RepoResult<DeletedMessageEntity> {
    Ok(DeletedMessageEntity {
        message_id: snowflake_from_db(row.get("message_id")?),
        guild_id: snowflake_from_db(row.get("guild_id")?),
        channel_id: snowflake_from_db(row.get("channel_id")?),
        author_id: snowflake_from_db(row.get("author_id")?),
        content: row.get("content")?,
        reason: row.get("reason")?,
        create_action_id: row.get("create_action_id")?,
        create_action: parse_moderation_action_row(row)?,
    })
}
