//! Moderation action reads.
//!
//! Moderation actions are only written as part of higher-level records (see
//! `deleted_message_repo`); this module reads them back.

use async_trait::async_trait;
use rusqlite::{params, Row};

use crate::db::StoreSession;
use crate::model::moderation::ModerationActionEntity;
use crate::model::{snowflake_from_db, snowflake_to_db};
use crate::repo::RepoResult;

/// Column list shared by every query that loads a moderation action.
///
/// Queries joining `moderation_actions` under the alias `a` reuse it so one
/// row parser serves all of them.
pub(crate) const ACTION_COLUMNS_SQL: &str = "
    a.id AS action_id,
    a.guild_id AS action_guild_id,
    a.type AS action_type,
    a.created AS action_created,
    a.created_by_id AS action_created_by_id,
    a.deleted_message_id AS action_deleted_message_id";

#[async_trait]
pub trait ModerationActionRepository {
    async fn read(&self, moderation_action_id: i64) -> RepoResult<Option<ModerationActionEntity>>;
    async fn count_by_guild(&self, guild_id: u64) -> RepoResult<u64>;
}

pub struct SqliteModerationActionRepository {
    session: StoreSession,
}

impl SqliteModerationActionRepository {
    pub fn new(session: StoreSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl ModerationActionRepository for SqliteModerationActionRepository {
    async fn read(&self, moderation_action_id: i64) -> RepoResult<Option<ModerationActionEntity>> {
        self.session
            .with_connection(|conn| -> RepoResult<Option<ModerationActionEntity>> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ACTION_COLUMNS_SQL}
                     FROM moderation_actions a
                     WHERE a.id = ?1;"
                ))?;
                let mut rows = stmt.query(params![moderation_action_id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(parse_moderation_action_row(row)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn count_by_guild(&self, guild_id: u64) -> RepoResult<u64> {
        self.session
            .with_connection(|conn| -> RepoResult<u64> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM moderation_actions WHERE guild_id = ?1;",
                    params![snowflake_to_db(guild_id)],
                    |row| row.get(0),
                )?;
                Ok(count.max(0) as u64)
            })
            .await
    }
}

pub(crate) fn parse_moderation_action_row(row: &Row<'_>) -> RepoResult<ModerationActionEntity> {
    let type_text: String = row.get("action_type")?;
    Ok(ModerationActionEntity {
        id: row.get("action_id")?,
        guild_id: snowflake_from_db(row.get("action_guild_id")?),
        kind: type_text.parse()?,
        created: row.get("action_created")?,
        created_by_id: snowflake_from_db(row.get("action_created_by_id")?),
        deleted_message_id: row
            .get::<_, Option<i64>>("action_deleted_message_id")?
            .map(snowflake_from_db),
    })
}
