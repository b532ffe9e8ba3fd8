//! Guild user and role storage backing the brief projections.

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};

use crate::db::StoreSession;
use crate::model::guild::{GuildRoleBrief, GuildRoleEntity, GuildUserBrief, GuildUserEntity};
use crate::model::{snowflake_from_db, snowflake_to_db};
use crate::repo::RepoResult;

#[async_trait]
pub trait GuildRepository {
    /// Inserts a guild member or refreshes its names.
    async fn upsert_user(&self, user: &GuildUserEntity) -> RepoResult<()>;
    /// Inserts a role or refreshes its name and position.
    async fn upsert_role(&self, role: &GuildRoleEntity) -> RepoResult<()>;
    async fn read_user_brief(&self, guild_id: u64, user_id: u64) -> RepoResult<Option<GuildUserBrief>>;
    async fn read_role_brief(&self, role_id: u64) -> RepoResult<Option<GuildRoleBrief>>;
}

pub struct SqliteGuildRepository {
    session: StoreSession,
}

impl SqliteGuildRepository {
    pub fn new(session: StoreSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl GuildRepository for SqliteGuildRepository {
    async fn upsert_user(&self, user: &GuildUserEntity) -> RepoResult<()> {
        self.session
            .with_connection(|conn| -> RepoResult<()> {
                conn.execute(
                    "INSERT INTO guild_users (guild_id, user_id, username, discriminator, nickname)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (guild_id, user_id) DO UPDATE SET
                        username = excluded.username,
                        discriminator = excluded.discriminator,
                        nickname = excluded.nickname;",
                    params![
                        snowflake_to_db(user.guild_id),
                        snowflake_to_db(user.user_id),
                        user.username.as_str(),
                        user.discriminator.as_str(),
                        user.nickname.as_deref(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn upsert_role(&self, role: &GuildRoleEntity) -> RepoResult<()> {
        self.session
            .with_connection(|conn| -> RepoResult<()> {
                conn.execute(
                    "INSERT INTO guild_roles (role_id, guild_id, name, position)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (role_id) DO UPDATE SET
                        name = excluded.name,
                        position = excluded.position;",
                    params![
                        snowflake_to_db(role.role_id),
                        snowflake_to_db(role.guild_id),
                        role.name.as_str(),
                        role.position,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn read_user_brief(&self, guild_id: u64, user_id: u64) -> RepoResult<Option<GuildUserBrief>> {
        self.session
            .with_connection(|conn| -> RepoResult<Option<GuildUserBrief>> {
                let brief = conn
                    .query_row(
                        "SELECT user_id, username, discriminator, nickname
                         FROM guild_users
                         WHERE guild_id = ?1 AND user_id = ?2;",
                        params![snowflake_to_db(guild_id), snowflake_to_db(user_id)],
                        |row| {
                            Ok(GuildUserBrief {
                                id: snowflake_from_db(row.get(0)?),
                                username: row.get(1)?,
                                discriminator: row.get(2)?,
                                nickname: row.get(3)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(brief)
            })
            .await
    }

    async fn read_role_brief(&self, role_id: u64) -> RepoResult<Option<GuildRoleBrief>> {
        self.session
            .with_connection(|conn| -> RepoResult<Option<GuildRoleBrief>> {
                let brief = conn
                    .query_row(
                        "SELECT role_id, name, position FROM guild_roles WHERE role_id = ?1;",
                        params![snowflake_to_db(role_id)],
                        |row| {
                            Ok(GuildRoleBrief {
                                id: snowflake_from_db(row.get(0)?),
                                name: row.get(1)?,
                                position: row.get(2)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(brief)
            })
            .await
    }
}
