//! Guild user and role records, and the brief views other summaries embed.

use serde::Serialize;

/// Stored guild membership row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildUserEntity {
    pub guild_id: u64,
    pub user_id: u64,
    pub username: String,
    pub discriminator: String,
    /// Guild-specific nickname, if one is set.
    pub nickname: Option<String>,
}

/// Stored guild role row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildRoleEntity {
    pub role_id: u64,
    pub guild_id: u64,
    pub name: String,
    pub position: i32,
}

/// Minimal user view for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuildUserBrief {
    pub id: u64,
    pub username: String,
    pub discriminator: String,
    pub nickname: Option<String>,
}

impl GuildUserBrief {
    pub fn from_entity(entity: &GuildUserEntity) -> Self {
        Self {
            id: entity.user_id,
            username: entity.username.clone(),
            discriminator: entity.discriminator.clone(),
            nickname: entity.nickname.clone(),
        }
    }

    /// Nickname when set, otherwise `username#discriminator`.
    pub fn display_name(&self) -> String {
        match &self.nickname {
            Some(nickname) => nickname.clone(),
            None => format!("{}#{}", self.username, self.discriminator),
        }
    }
}

/// Minimal role view for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuildRoleBrief {
    pub id: u64,
    pub name: String,
    pub position: i32,
}

impl GuildRoleBrief {
    pub fn from_entity(entity: &GuildRoleEntity) -> Self {
        Self {
            id: entity.role_id,
            name: entity.name.clone(),
            position: entity.position,
        }
    }
}
