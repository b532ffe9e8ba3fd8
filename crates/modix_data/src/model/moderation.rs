//! Moderation action and deleted message records.
//!
//! # Responsibility
//! - Define the stored shape of moderation actions and deleted messages.
//! - Validate deleted-message creation payloads before any store access.
//! - Produce the observer snapshot of a freshly created moderation action.
//!
//! # Invariants
//! - A deleted message always owns exactly one `MessageDeleted` action.
//! - After creation, `create_action.deleted_message_id == Some(message_id)`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

use super::UnknownEnumerationText;

/// Kind of disciplinary action a moderation record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ModerationActionType {
    Note,
    Warn,
    Mute,
    Deafen,
    Ban,
    /// A message was removed by a moderator.
    MessageDeleted,
}

impl ModerationActionType {
    pub const ALL: [Self; 6] = [
        Self::Note,
        Self::Warn,
        Self::Mute,
        Self::Deafen,
        Self::Ban,
        Self::MessageDeleted,
    ];

    /// Storage text for this member.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Warn => "warn",
            Self::Mute => "mute",
            Self::Deafen => "deafen",
            Self::Ban => "ban",
            Self::MessageDeleted => "message_deleted",
        }
    }
}

impl FromStr for ModerationActionType {
    type Err = UnknownEnumerationText;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "note" => Ok(Self::Note),
            "warn" => Ok(Self::Warn),
            "mute" => Ok(Self::Mute),
            "deafen" => Ok(Self::Deafen),
            "ban" => Ok(Self::Ban),
            "message_deleted" => Ok(Self::MessageDeleted),
            other => Err(UnknownEnumerationText::new("ModerationActionType", other)),
        }
    }
}

impl Display for ModerationActionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored moderation action row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationActionEntity {
    /// Store-generated id. Zero until the row has been inserted.
    pub id: i64,
    pub guild_id: u64,
    pub kind: ModerationActionType,
    pub created: DateTime<Utc>,
    pub created_by_id: u64,
    /// Back-link to the deleted message this action removed.
    pub deleted_message_id: Option<u64>,
}

/// Stored deleted message row together with its owned create action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedMessageEntity {
    /// Caller-supplied snowflake, primary key.
    pub message_id: u64,
    pub guild_id: u64,
    pub channel_id: u64,
    pub author_id: u64,
    pub content: String,
    pub reason: String,
    pub create_action_id: i64,
    pub create_action: ModerationActionEntity,
}

/// Validation failure for a creation payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid `{field}`: {reason}")]
pub struct CreationDataError {
    pub field: &'static str,
    pub reason: &'static str,
}

impl CreationDataError {
    pub(crate) fn missing(field: &'static str) -> Self {
        Self {
            field,
            reason: "value is required",
        }
    }
}

/// Payload for recording a moderator-deleted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedMessageCreationData {
    pub message_id: u64,
    pub channel_id: u64,
    pub guild_id: u64,
    pub author_id: u64,
    pub content: String,
    /// Moderator who deleted the message.
    pub created_by_id: u64,
    pub reason: String,
}

impl DeletedMessageCreationData {
    /// Rejects payloads with unset snowflakes.
    ///
    /// Zero is never a valid snowflake, so an unset id means the caller did
    /// not supply the field.
    pub fn validate(&self) -> Result<(), CreationDataError> {
        let ids = [
            ("message_id", self.message_id),
            ("channel_id", self.channel_id),
            ("guild_id", self.guild_id),
            ("author_id", self.author_id),
            ("created_by_id", self.created_by_id),
        ];
        for (field, value) in ids {
            if value == 0 {
                return Err(CreationDataError::missing(field));
            }
        }
        Ok(())
    }

    /// Materializes the unsaved message/action pair.
    ///
    /// The action id is zero and its back-link is unset; both are filled in
    /// by the repository once the store has assigned the id.
    pub fn to_entity(&self, created: DateTime<Utc>) -> DeletedMessageEntity {
        DeletedMessageEntity {
            message_id: self.message_id,
            guild_id: self.guild_id,
            channel_id: self.channel_id,
            author_id: self.author_id,
            content: self.content.clone(),
            reason: self.reason.clone(),
            create_action_id: 0,
            create_action: ModerationActionEntity {
                id: 0,
                guild_id: self.guild_id,
                kind: ModerationActionType::MessageDeleted,
                created,
                created_by_id: self.created_by_id,
                deleted_message_id: None,
            },
        }
    }
}

/// Snapshot of a new moderation action handed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModerationActionCreationData {
    pub guild_id: u64,
    pub kind: ModerationActionType,
    pub created: DateTime<Utc>,
    pub created_by_id: u64,
}

impl ModerationActionCreationData {
    pub fn from_entity(entity: &ModerationActionEntity) -> Self {
        Self {
            guild_id: entity.guild_id,
            kind: entity.kind,
            created: entity.created,
            created_by_id: entity.created_by_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DeletedMessageCreationData, ModerationActionType};
    use chrono::Utc;

    fn payload() -> DeletedMessageCreationData {
        DeletedMessageCreationData {
            message_id: 11,
            channel_id: 22,
            guild_id: 33,
            author_id: 44,
            content: "spam".to_string(),
            created_by_id: 55,
            reason: "advertising".to_string(),
        }
    }

    #[test]
    fn action_type_text_round_trips_for_every_member() {
        for kind in ModerationActionType::ALL {
            assert_eq!(kind.as_str().parse::<ModerationActionType>(), Ok(kind));
        }
    }

    #[test]
    fn unknown_action_type_text_is_rejected() {
        let err = "Warning"
            .parse::<ModerationActionType>()
            .expect_err("case-mismatched text must not parse");
        assert_eq!(err.enumeration, "ModerationActionType");
        assert_eq!(err.value, "Warning");
    }

    #[test]
    fn validate_reports_first_missing_id() {
        let mut data = payload();
        assert!(data.validate().is_ok());

        data.author_id = 0;
        let err = data.validate().expect_err("zero author must be rejected");
        assert_eq!(err.field, "author_id");
    }

    #[test]
    fn to_entity_builds_unlinked_message_deleted_action() {
        let now = Utc::now();
        let entity = payload().to_entity(now);

        assert_eq!(entity.message_id, 11);
        assert_eq!(entity.create_action.kind, ModerationActionType::MessageDeleted);
        assert_eq!(entity.create_action.guild_id, 33);
        assert_eq!(entity.create_action.created_by_id, 55);
        assert_eq!(entity.create_action.created, now);
        assert_eq!(entity.create_action.id, 0);
        assert!(entity.create_action.deleted_message_id.is_none());
    }
}
