//! Promotion campaign records and their summary projection.
//!
//! # Responsibility
//! - Define campaigns, comments and the actions that record their history.
//! - Project a loaded campaign graph into `PromotionCampaignSummary`.
//!
//! # Invariants
//! - `PromotionCampaignSummary::comment_counts` only holds sentiments that
//!   occur at least once; absent sentiments are omitted, never zero-filled.
//! - Missing optional references project to `None`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use super::guild::{GuildRoleBrief, GuildRoleEntity, GuildUserBrief, GuildUserEntity};
use super::moderation::CreationDataError;
use super::UnknownEnumerationText;

/// Event recorded against a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PromotionActionType {
    CampaignCreated,
    CommentCreated,
    CampaignClosed,
}

impl PromotionActionType {
    pub const ALL: [Self; 3] = [
        Self::CampaignCreated,
        Self::CommentCreated,
        Self::CampaignClosed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CampaignCreated => "campaign_created",
            Self::CommentCreated => "comment_created",
            Self::CampaignClosed => "campaign_closed",
        }
    }
}

impl FromStr for PromotionActionType {
    type Err = UnknownEnumerationText;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "campaign_created" => Ok(Self::CampaignCreated),
            "comment_created" => Ok(Self::CommentCreated),
            "campaign_closed" => Ok(Self::CampaignClosed),
            other => Err(UnknownEnumerationText::new("PromotionActionType", other)),
        }
    }
}

impl Display for PromotionActionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a closed campaign ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PromotionCampaignOutcome {
    Accepted,
    Rejected,
    /// Closed without a decision, e.g. the subject left the guild.
    Failed,
}

impl PromotionCampaignOutcome {
    pub const ALL: [Self; 3] = [Self::Accepted, Self::Rejected, Self::Failed];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for PromotionCampaignOutcome {
    type Err = UnknownEnumerationText;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownEnumerationText::new(
                "PromotionCampaignOutcome",
                other,
            )),
        }
    }
}

impl Display for PromotionCampaignOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A commenter's stance on a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PromotionSentiment {
    Approve,
    Oppose,
    Neutral,
}

impl PromotionSentiment {
    pub const ALL: [Self; 3] = [Self::Approve, Self::Oppose, Self::Neutral];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Oppose => "oppose",
            Self::Neutral => "neutral",
        }
    }
}

impl FromStr for PromotionSentiment {
    type Err = UnknownEnumerationText;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "approve" => Ok(Self::Approve),
            "oppose" => Ok(Self::Oppose),
            "neutral" => Ok(Self::Neutral),
            other => Err(UnknownEnumerationText::new("PromotionSentiment", other)),
        }
    }
}

impl Display for PromotionSentiment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored promotion action row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionActionEntity {
    pub id: i64,
    pub guild_id: u64,
    pub kind: PromotionActionType,
    pub created: DateTime<Utc>,
    pub created_by_id: u64,
    pub campaign_id: Option<i64>,
    pub comment_id: Option<i64>,
}

/// Stored promotion comment row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionCommentEntity {
    pub id: i64,
    pub campaign_id: i64,
    pub sentiment: PromotionSentiment,
    pub content: String,
    pub create_action_id: i64,
}

/// A campaign with its relationships loaded.
///
/// Optional relationships are `None` either because the row has no such
/// reference or because the caller did not load it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionCampaignEntity {
    pub id: i64,
    pub guild_id: u64,
    pub subject: GuildUserEntity,
    pub target_role: Option<GuildRoleEntity>,
    pub create_action: Option<PromotionActionEntity>,
    pub outcome: Option<PromotionCampaignOutcome>,
    pub close_action: Option<PromotionActionEntity>,
    pub comments: Vec<PromotionCommentEntity>,
}

/// Payload for opening a campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionCampaignCreationData {
    pub guild_id: u64,
    pub subject_id: u64,
    pub target_role_id: u64,
    pub created_by_id: u64,
}

impl PromotionCampaignCreationData {
    pub fn validate(&self) -> Result<(), CreationDataError> {
        let ids = [
            ("guild_id", self.guild_id),
            ("subject_id", self.subject_id),
            ("target_role_id", self.target_role_id),
            ("created_by_id", self.created_by_id),
        ];
        for (field, value) in ids {
            if value == 0 {
                return Err(CreationDataError::missing(field));
            }
        }
        Ok(())
    }
}

/// Payload for commenting on a campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionCommentCreationData {
    pub campaign_id: i64,
    pub sentiment: PromotionSentiment,
    pub content: String,
    pub created_by_id: u64,
}

impl PromotionCommentCreationData {
    pub fn validate(&self) -> Result<(), CreationDataError> {
        if self.campaign_id <= 0 {
            return Err(CreationDataError::missing("campaign_id"));
        }
        if self.created_by_id == 0 {
            return Err(CreationDataError::missing("created_by_id"));
        }
        if self.content.trim().is_empty() {
            return Err(CreationDataError {
                field: "content",
                reason: "comment content cannot be blank",
            });
        }
        Ok(())
    }
}

/// Minimal promotion action view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionActionBrief {
    pub id: i64,
    pub kind: PromotionActionType,
    pub created: DateTime<Utc>,
    pub created_by_id: u64,
}

impl PromotionActionBrief {
    pub fn from_entity(entity: &PromotionActionEntity) -> Self {
        Self {
            id: entity.id,
            kind: entity.kind,
            created: entity.created,
            created_by_id: entity.created_by_id,
        }
    }
}

/// Read-only, flattened view of a campaign. Computed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionCampaignSummary {
    pub id: i64,
    pub guild_id: u64,
    pub subject: GuildUserBrief,
    pub target_role: Option<GuildRoleBrief>,
    pub create_action: Option<PromotionActionBrief>,
    pub outcome: Option<PromotionCampaignOutcome>,
    pub close_action: Option<PromotionActionBrief>,
    /// Number of comments per sentiment that occurs on the campaign.
    pub comment_counts: BTreeMap<PromotionSentiment, u32>,
}

impl PromotionCampaignSummary {
    /// Projects an already-loaded campaign graph.
    pub fn from_entity(entity: &PromotionCampaignEntity) -> Self {
        Self {
            id: entity.id,
            guild_id: entity.guild_id,
            subject: GuildUserBrief::from_entity(&entity.subject),
            target_role: entity.target_role.as_ref().map(GuildRoleBrief::from_entity),
            create_action: entity
                .create_action
                .as_ref()
                .map(PromotionActionBrief::from_entity),
            outcome: entity.outcome,
            close_action: entity
                .close_action
                .as_ref()
                .map(PromotionActionBrief::from_entity),
            comment_counts: count_by_sentiment(
                entity.comments.iter().map(|comment| comment.sentiment),
            ),
        }
    }

    /// Total comments across all sentiments.
    pub fn total_comments(&self) -> u32 {
        self.comment_counts.values().sum()
    }
}

/// Groups sentiments into per-sentiment counts.
pub fn count_by_sentiment(
    sentiments: impl IntoIterator<Item = PromotionSentiment>,
) -> BTreeMap<PromotionSentiment, u32> {
    let mut counts = BTreeMap::new();
    for sentiment in sentiments {
        *counts.entry(sentiment).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::{
        count_by_sentiment, PromotionActionType, PromotionCampaignOutcome,
        PromotionCommentCreationData, PromotionSentiment,
    };

    #[test]
    fn enum_texts_round_trip_for_every_member() {
        for kind in PromotionActionType::ALL {
            assert_eq!(kind.as_str().parse::<PromotionActionType>(), Ok(kind));
        }
        for outcome in PromotionCampaignOutcome::ALL {
            assert_eq!(
                outcome.as_str().parse::<PromotionCampaignOutcome>(),
                Ok(outcome)
            );
        }
        for sentiment in PromotionSentiment::ALL {
            assert_eq!(sentiment.as_str().parse::<PromotionSentiment>(), Ok(sentiment));
        }
    }

    #[test]
    fn unknown_outcome_text_fails_loudly() {
        let err = "abandoned"
            .parse::<PromotionCampaignOutcome>()
            .expect_err("unknown outcome must not parse");
        assert_eq!(err.enumeration, "PromotionCampaignOutcome");
    }

    #[test]
    fn count_by_sentiment_omits_absent_sentiments() {
        let counts = count_by_sentiment([
            PromotionSentiment::Approve,
            PromotionSentiment::Oppose,
            PromotionSentiment::Approve,
        ]);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[&PromotionSentiment::Approve], 2);
        assert_eq!(counts[&PromotionSentiment::Oppose], 1);
        assert!(!counts.contains_key(&PromotionSentiment::Neutral));
    }

    #[test]
    fn blank_comment_is_rejected() {
        let data = PromotionCommentCreationData {
            campaign_id: 1,
            sentiment: PromotionSentiment::Neutral,
            content: "   ".to_string(),
            created_by_id: 9,
        };
        let err = data.validate().expect_err("blank content must fail");
        assert_eq!(err.field, "content");
    }
}
