//! Promotion campaign repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Open and close campaigns and record comments, each with the promotion
//!   action that documents it.
//! - Serve campaign summaries computed inside the store.
//!
//! # Invariants
//! - Campaign and comment creation follow the repository write order: insert
//!   the action, insert the row referencing it, patch the action back-link.
//! - Summaries never load comment bodies; comment counts come from a
//!   `GROUP BY sentiment` query.
//! - Closed campaigns accept neither comments nor a second close.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use crate::db::StoreSession;
use crate::model::guild::{GuildRoleEntity, GuildUserEntity};
use crate::model::moderation::CreationDataError;
use crate::model::promotions::{
    PromotionActionEntity, PromotionActionType, PromotionCampaignCreationData,
    PromotionCampaignEntity, PromotionCampaignOutcome, PromotionCampaignSummary,
    PromotionCommentCreationData, PromotionCommentEntity, PromotionSentiment,
};
use crate::model::{snowflake_from_db, snowflake_to_db};
use crate::repo::{RepoError, RepoResult};

#[async_trait]
pub trait PromotionCampaignRepository {
    /// Opens a campaign and returns its generated id.
    async fn create(&self, data: &PromotionCampaignCreationData) -> RepoResult<i64>;
    /// Adds a comment to an open campaign and returns the comment id.
    async fn add_comment(&self, data: &PromotionCommentCreationData) -> RepoResult<i64>;
    /// Records the outcome of an open campaign.
    async fn close(
        &self,
        campaign_id: i64,
        outcome: PromotionCampaignOutcome,
        closed_by_id: u64,
    ) -> RepoResult<()>;
    /// Loads the full campaign graph, comments included.
    async fn read(&self, campaign_id: i64) -> RepoResult<Option<PromotionCampaignEntity>>;
    async fn read_summary(&self, campaign_id: i64) -> RepoResult<Option<PromotionCampaignSummary>>;
    /// Summaries of every campaign in a guild, oldest first.
    async fn search_summaries(&self, guild_id: u64) -> RepoResult<Vec<PromotionCampaignSummary>>;
}

pub struct SqlitePromotionCampaignRepository {
    session: StoreSession,
}

impl SqlitePromotionCampaignRepository {
    pub fn new(session: StoreSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl PromotionCampaignRepository for SqlitePromotionCampaignRepository {
    async fn create(&self, data: &PromotionCampaignCreationData) -> RepoResult<i64> {
        let started_at = Instant::now();
        if let Err(err) = data.validate() {
            warn!(
                "event=promotion_campaign_create module=repo status=rejected error_code=invalid_argument field={}",
                err.field
            );
            return Err(err.into());
        }

        let created = Utc::now();
        let (action_id, campaign_id) = self
            .session
            .with_connection(|conn| insert_campaign_with_action(conn, data, created))
            .await?;

        self.session
            .with_connection(|conn| link_action(conn, action_id, "campaign_id", campaign_id))
            .await?;

        info!(
            "event=promotion_campaign_create module=repo status=ok campaign_id={} action_id={} guild_id={} duration_ms={}",
            campaign_id,
            action_id,
            data.guild_id,
            started_at.elapsed().as_millis()
        );
        Ok(campaign_id)
    }

    async fn add_comment(&self, data: &PromotionCommentCreationData) -> RepoResult<i64> {
        data.validate()?;

        let created = Utc::now();
        let (action_id, comment_id) = self
            .session
            .with_connection(|conn| insert_comment_with_action(conn, data, created))
            .await?;

        self.session
            .with_connection(|conn| link_action(conn, action_id, "comment_id", comment_id))
            .await?;

        debug!(
            "event=promotion_comment_create module=repo status=ok campaign_id={} comment_id={} sentiment={}",
            data.campaign_id, comment_id, data.sentiment
        );
        Ok(comment_id)
    }

    async fn close(
        &self,
        campaign_id: i64,
        outcome: PromotionCampaignOutcome,
        closed_by_id: u64,
    ) -> RepoResult<()> {
        if closed_by_id == 0 {
            return Err(CreationDataError::missing("closed_by_id").into());
        }

        let created = Utc::now();
        let action_id = self
            .session
            .with_connection(|conn| -> RepoResult<i64> {
                let sp = conn.savepoint()?;
                let guild_id = load_open_campaign_guild(&sp, campaign_id)?;
                let action_id = insert_promotion_action(
                    &sp,
                    guild_id,
                    PromotionActionType::CampaignClosed,
                    created,
                    closed_by_id,
                    Some(campaign_id),
                )?;
                sp.execute(
                    "UPDATE promotion_campaigns
                     SET outcome = ?1, close_action_id = ?2
                     WHERE id = ?3 AND outcome IS NULL;",
                    params![outcome.as_str(), action_id, campaign_id],
                )?;
                sp.commit()?;
                Ok(action_id)
            })
            .await?;

        info!(
            "event=promotion_campaign_close module=repo status=ok campaign_id={} action_id={} outcome={}",
            campaign_id, action_id, outcome
        );
        Ok(())
    }

    async fn read(&self, campaign_id: i64) -> RepoResult<Option<PromotionCampaignEntity>> {
        self.session
            .with_connection(|conn| -> RepoResult<Option<PromotionCampaignEntity>> {
                let Some(mut campaign) = load_campaign_head(conn, campaign_id)? else {
                    return Ok(None);
                };

                let mut stmt = conn.prepare(
                    "SELECT id, campaign_id, sentiment, content, create_action_id
                     FROM promotion_comments
                     WHERE campaign_id = ?1
                     ORDER BY id ASC;",
                )?;
                let mut rows = stmt.query(params![campaign_id])?;
                while let Some(row) = rows.next()? {
                    let sentiment: String = row.get("sentiment")?;
                    campaign.comments.push(PromotionCommentEntity {
                        id: row.get("id")?,
                        campaign_id: row.get("campaign_id")?,
                        sentiment: sentiment.parse()?,
                        content: row.get("content")?,
                        create_action_id: row.get("create_action_id")?,
                    });
                }
                Ok(Some(campaign))
            })
            .await
    }

    async fn read_summary(&self, campaign_id: i64) -> RepoResult<Option<PromotionCampaignSummary>> {
        self.session
            .with_connection(|conn| -> RepoResult<Option<PromotionCampaignSummary>> {
                let Some(head) = load_campaign_head(conn, campaign_id)? else {
                    return Ok(None);
                };

                let mut stmt = conn.prepare(
                    "SELECT sentiment, COUNT(*) AS comment_count
                     FROM promotion_comments
                     WHERE campaign_id = ?1
                     GROUP BY sentiment;",
                )?;
                let mut rows = stmt.query(params![campaign_id])?;
                let mut counts = BTreeMap::new();
                while let Some(row) = rows.next()? {
                    let (sentiment, count) = parse_sentiment_count(row)?;
                    counts.insert(sentiment, count);
                }

                let mut summary = PromotionCampaignSummary::from_entity(&head);
                summary.comment_counts = counts;
                Ok(Some(summary))
            })
            .await
    }

    async fn search_summaries(&self, guild_id: u64) -> RepoResult<Vec<PromotionCampaignSummary>> {
        self.session
            .with_connection(|conn| -> RepoResult<Vec<PromotionCampaignSummary>> {
                let mut counts: HashMap<i64, BTreeMap<PromotionSentiment, u32>> = HashMap::new();
                {
                    let mut stmt = conn.prepare(
                        "SELECT cm.campaign_id AS campaign_id, cm.sentiment AS sentiment, COUNT(*) AS comment_count
                         FROM promotion_comments cm
                         JOIN promotion_campaigns c ON c.id = cm.campaign_id
                         WHERE c.guild_id = ?1
                         GROUP BY cm.campaign_id, cm.sentiment;",
                    )?;
                    let mut rows = stmt.query(params![snowflake_to_db(guild_id)])?;
                    while let Some(row) = rows.next()? {
                        let campaign_id: i64 = row.get("campaign_id")?;
                        let (sentiment, count) = parse_sentiment_count(row)?;
                        counts.entry(campaign_id).or_default().insert(sentiment, count);
                    }
                }

                let mut stmt = conn.prepare(&format!(
                    "{} WHERE c.guild_id = ?1 ORDER BY c.id ASC;",
                    campaign_head_sql()
                ))?;
                let mut rows = stmt.query(params![snowflake_to_db(guild_id)])?;
                let mut summaries = Vec::new();
                while let Some(row) = rows.next()? {
                    let head = parse_campaign_head_row(row)?;
                    let mut summary = PromotionCampaignSummary::from_entity(&head);
                    summary.comment_counts = counts.remove(&head.id).unwrap_or_default();
                    summaries.push(summary);
                }
                Ok(summaries)
            })
            .await
    }
}

fn insert_campaign_with_action(
    conn: &mut Connection,
    data: &PromotionCampaignCreationData,
    created: DateTime<Utc>,
) -> RepoResult<(i64, i64)> {
    let sp = conn.savepoint()?;
    let action_id = insert_promotion_action(
        &sp,
        data.guild_id,
        PromotionActionType::CampaignCreated,
        created,
        data.created_by_id,
        None,
    )?;

    sp.execute(
        "INSERT INTO promotion_campaigns (
            guild_id,
            subject_id,
            target_role_id,
            create_action_id,
            outcome,
            close_action_id
        ) VALUES (?1, ?2, ?3, ?4, NULL, NULL);",
        params![
            snowflake_to_db(data.guild_id),
            snowflake_to_db(data.subject_id),
            snowflake_to_db(data.target_role_id),
            action_id,
        ],
    )?;
    let campaign_id = sp.last_insert_rowid();

    sp.commit()?;
    Ok((action_id, campaign_id))
}

fn insert_comment_with_action(
    conn: &mut Connection,
    data: &PromotionCommentCreationData,
    created: DateTime<Utc>,
) -> RepoResult<(i64, i64)> {
    let sp = conn.savepoint()?;
    let guild_id = load_open_campaign_guild(&sp, data.campaign_id)?;
    let action_id = insert_promotion_action(
        &sp,
        guild_id,
        PromotionActionType::CommentCreated,
        created,
        data.created_by_id,
        Some(data.campaign_id),
    )?;

    sp.execute(
        "INSERT INTO promotion_comments (campaign_id, sentiment, content, create_action_id)
         VALUES (?1, ?2, ?3, ?4);",
        params![
            data.campaign_id,
            data.sentiment.as_str(),
            data.content.as_str(),
            action_id,
        ],
    )?;
    let comment_id = sp.last_insert_rowid();

    sp.commit()?;
    Ok((action_id, comment_id))
}

fn insert_promotion_action(
    conn: &Connection,
    guild_id: u64,
    kind: PromotionActionType,
    created: DateTime<Utc>,
    created_by_id: u64,
    campaign_id: Option<i64>,
) -> RepoResult<i64> {
    conn.execute(
        "INSERT INTO promotion_actions (guild_id, type, created, created_by_id, campaign_id, comment_id)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL);",
        params![
            snowflake_to_db(guild_id),
            kind.as_str(),
            created,
            snowflake_to_db(created_by_id),
            campaign_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Sets one back-link column of a promotion action.
fn link_action(
    conn: &mut Connection,
    action_id: i64,
    column: &'static str,
    target_id: i64,
) -> RepoResult<()> {
    let changed = conn.execute(
        &format!("UPDATE promotion_actions SET {column} = ?1 WHERE id = ?2;"),
        params![target_id, action_id],
    )?;
    if changed == 0 {
        return Err(RepoError::not_found("promotion action", action_id));
    }
    Ok(())
}

/// Returns the campaign's guild, or fails if it is missing or closed.
fn load_open_campaign_guild(conn: &Connection, campaign_id: i64) -> RepoResult<u64> {
    let row = conn
        .query_row(
            "SELECT guild_id, outcome FROM promotion_campaigns WHERE id = ?1;",
            params![campaign_id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?)),
        )
        .optional()?;

    match row {
        None => Err(RepoError::not_found("promotion campaign", campaign_id)),
        Some((_, Some(_))) => Err(RepoError::CampaignClosed(campaign_id)),
        Some((guild_id, None)) => Ok(snowflake_from_db(guild_id)),
    }
}

fn action_columns_sql(alias: &str, prefix: &str) -> String {
    ["id", "guild_id", "type", "created", "created_by_id", "campaign_id", "comment_id"]
        .iter()
        .map(|column| format!("{alias}.{column} AS {prefix}{column}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn campaign_head_sql() -> String {
    format!(
        "SELECT
            c.id AS id,
            c.guild_id AS guild_id,
            c.subject_id AS subject_id,
            c.target_role_id AS target_role_id,
            c.outcome AS outcome,
            u.username AS subject_username,
            u.discriminator AS subject_discriminator,
            u.nickname AS subject_nickname,
            r.guild_id AS role_guild_id,
            r.name AS role_name,
            r.position AS role_position,
            {},
            {}
         FROM promotion_campaigns c
         JOIN guild_users u ON u.guild_id = c.guild_id AND u.user_id = c.subject_id
         LEFT JOIN guild_roles r ON r.role_id = c.target_role_id
         LEFT JOIN promotion_actions ca ON ca.id = c.create_action_id
         LEFT JOIN promotion_actions xa ON xa.id = c.close_action_id",
        action_columns_sql("ca", "create_action_"),
        action_columns_sql("xa", "close_action_"),
    )
}

/// Loads a campaign with its subject, role and actions but no comments.
fn load_campaign_head(conn: &Connection, campaign_id: i64) -> RepoResult<Option<PromotionCampaignEntity>> {
    let mut stmt = conn.prepare(&format!("{} WHERE c.id = ?1;", campaign_head_sql()))?;
    let mut rows = stmt.query(params![campaign_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_campaign_head_row(row)?)),
        None => Ok(None),
    }
}

fn parse_campaign_head_row(row: &Row<'_>) -> RepoResult<PromotionCampaignEntity> {
    let guild_id = snowflake_from_db(row.get("guild_id")?);
    let subject_id = snowflake_from_db(row.get("subject_id")?);

    let target_role = match (
        row.get::<_, Option<i64>>("target_role_id")?,
        row.get::<_, Option<String>>("role_name")?,
    ) {
        (Some(role_id), Some(name)) => Some(GuildRoleEntity {
            role_id: snowflake_from_db(role_id),
            guild_id: snowflake_from_db(row.get("role_guild_id")?),
            name,
            position: row.get("role_position")?,
        }),
        _ => None,
    };

    let outcome = row
        .get::<_, Option<String>>("outcome")?
        .map(|text| text.parse::<PromotionCampaignOutcome>())
        .transpose()?;

    Ok(PromotionCampaignEntity {
        id: row.get("id")?,
        guild_id,
        subject: GuildUserEntity {
            guild_id,
            user_id: subject_id,
            username: row.get("subject_username")?,
            discriminator: row.get("subject_discriminator")?,
            nickname: row.get("subject_nickname")?,
        },
        target_role,
        create_action: parse_promotion_action(row, "create_action_")?,
        outcome,
        close_action: parse_promotion_action(row, "close_action_")?,
        comments: Vec::new(),
    })
}

fn parse_promotion_action(row: &Row<'_>, prefix: &str) -> RepoResult<Option<PromotionActionEntity>> {
    let column = |name: &str| format!("{prefix}{name}");

    let Some(id) = row.get::<_, Option<i64>>(column("id").as_str())? else {
        return Ok(None);
    };
    let type_text: String = row.get(column("type").as_str())?;

    Ok(Some(PromotionActionEntity {
        id,
        guild_id: snowflake_from_db(row.get(column("guild_id").as_str())?),
        kind: type_text.parse()?,
        created: row.get(column("created").as_str())?,
        created_by_id: snowflake_from_db(row.get(column("created_by_id").as_str())?),
        campaign_id: row.get(column("campaign_id").as_str())?,
        comment_id: row.get(column("comment_id").as_str())?,
    }))
}

fn parse_sentiment_count(row: &Row<'_>) -> RepoResult<(PromotionSentiment, u32)> {
    let sentiment: String = row.get("sentiment")?;
    let count: i64 = row.get("comment_count")?;
    Ok((sentiment.parse::<PromotionSentiment>()?, count.clamp(0, i64::from(u32::MAX)) as u32))
}
