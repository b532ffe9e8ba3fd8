//! Persistence layer for the Modix moderation data model.
//! Repositories, transactions and moderation action observers live here.

pub mod config;
pub mod db;
pub mod events;
pub mod logging;
pub mod model;
pub mod repo;

pub use config::{ConfigError, StoreConfig};
pub use db::{
    open_store, open_store_from_config, open_store_in_memory, DbError, DbResult, StoreSession,
    StoreTransaction,
};
pub use events::{
    HandlerError, ModerationActionEventHandler, ModerationActionEventHandlers, NotifyError,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig};
pub use model::moderation::{
    CreationDataError, DeletedMessageCreationData, DeletedMessageEntity,
    ModerationActionCreationData, ModerationActionEntity, ModerationActionType,
};
pub use model::promotions::{
    PromotionCampaignCreationData, PromotionCampaignEntity, PromotionCampaignOutcome,
    PromotionCampaignSummary, PromotionCommentCreationData, PromotionSentiment,
};
pub use model::UnknownEnumerationText;
pub use repo::deleted_message_repo::{DeletedMessageRepository, SqliteDeletedMessageRepository};
pub use repo::guild_repo::{GuildRepository, SqliteGuildRepository};
pub use repo::moderation_action_repo::{
    ModerationActionRepository, SqliteModerationActionRepository,
};
pub use repo::promotion_repo::{PromotionCampaignRepository, SqlitePromotionCampaignRepository};
pub use repo::{ErrorPhase, RepoError, RepoResult};

/// Returns the crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
