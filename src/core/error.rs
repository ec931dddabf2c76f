use thiserror::Error;

use crate::core::types::{GuildId, MemberId, TerritoryId, WarId};

#[derive(Error, Debug)]
pub enum WarError {
    #[error("Not eligible: {0}")]
    NotEligible(String),

    #[error("Guild {guild} already has the maximum of {max} participants")]
    CapacityExceeded { guild: GuildId, max: usize },

    #[error("Member {0} is not a registered participant of this war")]
    NotParticipant(MemberId),

    #[error("Territory not found: {0}")]
    TerritoryNotFound(TerritoryId),

    #[error("Guild {guild} does not control territory {territory}")]
    NotController { territory: TerritoryId, guild: GuildId },

    #[error("Guild {guild} already controls territory {territory}")]
    AlreadyController { territory: TerritoryId, guild: GuildId },

    #[error("Force {force} is below the minimum of {minimum}")]
    ForceBelowMinimum { force: u32, minimum: u32 },

    #[error("Territory {territory} is on cooldown for another {remaining_ms}ms")]
    CooldownActive { territory: TerritoryId, remaining_ms: u64 },

    #[error("War {0} is not active")]
    WarNotActive(WarId),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("War not found: {0}")]
    WarNotFound(WarId),

    #[error("Guild not found: {0}")]
    GuildNotFound(GuildId),

    #[error("Member not found: {0}")]
    MemberNotFound(MemberId),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl WarError {
    /// Stable machine-readable code returned to API callers
    pub fn code(&self) -> &'static str {
        match self {
            WarError::NotEligible(_) => "NOT_ELIGIBLE",
            WarError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            WarError::NotParticipant(_) => "NOT_PARTICIPANT",
            WarError::TerritoryNotFound(_) => "TERRITORY_NOT_FOUND",
            WarError::NotController { .. } => "NOT_CONTROLLER",
            WarError::AlreadyController { .. } => "ALREADY_CONTROLLER",
            WarError::ForceBelowMinimum { .. } => "FORCE_BELOW_MINIMUM",
            WarError::CooldownActive { .. } => "COOLDOWN_ACTIVE",
            WarError::WarNotActive(_) => "WAR_NOT_ACTIVE",
            WarError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            WarError::WarNotFound(_) => "WAR_NOT_FOUND",
            WarError::GuildNotFound(_) => "GUILD_NOT_FOUND",
            WarError::MemberNotFound(_) => "MEMBER_NOT_FOUND",
            WarError::InvalidRequest(_) => "INVALID_REQUEST",
            WarError::Persistence(_) | WarError::IoError(_) => "PERSISTENCE_FAILURE",
            WarError::SerdeError(_) => "SERIALIZATION_FAILURE",
            WarError::Config(_) | WarError::TomlError(_) => "CONFIG_ERROR",
        }
    }

    /// Server-side failures the caller may retry; validation errors are final
    pub fn is_retryable(&self) -> bool {
        matches!(self, WarError::Persistence(_) | WarError::IoError(_))
    }

    /// Validation errors never mutate state and are the caller's fault
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            WarError::Persistence(_)
                | WarError::IoError(_)
                | WarError::SerdeError(_)
                | WarError::Config(_)
                | WarError::TomlError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WarError>;
