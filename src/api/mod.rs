//! JSON request/response surface over the war manager
//!
//! The session layer authenticates the caller and hands us an `Actor`; every
//! request body is a tagged `ApiRequest`. Errors carry the stable code from
//! `WarError::code` and whether a retry can help.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::archive::{ArchiveFilter, EventFilter};
use crate::core::error::{Result, WarError};
use crate::core::types::{Actor, GuildId, MemberId, TerritoryId, WarId};
use crate::war::WarManager;

const DEFAULT_PAGE_SIZE: usize = 50;

fn first_page() -> usize {
    1
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ApiRequest {
    Declare {
        target_guild_id: GuildId,
    },
    Register {
        war_id: WarId,
        member_id: MemberId,
    },
    Attack {
        war_id: WarId,
        territory_id: TerritoryId,
        force: u32,
    },
    Reinforce {
        war_id: WarId,
        territory_id: TerritoryId,
        amount: u32,
    },
    ReportKill {
        war_id: WarId,
        victim_member_id: MemberId,
    },
    ReportBossDefeat {
        war_id: WarId,
        boss_name: String,
    },
    Archive {
        war_id: WarId,
    },
    GetTerritories {
        war_id: WarId,
    },
    GetEvents {
        war_id: WarId,
        #[serde(default = "first_page")]
        page: usize,
        #[serde(default = "default_page_size")]
        page_size: usize,
        #[serde(default)]
        filter: Option<EventFilter>,
    },
    GetArchive {
        guild_id: GuildId,
        #[serde(default)]
        filter: ArchiveFilter,
        #[serde(default = "first_page")]
        page: usize,
        #[serde(default = "default_page_size")]
        page_size: usize,
    },
    DownloadArchive {
        war_id: WarId,
    },
    PreviewAttack {
        war_id: WarId,
        territory_id: TerritoryId,
        force: u32,
    },
    Snapshot {
        war_id: WarId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&WarError> for ApiError {
    fn from(e: &WarError) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.to_string(),
            retryable: e.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl ApiResponse {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: &WarError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}

/// Request dispatcher shared by every connection
#[derive(Clone)]
pub struct WarService {
    manager: Arc<WarManager>,
}

impl WarService {
    pub fn new(manager: Arc<WarManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<WarManager> {
        &self.manager
    }

    pub fn handle(&self, actor: Actor, request: ApiRequest) -> ApiResponse {
        match self.dispatch(actor, request) {
            Ok(data) => ApiResponse::success(data),
            Err(e) => {
                if e.is_validation() {
                    tracing::debug!(code = e.code(), error = %e, "request rejected");
                } else {
                    tracing::warn!(code = e.code(), error = %e, "request failed");
                }
                ApiResponse::failure(&e)
            }
        }
    }

    /// Parse, dispatch and serialize in one go
    pub fn handle_json(&self, actor: Actor, body: &str) -> String {
        let response = match serde_json::from_str::<ApiRequest>(body) {
            Ok(request) => self.handle(actor, request),
            Err(e) => ApiResponse::failure(&WarError::InvalidRequest(e.to_string())),
        };
        serde_json::to_string(&response).unwrap_or_else(|e| {
            format!(
                r#"{{"ok":false,"error":{{"code":"SERIALIZATION_FAILURE","message":"{}","retryable":false}}}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }

    fn dispatch(&self, actor: Actor, request: ApiRequest) -> Result<Value> {
        let m = &self.manager;
        let value = match request {
            ApiRequest::Declare { target_guild_id } => to_value(m.declare(actor, target_guild_id)?)?,
            ApiRequest::Register { war_id, member_id } => to_value(m.register(war_id, actor, member_id)?)?,
            ApiRequest::Attack {
                war_id,
                territory_id,
                force,
            } => to_value(m.attack(war_id, actor, territory_id, force)?)?,
            ApiRequest::Reinforce {
                war_id,
                territory_id,
                amount,
            } => to_value(m.reinforce(war_id, actor, territory_id, amount)?)?,
            ApiRequest::ReportKill {
                war_id,
                victim_member_id,
            } => to_value(m.report_kill(war_id, actor, victim_member_id)?)?,
            ApiRequest::ReportBossDefeat { war_id, boss_name } => {
                to_value(m.report_boss_defeat(war_id, actor, &boss_name)?)?
            }
            ApiRequest::Archive { war_id } => {
                let archive = m.archive(war_id)?;
                to_value(&archive.war)?
            }
            ApiRequest::GetTerritories { war_id } => to_value(m.get_territories(war_id)?)?,
            ApiRequest::GetEvents {
                war_id,
                page,
                page_size,
                filter,
            } => match filter {
                Some(filter) => to_value(m.query_events(war_id, &filter, page, page_size)?)?,
                None => to_value(m.list_events(war_id, page, page_size)?)?,
            },
            ApiRequest::GetArchive {
                guild_id,
                filter,
                page,
                page_size,
            } => to_value(m.history(guild_id, &filter, page, page_size)?)?,
            ApiRequest::DownloadArchive { war_id } => Value::String(m.download_archive(war_id)?),
            ApiRequest::PreviewAttack {
                war_id,
                territory_id,
                force,
            } => to_value(m.preview_attack(war_id, territory_id, force)?)?,
            ApiRequest::Snapshot { war_id } => to_value(m.snapshot(war_id)?)?,
        };
        Ok(value)
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}
