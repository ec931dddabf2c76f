//! One-way hand-off of reward-bearing events to the settlement service
//!
//! Sinks never fail the action that produced the event: delivery problems are
//! logged and dropped.

use std::collections::BTreeMap;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::core::error::{Result, WarError};
use crate::core::types::{GuildId, MemberId, TerritoryId, WarId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettlementEvent {
    Capture {
        war_id: WarId,
        guild_id: GuildId,
        member_id: MemberId,
        territory_id: TerritoryId,
        points: u64,
    },
    Kill {
        war_id: WarId,
        guild_id: GuildId,
        member_id: MemberId,
        points: u64,
    },
    BossDefeat {
        war_id: WarId,
        guild_id: GuildId,
        member_id: MemberId,
        boss_name: String,
        points: u64,
    },
    WarResult {
        war_id: WarId,
        winner: Option<GuildId>,
        scores: BTreeMap<GuildId, u64>,
    },
}

pub trait SettlementSink: Send + Sync {
    fn submit(&self, event: SettlementEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSettlement;

impl SettlementSink for NullSettlement {
    fn submit(&self, _event: SettlementEvent) {}
}

/// Forwards events to an in-process consumer
#[derive(Debug, Clone)]
pub struct ChannelSettlement {
    tx: mpsc::UnboundedSender<SettlementEvent>,
}

impl ChannelSettlement {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SettlementEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SettlementSink for ChannelSettlement {
    fn submit(&self, event: SettlementEvent) {
        if self.tx.send(event).is_err() {
            tracing::warn!("settlement consumer is gone, event dropped");
        }
    }
}

/// POSTs each event as JSON to a webhook on the tokio runtime it was built on
#[derive(Debug, Clone)]
pub struct WebhookSettlement {
    client: Client,
    url: String,
    runtime: Handle,
}

impl WebhookSettlement {
    /// Must be called from within a tokio runtime
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| WarError::Config(format!("webhook settlement needs a tokio runtime: {}", e)))?;
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(WarError::Config(format!("invalid settlement webhook url: {}", url)));
        }
        Ok(Self {
            client: Client::new(),
            url,
            runtime,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SettlementSink for WebhookSettlement {
    fn submit(&self, event: SettlementEvent) {
        let client = self.client.clone();
        let url = self.url.clone();
        self.runtime.spawn(async move {
            match client.post(&url).json(&event).send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    tracing::warn!(status = %response.status(), "settlement webhook rejected event");
                }
                Err(e) => tracing::warn!(error = %e, "settlement webhook unreachable"),
            }
        });
    }
}
