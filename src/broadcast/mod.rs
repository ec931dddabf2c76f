//! Real-time fan-out of war state deltas
//!
//! Each subscriber owns an unbounded channel, so publishing never waits on a
//! slow reader. Publishes for one war are serialized, which gives every
//! subscriber of that war the same message order. Subscribers that miss
//! messages reconcile with a full-state pull from the manager.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::archive::event_log::WarEvent;
use crate::core::sync;
use crate::core::types::{GuildId, TerritoryId, WarId};
use crate::territory::{Defense, Territory, TerritoryStatus};
use crate::war::WarPhase;

/// The mutable part of a territory, as pushed to viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerritoryDelta {
    pub id: TerritoryId,
    pub status: TerritoryStatus,
    pub controller_guild_id: Option<GuildId>,
    pub defense: Defense,
}

impl From<&Territory> for TerritoryDelta {
    fn from(territory: &Territory) -> Self {
        Self {
            id: territory.id,
            status: territory.status,
            controller_guild_id: territory.controller,
            defense: territory.defense,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WarMessage {
    TerritoryUpdate {
        war_id: WarId,
        territory: TerritoryDelta,
    },
    ScoreUpdate {
        war_id: WarId,
        scores: BTreeMap<GuildId, u64>,
    },
    Event {
        war_id: WarId,
        event: WarEvent,
    },
    PhaseUpdate {
        war_id: WarId,
        phase: WarPhase,
        winner: Option<GuildId>,
    },
}

impl WarMessage {
    pub fn territory(war_id: WarId, territory: &Territory) -> Self {
        WarMessage::TerritoryUpdate {
            war_id,
            territory: territory.into(),
        }
    }

    pub fn war_id(&self) -> WarId {
        match self {
            WarMessage::TerritoryUpdate { war_id, .. }
            | WarMessage::ScoreUpdate { war_id, .. }
            | WarMessage::Event { war_id, .. }
            | WarMessage::PhaseUpdate { war_id, .. } => *war_id,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Subscriber identifier, unique per broadcaster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Receiving end of one subscription
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub war_id: WarId,
    rx: mpsc::UnboundedReceiver<WarMessage>,
}

impl Subscription {
    /// Next message; `None` once the war's channels are closed
    pub async fn recv(&mut self) -> Option<WarMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<WarMessage> {
        self.rx.try_recv().ok()
    }

    /// Everything currently queued
    pub fn drain(&mut self) -> Vec<WarMessage> {
        let mut out = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            out.push(message);
        }
        out
    }
}

struct Subscriber {
    id: SubscriptionId,
    tx: mpsc::UnboundedSender<WarMessage>,
}

type Channel = Arc<Mutex<Vec<Subscriber>>>;

#[derive(Default)]
pub struct Broadcaster {
    channels: RwLock<AHashMap<WarId, Channel>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, war_id: WarId) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Arc::clone(sync::write(&self.channels).entry(war_id).or_default());
        sync::lock(&channel).push(Subscriber { id, tx });
        tracing::debug!(%war_id, subscription = id.0, "subscriber joined");
        Subscription { id, war_id, rx }
    }

    pub fn unsubscribe(&self, war_id: WarId, id: SubscriptionId) -> bool {
        let Some(channel) = self.channel(war_id) else {
            return false;
        };
        let mut subscribers = sync::lock(&channel);
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        before != subscribers.len()
    }

    /// Deliver to every live subscriber of the war; returns how many got it
    ///
    /// Subscribers whose receiver is gone are dropped.
    pub fn publish(&self, war_id: WarId, message: WarMessage) -> usize {
        let Some(channel) = self.channel(war_id) else {
            return 0;
        };
        let mut subscribers = sync::lock(&channel);
        let mut delivered = 0;
        subscribers.retain(|subscriber| match subscriber.tx.send(message.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                tracing::info!(%war_id, subscription = subscriber.id.0, "dropping closed subscriber");
                false
            }
        });
        delivered
    }

    pub fn subscriber_count(&self, war_id: WarId) -> usize {
        self.channel(war_id)
            .map(|c| sync::lock(&c).len())
            .unwrap_or(0)
    }

    /// End every subscription of one war
    pub fn close(&self, war_id: WarId) {
        if sync::write(&self.channels).remove(&war_id).is_some() {
            tracing::debug!(%war_id, "closed war channel");
        }
    }

    /// End every subscription of every war
    pub fn shutdown(&self) {
        sync::write(&self.channels).clear();
    }

    fn channel(&self, war_id: WarId) -> Option<Channel> {
        sync::read(&self.channels).get(&war_id).cloned()
    }
}
