//! Durable targets for event log appends

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::archive::event_log::WarEvent;
use crate::core::error::{Result, WarError};
use crate::core::sync;
use crate::core::types::WarId;

pub trait EventJournal: Send + Sync {
    /// Durably record one event; retryable errors may be retried by the caller
    fn append(&self, event: &WarEvent) -> Result<()>;

    /// Every event recorded for a war, in append order
    fn load(&self, war_id: WarId) -> Result<Vec<WarEvent>>;
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullJournal;

impl EventJournal for NullJournal {
    fn append(&self, _event: &WarEvent) -> Result<()> {
        Ok(())
    }

    fn load(&self, _war_id: WarId) -> Result<Vec<WarEvent>> {
        Ok(Vec::new())
    }
}

/// In-memory journal with failure injection for tests and simulations
#[derive(Debug, Default)]
pub struct MemoryJournal {
    events: Mutex<Vec<WarEvent>>,
    failures: AtomicU32,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` appends fail with a persistence error
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        sync::lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventJournal for MemoryJournal {
    fn append(&self, event: &WarEvent) -> Result<()> {
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(WarError::Persistence("injected journal failure".into()));
        }
        sync::lock(&self.events).push(event.clone());
        Ok(())
    }

    fn load(&self, war_id: WarId) -> Result<Vec<WarEvent>> {
        Ok(sync::lock(&self.events)
            .iter()
            .filter(|e| e.war_id == war_id)
            .cloned()
            .collect())
    }
}

/// One JSON-lines file per war under a directory
#[derive(Debug)]
pub struct JsonlJournal {
    directory: PathBuf,
}

impl JsonlJournal {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, war_id: WarId) -> PathBuf {
        self.directory.join(format!("{}.jsonl", war_id))
    }
}

impl EventJournal for JsonlJournal {
    fn append(&self, event: &WarEvent) -> Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(event.war_id))?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    fn load(&self, war_id: WarId) -> Result<Vec<WarEvent>> {
        let path = self.path_for(war_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(path)?);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::event_log::WarEventKind;
    use crate::core::types::{ActorRef, EventId, GuildId, MemberId, TerritoryId};

    fn event(war_id: WarId, seq: u64) -> WarEvent {
        WarEvent {
            seq,
            id: EventId::new(),
            war_id,
            territory_id: Some(TerritoryId(2)),
            timestamp: 1_000 + seq,
            actor: ActorRef {
                member_id: MemberId(5),
                display_name: "Vex".into(),
                guild_id: GuildId(1),
            },
            points: 0,
            credited_guild: GuildId(1),
            kind: WarEventKind::Reinforce {
                amount: 10,
                total: 10 * (seq as u32 + 1),
            },
        }
    }

    #[test]
    fn test_jsonl_round_trip_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let journal = JsonlJournal::new(dir.path()).unwrap();
        let war_id = WarId::new();
        for seq in 0..3 {
            journal.append(&event(war_id, seq)).unwrap();
        }
        let loaded = journal.load(war_id).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![0, 1, 2]);

        let raw = fs::read_to_string(journal.path_for(war_id)).unwrap();
        assert_eq!(raw.lines().count(), 3);
    }

    #[test]
    fn test_jsonl_missing_war_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let journal = JsonlJournal::new(dir.path().join("nested")).unwrap();
        assert!(journal.load(WarId::new()).unwrap().is_empty());
    }

    #[test]
    fn test_memory_journal_failure_injection() {
        let journal = MemoryJournal::new();
        let war_id = WarId::new();
        journal.fail_next(1);
        assert!(journal.append(&event(war_id, 0)).is_err());
        assert!(journal.append(&event(war_id, 0)).is_ok());
        assert_eq!(journal.load(war_id).unwrap().len(), 1);
    }
}
