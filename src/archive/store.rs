//! Immutable post-war snapshots and the history built on top of them

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::archive::event_log::WarEvent;
use crate::core::error::{Result, WarError};
use crate::core::page::Page;
use crate::core::sync;
use crate::core::types::{GuildId, Millis, WarId};
use crate::territory::Territory;
use crate::war::participants::ParticipantEntry;
use crate::war::{War, WarResult};

/// Everything that survives a war
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarArchive {
    pub war: War,
    pub participants: Vec<ParticipantEntry>,
    pub territories: Vec<Territory>,
    pub events: Vec<WarEvent>,
}

impl WarArchive {
    pub fn war_id(&self) -> WarId {
        self.war.id
    }

    /// Time the archive is sorted and filtered by
    pub fn ended_at(&self) -> Millis {
        self.war
            .concluded_at
            .or(self.war.end_time)
            .unwrap_or(self.war.declared_at)
    }

    pub fn involves(&self, guild: GuildId) -> bool {
        self.war.sides().contains(guild)
    }
}

/// History filter, evaluated from one guild's point of view
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveFilter {
    pub opponent: Option<GuildId>,
    pub result: Option<WarResult>,
    /// Inclusive lower bound on the war's end
    pub from: Option<Millis>,
    /// Exclusive upper bound on the war's end
    pub to: Option<Millis>,
}

impl ArchiveFilter {
    pub fn matches(&self, archive: &WarArchive, guild: GuildId) -> bool {
        let Some(opponent) = archive.war.opponent_of(guild) else {
            return false;
        };
        let ended = archive.ended_at();
        self.opponent.map_or(true, |o| o == opponent)
            && self
                .result
                .map_or(true, |r| archive.war.result_for(guild) == Some(r))
            && self.from.map_or(true, |from| ended >= from)
            && self.to.map_or(true, |to| ended < to)
    }
}

/// One row of a guild's war history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub war_id: WarId,
    pub opponent: GuildId,
    pub result: WarResult,
    pub score: u64,
    pub opponent_score: u64,
    pub start_time: Option<Millis>,
    pub end_time: Option<Millis>,
    pub archived_at: Option<Millis>,
    pub total_events: u64,
}

impl ArchiveSummary {
    pub fn for_guild(archive: &WarArchive, guild: GuildId) -> Option<Self> {
        let war = &archive.war;
        let opponent = war.opponent_of(guild)?;
        Some(Self {
            war_id: war.id,
            opponent,
            result: war.result_for(guild)?,
            score: war.scores.get(&guild).copied().unwrap_or(0),
            opponent_score: war.scores.get(&opponent).copied().unwrap_or(0),
            start_time: war.start_time,
            end_time: war.end_time,
            archived_at: war.archived_at,
            total_events: archive.events.len() as u64,
        })
    }
}

pub trait ArchiveStore: Send + Sync {
    /// Store a new archive; an existing archive is never overwritten
    fn save(&self, archive: &WarArchive) -> Result<()>;

    fn load(&self, war_id: WarId) -> Result<WarArchive>;

    fn list(&self) -> Result<Vec<WarArchive>>;

    /// Returns whether anything was removed
    fn remove(&self, war_id: WarId) -> Result<bool>;

    fn contains(&self, war_id: WarId) -> Result<bool> {
        match self.load(war_id) {
            Ok(_) => Ok(true),
            Err(WarError::WarNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// A guild's wars, newest first
    fn history(
        &self,
        guild: GuildId,
        filter: &ArchiveFilter,
        page: usize,
        page_size: usize,
    ) -> Result<Page<ArchiveSummary>> {
        crate::core::page::validate(page, page_size)?;
        let mut archives: Vec<WarArchive> = self
            .list()?
            .into_iter()
            .filter(|a| filter.matches(a, guild))
            .collect();
        archives.sort_by(|a, b| {
            b.ended_at()
                .cmp(&a.ended_at())
                .then_with(|| b.war_id().cmp(&a.war_id()))
        });
        let rows: Vec<ArchiveSummary> = archives
            .iter()
            .filter_map(|a| ArchiveSummary::for_guild(a, guild))
            .collect();
        Page::slice(&rows, page, page_size)
    }

    /// Delete archives whose war ended before `older_than`
    fn cleanup(&self, older_than: Millis) -> Result<usize> {
        let mut removed = 0;
        for archive in self.list()? {
            if archive.ended_at() < older_than && self.remove(archive.war_id())? {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, older_than, "archive retention cleanup");
        }
        Ok(removed)
    }

    /// Pretty JSON snapshot of one archive
    fn download(&self, war_id: WarId) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.load(war_id)?)?)
    }
}

fn already_archived(war_id: WarId) -> WarError {
    WarError::InvalidStateTransition(format!("war {} is already archived", war_id))
}

/// JSON files named `<war_id>.json` under a directory
///
/// Writes go to a temporary file first and are renamed into place, so a
/// reader never observes a half-written archive.
#[derive(Debug)]
pub struct FileArchiveStore {
    directory: PathBuf,
}

impl FileArchiveStore {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, war_id: WarId) -> PathBuf {
        self.directory.join(format!("{}.json", war_id))
    }
}

impl ArchiveStore for FileArchiveStore {
    fn save(&self, archive: &WarArchive) -> Result<()> {
        let path = self.path_for(archive.war_id());
        if path.exists() {
            return Err(already_archived(archive.war_id()));
        }
        let tmp = self.directory.join(format!("{}.json.tmp", archive.war_id()));
        fs::write(&tmp, serde_json::to_vec_pretty(archive)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load(&self, war_id: WarId) -> Result<WarArchive> {
        let path = self.path_for(war_id);
        if !path.exists() {
            return Err(WarError::WarNotFound(war_id));
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn list(&self) -> Result<Vec<WarArchive>> {
        let mut archives = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(war_id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(WarId)
            else {
                tracing::warn!(path = %path.display(), "skipping unrecognized archive file");
                continue;
            };
            archives.push(self.load(war_id)?);
        }
        Ok(archives)
    }

    fn remove(&self, war_id: WarId) -> Result<bool> {
        let path = self.path_for(war_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }
}

/// In-memory store with failure injection
#[derive(Debug, Default)]
pub struct MemoryArchiveStore {
    archives: RwLock<BTreeMap<WarId, WarArchive>>,
    failures: AtomicU32,
}

impl MemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` saves fail with a persistence error
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        sync::read(&self.archives).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArchiveStore for MemoryArchiveStore {
    fn save(&self, archive: &WarArchive) -> Result<()> {
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(WarError::Persistence("injected archive failure".into()));
        }
        let mut archives = sync::write(&self.archives);
        if archives.contains_key(&archive.war_id()) {
            return Err(already_archived(archive.war_id()));
        }
        archives.insert(archive.war_id(), archive.clone());
        Ok(())
    }

    fn load(&self, war_id: WarId) -> Result<WarArchive> {
        sync::read(&self.archives)
            .get(&war_id)
            .cloned()
            .ok_or(WarError::WarNotFound(war_id))
    }

    fn list(&self) -> Result<Vec<WarArchive>> {
        Ok(sync::read(&self.archives).values().cloned().collect())
    }

    fn remove(&self, war_id: WarId) -> Result<bool> {
        Ok(sync::write(&self.archives).remove(&war_id).is_some())
    }
}
