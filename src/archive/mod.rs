//! Event log, its durable journal, and the post-war archive

pub mod event_log;
pub mod journal;
pub mod retry;
pub mod store;

pub use event_log::{EventFilter, EventLog, EventType, NewEvent, WarEvent, WarEventKind};
pub use journal::{EventJournal, JsonlJournal, MemoryJournal, NullJournal};
pub use retry::RetryPolicy;
pub use store::{
    ArchiveFilter, ArchiveStore, ArchiveSummary, FileArchiveStore, MemoryArchiveStore, WarArchive,
};
