//! Guild War - territory warfare engine for guild-vs-guild conflicts
//!
//! A declared war runs through preparation, an active phase in which
//! registered members attack and reinforce territories, and conclusion, after
//! which its event log and statistics are archived.

pub mod api;
pub mod archive;
pub mod broadcast;
pub mod combat;
pub mod core;
pub mod directory;
pub mod territory;
pub mod war;

pub use crate::core::error::{Result, WarError};
