//! Realtime change feed.
//!
//! A subscribable channel delivers remote-origin change notifications
//! for a user's plans and planned meals. The listener's only job is to
//! hand events to the plan store, which invalidates and reloads; no
//! field-level merging happens here.

mod listener;
mod ws;

pub use listener::{MemoryChannel, RealtimeChannel, RealtimeListener};
pub use ws::WsChannel;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which logical table an event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    WeekPlan,
    MealSlot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// An ephemeral notification of a remote-origin change. Not retained
/// once processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub entity_kind: EntityKind,
    pub change: ChangeKind,
    pub entity_id: String,
}

impl fmt::Display for RealtimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:?} {}", self.entity_kind, self.change, self.entity_id)
    }
}
