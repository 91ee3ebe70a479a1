//! Store-wide configuration knobs: a plain `Clone + Debug` struct with a
//! hand-written `Default`, constructed once at startup and handed down
//! by reference rather than read from globals.

use std::time::Duration;

/// Configuration consulted by the entity store and the Update Manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Maximum UTF-8 character count for an entity's `name` field.
    pub limits_entity_name: usize,
    /// Maximum UTF-8 character count for freeform string fields (note,
    /// registration name/category, messages, program source, ...).
    pub limits_string_size: usize,
    /// How often the Update Manager's commit tick runs.
    pub commit_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            limits_entity_name: 64,
            limits_string_size: 4096,
            commit_interval: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits_entity_name(mut self, limit: usize) -> Self {
        self.limits_entity_name = limit;
        self
    }

    pub fn with_limits_string_size(mut self, limit: usize) -> Self {
        self.limits_string_size = limit;
        self
    }

    pub fn with_commit_interval(mut self, interval: Duration) -> Self {
        self.commit_interval = interval;
        self
    }
}
