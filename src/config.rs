use std::{path::PathBuf, time::Duration};

/// Tunables for the in-memory search index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexConfig {
    /// Edit-distance tolerance as a fraction of the query term length.
    pub fuzzy: f32,
    /// Hard cap on the edit distance (tantivy supports at most 2).
    pub max_fuzzy_distance: u8,
    pub title_boost: f32,
    pub content_boost: f32,
    /// Memory budget for the tantivy writer, in bytes.
    pub writer_memory_budget: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            fuzzy: 0.2,
            max_fuzzy_distance: 2,
            title_boost: 2.0,
            content_boost: 1.0,
            writer_memory_budget: 15_000_000,
        }
    }
}

impl IndexConfig {
    /// Edit distance allowed for a query term of `term_chars` characters.
    pub fn fuzzy_distance(&self, term_chars: usize) -> u8 {
        let distance = (term_chars as f32 * self.fuzzy).round();
        (distance as u8).min(self.max_fuzzy_distance)
    }
}

/// Settings for a [`SearchEngine`](crate::sync::SearchEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub index: IndexConfig,
    /// Location of the redb cache file. `None` keeps the cache in memory.
    pub cache_path: Option<PathBuf>,
    /// Quiet period used by `search_debounced`.
    pub debounce: Duration,
    /// Buffer size of the index-update broadcast channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            cache_path: None,
            debounce: Duration::from_millis(150),
            event_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }
}
