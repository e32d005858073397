/// Tuning parameters of a [`ComponentStore`](crate::ComponentStore).
///
/// ```
/// use entity_store::{ComponentStore, StoreConfig};
///
/// let config = StoreConfig::default()
///     .with_segment_capacity(256)
///     .with_entity_capacity(10_000);
/// let store = ComponentStore::with_config(config);
/// assert_eq!(store.config().segment_capacity, 256);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Rows reserved in every column when a segment is created.
    pub segment_capacity: usize,
    /// Pending structural changes reserved up front.
    pub transient_capacity: usize,
    /// Entity slots reserved up front.
    pub entity_capacity: usize,
    /// Events a [`Group`](crate::Group) buffers between two observations. A group whose
    /// backlog fills up rebuilds itself from the store on its next observation.
    pub group_backlog: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            segment_capacity: 16,
            transient_capacity: 64,
            entity_capacity: 1024,
            group_backlog: 4096,
        }
    }
}

impl StoreConfig {
    pub fn with_segment_capacity(mut self, capacity: usize) -> Self {
        self.segment_capacity = capacity;
        self
    }

    pub fn with_transient_capacity(mut self, capacity: usize) -> Self {
        self.transient_capacity = capacity;
        self
    }

    pub fn with_entity_capacity(mut self, capacity: usize) -> Self {
        self.entity_capacity = capacity;
        self
    }

    pub fn with_group_backlog(mut self, backlog: usize) -> Self {
        self.group_backlog = backlog;
        self
    }
}
