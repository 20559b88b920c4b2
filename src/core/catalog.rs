//! In-memory list of completed downloads

use parking_lot::RwLock;
use std::sync::Arc;

use crate::core::models::VideoRecord;

/// Completed downloads in completion order
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    records: Arc<RwLock<Vec<VideoRecord>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: VideoRecord) {
        self.records.write().push(record);
    }

    /// Snapshot of all records
    pub fn list(&self) -> Vec<VideoRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
