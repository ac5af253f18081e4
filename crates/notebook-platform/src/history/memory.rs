//! Records kept for the life of the process; used when the history
//! directory is unusable and in tests.

use std::cell::RefCell;
use std::collections::BTreeMap;

use async_trait::async_trait;
use notebook_core::ports::HistoryPort;
use notebook_types::{session::HistoryRecord, Result};

use super::{history_file_name, newest_first, stamped};

#[derive(Default)]
pub struct MemoryHistory {
    /// Keyed by file name, as on disk
    records: RefCell<BTreeMap<String, HistoryRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait(?Send)]
impl HistoryPort for MemoryHistory {
    async fn save_history(&self, record: &HistoryRecord) -> Result<()> {
        let name = history_file_name(&record.session_id)?;
        self.records.borrow_mut().insert(name, stamped(record));
        Ok(())
    }

    async fn load_history(&self) -> Result<Vec<HistoryRecord>> {
        let mut records: Vec<HistoryRecord> = self.records.borrow().values().cloned().collect();
        newest_first(&mut records);
        Ok(records)
    }
}
