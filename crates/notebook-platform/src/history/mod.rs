//! Saved transcripts, one JSON document per session.
//!
//! A record lives at `<sessionId>.json` under the workspace's history
//! directory. Session ids come from the backend and become file names, so
//! they are validated before use. When the directory is unusable the
//! workspace keeps its history in memory for the life of the process.

mod dir;
mod memory;

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use async_trait::async_trait;
use notebook_core::ports::HistoryPort;
use notebook_types::{
    session::{is_valid_session_id, HistoryRecord},
    NotebookError, Result,
};

pub use dir::DirHistory;
pub use memory::MemoryHistory;

const FILE_SUFFIX: &str = ".json";

pub fn history_file_name(session_id: &str) -> Result<String> {
    if !is_valid_session_id(session_id) {
        return Err(NotebookError::InvalidSessionId(session_id.to_string()));
    }
    Ok(format!("{}{}", session_id, FILE_SUFFIX))
}

/// Copy of `record` stamped with the write time.
fn stamped(record: &HistoryRecord) -> HistoryRecord {
    let mut record = record.clone();
    record.updated_at = chrono::Local::now().to_rfc3339();
    record
}

fn newest_first(records: &mut [HistoryRecord]) {
    // RFC 3339 stamps from the same writer sort lexically
    records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

/// History for a workspace directory. Never fails: an unusable directory
/// degrades to memory, losing persistence only.
pub async fn open_history(dir: &Path) -> Rc<dyn HistoryPort> {
    match DirHistory::open(dir).await {
        Ok(history) => {
            log::info!("History directory: {}", dir.display());
            Rc::new(history)
        }
        Err(e) => {
            log::warn!(
                "History directory {} unavailable ({}), keeping history in memory",
                dir.display(),
                e
            );
            Rc::new(MemoryHistory::new())
        }
    }
}

/// The history of whichever workspace is open.
pub struct WorkspaceHistory {
    backend: RefCell<Rc<dyn HistoryPort>>,
}

impl WorkspaceHistory {
    pub fn new(backend: Rc<dyn HistoryPort>) -> Self {
        Self {
            backend: RefCell::new(backend),
        }
    }

    /// Point at another workspace's history.
    pub fn replace_backend(&self, backend: Rc<dyn HistoryPort>) {
        *self.backend.borrow_mut() = backend;
    }

    fn backend(&self) -> Rc<dyn HistoryPort> {
        self.backend.borrow().clone()
    }
}

#[async_trait(?Send)]
impl HistoryPort for WorkspaceHistory {
    async fn save_history(&self, record: &HistoryRecord) -> Result<()> {
        self.backend().save_history(record).await
    }

    async fn load_history(&self) -> Result<Vec<HistoryRecord>> {
        self.backend().load_history().await
    }
}
