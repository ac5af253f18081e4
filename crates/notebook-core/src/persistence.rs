//! Mirrors the current transcript to the history service.
//!
//! Best-effort: a failed write is logged and forgotten, it never touches
//! in-memory state or interrupts the caller.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ports::HistoryPort;
use crate::store::SharedState;

pub struct PersistenceSync {
    history: Rc<dyn HistoryPort>,
    /// Session id and transcript revision of the last attempted write
    last_written: RefCell<Option<(String, u64)>>,
}

impl PersistenceSync {
    pub fn new(history: Rc<dyn HistoryPort>) -> Self {
        Self {
            history,
            last_written: RefCell::new(None),
        }
    }

    pub fn history(&self) -> &Rc<dyn HistoryPort> {
        &self.history
    }

    /// Write the current session through if its transcript changed since
    /// the last write. Returns whether a write was attempted.
    pub async fn sync(&self, state: &SharedState) -> bool {
        let record = {
            let state = state.borrow();
            if state.transcript.is_empty() {
                return false;
            }
            let Some(record) = state.current_history() else {
                return false;
            };
            let marker = (record.session_id.clone(), state.revision());
            if self.last_written.borrow().as_ref() == Some(&marker) {
                return false;
            }
            *self.last_written.borrow_mut() = Some(marker);
            record
        };

        if let Err(e) = self.history.save_history(&record).await {
            log::warn!("Failed to save history for {}: {}", record.session_id, e);
        } else {
            log::debug!(
                "Saved {} messages for {}",
                record.messages.len(),
                record.session_id
            );
        }
        true
    }
}
