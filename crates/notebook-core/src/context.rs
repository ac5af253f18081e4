//! Context files attached to a conversation, and which of them the backend
//! has already received.
//!
//! Invariant: `sent ⊆ attached`. Context that was delivered cannot be
//! retracted from the backend, so a sent path is never detached.

use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextTracker {
    attached: BTreeSet<String>,
    sent: BTreeSet<String>,
}

impl ContextTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from saved lists. Sent paths missing from `attached` are
    /// attached as well.
    pub fn restore<A, S>(attached: A, sent: S) -> Self
    where
        A: IntoIterator<Item = String>,
        S: IntoIterator<Item = String>,
    {
        let mut tracker = Self::new();
        tracker.replace(attached, sent);
        tracker
    }

    /// Replace the whole state, e.g. when another session becomes current.
    pub fn replace<A, S>(&mut self, attached: A, sent: S)
    where
        A: IntoIterator<Item = String>,
        S: IntoIterator<Item = String>,
    {
        self.attached = attached.into_iter().collect();
        self.sent = sent.into_iter().collect();
        self.attached.extend(self.sent.iter().cloned());
    }

    pub fn reset(&mut self) {
        self.attached.clear();
        self.sent.clear();
    }

    /// Idempotent.
    pub fn attach(&mut self, path: impl Into<String>) {
        self.attached.insert(path.into());
    }

    /// Detach an unsent path or attach a new one. Sent paths are left alone.
    /// Returns whether anything changed.
    pub fn toggle(&mut self, path: &str) -> bool {
        if self.sent.contains(path) {
            return false;
        }
        if !self.attached.remove(path) {
            self.attached.insert(path.to_string());
        }
        true
    }

    /// Attached files the backend has not received yet, sorted.
    pub fn unsent_delta(&self) -> Vec<String> {
        self.attached.difference(&self.sent).cloned().collect()
    }

    pub fn mark_sent<'a, I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for path in paths {
            if self.attached.contains(path) {
                self.sent.insert(path.clone());
            } else {
                log::warn!("Ignoring sent marker for unattached context file {}", path);
            }
        }
    }

    /// Forget every sent marker, keeping the attachments.
    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }

    pub fn attached(&self) -> Vec<String> {
        self.attached.iter().cloned().collect()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.iter().cloned().collect()
    }

    pub fn is_attached(&self, path: &str) -> bool {
        self.attached.contains(path)
    }

    pub fn is_sent(&self, path: &str) -> bool {
        self.sent.contains(path)
    }

    pub fn len(&self) -> usize {
        self.attached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attached.is_empty()
    }
}
