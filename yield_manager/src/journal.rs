//! Structured operation log kept in stable storage.
//!
//! Entries are grouped into collections: one per rebalance cycle, one per
//! user attempt, one per maintenance task. A collection is built in heap
//! memory and committed to the stable vector in one piece when closed, so a
//! trapped run never leaves a half-written collection behind.

use std::borrow::Cow;

use candid::{CandidType, Decode, Encode};
use ic_stable_structures::{storable::Bound, Storable};
use serde::Deserialize;

use crate::state::insert_journal_collection;
use crate::utils::common::time_secs;
use crate::utils::error::ManagerResult;

#[derive(Clone, CandidType, Deserialize, Debug, PartialEq)]
pub enum LogType {
    Info,
    Decision,
    Migration,
    ExecutionResult,
    Custody,
    ProviderReputationChange,
}

/// Journal entry
#[derive(Clone, CandidType, Deserialize)]
pub struct JournalEntry {
    pub timestamp: u64,
    pub entry: ManagerResult<()>,
    pub log_type: LogType,
    pub note: Option<String>,
}

/// A group of related journal entries committed together
#[derive(Clone, CandidType, Deserialize)]
pub struct JournalCollection {
    pub opened_at: u64,
    pub closed_at: Option<u64>,
    /// User address this collection belongs to, if any
    pub user: Option<String>,
    pub entries: Vec<JournalEntry>,
}

impl JournalCollection {
    /// Opens a new collection. Pass the user address for per-user runs,
    /// `None` for cycle-level or maintenance collections.
    pub fn open(user: Option<String>) -> Self {
        Self {
            opened_at: time_secs(),
            closed_at: None,
            user,
            entries: Vec::new(),
        }
    }

    /// Appends one entry carrying the outcome, its category, and a note
    pub fn append_note<S: AsRef<str>>(
        &mut self,
        entry: ManagerResult<()>,
        log_type: LogType,
        note: S,
    ) -> &mut Self {
        self.entries.push(JournalEntry {
            timestamp: time_secs(),
            entry,
            log_type,
            note: Some(note.as_ref().to_string()),
        });
        self
    }

    /// Commits the collection to the stable storage vector
    pub fn close(mut self) {
        self.closed_at = Some(time_secs());
        insert_journal_collection(&self);
    }

    /// True when every entry is a provider reputation adjustment.
    /// These collections are dropped wholesale by the cleanup task.
    pub fn is_reputation_change(&self) -> bool {
        !self.entries.is_empty()
            && self
                .entries
                .iter()
                .all(|entry| entry.log_type == LogType::ProviderReputationChange)
    }
}

impl Storable for JournalCollection {
    fn to_bytes(&self) -> Cow<[u8]> {
        Cow::Owned(Encode!(self).unwrap())
    }

    fn from_bytes(bytes: Cow<[u8]>) -> Self {
        Decode!(bytes.as_ref(), Self).unwrap()
    }

    const BOUND: Bound = Bound::Unbounded;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::ManagerError;

    #[test]
    fn entries_keep_append_order() {
        let mut collection = JournalCollection::open(None);
        collection.append_note(Ok(()), LogType::Info, "first");
        collection.append_note(
            Err(ManagerError::NonExistentValue),
            LogType::ExecutionResult,
            "second",
        );
        collection.append_note(Ok(()), LogType::Info, "third");

        let notes: Vec<_> = collection
            .entries
            .iter()
            .map(|e| e.note.clone().unwrap())
            .collect();
        assert_eq!(notes, vec!["first", "second", "third"]);
        assert!(collection.entries[1].entry.is_err());
    }

    #[test]
    fn reputation_detection_requires_uniform_entries() {
        let mut collection = JournalCollection::open(None);
        assert!(!collection.is_reputation_change());

        collection.append_note(Ok(()), LogType::ProviderReputationChange, "rank up");
        assert!(collection.is_reputation_change());

        collection.append_note(Ok(()), LogType::Info, "something else");
        assert!(!collection.is_reputation_change());
    }

    #[test]
    fn storable_round_trip() {
        let mut collection = JournalCollection::open(Some("0xabc".to_string()));
        collection.append_note(Ok(()), LogType::Migration, "swap confirmed");
        let bytes = collection.to_bytes();
        let decoded = JournalCollection::from_bytes(bytes);
        assert_eq!(decoded.user.as_deref(), Some("0xabc"));
        assert_eq!(decoded.entries.len(), 1);
    }
}
