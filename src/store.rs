//! Configuration store seam.
//!
//! The engine never persists anything itself; callers hand it a [`Store`].
//! [`MemoryStore`] backs the CLI and the tests.

use crate::error::StoreError;
use crate::types::{FieldValue, FlatRecord, FlatSection};

/// Section-oriented key/value store.
pub trait Store {
    /// Snapshot of one section.
    fn get(&self, section: &str) -> Option<&FlatSection>;

    /// Set a key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SectionNotFound` if the section does not exist.
    fn set(&mut self, section: &str, key: &str, value: FieldValue) -> Result<(), StoreError>;

    /// Remove a key. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SectionNotFound` if the section does not exist.
    fn unset(&mut self, section: &str, key: &str) -> Result<(), StoreError>;

    /// Create an empty section and return its fresh id.
    fn add(&mut self, section_type: &str) -> String;

    /// Delete a section.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SectionNotFound` if the section does not exist.
    fn remove(&mut self, section: &str) -> Result<FlatSection, StoreError>;

    /// Stage pending changes.
    ///
    /// # Errors
    ///
    /// Implementation-specific persistence failures.
    fn save(&mut self) -> Result<(), StoreError>;

    /// Activate staged changes.
    ///
    /// # Errors
    ///
    /// Implementation-specific activation failures.
    fn apply(&mut self) -> Result<(), StoreError>;
}

/// In-memory store over a [`FlatRecord`].
///
/// Ids are `cfg` followed by six hex digits from a counter that only grows,
/// so a deleted id is not handed out again until the counter wraps. An id
/// still present in the record is never handed out.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    record: FlatRecord,
    next_id: u32,
    pending: usize,
    saved: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing record. The id counter starts past every
    /// `cfgXXXXXX` id already present.
    pub fn from_record(record: FlatRecord) -> Self {
        let next_id = record
            .keys()
            .filter_map(|id| id.strip_prefix("cfg"))
            .filter_map(|hex| u32::from_str_radix(hex, 16).ok())
            .max()
            .map_or(1, |max| max.saturating_add(1));
        Self {
            record,
            next_id,
            pending: 0,
            saved: 0,
        }
    }

    pub fn record(&self) -> &FlatRecord {
        &self.record
    }

    pub fn into_record(self) -> FlatRecord {
        self.record
    }

    /// Changes made since the last save.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Number of successful saves.
    pub fn saves(&self) -> usize {
        self.saved
    }

    /// Take the next counter value. Past `u32::MAX` the counter wraps to 1;
    /// `add` skips ids that are still taken.
    fn next_fresh_id(&mut self) -> String {
        let n = self.next_id.max(1);
        self.next_id = n.checked_add(1).unwrap_or(1);
        format!("cfg{n:06x}")
    }

    fn section_mut(&mut self, section: &str) -> Result<&mut FlatSection, StoreError> {
        self.record
            .get_mut(section)
            .ok_or_else(|| StoreError::SectionNotFound {
                section: section.to_string(),
            })
    }
}

impl Store for MemoryStore {
    fn get(&self, section: &str) -> Option<&FlatSection> {
        self.record.get(section)
    }

    fn set(&mut self, section: &str, key: &str, value: FieldValue) -> Result<(), StoreError> {
        self.section_mut(section)?.set(key, value);
        self.pending += 1;
        Ok(())
    }

    fn unset(&mut self, section: &str, key: &str) -> Result<(), StoreError> {
        if self.section_mut(section)?.remove(key).is_some() {
            self.pending += 1;
        }
        Ok(())
    }

    fn add(&mut self, section_type: &str) -> String {
        let mut id = self.next_fresh_id();
        while self.record.contains_key(&id) {
            id = self.next_fresh_id();
        }
        self.record.insert(id.clone(), FlatSection::new(section_type));
        self.pending += 1;
        id
    }

    fn remove(&mut self, section: &str) -> Result<FlatSection, StoreError> {
        let removed = self
            .record
            .remove(section)
            .ok_or_else(|| StoreError::SectionNotFound {
                section: section.to_string(),
            })?;
        self.pending += 1;
        Ok(removed)
    }

    fn save(&mut self) -> Result<(), StoreError> {
        tracing::debug!(changes = self.pending, "saving store");
        self.pending = 0;
        self.saved += 1;
        Ok(())
    }

    fn apply(&mut self) -> Result<(), StoreError> {
        tracing::debug!("applying store");
        Ok(())
    }
}
