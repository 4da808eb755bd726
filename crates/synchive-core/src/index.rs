use std::collections::btree_map::{self, BTreeMap};

use crate::hasher::{DirKey, UniqueId};

/// Whether a known destination file was matched by the current source pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    NotFound,
    Found,
}

/// Known file identifiers of one destination directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    key: DirKey,
    folder_name: String,
    files: BTreeMap<UniqueId, Presence>,
}

impl DirectoryEntry {
    pub fn new(key: DirKey) -> Self {
        let folder_name = key.folder_name().to_string();
        Self {
            key,
            folder_name,
            files: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &DirKey {
        &self.key
    }

    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    /// Register an identifier as `NotFound`. An existing flag is left untouched.
    pub fn insert(&mut self, id: UniqueId) {
        self.files.entry(id).or_insert(Presence::NotFound);
    }

    /// Flag an identifier as `Found`, adding it if needed. Returns whether it was
    /// already known.
    pub fn mark_found(&mut self, id: UniqueId) -> bool {
        self.files.insert(id, Presence::Found).is_some()
    }

    pub fn contains(&self, id: &UniqueId) -> bool {
        self.files.contains_key(id)
    }

    pub fn presence(&self, id: &UniqueId) -> Option<Presence> {
        self.files.get(id).copied()
    }

    pub fn remove(&mut self, id: &UniqueId) -> Option<Presence> {
        self.files.remove(id)
    }

    /// Identifiers not matched by the source: deletion candidates once the pass is over.
    pub fn not_found(&self) -> Vec<UniqueId> {
        self.files
            .iter()
            .filter(|(_, presence)| **presence == Presence::NotFound)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn found(&self) -> impl Iterator<Item = &UniqueId> {
        self.files
            .iter()
            .filter(|(_, presence)| **presence == Presence::Found)
            .map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> btree_map::Iter<'_, UniqueId, Presence> {
        self.files.iter()
    }
}

/// Directory key → entry for the whole destination tree.
///
/// Owned by a single engine run and mutated in place without locking. Any
/// concurrent extension of the run has to synchronize access here first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationIndex {
    entries: BTreeMap<DirKey, DirectoryEntry>,
}

impl DestinationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &DirKey) -> Option<&DirectoryEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &DirKey) -> Option<&mut DirectoryEntry> {
        self.entries.get_mut(key)
    }

    /// Entry for `key`, created empty when missing.
    pub fn entry_or_insert(&mut self, key: DirKey) -> &mut DirectoryEntry {
        self.entries
            .entry(key.clone())
            .or_insert_with(|| DirectoryEntry::new(key))
    }

    pub fn insert(&mut self, entry: DirectoryEntry) -> Option<DirectoryEntry> {
        self.entries.insert(entry.key().clone(), entry)
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&DirKey, &DirectoryEntry) -> bool,
    {
        self.entries.retain(|key, entry| keep(key, entry));
    }

    pub fn keys(&self) -> impl Iterator<Item = &DirKey> {
        self.entries.keys()
    }

    /// Entries in key order (shallowest directories first).
    pub fn iter(&self) -> btree_map::Values<'_, DirKey, DirectoryEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.entries.values().map(DirectoryEntry::len).sum()
    }

    pub fn found_count(&self) -> usize {
        self.entries.values().map(|entry| entry.found().count()).sum()
    }
}
