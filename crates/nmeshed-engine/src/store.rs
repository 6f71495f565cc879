// Copyright (C) 2026 The Nmeshed Authors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The mapping from key to encoded value bytes. Owned exclusively by
//! [`crate::SyncEngine`]; no other component writes it.

use std::collections::BTreeMap;

#[derive(Clone, Debug, Default)]
struct Entry {
    value: Vec<u8>,
    timestamp: u64,
}

#[derive(Debug, Default)]
pub struct Store {
    entries: BTreeMap<String, Entry>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(|e| e.value.as_slice())
    }

    pub fn timestamp_of(&self, key: &str) -> Option<u64> {
        self.entries.get(key).map(|e| e.timestamp)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Vec<u8>, timestamp: u64) {
        self.entries.insert(key.into(), Entry { value, timestamp });
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn replace_all(&mut self, entries: BTreeMap<String, Vec<u8>>, timestamp: u64) {
        self.entries = entries
            .into_iter()
            .map(|(k, value)| (k, Entry { value, timestamp }))
            .collect();
    }

    pub fn all_values(&self) -> BTreeMap<String, Vec<u8>> {
        self.entries
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
