//! Data-filter store
//!
//! Filters carrying a data directive (`csp=`) are not part of the category
//! index. They are kept per token hash in a chain, newest first, so every
//! matching directive can be collected for a URL.

use std::collections::HashMap;

use crate::filters::Filter;
use crate::selfie::DataEntrySelfie;
use crate::types::CategoryBits;

/// One data-holding filter.
#[derive(Debug, Clone)]
pub struct DataFilterEntry {
    pub category: CategoryBits,
    pub token_hash: u32,
    pub filter: Filter,
    next: Option<u32>,
}

/// Token-keyed chains of data-holding filters.
#[derive(Debug, Default)]
pub struct DataFilterStore {
    entries: Vec<DataFilterEntry>,
    heads: HashMap<u32, u32>,
}

impl DataFilterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.heads.clear();
    }

    /// Link a filter at the head of its token's chain.
    pub fn add(&mut self, category: CategoryBits, token_hash: u32, filter: Filter) {
        let id = self.entries.len() as u32;
        let next = self.heads.insert(token_hash, id);
        self.entries.push(DataFilterEntry {
            category,
            token_hash,
            filter,
            next,
        });
    }

    /// Entries stored under `token_hash`, newest first.
    pub fn chain(&self, token_hash: u32) -> Chain<'_> {
        Chain {
            store: self,
            cursor: self.heads.get(&token_hash).copied(),
        }
    }

    /// Every entry in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &DataFilterEntry> {
        self.entries.iter()
    }

    pub fn optimize(&mut self) {
        self.entries.shrink_to_fit();
    }

    pub fn to_selfie(&self) -> Vec<DataEntrySelfie> {
        self.entries
            .iter()
            .map(|entry| DataEntrySelfie {
                bits: entry.category,
                token_hash: entry.token_hash,
                filter: entry.filter.compile(),
            })
            .collect()
    }

    pub fn from_selfie(entries: Vec<DataEntrySelfie>) -> Self {
        let mut store = Self::new();
        for entry in entries {
            store.add(entry.bits, entry.token_hash, Filter::from_compiled(entry.filter));
        }
        store
    }
}

/// Iterator over one token chain.
pub struct Chain<'a> {
    store: &'a DataFilterStore,
    cursor: Option<u32>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a DataFilterEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.store.entries.get(self.cursor? as usize)?;
        self.cursor = entry.next;
        Some(entry)
    }
}
