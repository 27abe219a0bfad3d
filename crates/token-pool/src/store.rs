//! Ordered pool of raw entries with a dual-keyed credential index
//!
//! The primary table maps each raw string to its credential record. Composite
//! entries additionally get a back-reference from their bare token to the raw
//! string, so a lookup by either key lands on the same record.

use std::collections::HashMap;

use common::Secret;

use crate::entry::{CredentialEntry, extract_token};

/// Credentials known for one pool entry.
#[derive(Debug, Clone, Default)]
pub struct CredentialRecord {
    pub email: String,
    pub password: Secret<String>,
    pub has_credentials: bool,
}

impl CredentialRecord {
    fn from_entry(entry: &CredentialEntry) -> Self {
        Self {
            email: entry.email().to_string(),
            password: Secret::from(entry.password()),
            has_credentials: entry.has_credentials(),
        }
    }
}

/// Pool entries in insertion order plus their credential index.
#[derive(Debug, Default)]
pub struct CredentialStore {
    entries: Vec<String>,
    records: HashMap<String, CredentialRecord>,
    tokens: HashMap<String, String>,
}

impl CredentialStore {
    /// Build a store from raw strings. Every string is accepted.
    pub fn parse(raw_list: Vec<String>) -> Self {
        let mut store = Self {
            entries: Vec::with_capacity(raw_list.len()),
            records: HashMap::with_capacity(raw_list.len()),
            tokens: HashMap::new(),
        };
        for raw in raw_list {
            store.index(&raw);
            store.entries.push(raw);
        }
        store
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw string at `position`.
    pub fn get(&self, position: usize) -> Option<&str> {
        self.entries.get(position).map(String::as_str)
    }

    /// Credential record for a raw string or a bare token.
    ///
    /// Unknown identifiers yield an empty record rather than an error.
    pub fn lookup(&self, id: &str) -> CredentialRecord {
        self.records
            .get(id)
            .or_else(|| self.tokens.get(id).and_then(|raw| self.records.get(raw)))
            .cloned()
            .unwrap_or_default()
    }

    /// Position of the first entry whose raw string or extracted token equals
    /// `token`.
    pub fn resolve(&self, token: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|raw| raw == token || extract_token(raw) == token)
    }

    /// Rewrite the entry at `position` as a composite and rewire the index.
    ///
    /// Returns the new raw string, or `None` when `position` is out of range.
    pub fn replace_at(
        &mut self,
        position: usize,
        email: &str,
        password: &str,
        token: &str,
    ) -> Option<String> {
        let raw = CredentialEntry::composite(email, password, token).raw();
        let old = std::mem::replace(self.entries.get_mut(position)?, raw.clone());

        // A duplicate of the old raw string elsewhere still needs its index
        if !self.entries.contains(&old) {
            self.unindex(&old);
        }
        self.index(&raw);
        Some(raw)
    }

    fn index(&mut self, raw: &str) {
        let entry = CredentialEntry::parse(raw);
        if let CredentialEntry::Composite { token, .. } = &entry {
            self.tokens.insert(token.clone(), raw.to_string());
        }
        self.records
            .insert(raw.to_string(), CredentialRecord::from_entry(&entry));
    }

    fn unindex(&mut self, raw: &str) {
        self.records.remove(raw);
        if let CredentialEntry::Composite { token, .. } = CredentialEntry::parse(raw) {
            if self.tokens.get(&token).is_some_and(|r| r == raw) {
                self.tokens.remove(&token);
            }
        }
    }
}
