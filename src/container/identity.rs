//! Deterministic container fingerprints.
//!
//! A fingerprint is the CRC32 of a container's identifying fields. Fields are
//! sorted by name before hashing so the order in which a resource declares
//! them does not matter, and absent values are skipped entirely.

use crate::types::Fingerprint;

const FIELD_SEPARATOR: &str = "$$$$$";

/// Identifying fields of one backend resource.
///
/// Only stable fields belong here. Transient values such as an instance id
/// that changes on recreate must be left out, otherwise the registry would
/// treat the recreated resource as a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    fields: Vec<(&'static str, String)>,
}

impl Identity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required identifying field.
    pub fn field(mut self, name: &'static str, value: impl ToString) -> Self {
        self.fields.push((name, value.to_string()));
        self
    }

    /// Add a field that only contributes when present.
    pub fn optional<V: ToString>(self, name: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.field(name, v),
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Canonical string the checksum is computed over.
    pub fn canonical(&self) -> String {
        let mut fields: Vec<_> = self.fields.iter().collect();
        fields.sort();
        fields
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(FIELD_SEPARATOR)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(crc32fast::hash(self.canonical().as_bytes()) as u64)
    }
}
