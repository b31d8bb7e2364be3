//! Field-level contracts for record-processing stages.

use std::collections::BTreeSet;

use crate::record::Record;

/// Whether a proxy confines field access to the declared contract.
///
/// The mode is chosen explicitly at schema construction; it is never
/// inferred from how many fields were declared. A strict schema with no
/// declared fields is a valid, fully-closed contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Only declared fields are reachable through the proxy.
    Strict,
    /// Any field may be read or written.
    #[default]
    Permissive,
}

/// Accumulated field contract for one record-processing stage.
///
/// `require` and `provide` accumulate across calls: required fields must be
/// present (and non-null) on every input record before the handler runs;
/// provided fields must be present on every non-rejected output record
/// after it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    mode: AccessMode,
    requires: BTreeSet<String>,
    provides: BTreeSet<String>,
}

impl Schema {
    /// A contract that confines proxy access to the declared fields.
    pub fn strict() -> Self {
        Self {
            mode: AccessMode::Strict,
            ..Self::default()
        }
    }

    /// A contract that leaves proxy access open.
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Declare an input field the stage depends on. Readable through a
    /// strict proxy; checked for presence before the handler runs.
    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.requires.insert(field.into());
        self
    }

    /// Declare an output field the stage populates. Readable and writable
    /// through a strict proxy; checked for presence after the handler runs.
    pub fn provide(mut self, field: impl Into<String>) -> Self {
        self.provides.insert(field.into());
        self
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn is_strict(&self) -> bool {
        self.mode == AccessMode::Strict
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.requires.iter().map(String::as_str)
    }

    pub fn provided_fields(&self) -> impl Iterator<Item = &str> {
        self.provides.iter().map(String::as_str)
    }

    /// Whether a proxy under this contract may read `field`.
    pub(crate) fn readable(&self, field: &str) -> bool {
        match self.mode {
            AccessMode::Permissive => true,
            AccessMode::Strict => {
                self.requires.contains(field) || self.provides.contains(field)
            }
        }
    }

    /// Whether a proxy under this contract may write `field`.
    pub(crate) fn writable(&self, field: &str) -> bool {
        match self.mode {
            AccessMode::Permissive => true,
            AccessMode::Strict => self.provides.contains(field),
        }
    }

    /// First declared required field missing (or null) in `record`.
    pub(crate) fn missing_required(&self, record: &Record) -> Option<&str> {
        self.required_fields().find(|field| !record.has(field))
    }

    /// First declared provided field missing (or null) in `record`.
    pub(crate) fn missing_provided(&self, record: &Record) -> Option<&str> {
        self.provided_fields().find(|field| !record.has(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_schema_is_permissive_and_empty() {
        let schema = Schema::permissive();
        assert!(!schema.is_strict());
        assert_eq!(schema.required_fields().count(), 0);
        assert_eq!(schema.provided_fields().count(), 0);
    }

    #[test]
    fn declarations_accumulate_across_calls() {
        let schema = Schema::strict()
            .require("url")
            .require("etag")
            .provide("rss");
        assert_eq!(
            schema.required_fields().collect::<Vec<_>>(),
            vec!["etag", "url"]
        );
        assert_eq!(schema.provided_fields().collect::<Vec<_>>(), vec!["rss"]);
    }

    #[test]
    fn strict_reads_cover_required_and_provided() {
        let schema = Schema::strict().require("url").provide("rss");
        assert!(schema.readable("url"));
        assert!(schema.readable("rss"));
        assert!(!schema.readable("other"));
    }

    #[test]
    fn strict_writes_cover_provided_only() {
        let schema = Schema::strict().require("url").provide("rss");
        assert!(schema.writable("rss"));
        assert!(!schema.writable("url"));
        assert!(!schema.writable("other"));
    }

    #[test]
    fn permissive_allows_everything() {
        let schema = Schema::permissive();
        assert!(schema.readable("anything"));
        assert!(schema.writable("anything"));
    }

    #[test]
    fn strict_with_no_fields_is_fully_closed() {
        let schema = Schema::strict();
        assert!(schema.is_strict());
        assert!(!schema.readable("a"));
        assert!(!schema.writable("a"));
    }

    #[test]
    fn missing_required_finds_absent_and_null_fields() {
        let schema = Schema::strict().require("a").require("b");
        let mut record = Record::from_iter([("a", json!(1))]);
        assert_eq!(schema.missing_required(&record), Some("b"));
        record.set("b", serde_json::Value::Null);
        assert_eq!(schema.missing_required(&record), Some("b"));
        record.set("b", 2);
        assert_eq!(schema.missing_required(&record), None);
    }
}
