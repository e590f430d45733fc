//! Key and pattern validation.
//!
//! A key is a `/`-delimited path such as `sensors/room1/temp`. Writes take a
//! literal [`Key`]; reads and deletes take a [`Pattern`], which may contain
//! wildcards that only the engine evaluates in full.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::StoreError;

pub const SEPARATOR: char = '/';
pub const WILDCARD: char = '*';

/// A literal, writable key.
///
/// Invariants (checked by [`Key::parse`]):
/// - not empty
/// - no wildcard marker anywhere (`*`, `**`, `a/*`)
/// - no empty segment (leading `/`, trailing `/`, `//`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key(String);

impl Key {
    pub fn parse(key: impl Into<String>) -> Result<Self, StoreError> {
        let key = key.into();
        validate_literal(&key)?;
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parent path, `None` for a single-segment key.
    pub fn parent(&self) -> Option<&str> {
        self.0.rsplit_once(SEPARATOR).map(|(parent, _)| parent)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for Key {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Key::parse(value)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0
    }
}

/// Checks that `key` could be the target of a write.
pub fn validate_literal(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::invalid_key(key, "key is empty"));
    }
    if key.contains(WILDCARD) {
        return Err(StoreError::invalid_key(key, "key contains a wildcard"));
    }
    if key.split(SEPARATOR).any(str::is_empty) {
        return Err(StoreError::invalid_key(key, "key has an empty segment"));
    }
    Ok(())
}

/// How a read/delete pattern is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    /// `*`: every key.
    All,
    /// A literal key: exact match.
    Exact,
    /// `parent/*`: every key exactly one level below `parent`.
    Children,
    /// Any other shape. Forwarded untouched; the engine decides what matches.
    Glob,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    raw: String,
    kind: PatternKind,
}

impl Pattern {
    pub fn parse(pattern: impl Into<String>) -> Result<Self, StoreError> {
        let raw = pattern.into();
        if raw.is_empty() {
            return Err(StoreError::invalid_key(&raw, "pattern is empty"));
        }
        let kind = classify_pattern(&raw);
        Ok(Self { raw, kind })
    }

    pub fn all() -> Self {
        Self {
            raw: WILDCARD.to_string(),
            kind: PatternKind::All,
        }
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parent path of a `Children` pattern.
    pub fn parent(&self) -> Option<&str> {
        match self.kind {
            PatternKind::Children => self.raw.strip_suffix("/*"),
            _ => None,
        }
    }
}

impl From<Key> for Pattern {
    fn from(key: Key) -> Self {
        Self {
            raw: key.0,
            kind: PatternKind::Exact,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.raw.fmt(f)
    }
}

pub fn classify_pattern(pattern: &str) -> PatternKind {
    if pattern == "*" {
        return PatternKind::All;
    }
    if validate_literal(pattern).is_ok() {
        return PatternKind::Exact;
    }
    match pattern.strip_suffix("/*") {
        Some(parent) if validate_literal(parent).is_ok() => PatternKind::Children,
        _ => PatternKind::Glob,
    }
}
