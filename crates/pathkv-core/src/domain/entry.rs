//! Entry model and multi-row read results.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use super::errors::RowError;

/// One stored key's current value plus its creation/update instants.
///
/// Instants are nanoseconds since the Unix epoch. `updated` stays `None` until
/// the key is overwritten; when present it is never earlier than `created`.
///
/// Serialized as `{"created": .., "updated": .., "key": .., "value": ..}` with
/// the payload embedded verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub created: i64,
    pub updated: Option<i64>,
    pub key: String,
    #[serde(rename = "value")]
    pub payload: Box<RawValue>,
}

impl Entry {
    /// Payload text exactly as the engine returned it.
    pub fn payload_str(&self) -> &str {
        self.payload.get()
    }

    /// Most recent write instant.
    pub fn last_modified(&self) -> i64 {
        self.updated.unwrap_or(self.created)
    }
}

/// Result of a multi-row read: the rows that decoded, plus the ones that did not.
///
/// Whole-operation failures never end up here; they are returned as `Err`.
#[derive(Debug)]
pub struct Batch<T> {
    pub items: Vec<T>,
    pub errors: Vec<RowError>,
}

impl<T> Batch<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// True when every row decoded.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IntoIterator for Batch<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(updated: Option<i64>) -> Entry {
        Entry {
            created: 10,
            updated,
            key: "test/1".to_string(),
            payload: RawValue::from_string(r#"{"ob":"test ✔⚓🛸🛴"}"#.to_string()).unwrap(),
        }
    }

    #[test]
    fn entry_serializes_payload_verbatim() {
        let s = serde_json::to_string(&entry(Some(20))).unwrap();
        assert_eq!(
            s,
            r#"{"created":10,"updated":20,"key":"test/1","value":{"ob":"test ✔⚓🛸🛴"}}"#
        );
    }

    #[test]
    fn entry_roundtrip_keeps_payload_bytes() {
        let s = serde_json::to_string(&entry(None)).unwrap();
        let back: Entry = serde_json::from_str(&s).unwrap();
        assert_eq!(back.payload_str(), r#"{"ob":"test ✔⚓🛸🛴"}"#);
        assert_eq!(back.updated, None);
    }

    #[test]
    fn last_modified_prefers_updated() {
        assert_eq!(entry(None).last_modified(), 10);
        assert_eq!(entry(Some(20)).last_modified(), 20);
    }
}
