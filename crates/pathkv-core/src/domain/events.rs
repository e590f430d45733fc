//! Events - 変更通知
//!
//! engine は書き込み・削除のたびに `{key, operation}` の JSON を
//! 通知チャネルへ送ります。

use serde::{Deserialize, Serialize};

use super::errors::StoreError;

/// Channel the engine notifies on.
pub const BROADCAST_CHANNEL: &str = "broadcast";

/// ChangeEvent は 1 件の変更通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(alias = "Key")]
    pub key: String,

    /// e.g. `insert`, `update`, `delete`
    #[serde(alias = "op", alias = "OP")]
    pub operation: String,
}

impl ChangeEvent {
    pub fn new(key: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operation: operation.into(),
        }
    }

    pub fn decode(payload: &str) -> Result<Self, StoreError> {
        serde_json::from_str(payload)
            .map_err(|e| StoreError::RowDecode(format!("change event: {e}")))
    }

    pub fn encode(&self) -> String {
        // two string fields; serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r#"{"key":"a/b","operation":"update"}"#)]
    #[case(r#"{"key":"a/b","op":"update"}"#)]
    #[case(r#"{"Key":"a/b","OP":"update"}"#)]
    fn decodes_envelope_spellings(#[case] payload: &str) {
        let event = ChangeEvent::decode(payload).unwrap();
        assert_eq!(event, ChangeEvent::new("a/b", "update"));
    }

    #[test]
    fn malformed_envelope_is_a_decode_error() {
        let err = ChangeEvent::decode("not json").unwrap_err();
        assert_eq!(err.kind(), crate::domain::ErrorKind::RowDecode);
    }

    #[test]
    fn encode_then_decode() {
        let event = ChangeEvent::new("x", "delete");
        assert_eq!(ChangeEvent::decode(&event.encode()).unwrap(), event);
    }
}
