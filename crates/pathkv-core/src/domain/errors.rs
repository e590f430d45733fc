//! Errors - エラー型と分類
//!
//! `StoreError` はクライアントが返すすべての失敗を表し、
//! `ErrorKind` はその運用上の分類を提供します。

use thiserror::Error;

/// ErrorKind は StoreError の分類
///
/// # 分類
/// - Configuration: 接続パラメータ不足など（start 時に致命的）
/// - Connection: engine に到達できない、接続が失われた、未 start
/// - InvalidKey: 書き込み不可能な key
/// - Payload: JSON として不正な値
/// - TimestampFormat: 保存済み timestamp を解釈できない
/// - RowDecode: その他の行形状の不一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Connection,
    InvalidKey,
    Payload,
    TimestampFormat,
    RowDecode,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("store is not active")]
    NotActive,

    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("invalid payload: {0}")]
    Payload(String),

    #[error("invalid timestamp {value:?}: {reason}")]
    TimestampFormat { value: String, reason: String },

    #[error("row decode error: {0}")]
    RowDecode(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Configuration(_) => ErrorKind::Configuration,
            StoreError::Connection(_) | StoreError::NotActive => ErrorKind::Connection,
            StoreError::InvalidKey { .. } => ErrorKind::InvalidKey,
            StoreError::Payload(_) => ErrorKind::Payload,
            StoreError::TimestampFormat { .. } => ErrorKind::TimestampFormat,
            StoreError::RowDecode(_) => ErrorKind::RowDecode,
        }
    }

    pub(crate) fn invalid_key(key: &str, reason: &'static str) -> Self {
        StoreError::InvalidKey {
            key: key.to_string(),
            reason,
        }
    }

    pub(crate) fn timestamp(value: impl ToString, reason: impl Into<String>) -> Self {
        StoreError::TimestampFormat {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// A row that could not be decoded during a multi-row read.
#[derive(Debug, Error)]
#[error("row {row}: {source}")]
pub struct RowError {
    /// Position of the row in the engine's response.
    pub row: usize,
    #[source]
    pub source: StoreError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::config(StoreError::Configuration("x".into()), ErrorKind::Configuration)]
    #[case::connection(StoreError::Connection("x".into()), ErrorKind::Connection)]
    #[case::not_active(StoreError::NotActive, ErrorKind::Connection)]
    #[case::key(StoreError::invalid_key("a//b", "empty segment"), ErrorKind::InvalidKey)]
    #[case::payload(StoreError::Payload("x".into()), ErrorKind::Payload)]
    #[case::timestamp(StoreError::timestamp("nope", "bad"), ErrorKind::TimestampFormat)]
    #[case::row(StoreError::RowDecode("x".into()), ErrorKind::RowDecode)]
    fn errors_are_classified(#[case] err: StoreError, #[case] kind: ErrorKind) {
        assert_eq!(err.kind(), kind);
    }

    #[test]
    fn row_error_mentions_position() {
        let err = RowError {
            row: 3,
            source: StoreError::RowDecode("missing column".into()),
        };
        assert_eq!(err.to_string(), "row 3: row decode error: missing column");
    }
}
