//! Engine port - リモート key-value engine（PostgreSQL または InMemory）
//!
//! engine は 4 つの呼び出しだけを公開します：
//! - `get(pattern)`  → (key, created, updated, payload) の行
//! - `peek(pattern)` → (created, key, updated) の行（payload なし）
//! - `set(key, payload)` → 触れた行の timestamp
//! - `del(pattern)`
//!
//! # 設計原則
//! - パラメータは常に bind する（呼び出しテキストへの連結は禁止）
//! - 時刻境界は timezone なしのテキストで渡す（`TimeWindow`）
//! - timestamp は engine が保存した wall-clock の数字のまま返す（NaiveDateTime）
//! - 行単位の decode 失敗は `Err` 要素として返し、呼び出し全体は失敗させない

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::value::RawValue;

use crate::config::StoreConfig;
use crate::domain::{Key, Pattern, Query, StoreError};

/// A GET row as stored by the engine.
#[derive(Debug, Clone)]
pub struct EntryRow {
    pub key: String,
    pub created: NaiveDateTime,
    pub updated: Option<NaiveDateTime>,
    pub payload: Box<RawValue>,
}

/// A PEEK row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRow {
    pub created: NaiveDateTime,
    pub key: String,
    pub updated: Option<NaiveDateTime>,
}

/// One row of a multi-row response.
pub type RowResult<T> = Result<T, StoreError>;

/// Engine は 1 接続（または pool）越しの 4 操作
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数 caller から同時に呼ばれる）
#[async_trait]
pub trait Engine: Send + Sync {
    async fn get(&self, query: &Query) -> Result<Vec<RowResult<EntryRow>>, StoreError>;

    async fn peek(&self, query: &Query) -> Result<Vec<RowResult<KeyRow>>, StoreError>;

    /// Writes `payload` (JSON text) under `key`.
    ///
    /// Returns the timestamp the engine recorded: `created` on first write,
    /// `updated` afterwards, `None` when the engine reports no change.
    async fn set(&self, key: &Key, payload: &str) -> Result<Option<NaiveDateTime>, StoreError>;

    async fn del(&self, pattern: &Pattern) -> Result<(), StoreError>;

    /// Releases the underlying connection(s).
    async fn close(&self) {}
}

/// Connector は設定から Engine を作る（`Store::start` が使う）
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &StoreConfig) -> Result<Arc<dyn Engine>, StoreError>;
}
