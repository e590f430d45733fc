//! Store - クライアント本体
//!
//! # 状態遷移
//! `Uninitialized → Active → Closed`（`Closed → Active` も可）
//!
//! # ロック方針
//! - `start` / `close` は write lock を保持したまま接続・切断する
//! - データ操作は read lock で engine handle を clone するだけ
//! - engine への往復はロックを跨がない（1 操作 = 1 往復）

use std::sync::Arc;

use serde::Serialize;
use serde_json::value::RawValue;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::codec::TemporalCodec;
use crate::config::{DecodePolicy, StoreConfig};
use crate::domain::{
    Batch, Entry, Key, Pattern, Query, RowError, StoreError, TimeColumn, TimeWindow,
};
use crate::ports::{Clock, Connector, Engine, EntryRow, KeyRow, RowResult, SystemClock};

/// Client for a path-keyed, timestamped JSON store.
///
/// Shared between tasks as `Arc<Store>`. Instants are nanoseconds since the
/// Unix epoch; a `to` bound of `0` means "now".
pub struct Store {
    config: StoreConfig,
    connector: Arc<dyn Connector>,
    clock: Arc<dyn Clock>,
    codec: TemporalCodec,
    engine: RwLock<Option<Arc<dyn Engine>>>,
}

impl Store {
    pub fn new(config: StoreConfig, connector: Arc<dyn Connector>) -> Self {
        Self::with_clock(config, connector, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: StoreConfig,
        connector: Arc<dyn Connector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let codec = config.codec();
        Self {
            config,
            connector,
            clock,
            codec,
            engine: RwLock::new(None),
        }
    }

    /// Connects to the engine. A no-op when already active.
    ///
    /// # Errors
    /// - `Configuration` when the database name or host is missing
    /// - `Connection` when the engine cannot be reached
    pub async fn start(&self) -> Result<(), StoreError> {
        let mut slot = self.engine.write().await;
        if slot.is_some() {
            debug!("store already active");
            return Ok(());
        }

        self.config.validate()?;
        let engine = self.connector.connect(&self.config).await?;
        *slot = Some(engine);

        info!(
            database = %self.config.name,
            host = %self.config.host,
            port = self.config.port,
            "store started"
        );
        Ok(())
    }

    /// Releases the connection. Harmless when not active.
    pub async fn close(&self) {
        let mut slot = self.engine.write().await;
        if let Some(engine) = slot.take() {
            engine.close().await;
            info!(database = %self.config.name, "store closed");
        }
    }

    pub async fn is_active(&self) -> bool {
        self.engine.read().await.is_some()
    }

    /// Deletes every entry.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let engine = self.engine().await?;
        debug!(op = "clear", "engine call");
        engine.del(&Pattern::all()).await
    }

    /// Every key, in engine order.
    pub async fn keys(&self) -> Result<Batch<String>, StoreError> {
        let engine = self.engine().await?;
        debug!(op = "keys", "engine call");
        let rows = engine.peek(&Query::new(Pattern::all())).await?;
        self.collect("keys", rows, |row: KeyRow| Ok(row.key))
    }

    /// Keys matching `pattern` created within `[from, to]`, at most `limit`.
    pub async fn keys_range(
        &self,
        pattern: &str,
        from: i64,
        to: i64,
        limit: u32,
    ) -> Result<Batch<String>, StoreError> {
        let query = Query::new(Pattern::parse(pattern)?)
            .with_window(self.window(TimeColumn::Created, from, to))
            .with_limit(positive(limit)?);
        let engine = self.engine().await?;
        debug!(op = "keys_range", pattern, window = ?query.window, limit, "engine call");
        let rows = engine.peek(&query).await?;
        self.collect("keys_range", rows, |row: KeyRow| Ok(row.key))
    }

    pub async fn get(&self, pattern: &str) -> Result<Batch<Entry>, StoreError> {
        self.fetch("get", Query::new(Pattern::parse(pattern)?)).await
    }

    pub async fn get_n(&self, pattern: &str, limit: u32) -> Result<Batch<Entry>, StoreError> {
        let query = Query::new(Pattern::parse(pattern)?).with_limit(positive(limit)?);
        self.fetch("get_n", query).await
    }

    pub async fn get_range(
        &self,
        pattern: &str,
        from: i64,
        to: i64,
    ) -> Result<Batch<Entry>, StoreError> {
        let query = Query::new(Pattern::parse(pattern)?)
            .with_window(self.window(TimeColumn::Created, from, to));
        self.fetch("get_range", query).await
    }

    /// The window is applied before the limit.
    pub async fn get_n_range(
        &self,
        pattern: &str,
        from: i64,
        to: i64,
        limit: u32,
    ) -> Result<Batch<Entry>, StoreError> {
        let query = Query::new(Pattern::parse(pattern)?)
            .with_window(self.window(TimeColumn::Created, from, to))
            .with_limit(positive(limit)?);
        self.fetch("get_n_range", query).await
    }

    /// Entries whose last update falls within `[from, to]`. Never-updated
    /// entries are excluded.
    pub async fn get_updated_range(
        &self,
        pattern: &str,
        from: i64,
        to: i64,
    ) -> Result<Batch<Entry>, StoreError> {
        let query = Query::new(Pattern::parse(pattern)?)
            .with_window(self.window(TimeColumn::Updated, from, to));
        self.fetch("get_updated_range", query).await
    }

    /// Writes `value` (JSON text) under `key`.
    ///
    /// Returns the instant the engine recorded: `created` on first write,
    /// `updated` afterwards, `None` when the engine reports no change.
    ///
    /// # Errors
    /// - `InvalidKey` / `Payload` before anything reaches the engine
    pub async fn set(&self, key: &str, value: &str) -> Result<Option<i64>, StoreError> {
        let key = Key::parse(key)?;
        serde_json::from_str::<&RawValue>(value)
            .map_err(|e| StoreError::Payload(e.to_string()))?;

        let engine = self.engine().await?;
        debug!(op = "set", key = %key, bytes = value.len(), "engine call");
        engine
            .set(&key, value)
            .await?
            .map(|stamp| self.codec.decode_naive(stamp))
            .transpose()
    }

    /// Serializes `value` and writes it under `key`.
    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<Option<i64>, StoreError> {
        let text = serde_json::to_string(value).map_err(|e| StoreError::Payload(e.to_string()))?;
        self.set(key, &text).await
    }

    /// Deletes every entry matching `pattern`.
    pub async fn del(&self, pattern: &str) -> Result<(), StoreError> {
        let pattern = Pattern::parse(pattern)?;
        let engine = self.engine().await?;
        debug!(op = "del", pattern = %pattern, "engine call");
        engine.del(&pattern).await
    }

    async fn engine(&self) -> Result<Arc<dyn Engine>, StoreError> {
        self.engine.read().await.clone().ok_or(StoreError::NotActive)
    }

    async fn fetch(&self, op: &'static str, query: Query) -> Result<Batch<Entry>, StoreError> {
        let engine = self.engine().await?;
        debug!(
            op,
            pattern = %query.pattern,
            window = ?query.window,
            limit = ?query.limit,
            "engine call"
        );
        let rows = engine.get(&query).await?;
        self.collect(op, rows, |row| self.entry(row))
    }

    fn entry(&self, row: EntryRow) -> Result<Entry, StoreError> {
        Ok(Entry {
            created: self.codec.decode_naive(row.created)?,
            updated: row
                .updated
                .map(|stamp| self.codec.decode_naive(stamp))
                .transpose()?,
            key: row.key,
            payload: row.payload,
        })
    }

    fn window(&self, column: TimeColumn, from: i64, to: i64) -> TimeWindow {
        let to = if to == 0 { self.clock.now_nanos() } else { to };
        TimeWindow {
            column,
            from: self.codec.encode(from),
            to: self.codec.encode(to),
        }
    }

    fn collect<R, T>(
        &self,
        op: &'static str,
        rows: Vec<RowResult<R>>,
        mut convert: impl FnMut(R) -> Result<T, StoreError>,
    ) -> Result<Batch<T>, StoreError> {
        let mut batch = Batch::new();
        for (row, result) in rows.into_iter().enumerate() {
            match result.and_then(&mut convert) {
                Ok(item) => batch.items.push(item),
                Err(source) => match self.config.row_policy {
                    DecodePolicy::Fail => return Err(source),
                    DecodePolicy::Skip => {
                        warn!(op, row, error = %source, "skipping undecodable row");
                        batch.errors.push(RowError { row, source });
                    }
                },
            }
        }
        Ok(batch)
    }
}

fn positive(limit: u32) -> Result<u32, StoreError> {
    if limit == 0 {
        return Err(StoreError::Configuration("limit must be positive".into()));
    }
    Ok(limit)
}
