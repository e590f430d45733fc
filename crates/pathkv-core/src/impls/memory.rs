//! InMemoryEngine - 開発用・テスト用の engine
//!
//! PostgreSQL の stored function と同じ契約を守ります：
//! - timestamp は timezone なしの wall-clock（設定した zone の数字）で保存
//! - `*` は 1 segment にマッチ、`*` 単体は全 key にマッチ
//! - 結果は created の新しい順
//! - 書き込み・削除のたびに `{key, operation}` を broadcast チャネルへ通知

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::value::RawValue;
use tokio::sync::{Mutex, broadcast};
use tracing::warn;

use crate::codec::{TemporalCodec, WallClock, parse_naive};
use crate::config::StoreConfig;
use crate::domain::events::BROADCAST_CHANNEL;
use crate::domain::key::{SEPARATOR, WILDCARD};
use crate::domain::{ChangeEvent, Key, Pattern, PatternKind, Query, StoreError, TimeColumn};
use crate::ports::{Clock, Connector, Engine, EntryRow, EventSource, KeyRow, RowResult};

const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone)]
struct StoredEntry {
    created: NaiveDateTime,
    updated: Option<NaiveDateTime>,
    payload: Box<RawValue>,
    /// Insertion order, breaks ties between equal `created` stamps.
    seq: u64,
}

#[derive(Default)]
struct InMemoryState {
    entries: HashMap<String, StoredEntry>,
    next_seq: u64,
}

impl InMemoryState {
    /// Matching entries, most recent first, window applied before the limit.
    fn select(&self, query: &Query) -> Result<Vec<(&String, &StoredEntry)>, StoreError> {
        let window = match &query.window {
            Some(w) => Some((w.column, parse_naive(&w.from)?, parse_naive(&w.to)?)),
            None => None,
        };

        let mut hits: Vec<(&String, &StoredEntry)> = self
            .entries
            .iter()
            .filter(|(key, _)| matches(&query.pattern, key))
            .filter(|(_, entry)| {
                window.is_none_or(|(column, from, to)| {
                    let stamp = match column {
                        TimeColumn::Created => Some(entry.created),
                        TimeColumn::Updated => entry.updated,
                    };
                    stamp.is_some_and(|s| s >= from && s <= to)
                })
            })
            .collect();

        hits.sort_by(|(_, a), (_, b)| b.created.cmp(&a.created).then(b.seq.cmp(&a.seq)));
        if let Some(limit) = query.limit {
            hits.truncate(limit as usize);
        }
        Ok(hits)
    }
}

/// Whether `key` matches `pattern` under the engine's segment-glob rules.
pub fn matches(pattern: &Pattern, key: &str) -> bool {
    match pattern.kind() {
        PatternKind::All => true,
        PatternKind::Exact => pattern.as_str() == key,
        PatternKind::Children => pattern
            .parent()
            .and_then(|parent| key.strip_prefix(parent))
            .and_then(|rest| rest.strip_prefix(SEPARATOR))
            .is_some_and(|child| !child.is_empty() && !child.contains(SEPARATOR)),
        PatternKind::Glob => {
            let wildcard = WILDCARD.to_string();
            let mut pattern_segments = pattern.as_str().split(SEPARATOR);
            let mut key_segments = key.split(SEPARATOR);
            loop {
                match (pattern_segments.next(), key_segments.next()) {
                    (None, None) => return true,
                    (Some(p), Some(k)) if p == wildcard || p == k => continue,
                    _ => return false,
                }
            }
        }
    }
}

/// In-memory engine.
pub struct InMemoryEngine {
    state: Mutex<InMemoryState>,
    clock: Arc<dyn Clock>,
    codec: TemporalCodec,
    events: broadcast::Sender<(String, String)>,
}

impl InMemoryEngine {
    /// `zone` is the wall clock the engine writes its naive timestamps in.
    pub fn new(clock: Arc<dyn Clock>, zone: WallClock) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Mutex::new(InMemoryState::default()),
            clock,
            codec: TemporalCodec::new(zone),
            events,
        }
    }

    pub fn subscribe(&self) -> InMemoryEventSource {
        InMemoryEventSource {
            rx: self.events.subscribe(),
            channel: None,
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stores a row verbatim, bypassing timestamping. For seeding tests.
    pub async fn insert_raw(
        &self,
        key: &str,
        created: NaiveDateTime,
        updated: Option<NaiveDateTime>,
        payload: Box<RawValue>,
    ) {
        let mut state = self.state.lock().await;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            key.to_string(),
            StoredEntry {
                created,
                updated,
                payload,
                seq,
            },
        );
    }

    fn publish(&self, key: &str, operation: &str) {
        // no subscribers is fine
        let _ = self.events.send((
            BROADCAST_CHANNEL.to_string(),
            ChangeEvent::new(key, operation).encode(),
        ));
    }
}

#[async_trait]
impl Engine for InMemoryEngine {
    async fn get(&self, query: &Query) -> Result<Vec<RowResult<EntryRow>>, StoreError> {
        let state = self.state.lock().await;
        let rows = state
            .select(query)?
            .into_iter()
            .map(|(key, entry)| {
                Ok(EntryRow {
                    key: key.clone(),
                    created: entry.created,
                    updated: entry.updated,
                    payload: entry.payload.clone(),
                })
            })
            .collect();
        Ok(rows)
    }

    async fn peek(&self, query: &Query) -> Result<Vec<RowResult<KeyRow>>, StoreError> {
        let state = self.state.lock().await;
        let rows = state
            .select(query)?
            .into_iter()
            .map(|(key, entry)| {
                Ok(KeyRow {
                    created: entry.created,
                    key: key.clone(),
                    updated: entry.updated,
                })
            })
            .collect();
        Ok(rows)
    }

    async fn set(&self, key: &Key, payload: &str) -> Result<Option<NaiveDateTime>, StoreError> {
        let payload: Box<RawValue> =
            serde_json::from_str(payload).map_err(|e| StoreError::Payload(e.to_string()))?;
        let now = self.codec.to_naive(self.clock.now_nanos());

        let (stamp, operation) = {
            let mut state = self.state.lock().await;
            match state.entries.get_mut(key.as_str()) {
                Some(entry) => {
                    let stamp = now.max(entry.created);
                    entry.updated = Some(stamp);
                    entry.payload = payload;
                    (stamp, "update")
                }
                None => {
                    let seq = state.next_seq;
                    state.next_seq += 1;
                    state.entries.insert(
                        key.as_str().to_string(),
                        StoredEntry {
                            created: now,
                            updated: None,
                            payload,
                            seq,
                        },
                    );
                    (now, "insert")
                }
            }
        };

        self.publish(key.as_str(), operation);
        Ok(Some(stamp))
    }

    async fn del(&self, pattern: &Pattern) -> Result<(), StoreError> {
        let removed: Vec<String> = {
            let mut state = self.state.lock().await;
            let doomed: Vec<String> = state
                .entries
                .keys()
                .filter(|key| matches(pattern, key))
                .cloned()
                .collect();
            for key in &doomed {
                state.entries.remove(key);
            }
            doomed
        };

        for key in &removed {
            self.publish(key, "delete");
        }
        Ok(())
    }
}

/// Connector handing out one shared InMemoryEngine, so data survives close/start.
#[derive(Clone)]
pub struct InMemoryConnector {
    engine: Arc<InMemoryEngine>,
}

impl InMemoryConnector {
    pub fn new(engine: Arc<InMemoryEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn connect(&self, _config: &StoreConfig) -> Result<Arc<dyn Engine>, StoreError> {
        Ok(self.engine.clone())
    }
}

/// EventSource fed by an InMemoryEngine's change notifications.
pub struct InMemoryEventSource {
    rx: broadcast::Receiver<(String, String)>,
    channel: Option<String>,
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn listen(&mut self, channel: &str) -> Result<(), StoreError> {
        self.channel = Some(channel.to_string());
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>, StoreError> {
        let Some(listening) = self.channel.as_deref() else {
            return Err(StoreError::Connection("recv before listen".into()));
        };
        loop {
            match self.rx.recv().await {
                Ok((channel, payload)) if channel == listening => return Ok(Some(payload)),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "in-memory event source lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }

    async fn ping(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}
