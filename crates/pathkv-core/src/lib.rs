//! pathkv-core
//!
//! Client core for a hierarchical, path-keyed, timestamped JSON store.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（key, pattern, entry, query, events, errors）
//! - **codec**: nanosecond instant と timezone なし timestamp の変換
//! - **config**: 接続パラメータとクライアントの振る舞い
//! - **ports**: 抽象化レイヤー（Engine, Connector, EventSource, Clock）
//! - **app**: アプリケーションロジック（Store, Listener）
//! - **impls**: 実装（InMemoryEngine など開発用）
//!
//! PostgreSQL 実装は `pathkv-pg` クレートにあります。

pub mod app;
pub mod codec;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use crate::app::{Listener, ListenerConfig, ListenerHandle, Store};
pub use crate::codec::{TemporalCodec, WallClock};
pub use crate::config::{DecodePolicy, StoreConfig};
pub use crate::domain::{Batch, ChangeEvent, Entry, ErrorKind, RowError, StoreError};
