//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（PostgreSQL の stored function、LISTEN/NOTIFY）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - engine が source of truth（正本）。matching / indexing は engine の責務
//! - クライアントは request の整形と response の decode だけを担う

pub mod clock;
pub mod engine;
pub mod event_source;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::engine::{Connector, Engine, EntryRow, KeyRow, RowResult};
pub use self::event_source::{ChangeObserver, EventSource};
