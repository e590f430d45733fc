//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryEngine**: 開発用の engine（PostgreSQL の stored function と同じ契約）
//! - **InMemoryConnector**: InMemoryEngine を渡す Connector
//! - **InMemoryEventSource**: InMemoryEngine の変更通知を受け取る EventSource
//!
//! # 本番用実装
//! 本番用の実装は別クレート `pathkv-pg` に配置します。

pub mod memory;

// 主要な型を再エクスポート
pub use self::memory::{InMemoryConnector, InMemoryEngine, InMemoryEventSource};
