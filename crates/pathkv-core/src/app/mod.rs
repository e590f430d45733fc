//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてクライアントの振る舞いを実装します。
//!
//! # 主要コンポーネント
//! - **Store**: start / close とデータ操作（keys, get, set, del, ...）
//! - **Listener**: 変更通知の購読ループ（keep-alive ping 付き）

pub mod listener;
pub mod store;

// 主要な型を再エクスポート
pub use self::listener::{Listener, ListenerConfig, ListenerHandle};
pub use self::store::Store;
