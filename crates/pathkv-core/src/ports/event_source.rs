//! EventSource port - 変更通知チャネル（LISTEN/NOTIFY または InMemory）
//!
//! Listener はこの trait 越しに通知を受け取り、keep-alive を送ります。

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{ChangeEvent, StoreError};

/// EventSource は通知 payload（JSON テキスト）を 1 件ずつ返す
///
/// # 設計原則
/// - `recv` の `Ok(None)` はチャネルが閉じたことを意味する
/// - 接続エラーは `Err` で返す（Listener はそこで終了する）
#[async_trait]
pub trait EventSource: Send {
    async fn listen(&mut self, channel: &str) -> Result<(), StoreError>;

    async fn recv(&mut self) -> Result<Option<String>, StoreError>;

    async fn ping(&mut self) -> Result<(), StoreError>;
}

/// ChangeObserver は decode 済みの ChangeEvent を受け取る
pub trait ChangeObserver: Send + Sync {
    fn on_change(&self, event: ChangeEvent);
}

impl ChangeObserver for mpsc::UnboundedSender<ChangeEvent> {
    fn on_change(&self, event: ChangeEvent) {
        // receiver dropped: nobody is interested any more
        let _ = self.send(event);
    }
}
