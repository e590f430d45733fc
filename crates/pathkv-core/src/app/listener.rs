//! Listener - 変更通知の購読ループ
//!
//! # フロー
//! 1. `EventSource::listen(channel)`
//! 2. `select!` で shutdown / 通知 / keep-alive timer を待つ
//! 3. 通知は ChangeEvent に decode して ChangeObserver へ渡す
//!
//! Store とは状態を共有しない（Listener の失敗は Store に影響しない）。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::DecodePolicy;
use crate::domain::{BROADCAST_CHANNEL, ChangeEvent, StoreError};
use crate::ports::{ChangeObserver, EventSource};

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub channel: String,
    /// Keep-alive period, independent of event arrival.
    pub ping_interval: Duration,
    /// What to do with a notification that is not a `{key, operation}` envelope.
    pub decode_policy: DecodePolicy,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            channel: BROADCAST_CHANNEL.to_string(),
            ping_interval: DEFAULT_PING_INTERVAL,
            decode_policy: DecodePolicy::Fail,
        }
    }
}

/// Listener は EventSource から通知を受け取り続ける
pub struct Listener<S> {
    source: S,
    observer: Arc<dyn ChangeObserver>,
    config: ListenerConfig,
}

impl<S: EventSource + 'static> Listener<S> {
    pub fn new(source: S, observer: Arc<dyn ChangeObserver>, config: ListenerConfig) -> Self {
        Self {
            source,
            observer,
            config,
        }
    }

    /// Runs until shutdown is requested (`Ok`), the channel closes (`Ok`), or
    /// the source fails (`Err`).
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> Result<(), StoreError> {
        self.source.listen(&self.config.channel).await?;
        info!(channel = %self.config.channel, "listening for changes");

        let mut ping = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.ping_interval,
            self.config.ping_interval,
        );
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    // sender dropped counts as shutdown
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    debug!(channel = %self.config.channel, "keep-alive ping");
                    self.source.ping().await?;
                }
                received = self.source.recv() => {
                    let Some(payload) = received? else {
                        info!(channel = %self.config.channel, "notification channel closed");
                        break;
                    };
                    self.dispatch(&payload)?;
                }
            }
        }

        info!(channel = %self.config.channel, "listener stopped");
        Ok(())
    }

    /// Spawns the loop onto the runtime.
    pub fn spawn(self) -> ListenerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let result = self.run(shutdown_rx).await;
            if let Err(e) = &result {
                warn!(error = %e, "listener terminated");
            }
            result
        });
        ListenerHandle { shutdown_tx, join }
    }

    fn dispatch(&self, payload: &str) -> Result<(), StoreError> {
        match ChangeEvent::decode(payload) {
            Ok(event) => {
                debug!(key = %event.key, operation = %event.operation, "change");
                self.observer.on_change(event);
                Ok(())
            }
            Err(e) => match self.config.decode_policy {
                DecodePolicy::Fail => Err(e),
                DecodePolicy::Skip => {
                    warn!(error = %e, payload, "skipping undecodable notification");
                    Ok(())
                }
            },
        }
    }
}

/// Handle to a spawned listener.
/// - `shutdown_tx` を drop すると listener は止まる
pub struct ListenerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<Result<(), StoreError>>,
}

impl ListenerHandle {
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the loop without asking it to stop.
    pub async fn join(self) -> Result<(), StoreError> {
        self.join
            .await
            .map_err(|e| StoreError::Connection(format!("listener task failed: {e}")))?
    }

    pub async fn shutdown_and_join(self) -> Result<(), StoreError> {
        self.request_shutdown();
        self.join().await
    }
}
