//! LISTEN/NOTIFY event source.

use async_trait::async_trait;
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions};
use tracing::debug;

use pathkv_core::ports::EventSource;
use pathkv_core::{StoreConfig, StoreError};

use crate::engine::connect_options;
use crate::error::map_sqlx;

/// One dedicated connection subscribed with `LISTEN`.
///
/// A dropped connection is reported as an error instead of silently
/// reconnecting, so the listener loop terminates and the caller decides.
pub struct PgEventSource {
    listener: PgListener,
}

impl PgEventSource {
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(config.acquire_timeout())
            .connect_with(connect_options(config)?)
            .await
            .map_err(map_sqlx)?;
        Self::from_pool(&pool).await
    }

    pub async fn from_pool(pool: &PgPool) -> Result<Self, StoreError> {
        let listener = PgListener::connect_with(pool).await.map_err(map_sqlx)?;
        Ok(Self { listener })
    }
}

#[async_trait]
impl EventSource for PgEventSource {
    async fn listen(&mut self, channel: &str) -> Result<(), StoreError> {
        self.listener.listen(channel).await.map_err(map_sqlx)
    }

    async fn recv(&mut self) -> Result<Option<String>, StoreError> {
        match self.listener.try_recv().await.map_err(map_sqlx)? {
            Some(notification) => {
                debug!(channel = notification.channel(), "notification");
                Ok(Some(notification.payload().to_string()))
            }
            None => Err(StoreError::Connection(
                "notification connection lost".into(),
            )),
        }
    }

    async fn ping(&mut self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&mut self.listener)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}
