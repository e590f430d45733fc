//! PgEngine - stored function 越しの Engine 実装
//!
//! # 呼び出し
//! - `SELECT * FROM public.get($1) AS kv [WHERE ...] [LIMIT ...]`
//! - `SELECT * FROM public.peek($1) AS kv [WHERE ...] [LIMIT ...]`
//! - `SELECT public.set($1, $2::json)`
//! - `SELECT public.del($1)`
//!
//! 行は位置で読む：get は (key, created, updated, data)、peek は (created, key, updated)。

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use serde_json::value::RawValue;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{debug, info};

use pathkv_core::domain::{Key, Pattern, Query};
use pathkv_core::ports::{Connector, Engine, EntryRow, KeyRow, RowResult};
use pathkv_core::codec::WallClock;
use pathkv_core::{StoreConfig, StoreError};

use crate::error::map_sqlx;

const APPLICATION_NAME: &str = "pathkv";

/// Maps a [`StoreConfig`] onto sqlx connect options.
pub fn connect_options(config: &StoreConfig) -> Result<PgConnectOptions, StoreError> {
    let ssl_mode = PgSslMode::from_str(&config.ssl_mode).map_err(|_| {
        StoreError::Configuration(format!("unknown ssl mode {:?}", config.ssl_mode))
    })?;

    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.name)
        .ssl_mode(ssl_mode)
        .application_name(APPLICATION_NAME);
    if !config.user.is_empty() {
        options = options.username(&config.user);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    Ok(options)
}

/// Session `TimeZone` matching the configured wall clock.
///
/// `now()` is cast to `timestamp` in the session zone, and sqlx pins every
/// session to UTC at startup, so each pooled connection resets it.
pub fn session_time_zone(zone: WallClock) -> String {
    let offset = match zone {
        WallClock::Utc => return "SET TIME ZONE 'UTC'".to_string(),
        WallClock::Fixed(offset) => offset,
        WallClock::Local => *Local::now().offset(),
    };
    let secs = offset.local_minus_utc();
    let sign = if secs < 0 { '-' } else { '+' };
    let secs = secs.abs();
    format!(
        "SET TIME ZONE INTERVAL '{sign}{:02}:{:02}' HOUR TO MINUTE",
        secs / 3600,
        secs % 3600 / 60
    )
}

/// SELECT over one of the row-returning stored functions.
///
/// Placeholders: `$1` pattern, then `from`/`to` when windowed, then the limit.
pub(crate) fn select_sql(function: &str, query: &Query) -> String {
    let mut sql = format!("SELECT * FROM public.{function}($1) AS kv");
    let mut next = 2;
    if let Some(window) = &query.window {
        let column = window.column.as_str();
        sql.push_str(&format!(
            " WHERE kv.{column} >= ${}::timestamp AND kv.{column} <= ${}::timestamp",
            next,
            next + 1
        ));
        next += 2;
    }
    if query.limit.is_some() {
        sql.push_str(&format!(" LIMIT ${next}"));
    }
    sql
}

pub struct PgEngine {
    pool: PgPool,
}

impl PgEngine {
    /// Opens a pool and checks that the server answers.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let options = connect_options(config)?;
        let set_zone = session_time_zone(config.wall_clock);
        debug!(sql = %set_zone, "session time zone");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .after_connect(move |conn, _meta| {
                let sql = set_zone.clone();
                Box::pin(async move {
                    sqlx::query(&sql).execute(&mut *conn).await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await
            .map_err(map_sqlx)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(map_sqlx)?;

        info!(
            database = %config.name,
            host = %config.host,
            max_connections = config.max_connections,
            "postgres pool ready"
        );
        Ok(Self { pool })
    }

    async fn select(&self, function: &str, query: &Query) -> Result<Vec<PgRow>, StoreError> {
        let sql = select_sql(function, query);
        debug!(sql = %sql, pattern = %query.pattern, "postgres query");

        let mut statement = sqlx::query(&sql).bind(query.pattern.as_str());
        if let Some(window) = &query.window {
            statement = statement.bind(window.from.as_str()).bind(window.to.as_str());
        }
        if let Some(limit) = query.limit {
            statement = statement.bind(i64::from(limit));
        }
        statement.fetch_all(&self.pool).await.map_err(map_sqlx)
    }
}

fn timestamp(row: &PgRow, index: usize) -> Result<NaiveDateTime, StoreError> {
    row.try_get(index).map_err(|e| stamp_error(index, e))
}

fn optional_timestamp(row: &PgRow, index: usize) -> Result<Option<NaiveDateTime>, StoreError> {
    row.try_get(index).map_err(|e| stamp_error(index, e))
}

fn stamp_error(index: usize, err: sqlx::Error) -> StoreError {
    StoreError::TimestampFormat {
        value: format!("column {index}"),
        reason: err.to_string(),
    }
}

fn entry_row(row: &PgRow) -> RowResult<EntryRow> {
    let key: String = row.try_get(0).map_err(map_sqlx)?;
    let Json(payload): Json<Box<RawValue>> = row.try_get(3).map_err(map_sqlx)?;
    Ok(EntryRow {
        key,
        created: timestamp(row, 1)?,
        updated: optional_timestamp(row, 2)?,
        payload,
    })
}

fn key_row(row: &PgRow) -> RowResult<KeyRow> {
    Ok(KeyRow {
        created: timestamp(row, 0)?,
        key: row.try_get(1).map_err(map_sqlx)?,
        updated: optional_timestamp(row, 2)?,
    })
}

#[async_trait]
impl Engine for PgEngine {
    async fn get(&self, query: &Query) -> Result<Vec<RowResult<EntryRow>>, StoreError> {
        let rows = self.select("get", query).await?;
        Ok(rows.iter().map(entry_row).collect())
    }

    async fn peek(&self, query: &Query) -> Result<Vec<RowResult<KeyRow>>, StoreError> {
        let rows = self.select("peek", query).await?;
        Ok(rows.iter().map(key_row).collect())
    }

    async fn set(&self, key: &Key, payload: &str) -> Result<Option<NaiveDateTime>, StoreError> {
        sqlx::query_scalar::<_, Option<NaiveDateTime>>("SELECT public.set($1, $2::json)")
            .bind(key.as_str())
            .bind(payload)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn del(&self, pattern: &Pattern) -> Result<(), StoreError> {
        sqlx::query("SELECT public.del($1)")
            .bind(pattern.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Connector opening a fresh pool on every `Store::start`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self, config: &StoreConfig) -> Result<Arc<dyn Engine>, StoreError> {
        Ok(Arc::new(PgEngine::connect(config).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathkv_core::domain::{TimeColumn, TimeWindow};
    use pathkv_core::ErrorKind;
    use rstest::rstest;

    fn window(column: TimeColumn) -> TimeWindow {
        TimeWindow {
            column,
            from: "2024-01-01 00:00:00".into(),
            to: "2024-01-02 00:00:00".into(),
        }
    }

    fn query(pattern: &str) -> Query {
        Query::new(Pattern::parse(pattern).unwrap())
    }

    #[rstest]
    #[case::plain(query("a/*"), "SELECT * FROM public.get($1) AS kv")]
    #[case::limit(query("a/*").with_limit(5), "SELECT * FROM public.get($1) AS kv LIMIT $2")]
    #[case::created(
        query("*").with_window(window(TimeColumn::Created)),
        "SELECT * FROM public.get($1) AS kv WHERE kv.created >= $2::timestamp AND kv.created <= $3::timestamp"
    )]
    #[case::updated_limit(
        query("*").with_window(window(TimeColumn::Updated)).with_limit(1),
        "SELECT * FROM public.get($1) AS kv WHERE kv.updated >= $2::timestamp AND kv.updated <= $3::timestamp LIMIT $4"
    )]
    fn builds_select(#[case] query: Query, #[case] expected: &str) {
        assert_eq!(select_sql("get", &query), expected);
    }

    #[test]
    fn pattern_never_lands_in_sql_text() {
        let sql = select_sql("peek", &query("x'; DROP TABLE kv; --"));
        assert_eq!(sql, "SELECT * FROM public.peek($1) AS kv");
    }

    #[test]
    fn maps_config_onto_connect_options() {
        let config = StoreConfig {
            port: 6543,
            user: "kv".into(),
            password: Some("secret".into()),
            ssl_mode: "require".into(),
            ..StoreConfig::new("store", "db.internal")
        };
        let options = connect_options(&config).unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("store"));
        assert_eq!(options.get_username(), "kv");
        assert!(matches!(options.get_ssl_mode(), PgSslMode::Require));
        assert_eq!(options.get_application_name(), Some(APPLICATION_NAME));
    }

    #[test]
    fn default_ssl_mode_is_disable() {
        let options = connect_options(&StoreConfig::new("store", "localhost")).unwrap();
        assert!(matches!(options.get_ssl_mode(), PgSslMode::Disable));
    }

    #[rstest]
    #[case::utc(WallClock::Utc, "SET TIME ZONE 'UTC'")]
    #[case::east(
        WallClock::Fixed(chrono::FixedOffset::east_opt(9 * 3600).unwrap()),
        "SET TIME ZONE INTERVAL '+09:00' HOUR TO MINUTE"
    )]
    #[case::west_half_hour(
        WallClock::Fixed(chrono::FixedOffset::west_opt(3 * 3600 + 1800).unwrap()),
        "SET TIME ZONE INTERVAL '-03:30' HOUR TO MINUTE"
    )]
    fn pins_session_time_zone(#[case] zone: WallClock, #[case] expected: &str) {
        assert_eq!(session_time_zone(zone), expected);
    }

    #[test]
    fn local_wall_clock_pins_the_host_offset() {
        let secs = Local::now().offset().local_minus_utc();
        let expected = session_time_zone(WallClock::Fixed(
            chrono::FixedOffset::east_opt(secs).unwrap(),
        ));
        assert_eq!(session_time_zone(WallClock::Local), expected);
    }

    #[test]
    fn unknown_ssl_mode_is_a_configuration_error() {
        let config = StoreConfig {
            ssl_mode: "sometimes".into(),
            ..StoreConfig::new("store", "localhost")
        };
        let err = connect_options(&config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
