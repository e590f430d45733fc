//! `pathkv`: command-line client for the path-keyed JSON store.
//!
//! Usage:
//!   pathkv [connection flags] <command> [args]
//!
//! Connection flags override `PATHKV_DB_*` environment variables. Results are
//! printed as JSON lines; undecodable rows are reported through the log.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use pathkv_core::domain::BROADCAST_CHANNEL;
use pathkv_core::impls::{InMemoryConnector, InMemoryEngine};
use pathkv_core::ports::{EventSource, SystemClock};
use pathkv_core::{
    Batch, ChangeEvent, Listener, ListenerConfig, DecodePolicy, Store, StoreConfig, WallClock,
};
use pathkv_pg::{PgConnector, PgEventSource};

/// Path-keyed JSON store client.
#[derive(Parser, Debug)]
#[command(name = "pathkv", about = "Path-keyed JSON store client")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Use a throwaway in-memory engine instead of PostgreSQL.
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Database name.
    #[arg(long, global = true)]
    db_name: Option<String>,

    #[arg(long, global = true)]
    db_host: Option<String>,

    #[arg(long, global = true)]
    db_port: Option<u16>,

    #[arg(long, global = true)]
    db_user: Option<String>,

    #[arg(long, global = true)]
    db_password: Option<String>,

    /// libpq sslmode (disable, prefer, require, ...).
    #[arg(long, global = true)]
    ssl_mode: Option<String>,

    /// Zone of the stored wall-clock timestamps: local, utc or an offset like +09:00.
    #[arg(long, global = true)]
    wall_clock: Option<WallClock>,

    /// skip or fail on undecodable rows.
    #[arg(long, global = true)]
    row_policy: Option<DecodePolicy>,
}

impl ConnectionArgs {
    fn apply(&self, mut config: StoreConfig) -> StoreConfig {
        if let Some(name) = &self.db_name {
            config.name = name.clone();
        }
        if let Some(host) = &self.db_host {
            config.host = host.clone();
        }
        if let Some(port) = self.db_port {
            config.port = port;
        }
        if let Some(user) = &self.db_user {
            config.user = user.clone();
        }
        if let Some(password) = &self.db_password {
            config.password = Some(password.clone());
        }
        if let Some(ssl_mode) = &self.ssl_mode {
            config.ssl_mode = ssl_mode.clone();
        }
        if let Some(zone) = self.wall_clock {
            config.wall_clock = zone;
        }
        if let Some(policy) = self.row_policy {
            config.row_policy = policy;
        }
        config
    }
}

/// Time window flags. Instants are nanoseconds since the epoch; `--to 0` means now.
#[derive(Args, Debug, Clone, Copy)]
struct Window {
    #[arg(long, default_value_t = 0)]
    from: i64,

    #[arg(long, default_value_t = 0)]
    to: i64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every key.
    Keys,
    /// Keys created within a window.
    KeysRange {
        pattern: String,
        #[command(flatten)]
        window: Window,
        #[arg(long)]
        limit: u32,
    },
    /// Entries matching a pattern.
    Get { pattern: String },
    GetN {
        pattern: String,
        #[arg(long)]
        limit: u32,
    },
    /// Entries created within a window.
    GetRange {
        pattern: String,
        #[command(flatten)]
        window: Window,
    },
    GetNRange {
        pattern: String,
        #[command(flatten)]
        window: Window,
        #[arg(long)]
        limit: u32,
    },
    /// Entries updated within a window.
    GetUpdatedRange {
        pattern: String,
        #[command(flatten)]
        window: Window,
    },
    /// Write a JSON value under a key.
    Set { key: String, value: String },
    /// Delete entries matching a pattern.
    Del { pattern: String },
    /// Delete everything.
    Clear,
    /// Print change notifications until interrupted.
    Listen(ListenArgs),
}

#[derive(Args, Debug)]
struct ListenArgs {
    #[arg(long, default_value = BROADCAST_CHANNEL)]
    channel: String,

    /// Keep-alive interval in seconds.
    #[arg(long, default_value_t = 60)]
    ping_secs: u64,

    /// Log and skip malformed notifications instead of stopping.
    #[arg(long)]
    skip_malformed: bool,
}

impl ListenArgs {
    fn config(&self) -> ListenerConfig {
        ListenerConfig {
            channel: self.channel.clone(),
            ping_interval: Duration::from_secs(self.ping_secs.max(1)),
            decode_policy: if self.skip_malformed {
                DecodePolicy::Skip
            } else {
                DecodePolicy::Fail
            },
        }
    }
}

#[derive(Serialize)]
struct Written<'a> {
    key: &'a str,
    stamp: Option<i64>,
}

fn emit<T: Serialize>(out: &mut impl Write, batch: Batch<T>) -> anyhow::Result<()> {
    for error in &batch.errors {
        warn!(%error, "row skipped");
    }
    for item in &batch.items {
        writeln!(out, "{}", serde_json::to_string(item)?)?;
    }
    Ok(())
}

/// Runs one data command against an active store.
async fn execute(store: &Store, command: Command, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        Command::Keys => emit(out, store.keys().await?),
        Command::KeysRange {
            pattern,
            window,
            limit,
        } => emit(
            out,
            store
                .keys_range(&pattern, window.from, window.to, limit)
                .await?,
        ),
        Command::Get { pattern } => emit(out, store.get(&pattern).await?),
        Command::GetN { pattern, limit } => emit(out, store.get_n(&pattern, limit).await?),
        Command::GetRange { pattern, window } => {
            emit(out, store.get_range(&pattern, window.from, window.to).await?)
        }
        Command::GetNRange {
            pattern,
            window,
            limit,
        } => emit(
            out,
            store
                .get_n_range(&pattern, window.from, window.to, limit)
                .await?,
        ),
        Command::GetUpdatedRange { pattern, window } => emit(
            out,
            store
                .get_updated_range(&pattern, window.from, window.to)
                .await?,
        ),
        Command::Set { key, value } => {
            let stamp = store.set(&key, &value).await?;
            writeln!(out, "{}", serde_json::to_string(&Written { key: &key, stamp })?)?;
            Ok(())
        }
        Command::Del { pattern } => Ok(store.del(&pattern).await?),
        Command::Clear => Ok(store.clear().await?),
        Command::Listen(_) => anyhow::bail!("listen does not run against a store"),
    }
}

async fn listen<S: EventSource + 'static>(source: S, args: &ListenArgs) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ChangeEvent>();
    let handle = Listener::new(source, Arc::new(tx), args.config()).spawn();
    let mut out = std::io::stdout();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            event = rx.recv() => {
                // sender dropped: the listener has stopped
                let Some(event) = event else { break };
                writeln!(out, "{}", serde_json::to_string(&event)?)?;
            }
        }
    }

    handle.shutdown_and_join().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = cli
        .connection
        .apply(StoreConfig::from_env().context("reading PATHKV_* environment")?);

    let memory = if cli.memory {
        if config.name.is_empty() {
            config.name = "memory".into();
        }
        if config.host.is_empty() {
            config.host = "localhost".into();
        }
        Some(Arc::new(InMemoryEngine::new(
            Arc::new(SystemClock),
            config.wall_clock,
        )))
    } else {
        None
    };

    if let Command::Listen(args) = &cli.command {
        return match &memory {
            Some(engine) => listen(engine.subscribe(), args).await,
            None => listen(PgEventSource::connect(&config).await?, args).await,
        };
    }

    let store = match &memory {
        Some(engine) => Store::new(config, Arc::new(InMemoryConnector::new(engine.clone()))),
        None => Store::new(config, Arc::new(PgConnector)),
    };
    store.start().await.context("connecting to the store")?;

    let result = execute(&store, cli.command, &mut std::io::stdout()).await;
    store.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathkv_core::ErrorKind;
    use pathkv_core::StoreError;

    async fn memory_store() -> Store {
        let engine = Arc::new(InMemoryEngine::new(Arc::new(SystemClock), WallClock::Utc));
        let config = StoreConfig {
            wall_clock: WallClock::Utc,
            ..StoreConfig::new("memory", "localhost")
        };
        let store = Store::new(config, Arc::new(InMemoryConnector::new(engine)));
        store.start().await.unwrap();
        store
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pathkv").chain(args.iter().copied())).unwrap()
    }

    async fn run(store: &Store, args: &[&str]) -> anyhow::Result<String> {
        let mut out = Vec::new();
        execute(store, parse(args).command, &mut out).await?;
        Ok(String::from_utf8(out)?)
    }

    #[test]
    fn parses_range_commands() {
        let cli = parse(&["get-n-range", "a/*", "--from", "10", "--limit", "3"]);
        match cli.command {
            Command::GetNRange {
                pattern,
                window,
                limit,
            } => {
                assert_eq!(pattern, "a/*");
                assert_eq!(window.from, 10);
                assert_eq!(window.to, 0);
                assert_eq!(limit, 3);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn connection_flags_override_config() {
        let cli = parse(&[
            "--db-name",
            "kv",
            "--db-host",
            "db",
            "--wall-clock",
            "+09:00",
            "--row-policy",
            "fail",
            "keys",
        ]);
        let config = cli.connection.apply(StoreConfig::new("env", "env-host"));
        assert_eq!(config.name, "kv");
        assert_eq!(config.host, "db");
        assert_eq!(config.wall_clock, "+09:00".parse::<WallClock>().unwrap());
        assert_eq!(config.row_policy, DecodePolicy::Fail);
        assert_eq!(config.port, 5432);
    }

    #[test]
    fn rejects_bad_wall_clock() {
        let result = Cli::try_parse_from(["pathkv", "--wall-clock", "mars", "keys"]);
        assert!(result.is_err());
    }

    #[test]
    fn listen_defaults() {
        let cli = parse(&["listen"]);
        let Command::Listen(args) = cli.command else {
            panic!("expected listen");
        };
        let config = args.config();
        assert_eq!(config.channel, "broadcast");
        assert_eq!(config.ping_interval, Duration::from_secs(60));
        assert_eq!(config.decode_policy, DecodePolicy::Fail);
    }

    #[tokio::test]
    async fn set_get_and_clear_print_json_lines() {
        let store = memory_store().await;
        let written = run(&store, &["set", "cfg/a", r#"{"x":1}"#]).await.unwrap();
        assert!(written.starts_with(r#"{"key":"cfg/a","stamp":"#));

        let got = run(&store, &["get", "cfg/*"]).await.unwrap();
        let line: serde_json::Value = serde_json::from_str(got.trim()).unwrap();
        assert_eq!(line["key"], "cfg/a");
        assert_eq!(line["value"]["x"], 1);

        assert_eq!(run(&store, &["keys"]).await.unwrap(), "\"cfg/a\"\n");

        run(&store, &["clear"]).await.unwrap();
        assert_eq!(run(&store, &["keys"]).await.unwrap(), "");
    }

    #[tokio::test]
    async fn store_errors_surface_through_anyhow() {
        let store = memory_store().await;
        let err = run(&store, &["set", "a//b", "1"]).await.unwrap_err();
        let store_err = err.downcast_ref::<StoreError>().unwrap();
        assert_eq!(store_err.kind(), ErrorKind::InvalidKey);
    }
}
