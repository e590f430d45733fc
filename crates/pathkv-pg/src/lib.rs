//! pathkv-pg
//!
//! PostgreSQL implementation of the pathkv engine port.
//!
//! The database exposes four stored functions (`public.get`, `public.peek`,
//! `public.set`, `public.del`) and notifies changes on the `broadcast`
//! channel. Every parameter is bound; nothing is concatenated into SQL text.

mod error;

pub mod engine;
pub mod listener;

pub use crate::engine::{PgConnector, PgEngine, connect_options};
pub use crate::listener::PgEventSource;
