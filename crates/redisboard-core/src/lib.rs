//! # Redisboard – Redis Introspection Engine
//!
//! Read-mostly inspection of live Redis servers for an admin UI. Provides:
//!
//! - **Key Inspection** – type detection and pipelined OBJECT / length / TTL
//!   metadata, degrading to `n/a` fields instead of failing
//! - **Value Fetching** – type-dispatched reads with lazy, page-bounded range
//!   reads for lists and sorted sets
//! - **Database Sampling** – memory estimates (total / volatile / persistent)
//!   extrapolated from random keys, plus full or sampled key listings
//! - **Server Stats** – UP / DOWN / ERROR status, INFO details, memory, clients,
//!   CPU utilisation and slow log summaries
//! - **Key Deletion** – single-key DEL with operator-facing messages

pub mod types;
pub mod error;
pub mod config;
pub mod info;
pub mod connection;
pub mod server;
pub mod inspector;
pub mod fetcher;
pub mod paginate;
pub mod sampler;
pub mod stats;
pub mod delete;
pub mod service;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use config::BoardSettings;
pub use error::{BoardError, BoardErrorKind, BoardResult};
pub use server::ServerHandle;
pub use service::{Redisboard, RedisboardState};
