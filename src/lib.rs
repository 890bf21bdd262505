//! # Redisboard
//!
//! Host-side surface for the Redis introspection engine: configuration
//! loading, the server registry, and an axum router exposing the admin pages
//! as JSON.

pub mod api;
pub mod config;
pub mod logging;
pub mod registry;
