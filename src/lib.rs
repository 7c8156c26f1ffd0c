//! Habitat community feeds.
//!
//! - [`storage`] - SQLite store for habitats, users, posts, comments, hearts
//! - [`feed`] - cursor paginator and the client-side windowed feed session
//! - [`server`] - axum REST API
//! - [`client`] - reqwest client for that API
//! - [`config`] - optional TOML configuration

pub mod client;
pub mod config;
pub mod feed;
pub mod server;
pub mod storage;
pub mod util;
