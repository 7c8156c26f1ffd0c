//! HTTP client for the habitat API, used by the terminal feed.

mod api;

pub use api::{ApiClient, FetchError};
