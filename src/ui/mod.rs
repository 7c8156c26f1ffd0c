//! Terminal feed client.
//!
//! - `loop_runner` - event loop and terminal setup
//! - `input` - key handling
//! - `events` - background task results
//! - `helpers` - task spawning and panic capture
//! - `render` - layout and header
//! - `cards` - fixed-height post cards
//! - `detail` - post overlay
//! - `status` - status bar

mod cards;
mod detail;
mod events;
mod helpers;
mod input;
mod loop_runner;
mod render;
mod status;

pub use loop_runner::{run, Action};
