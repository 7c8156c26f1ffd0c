//! Feed pagination and the client-side feed session.
//!
//! - [`paginator`] - server-side cursor pagination over a habitat's posts
//! - [`session`] - client-side state: loaded items, cursor, fetch state machine
//! - [`window`] - fixed-height virtual scrolling geometry
//! - [`lazy`] - one-shot image reveal tracking around the viewport
//!
//! The session never performs I/O itself. Scrolling returns a
//! [`PageRequest`] when the next page is due; the caller fetches it and hands
//! the result back with the request's generation:
//!
//! ```
//! use habitat::feed::{FeedSession, PageOutcome, SessionConfig};
//!
//! let mut session = FeedSession::new(1, 40, SessionConfig::default());
//! let request = session.poll().expect("empty feed requests its first page");
//! let page: Result<Vec<_>, String> = Ok(Vec::new());
//! assert_eq!(session.apply_page(request.generation, page), PageOutcome::Exhausted);
//! ```

mod lazy;
mod paginator;
mod session;
mod window;

pub use lazy::LazyImages;
pub use paginator::{PageLimit, PageLimits, PaginationError, Paginator};
pub use session::{FeedSession, FetchState, PageOutcome, PageRequest, SessionConfig};
pub use window::ScrollWindow;
