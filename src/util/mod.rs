//! Shared helpers.
//!
//! - **URL validation**: image URLs stored with posts and the client's API base
//! - **Text processing**: width-aware truncation, wrapping and terminal sanitizing
//!
//! ```
//! use habitat::util::{display_width, fit_width, validate_image_url};
//!
//! assert!(validate_image_url("https://cdn.example.com/otter.png").is_ok());
//! assert!(validate_image_url("http://127.0.0.1/otter.png").is_err());
//! assert_eq!(display_width("水獺"), 4);
//! assert_eq!(fit_width("sea otter", 5), "sea …");
//! ```

mod text;
mod url_validator;

pub use text::{display_width, fit_width, sanitize, wrap_lines};
pub use url_validator::{
    validate_api_url, validate_image_url, UrlValidationError, MAX_IMAGE_URL_LEN,
};
