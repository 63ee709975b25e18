//! Helpers shared by the feed and storage layers.
//!
//! - **URL handling**: scheme normalization and the fetch policy that guards
//!   every outbound request
//! - **Text processing**: control-character stripping, first-line title
//!   extraction and HTML-to-text rendering for summaries

mod text;
mod url_validator;

pub use text::{first_line, html_to_text, strip_control_chars};
pub use url_validator::{normalize_site_url, validate_url, UrlValidationError};
