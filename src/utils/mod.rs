//! Utility functions shared across the crate.
//!
//! - [`app_data`] - Application data directory management (XDG-compliant)
//! - [`tokenizer`] - Word extraction for indexing and query terms
//!
//! ```
//! use sheaf::utils::extract_tokens;
//!
//! let tokens = extract_tokens("getUserById");
//! assert!(tokens.contains("user"));
//! assert!(tokens.contains("getuserbyid"));
//! ```

pub mod app_data;
pub mod tokenizer;

pub use app_data::*;
pub use tokenizer::*;
