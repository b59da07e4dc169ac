//! Output of collected articles.
//!
//! # Submodules
//!
//! - [`json`]: Writes each article as one JSON line, to a file or stdout
//!
//! # Output Structure
//!
//! ```text
//! {"source":"https://www.bbc.co.uk/news/...","outlet":"BBC","title":"...","content":"...","fetched_at":"..."}
//! {"source":"https://www.theguardian.com/...","outlet":"Guardian",...}
//! ```

pub mod json;
