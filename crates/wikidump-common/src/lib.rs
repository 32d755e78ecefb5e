//! Wikidump Common Library
//!
//! Shared utilities for the wikidump workspace members:
//!
//! - **Logging**: centralized `tracing` setup driven by [`logging::LogConfig`]
//! - **Framing**: the line-number prefix used to tag queued dump payloads
//! - **Errors**: [`CommonError`] and its [`Result`] alias
//!
//! # Example
//!
//! ```no_run
//! use wikidump_common::framing::{add_line_number, parse_line_number};
//!
//! let frame = add_line_number(42, br#"{"id":"Q42"}"#);
//! let (line, payload) = parse_line_number(&frame).unwrap();
//! assert_eq!(line, 42);
//! assert_eq!(payload, br#"{"id":"Q42"}"#);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod framing;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
