//! Durable storage for provider webhooks that could not be reconciled.
//!
//! # File Layout
//!
//! ```text
//! <error_log_dir>/<workspace_id>/<record_id>.json
//! ```
//!
//! Each record is written atomically (temp file, fsync, rename, fsync of the
//! directory), so a crash leaves either the whole record or nothing.

pub mod error_log;
pub mod fsync;

pub use error_log::{ErrorLog, ErrorLogError, FileErrorLog, MemoryErrorLog};
pub use fsync::{fsync_dir, fsync_file, write_atomic};
