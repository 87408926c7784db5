#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Logging setup and span context shared by the pagewise binaries.
//!
//! Layout: init.rs (subscriber installation, build SHA), context.rs
//! (command span, task-local command scope), error.rs.

pub mod context;
pub mod error;
pub mod init;

pub use context::{CommandScope, CommandSpan};
pub use error::{Result, TelemetryError};
pub use init::{
    DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging,
    log_format_from_config,
};
