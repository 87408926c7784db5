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
#![allow(clippy::redundant_pub_crate)]

//! Operator CLI that drives a list controller per ISP console resource.
//!
//! Layout:
//! - `cli.rs`: argument parsing, logging setup and command dispatch
//! - `commands/`: command handlers (listing/export, mutations)
//! - `client.rs`: error type, credentials and the application context
//! - `backend.rs`: HTTP list backend and the generic `Record` row
//! - `profiles.rs`: per-resource paths, vocabularies and export columns
//! - `output.rs`: table/JSON/CSV renderers
//! - `main.rs`: thin entrypoint delegating to `run()`

pub(crate) mod backend;
pub(crate) mod cli;
pub(crate) mod client;
pub(crate) mod commands;
pub(crate) mod output;
pub(crate) mod profiles;

pub use cli::run;
