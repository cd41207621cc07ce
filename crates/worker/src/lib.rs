//! `runbridge-worker` library crate.
//!
//! Re-exports the pipeline, handler and HTTP surface for integration
//! testing. The binary entrypoint lives in `main.rs`.

pub mod error;
pub mod handler;
pub mod outputs;
pub mod pipeline;
pub mod server;
