//! ComfyUI REST client library.
//!
//! Provides the HTTP API wrapper, typed history records, the startup
//! readiness probe, and the cancellable poll loop used to wait for a
//! queued workflow.

pub mod api;
pub mod backoff;
pub mod history;
pub mod poll;
pub mod readiness;
