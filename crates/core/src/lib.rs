//! Domain types for the runbridge worker.
//!
//! Holds everything about a job that does not touch the engine's HTTP
//! API: configuration, the inbound/outbound payload shapes, input
//! validation, staging of input images, and workflow patching.

pub mod config;
pub mod error;
pub mod job;
pub mod staging;
pub mod workflow;
