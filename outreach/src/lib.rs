//! Outreach service
//!
//! Wires the job store, suppression registry, delivery client, dispatcher and
//! HTTP server together from a single RON configuration file.

pub mod controller;

pub use controller::{Outreach, SHUTDOWN_BROADCAST};
