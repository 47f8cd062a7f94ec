//! Building monitor daemon
//!
//! Wires a simulated building into the monitoring loop and serves the
//! results over HTTP.

pub mod api;
pub mod config;
pub mod simulation;
