//! HTTP and WebSocket front end for `holdem_engine` rooms.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
