//! linesink - Bounded log aggregation with asynchronous rotating persistence
//!
//! This library provides the log sink, its configuration, and the HTTP query
//! endpoint used by the linesink service.

pub mod config;
pub mod logging;
pub mod server;
