//! Rrmark - Round-Robin Connection Marker
//!
//! Takes packets diverted into a Linux NFQUEUE, tags each one with a
//! firewall mark cycling through a fixed range, and returns it to the
//! kernel for re-evaluation. Downstream mangle/routing rules read the mark
//! to spread connections across multiple uplinks.

pub mod classify;
pub mod config;
pub mod error;
pub mod handler;
pub mod mark;
pub mod protocol;
pub mod queue;
pub mod service;
pub mod telemetry;

pub use error::{Error, Result};
