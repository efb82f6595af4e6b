//! Queue-driven single file transfers
//!
//! A background thread takes file paths off a queue and rsyncs them one at
//! a time to the configured destination.

mod service;
mod thread;

pub use service::*;
pub use thread::*;
