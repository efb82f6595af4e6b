//! Command construction
//!
//! Turns transfer settings into rsync, mkdir and ssh argument vectors.

mod builder;

pub use builder::*;
