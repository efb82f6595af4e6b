//! Process execution
//!
//! Launching rsync and its helpers, and turning one invocation into a
//! classified, logged outcome.

mod executor;
mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use executor::*;
pub use runner::*;
