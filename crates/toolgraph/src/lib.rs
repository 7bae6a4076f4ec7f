//! Parallel tool execution for LLM agents, with a ready-made demo.
//!
//! The crate includes a CLI that compares the graph-based driver against
//! the sequential loop on a scripted model. And you can also use it as a
//! library to bring the engine into your own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod demo;
pub mod tools;

/// Re-exports of [`toolgraph_core`] crate.
pub mod core {
    pub use toolgraph_core::*;
}
