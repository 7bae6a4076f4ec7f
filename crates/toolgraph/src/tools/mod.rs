//! A set of built-in tools that models can use.

mod wait;

pub use wait::WaitTool;
