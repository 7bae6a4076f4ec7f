//! The protocol between the workflow engine and an inference backend.
//!
//! Types in this crate describe what a request to a language model looks
//! like, how its response is streamed back, and how the model asks for tool
//! invocations. They carry no behavior of their own: a backend implements
//! [`ModelProvider`] and the engine only ever talks to that trait, so the
//! same workflow runs unchanged against a hosted model or a scripted fake.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
