//! Prof Buzz, a chat assistant that answers questions about professors
//! using retrieved reviews.
//!
//! The crate serves the chat endpoint over HTTP and includes a client for
//! it. The binary wires both up with OpenAI and Pinecone providers.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod client;
pub mod server;

pub use client::{ChatClient, ChatClientBuilder, ClientError};

/// Re-exports of [`prof_buzz_core`] crate.
pub mod core {
    pub use prof_buzz_core::*;
}
