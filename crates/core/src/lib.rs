//! Core logic of the relay: retrieval-augmented prompting, streaming of
//! completions, and the chat client state.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

pub mod chat;
mod error;
pub mod prompt;
mod relay;
mod upstream;

pub use error::{Error, ErrorKind};
pub use relay::{ChatRelay, ChatRelayBuilder, RelayStream};
