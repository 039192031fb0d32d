//! An abstraction layer for the hosted services behind the chat relay.
//!
//! This crate establishes an unified protocol for talking to embedding
//! providers, vector indexes and completion providers, so that the relay
//! can switch between vendors (or fakes in tests) without modifying the
//! core codebase.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;
mod retrieval;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
pub use retrieval::*;
