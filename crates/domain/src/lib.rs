//! Shared domain types for Acre: the conversation transcript model, the
//! two-channel answer format, agent step normalization, streaming
//! primitives, and configuration.
//!
//! This crate carries no I/O beyond `tokio::sync`; everything here is
//! usable from both the gateway runtime and the external-collaborator
//! crates without pulling in HTTP or storage.

pub mod channels;
pub mod config;
pub mod emit;
pub mod error;
pub mod message;
pub mod step;
pub mod stream;
pub mod tool;
pub mod ui;

pub use error::{Error, Result};
