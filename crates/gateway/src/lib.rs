//! The Acre gateway: HTTP surface and turn runtime for the research
//! assistant.
//!
//! One user input becomes one *turn*: the orchestrator in
//! [`runtime::turn`] fans the input out into the optional external-data
//! route, the tool-augmented research loop, and the durable transcript,
//! while the API layer streams progress to the client over SSE.

pub mod api;
pub mod runtime;
pub mod state;
