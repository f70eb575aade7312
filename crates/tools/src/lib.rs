//! Research tools exposed to the model, plus the external data-agent
//! client.
//!
//! Every tool pushes its own display fragment onto the turn's UI stream
//! as a side effect of execution, and returns a JSON payload that goes
//! back to the model as the tool result. Failures are data, not panics.

mod econ;
mod property;
mod registry;
mod retrieve;
mod search;

pub use econ::HttpDataAgent;
pub use property::PropertySearchTool;
pub use registry::{ResearchTool, ToolRegistry};
pub use retrieve::RetrieveTool;
pub use search::SearchTool;
