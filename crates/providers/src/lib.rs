//! Model-provider abstraction and the OpenAI-compatible adapter.
//!
//! The rest of the system only sees [`ModelProvider`]: "generate text,
//! optionally interleaved with tool calls, from a message list and a tool
//! registry". Tests script their own implementations.

mod handle;
mod openai_compat;
mod sse;
mod traits;
mod util;

pub use handle::LazyProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use traits::{ChatRequest, ChatResponse, ModelProvider};
