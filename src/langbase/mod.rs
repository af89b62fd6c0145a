//! Langbase Pipes HTTP client and wire types.

mod client;
mod types;

pub use client::LangbaseClient;
pub use types::{
    CreatePipeRequest, CreatePipeResponse, Message, MessageRole, PipeRequest, PipeResponse,
    RawResponse, Usage, PIPE_MODEL,
};
