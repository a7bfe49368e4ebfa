//! Minimal typed client for the Ollama HTTP API
//!
//! Covers the endpoints the router needs: non-streaming chat (optionally
//! constrained by a JSON schema) and batch embeddings.

mod client;
mod error;

pub use client::{
    ChatOptions, ChatRequest, ChatResponse, DEFAULT_HOST, EmbedRequest, EmbedResponse, Message,
    OllamaClient,
};
pub use error::{Error, Result};
