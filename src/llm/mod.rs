//! LLM client layer: chat completion client, embedding client and the
//! rate-limited API key pool.

pub mod client;
pub mod embedding;
pub mod keypool;

pub use client::{
    ChatClient, Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage,
};
pub use embedding::{EmbeddingClient, EmbeddingProvider};
pub use keypool::{load_keys_from_env, Clock, KeyPool, SystemClock};
