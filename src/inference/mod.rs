//! Model boundary: OpenAI-compatible streaming chat completions.

pub mod client;
pub mod errors;
pub mod streaming;
pub mod types;

pub use client::{ChunkStream, InferenceClient, ModelBackend, ModelSettings};
pub use errors::InferenceError;
