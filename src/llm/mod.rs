pub mod client;

pub use client::{CompletionBackend, LLMClient};
