//! Model adapters.
//!
//! - [`openai`] — `OpenAiClient`, an OpenAI-compatible chat completion client
//!   serving both streamed generation and structured decisions

pub mod openai;

pub use crate::services::{ModelRegistry, ModelTier};
pub use openai::OpenAiClient;
