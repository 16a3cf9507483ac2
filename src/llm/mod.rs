//! LLM integration for question-forge.
//!
//! Every stage of the pipeline talks to a model through the [`LlmProvider`]
//! trait. [`ChatClient`] is the production implementation over an
//! OpenAI-compatible `/chat/completions` endpoint; tests substitute scripted
//! providers.
//!
//! ```ignore
//! use question_forge::llm::{ChatClient, GenerationRequest, LlmConfig, LlmProvider, Message};
//!
//! let client = ChatClient::new(LlmConfig::from_env()?)?;
//! let request = GenerationRequest::new("", vec![Message::user("Hello!")]);
//! let response = client.generate(request).await?;
//! println!("{}", response.first_content().unwrap_or_default());
//! ```

pub mod client;

pub use client::{
    ChatClient, Choice, GenerationRequest, GenerationResponse, LlmConfig, LlmProvider, Message,
    Usage,
};
