//! LLM Provider abstractions for the research pipeline
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Clarifier / Supervisor / Worker              │
//! └──────────────────┬───────────────────────────┘
//!                    │ decide::<D>() / complete()
//!                    ▼
//! ┌──────────────────────────────────────────────┐
//! │        LLMProvider (trait)                   │
//! │  - complete(messages, tools, config)         │
//! └──────────────────┬───────────────────────────┘
//!                    │ implemented by
//!                    ▼
//! ┌──────────────────────────────────────────────┐
//! │         RigAgentAdapter                      │
//! │   (wraps any Rig Agent<M>)                   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use rig::providers::ollama::Client;
//! use rig::client::{CompletionClient, ProviderClient};
//! use rig_deepresearch::compat::RigAgentAdapter;
//!
//! let client = Client::from_env();
//! let agent = client.agent("llama3.2").build();
//! let provider = RigAgentAdapter::new(agent);
//! ```

mod config;
pub mod decision;
mod provider;

pub use config::{LLMConfig, TokenUsage};
pub use decision::{decide, Decided, Decision};
pub use provider::{LLMProvider, LLMResponse};
