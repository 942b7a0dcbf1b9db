//! Text-generation upstream for Marquee.
//!
//! The service exposes completion and chat endpoints that are forwarded,
//! unchanged, to a local llama.cpp server.
//!
//! # Example
//! ```no_run
//! use marquee_llm::{LlmClient, LlmRoute};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = LlmClient::new("http://localhost:8080", Duration::from_secs(60))?;
//! let reply = client
//!     .forward(LlmRoute::Completion, &json!({"prompt": "Recommend a heist movie"}))
//!     .await?;
//! println!("{} {}", reply.status, reply.body);
//! # Ok(())
//! # }
//! ```

pub mod client;

pub use client::{LlmClient, LlmRoute, ProxiedResponse};
