//! LLM Provider implementations for citycode.
//!
//! All providers implement the `citycode_core::Provider` trait.
//! The router builds them from configuration and wraps each in a
//! [`RetryProvider`] so transient failures are retried below any tracing.

pub mod openai_compat;
pub mod retry;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use retry::RetryProvider;
pub use router::{ProviderRouter, build_from_config};
