//! Procure Assist: a procurement Q&A assistant.
//!
//! Two cooperating subsystems:
//! - a retrieval-augmented answer pipeline ([`pipeline`]) over a hybrid
//!   search index, with per-conversation memory;
//! - an approval-gated workflow engine ([`workflow`]) that plans tool
//!   invocations, halts at human-approval gates, and resumes on response.

pub mod api;
pub mod approval;
pub mod config;
pub mod email;
pub mod error;
pub mod llm;
pub mod memory;
pub mod pipeline;
pub mod retrieval;
pub mod stream;
pub mod tools;
pub mod workflow;

pub use error::{Error, Result};
