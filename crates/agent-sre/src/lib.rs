//! AI-augmented SRE remediation agent.
//!
//! Receives Prometheus alerts as CloudEvents, selects a remediation
//! through a layered pipeline (static annotations, recursive reasoning,
//! retrieval-augmented LLM function calling, keyword rules), optionally
//! gates execution behind human approval, invokes the remediation lambda,
//! verifies the outcome, and feeds the result back into memory so future
//! selections improve.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod alert;
pub mod cloudevent;
pub mod config;
pub mod error;
pub mod few_shot;
pub mod lambda;
pub mod observability;
pub mod rag;
pub mod selection;
pub mod server;
pub mod workflow;

pub use config::{AgentConfig, OperationMode};
pub use error::AgentError;
