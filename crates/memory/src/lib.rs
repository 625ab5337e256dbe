//! Multi-tier agent memory.
//!
//! This crate gives event-driven agents durable progress across
//! interactions:
//!
//! - [`types`] — the memory tiers and the tagged entries stored in them
//! - [`schema`] — the Initializer→Worker domain memory schema
//! - [`store`] — pluggable backends (in-memory, redis with TTL, postgres)
//! - [`factory`] — two-phase task setup and lifecycle
//! - [`manager`] — the unified facade handlers are given at startup
//!
//! # Usage
//!
//! ```no_run
//! use agent_memory::manager::{DomainMemoryManager, MemoryConfig};
//!
//! # async fn run() -> Result<(), agent_memory::store::MemoryError> {
//! let manager = DomainMemoryManager::new(&MemoryConfig::from_env());
//! manager.connect().await?;
//!
//! let mut schema = manager
//!     .create_task("remediate PodCrashLooping", None, Some("corr-1"), None, None, None)
//!     .await?;
//! manager.complete_task(&mut schema, "restarted pod", true, &[]).await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod factory;
pub mod manager;
pub mod schema;
pub mod store;
mod telemetry;
pub mod types;

pub use factory::{ConstraintSpec, DomainMemoryFactory, GoalSpec, RequirementSpec, TaskAnalyzer};
pub use manager::{ContextOptions, DomainMemoryManager, MemoryConfig, MemoryContext};
pub use schema::{DomainMemorySchema, TaskStatus};
pub use store::{InMemoryStore, MemoryError, MemoryStore, QueryFilters};
pub use types::{MemoryEntry, MemoryPayload, MemoryType};
