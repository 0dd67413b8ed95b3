//! Rule-based authorization engine
//!
//! Actors are described by a [`RuleSet`] of grant and revoke rules. The same
//! rules answer two kinds of question:
//! - **Instance checks**: may this actor perform an action on this record?
//! - **Collection scope**: which records may this actor perform an action on?
//!   Rules are compiled into a backend-neutral [`CompiledFilter`] that storage
//!   adapters translate into their native query form.
//!
//! # Core Concepts
//!
//! - **Rule**: grants or revokes actions on subject types, optionally narrowed
//!   by attribute [`Conditions`] or a custom predicate
//! - **Adapter**: storage backend for one or more subject types, registered
//!   in an [`AdapterRegistry`]
//! - **Resolution**: a request is permitted when some relevant grant matches
//!   and no relevant revoke matches
//!
//! # Example
//!
//! ```rust
//! use auth_ability::{AbilityEngine, AdapterRegistry, Action, Conditions, MemoryAdapter, RuleSet, SubjectType};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let projects = SubjectType::new("project");
//!     let store = Arc::new(MemoryAdapter::new(["project"]));
//!     store.create(&projects, serde_json::json!({"title": "Sir"}))?;
//!     store.create(&projects, serde_json::json!({"title": "Lord"}))?;
//!
//!     let mut registry = AdapterRegistry::new();
//!     registry.register("memory", store);
//!     let engine = AbilityEngine::new(registry);
//!
//!     let mut rules = RuleSet::new();
//!     rules.grant("read", "project").when(Conditions::new().equals("title", "Sir"));
//!
//!     let visible = engine.collect_accessible(&rules, &Action::new("read"), &projects).await?;
//!     assert_eq!(visible.len(), 1);
//!
//!     Ok(())
//! }
//! ```

pub mod ability;
pub mod adapter;
pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod models;
pub mod registry;
pub mod rule;

pub use ability::RuleSet;
pub use adapter::{Adapter, MemoryAdapter, PostgresAdapter, QueryTranslator, RecordStream, SqlTranslator};
pub use condition::{Condition, Conditions};
pub use config::{AbilityConfig, PostgresConfig};
pub use engine::AbilityEngine;
pub use error::*;
pub use filter::{CompiledFilter, FieldPath};
pub use models::*;
pub use registry::AdapterRegistry;
pub use rule::{CompilableRule, Predicate, Rule};
