#![allow(dead_code)]

use auth_ability::{AbilityEngine, AdapterRegistry, MemoryAdapter, Record, SubjectType};
use serde_json::Value;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

pub fn projects() -> SubjectType {
    SubjectType::new("project")
}

/// Engine over a single memory adapter serving `subject_types`
pub fn memory_engine(subject_types: &[&str]) -> (AbilityEngine, Arc<MemoryAdapter>) {
    init_tracing();
    let adapter = Arc::new(MemoryAdapter::new(subject_types.iter().copied()));
    let mut registry = AdapterRegistry::new();
    registry.register("memory", adapter.clone());
    (AbilityEngine::new(registry), adapter)
}

/// Seed documents of one type, returning them in insertion order
pub fn seed(adapter: &MemoryAdapter, subject_type: &SubjectType, documents: Vec<Value>) -> Vec<Record> {
    documents
        .into_iter()
        .map(|document| adapter.create(subject_type, document).unwrap())
        .collect()
}
