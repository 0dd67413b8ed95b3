use crate::{
    error::Result,
    filter::CompiledFilter,
    models::{Record, SubjectType},
};
use async_trait::async_trait;
use futures::stream::BoxStream;

pub mod memory;
pub mod postgres;

pub use memory::{MemoryAdapter, MemoryTranslator};
pub use postgres::{PostgresAdapter, SqlTranslator};

/// Lazy sequence of records produced by an adapter
pub type RecordStream = BoxStream<'static, Result<Record>>;

/// Storage backend interface for subject types.
///
/// Adapters are stateless strategies shared behind an `Arc`; they may block
/// on I/O, and their errors are handed to callers unchanged.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Whether this adapter stores records of `subject_type`
    fn is_responsible_for(&self, subject_type: &SubjectType) -> bool;

    /// Load one record, failing with `NotFound` when it does not exist
    async fn load_by_id(&self, subject_type: &SubjectType, id: &str) -> Result<Record>;

    /// Run a compiled filter against the store
    fn execute_filter(&self, subject_type: &SubjectType, filter: CompiledFilter) -> RecordStream;
}

/// Turns the compiled filter algebra into a backend's native filter form
pub trait QueryTranslator {
    type Output;

    fn translate(&self, filter: &CompiledFilter) -> Result<Self::Output>;
}
