//! In-memory document store adapter
//!
//! Records are kept per subject type in insertion order. Filters are
//! translated into record predicates that mirror document-store semantics,
//! including "array field contains value" equality.

use crate::{
    adapter::{Adapter, QueryTranslator, RecordStream},
    error::{AbilityError, Result},
    filter::CompiledFilter,
    models::{Record, SubjectType},
};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Predicate produced from a compiled filter
pub type RecordPredicate = Box<dyn Fn(&Record) -> bool + Send + Sync>;

/// Translates compiled filters into record predicates
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryTranslator;

impl QueryTranslator for MemoryTranslator {
    type Output = RecordPredicate;

    fn translate(&self, filter: &CompiledFilter) -> Result<RecordPredicate> {
        let filter = filter.clone();
        Ok(Box::new(move |record: &Record| filter.evaluate(&record.attributes)))
    }
}

/// In-memory adapter for testing and development
pub struct MemoryAdapter {
    subject_types: Vec<SubjectType>,
    records: Arc<DashMap<SubjectType, Vec<Record>>>,
}

impl MemoryAdapter {
    /// Adapter responsible for exactly these subject types
    pub fn new<I, S>(subject_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SubjectType>,
    {
        Self {
            subject_types: subject_types.into_iter().map(Into::into).collect(),
            records: Arc::new(DashMap::new()),
        }
    }

    /// Store a record, replacing any record with the same id
    pub fn insert(&self, record: Record) -> Result<()> {
        if !self.is_responsible_for(&record.subject_type) {
            return Err(AbilityError::StorageError(format!(
                "Memory adapter does not store {}",
                record.subject_type
            )));
        }

        let mut records = self.records.entry(record.subject_type.clone()).or_default();
        match records.iter().position(|existing| existing.id == record.id) {
            Some(index) => records[index] = record,
            None => records.push(record),
        }
        Ok(())
    }

    /// Store a new record under a generated id
    pub fn create(&self, subject_type: &SubjectType, document: Value) -> Result<Record> {
        let record = Record::from_json(subject_type.clone(), &Uuid::new_v4().to_string(), document)?;
        self.insert(record.clone())?;
        Ok(record)
    }

    /// Store a new record with explicit attributes
    pub fn create_with(&self, subject_type: &SubjectType, attributes: Map<String, Value>) -> Result<Record> {
        self.create(subject_type, Value::Object(attributes))
    }

    pub fn len(&self, subject_type: &SubjectType) -> usize {
        self.records.get(subject_type).map_or(0, |records| records.len())
    }

    pub fn is_empty(&self, subject_type: &SubjectType) -> bool {
        self.len(subject_type) == 0
    }

    pub fn clear(&self) {
        self.records.clear();
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn is_responsible_for(&self, subject_type: &SubjectType) -> bool {
        self.subject_types.contains(subject_type)
    }

    async fn load_by_id(&self, subject_type: &SubjectType, id: &str) -> Result<Record> {
        self.records
            .get(subject_type)
            .and_then(|records| records.iter().find(|record| record.id == id).cloned())
            .ok_or_else(|| AbilityError::NotFound {
                subject_type: subject_type.clone(),
                id: id.to_string(),
            })
    }

    fn execute_filter(&self, subject_type: &SubjectType, filter: CompiledFilter) -> RecordStream {
        let predicate = match MemoryTranslator.translate(&filter) {
            Ok(predicate) => predicate,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };

        // Snapshot so the stream does not hold a map guard across awaits
        let snapshot = self
            .records
            .get(subject_type)
            .map(|records| records.value().clone())
            .unwrap_or_default();
        debug!("Scanning {} {} record(s) for {}", snapshot.len(), subject_type, filter);

        stream::iter(snapshot)
            .filter(move |record| futures::future::ready(predicate(record)))
            .map(Ok)
            .boxed()
    }
}
