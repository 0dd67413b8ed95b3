use crate::{
    ability::RuleSet,
    adapter::RecordStream,
    error::{AbilityError, Result},
    models::{Action, Record, SubjectType},
    registry::AdapterRegistry,
};
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Authorization entry point tying rule sets to storage adapters.
///
/// The engine holds no actor state. Every call takes the [`RuleSet`] it
/// should evaluate, so one engine can serve any number of actors.
#[derive(Debug, Clone)]
pub struct AbilityEngine {
    registry: Arc<AdapterRegistry>,
}

impl AbilityEngine {
    pub fn new(registry: AdapterRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Create with a shared registry
    pub fn with_registry(registry: Arc<AdapterRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    // =============================================================================
    // Instance Checks
    // =============================================================================

    /// Check whether `rules` permit `action` on an already loaded record
    pub fn can_perform(&self, rules: &RuleSet, action: &Action, record: &Record) -> bool {
        rules.can_perform(action, record)
    }

    /// Load a record and return it only if `rules` permit `action` on it.
    ///
    /// Missing records fail with `NotFound`, existing but forbidden ones with
    /// `PermissionDenied`. Masking one as the other is left to the caller.
    pub async fn load_if_permitted(
        &self,
        rules: &RuleSet,
        action: &Action,
        subject_type: &SubjectType,
        id: &str,
    ) -> Result<Record> {
        let adapter = self.registry.adapter_for(subject_type)?;
        let record = adapter.load_by_id(subject_type, id).await?;

        if !rules.can_perform(action, &record) {
            warn!("Denied {} on {}", action, record);
            return Err(AbilityError::PermissionDenied {
                action: action.clone(),
                subject_type: subject_type.clone(),
                id: id.to_string(),
            });
        }

        debug!("Permitted {} on {}", action, record);
        Ok(record)
    }

    // =============================================================================
    // Collection Scope
    // =============================================================================

    /// Lazily stream every record of `subject_type` that `rules` permit
    /// `action` on, in the adapter's natural order.
    ///
    /// Fails up front when no adapter handles the type or a relevant rule
    /// cannot be compiled. Storage errors surface as stream items.
    pub async fn accessible_records(
        &self,
        rules: &RuleSet,
        action: &Action,
        subject_type: &SubjectType,
    ) -> Result<RecordStream> {
        let adapter = self.registry.adapter_for(subject_type)?;
        let filter = rules.filter_for(action, subject_type)?;

        info!(
            "Querying accessible {} records for {}: {}",
            subject_type, action, filter
        );
        if filter.uses_containment() {
            debug!("Filter for {} relies on array containment", subject_type);
        }

        Ok(adapter.execute_filter(subject_type, filter))
    }

    /// Collect [`accessible_records`](Self::accessible_records) into a vector
    pub async fn collect_accessible(
        &self,
        rules: &RuleSet,
        action: &Action,
        subject_type: &SubjectType,
    ) -> Result<Vec<Record>> {
        self.accessible_records(rules, action, subject_type)
            .await?
            .try_collect()
            .await
    }
}
