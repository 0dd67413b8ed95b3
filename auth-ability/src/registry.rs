use crate::{
    adapter::Adapter,
    error::{AbilityError, Result},
    models::SubjectType,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Explicit responsibility test used instead of the adapter's own
pub type SubjectMatcher = Arc<dyn Fn(&SubjectType) -> bool + Send + Sync>;

struct Registration {
    name: String,
    matcher: Option<SubjectMatcher>,
    adapter: Arc<dyn Adapter>,
}

impl Registration {
    fn responsible_for(&self, subject_type: &SubjectType) -> bool {
        match &self.matcher {
            Some(matcher) => matcher(subject_type),
            None => self.adapter.is_responsible_for(subject_type),
        }
    }
}

/// Ordered adapter lookup. The first registration that claims a subject
/// type wins, so more specific adapters should be registered first.
#[derive(Default)]
pub struct AdapterRegistry {
    registrations: Vec<Registration>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter that decides responsibility itself
    pub fn register(&mut self, name: &str, adapter: Arc<dyn Adapter>) -> &mut Self {
        info!("Registered adapter {}", name);
        self.registrations.push(Registration {
            name: name.to_string(),
            matcher: None,
            adapter,
        });
        self
    }

    /// Register an adapter behind an explicit subject-type matcher
    pub fn register_with<F>(&mut self, name: &str, matcher: F, adapter: Arc<dyn Adapter>) -> &mut Self
    where
        F: Fn(&SubjectType) -> bool + Send + Sync + 'static,
    {
        info!("Registered adapter {} with custom matcher", name);
        self.registrations.push(Registration {
            name: name.to_string(),
            matcher: Some(Arc::new(matcher)),
            adapter,
        });
        self
    }

    /// Adapter responsible for `subject_type`
    pub fn adapter_for(&self, subject_type: &SubjectType) -> Result<Arc<dyn Adapter>> {
        let registration = self
            .registrations
            .iter()
            .find(|registration| registration.responsible_for(subject_type))
            .ok_or_else(|| AbilityError::NoAdapter(subject_type.clone()))?;

        debug!("Resolved {} to adapter {}", subject_type, registration.name);
        Ok(registration.adapter.clone())
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.registrations.iter().map(|registration| &registration.name))
            .finish()
    }
}
