//! Model registration.
//!
//! Models are declared by name with the field that serves as their primary
//! key. Subscriptions refer to models by name, and collection reconciliation
//! locates elements by the primary-key field.

use std::collections::HashMap;

use crate::error::{LiveLinkError, Result};

/// Shape descriptor for a registered model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSchema {
    /// Declared model name, e.g. `"User"`.
    pub name: String,
    /// Field holding the primary-key value, e.g. `"id"`.
    pub primary_key: String,
}

impl ModelSchema {
    /// Create a schema descriptor.
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
        }
    }
}

/// Name → schema mapping shared by the client and the sync service task.
#[derive(Debug, Default)]
pub(crate) struct ModelRegistry {
    models: HashMap<String, ModelSchema>,
}

impl ModelRegistry {
    /// Register a model. Registering the same schema twice is a no-op;
    /// registering a different schema under an already-used name fails fast.
    pub fn register(&mut self, schema: ModelSchema) -> Result<()> {
        match self.models.get(&schema.name) {
            Some(existing) if *existing == schema => Ok(()),
            Some(_) => Err(LiveLinkError::ModelNameConflict(schema.name)),
            None => {
                self.models.insert(schema.name.clone(), schema);
                Ok(())
            },
        }
    }

    /// Look up a registered model by name.
    pub fn get(&self, name: &str) -> Option<&ModelSchema> {
        self.models.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_for_same_schema() {
        let mut registry = ModelRegistry::default();
        registry.register(ModelSchema::new("User", "id")).unwrap();
        registry.register(ModelSchema::new("User", "id")).unwrap();
        assert_eq!(registry.get("User").unwrap().primary_key, "id");
    }

    #[test]
    fn register_fails_on_conflicting_schema() {
        let mut registry = ModelRegistry::default();
        registry.register(ModelSchema::new("User", "id")).unwrap();
        let err = registry
            .register(ModelSchema::new("User", "uuid"))
            .unwrap_err();
        assert!(matches!(err, LiveLinkError::ModelNameConflict(name) if name == "User"));
        // The original registration is untouched.
        assert_eq!(registry.get("User").unwrap().primary_key, "id");
    }

    #[test]
    fn lookup_of_unknown_model_is_none() {
        let registry = ModelRegistry::default();
        assert!(registry.get("Ghost").is_none());
    }
}
