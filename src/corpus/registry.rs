//! @ai:module:intent Read-only, id-indexed registry shared by cases, variants and providers
//! @ai:module:layer domain
//! @ai:module:public_api Registry, Keyed
//! @ai:module:stateless true

use crate::error::{ConfigError, NotFound};
use std::collections::HashMap;

/// @ai:intent An entry that can live in a registry
pub trait Keyed {
    /// Human-readable registry name used in error messages
    const REGISTRY: &'static str;

    fn id(&self) -> &str;
}

/// @ai:intent Ordered collection populated once, never mutated afterwards
#[derive(Debug, Clone)]
pub struct Registry<T> {
    entries: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T: Keyed> Registry<T> {
    /// @ai:intent Build a registry, rejecting empty or duplicate identifiers
    /// @ai:post list() preserves the input order
    /// @ai:effects pure
    pub fn new(entries: Vec<T>) -> Result<Self, ConfigError> {
        let mut index = HashMap::with_capacity(entries.len());

        for (position, entry) in entries.iter().enumerate() {
            let id = entry.id();
            if id.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    registry: T::REGISTRY,
                    field: "id",
                });
            }
            if index.insert(id.to_string(), position).is_some() {
                return Err(ConfigError::DuplicateId {
                    registry: T::REGISTRY,
                    id: id.to_string(),
                });
            }
        }

        Ok(Self { entries, index })
    }

    pub fn list(&self) -> &[T] {
        &self.entries
    }

    /// @ai:intent Look up an entry by identifier
    /// @ai:effects pure
    pub fn get(&self, id: &str) -> Result<&T, NotFound> {
        self.index
            .get(id)
            .map(|&position| &self.entries[position])
            .ok_or_else(|| NotFound {
                registry: T::REGISTRY,
                id: id.to_string(),
            })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Item(&'static str);

    impl Keyed for Item {
        const REGISTRY: &'static str = "item";

        fn id(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_registry_preserves_order() {
        let registry = Registry::new(vec![Item("b"), Item("a"), Item("c")]).unwrap();
        let ids: Vec<_> = registry.list().iter().map(|i| i.0).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_registry_get_and_not_found() {
        let registry = Registry::new(vec![Item("a")]).unwrap();
        assert_eq!(registry.get("a").unwrap().0, "a");

        let err = registry.get("missing").unwrap_err();
        assert_eq!(err.registry, "item");
        assert_eq!(err.id, "missing");
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let err = Registry::new(vec![Item("a"), Item("a")]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateId { id, .. } if id == "a"));
    }

    #[test]
    fn test_registry_rejects_empty_id() {
        let err = Registry::new(vec![Item("  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "id", .. }));
    }
}
