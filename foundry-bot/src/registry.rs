//! Factory registry: which factory spawned which children.
//!
//! Plain in-memory state with `&mut self` mutations. The registry does no
//! locking of its own; callers serialize writers per factory through the
//! [`crate::sequencer::Sequencer`] and hold the surrounding mutex only for the
//! duration of a single call.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use foundry_sdk::types::{ContextId, ResourceId};

use crate::error::{OrchestratorError, Result};

/// A factory and the children it has spawned, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Factory {
    pub id: ResourceId,
    pub name: String,
    pub context: ContextId,
    pub children: Vec<ResourceId>,
    pub created_at: DateTime<Utc>,
}

impl Factory {
    /// Display name of the child at `index` (0-based).
    pub fn child_name(&self, index: usize) -> String {
        child_name(&self.name, index)
    }
}

/// `"<factory name> <index+1>"`.
pub fn child_name(factory_name: &str, index: usize) -> String {
    format!("{factory_name} {}", index + 1)
}

#[derive(Debug, Default)]
pub struct Registry {
    factories: HashMap<ResourceId, Factory>,
    /// Registration order; drives first-match name resolution.
    order: Vec<ResourceId>,
    /// child -> owning factory
    owners: HashMap<ResourceId, ResourceId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a factory with no children.
    ///
    /// Rejects an identifier that is already known (as a factory or a child)
    /// and a display name another factory already carries.
    pub fn register(&mut self, id: ResourceId, name: &str, context: ContextId) -> Result<()> {
        if self.factories.contains_key(&id) || self.owners.contains_key(&id) || self.has_name(name) {
            return Err(OrchestratorError::DuplicateFactory {
                name: name.to_string(),
            });
        }
        self.factories.insert(
            id,
            Factory {
                id,
                name: name.to_string(),
                context,
                children: Vec::new(),
                created_at: Utc::now(),
            },
        );
        self.order.push(id);
        Ok(())
    }

    /// Append a child and return its 0-based index.
    pub fn append_child(&mut self, factory: ResourceId, child: ResourceId) -> Result<usize> {
        if let Some(owner) = self.owners.get(&child) {
            return Err(OrchestratorError::Internal(format!(
                "child {child} is already registered under factory {owner}"
            )));
        }
        let entry = self
            .factories
            .get_mut(&factory)
            .ok_or(OrchestratorError::UnknownFactory(factory))?;
        entry.children.push(child);
        self.owners.insert(child, factory);
        Ok(entry.children.len() - 1)
    }

    /// First factory, in registration order, whose name starts with `prefix`.
    ///
    /// Case-sensitive. Ambiguous when two factories share the prefix; the
    /// earliest registered wins.
    pub fn find_by_name_prefix(&self, prefix: &str) -> Option<ResourceId> {
        self.order
            .iter()
            .filter_map(|id| self.factories.get(id))
            .find(|f| f.name.starts_with(prefix))
            .map(|f| f.id)
    }

    /// Delete a factory and hand back its children for remote teardown.
    pub fn remove(&mut self, factory: ResourceId) -> Result<Vec<ResourceId>> {
        let entry = self
            .factories
            .remove(&factory)
            .ok_or(OrchestratorError::UnknownFactory(factory))?;
        self.order.retain(|id| *id != factory);
        for child in &entry.children {
            self.owners.remove(child);
        }
        Ok(entry.children)
    }

    pub fn children_of(&self, factory: ResourceId) -> Result<Vec<ResourceId>> {
        self.factories
            .get(&factory)
            .map(|f| f.children.clone())
            .ok_or(OrchestratorError::UnknownFactory(factory))
    }

    pub fn get(&self, factory: ResourceId) -> Option<Factory> {
        self.factories.get(&factory).cloned()
    }

    pub fn contains(&self, factory: ResourceId) -> bool {
        self.factories.contains_key(&factory)
    }

    /// Factory that spawned `child`, if any.
    pub fn owner_of(&self, child: ResourceId) -> Option<ResourceId> {
        self.owners.get(&child).copied()
    }

    /// Track a rename made on the platform. A name already held by another
    /// factory is refused, as in [`Registry::register`].
    pub fn rename(&mut self, factory: ResourceId, name: &str) -> Result<()> {
        if self.factories.iter().any(|(id, f)| *id != factory && f.name == name) {
            return Err(OrchestratorError::DuplicateFactory {
                name: name.to_string(),
            });
        }
        let entry = self
            .factories
            .get_mut(&factory)
            .ok_or(OrchestratorError::UnknownFactory(factory))?;
        entry.name = name.to_string();
        Ok(())
    }

    /// Snapshot of every factory in registration order.
    pub fn factories(&self) -> Vec<Factory> {
        self.order
            .iter()
            .filter_map(|id| self.factories.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    fn has_name(&self, name: &str) -> bool {
        self.factories.values().any(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: ContextId = ContextId(1);

    fn id(n: u64) -> ResourceId {
        ResourceId(n)
    }

    #[test]
    fn register_then_append_assigns_sequential_indices() {
        let mut reg = Registry::new();
        reg.register(id(10), "Gaming", GUILD).unwrap();
        assert_eq!(reg.append_child(id(10), id(11)).unwrap(), 0);
        assert_eq!(reg.append_child(id(10), id(12)).unwrap(), 1);
        assert_eq!(reg.children_of(id(10)).unwrap(), vec![id(11), id(12)]);
        assert_eq!(reg.owner_of(id(12)), Some(id(10)));
    }

    #[test]
    fn duplicate_id_or_name_is_rejected_and_entry_untouched() {
        let mut reg = Registry::new();
        reg.register(id(10), "Gaming", GUILD).unwrap();
        reg.append_child(id(10), id(11)).unwrap();

        let err = reg.register(id(10), "Other", GUILD).unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateFactory { .. }));
        let err = reg.register(id(20), "Gaming", GUILD).unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateFactory { .. }));

        let f = reg.get(id(10)).unwrap();
        assert_eq!(f.name, "Gaming");
        assert_eq!(f.children, vec![id(11)]);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn child_id_cannot_become_a_factory() {
        let mut reg = Registry::new();
        reg.register(id(10), "Gaming", GUILD).unwrap();
        reg.append_child(id(10), id(11)).unwrap();
        assert!(reg.register(id(11), "Gaming 1", GUILD).is_err());
    }

    #[test]
    fn child_belongs_to_exactly_one_factory() {
        let mut reg = Registry::new();
        reg.register(id(10), "A", GUILD).unwrap();
        reg.register(id(20), "B", GUILD).unwrap();
        reg.append_child(id(10), id(11)).unwrap();
        assert!(matches!(
            reg.append_child(id(20), id(11)),
            Err(OrchestratorError::Internal(_))
        ));
        assert!(reg.children_of(id(20)).unwrap().is_empty());
    }

    #[test]
    fn append_to_unknown_factory_fails() {
        let mut reg = Registry::new();
        assert_eq!(
            reg.append_child(id(10), id(11)),
            Err(OrchestratorError::UnknownFactory(id(10)))
        );
    }

    #[test]
    fn prefix_resolution_is_first_registered_and_case_sensitive() {
        let mut reg = Registry::new();
        reg.register(id(10), "Gaming Lounge", GUILD).unwrap();
        reg.register(id(20), "Gaming", GUILD).unwrap();
        assert_eq!(reg.find_by_name_prefix("Gam"), Some(id(10)));
        assert_eq!(reg.find_by_name_prefix("Gaming"), Some(id(10)));
        assert_eq!(reg.find_by_name_prefix("gaming"), None);
        assert_eq!(reg.find_by_name_prefix("Music"), None);
    }

    #[test]
    fn remove_returns_children_and_forgets_everything() {
        let mut reg = Registry::new();
        reg.register(id(10), "Gaming", GUILD).unwrap();
        reg.append_child(id(10), id(11)).unwrap();
        reg.append_child(id(10), id(12)).unwrap();

        assert_eq!(reg.remove(id(10)).unwrap(), vec![id(11), id(12)]);
        assert!(!reg.contains(id(10)));
        assert_eq!(reg.owner_of(id(11)), None);
        assert_eq!(reg.find_by_name_prefix("Gaming"), None);
        assert_eq!(reg.remove(id(10)), Err(OrchestratorError::UnknownFactory(id(10))));
        assert!(reg.is_empty());
    }

    #[test]
    fn rename_changes_future_child_names() {
        let mut reg = Registry::new();
        reg.register(id(10), "Gaming", GUILD).unwrap();
        reg.rename(id(10), "Games").unwrap();
        assert_eq!(reg.get(id(10)).unwrap().child_name(0), "Games 1");
    }

    #[test]
    fn rename_onto_another_factorys_name_is_refused() {
        let mut reg = Registry::new();
        reg.register(id(10), "Gaming", GUILD).unwrap();
        reg.register(id(20), "Music", GUILD).unwrap();

        assert!(matches!(
            reg.rename(id(20), "Gaming"),
            Err(OrchestratorError::DuplicateFactory { .. })
        ));
        assert_eq!(reg.get(id(20)).unwrap().name, "Music");
        // renaming to its own name is a no-op, not a clash
        reg.rename(id(10), "Gaming").unwrap();
    }

    #[test]
    fn factories_snapshot_keeps_registration_order() {
        let mut reg = Registry::new();
        reg.register(id(30), "C", GUILD).unwrap();
        reg.register(id(10), "A", GUILD).unwrap();
        let names: Vec<_> = reg.factories().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["C", "A"]);
    }
}
