//! The registry: a mapping from plan nodes to value stores.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::builtins;
use crate::call_site::CallSite;
use crate::errors::PlanError;
use crate::graph::Node;
use crate::plan::Plan;
use crate::store::ValueStore;

#[derive(Clone)]
pub(crate) struct RegistryEntry {
    pub store: Arc<dyn ValueStore>,
    pub is_source: bool,
    pub call_site: CallSite,
}

/// Associates plan nodes with [`ValueStore`]s.
///
/// A node participates in at most one relationship: *stored* (the node's
/// computed value is written to and read back from the store) or *sourced*
/// (a placeholder node whose only way to produce a value is reading the
/// store).
#[derive(Clone, Default)]
pub struct Registry {
    mapping: IndexMap<Node, RegistryEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a store to a node the plan computes.
    #[track_caller]
    pub fn add(&mut self, node: Node, store: Arc<dyn ValueStore>) -> Result<(), PlanError> {
        if self.mapping.contains_key(&node) {
            return Err(PlanError::DuplicateStore);
        }
        self.mapping.insert(
            node,
            RegistryEntry {
                store,
                is_source: false,
                call_site: CallSite::capture(),
            },
        );
        Ok(())
    }

    /// Create a node in `plan` that reads from the given store.
    ///
    /// The returned node is a placeholder: running the plan without this
    /// registry fails with [`crate::NotTransformedError`].
    #[track_caller]
    pub fn source(&mut self, plan: &mut Plan, store: Arc<dyn ValueStore>) -> Node {
        let site = CallSite::capture();
        let placeholder = builtins::source_placeholder();
        let node = plan.call_with_args(site, &placeholder, Vec::new(), Vec::new());
        self.mapping.insert(
            node,
            RegistryEntry {
                store,
                is_source: true,
                call_site: site,
            },
        );
        node
    }

    pub fn contains(&self, node: Node) -> bool {
        self.mapping.contains_key(&node)
    }

    pub fn get(&self, node: Node) -> Option<&Arc<dyn ValueStore>> {
        self.mapping.get(&node).map(|entry| &entry.store)
    }

    /// Registered (node, store) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Node, &Arc<dyn ValueStore>)> {
        self.mapping.iter().map(|(node, entry)| (*node, &entry.store))
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    pub(crate) fn entry(&self, node: Node) -> Option<&RegistryEntry> {
        self.mapping.get(&node)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (Node, &RegistryEntry)> {
        self.mapping.iter().map(|(node, entry)| (*node, entry))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.mapping.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::TestStore;

    #[test]
    fn add_rejects_a_second_store_for_the_same_node() {
        let mut plan = Plan::new();
        let mut registry = Registry::new();
        let node = plan.lit(1);
        registry
            .add(node, Arc::new(TestStore::new()))
            .expect("first add");
        assert!(matches!(
            registry.add(node, Arc::new(TestStore::new())),
            Err(PlanError::DuplicateStore)
        ));
    }

    #[test]
    fn source_adds_a_placeholder_to_the_plan() {
        let mut plan = Plan::new();
        let mut registry = Registry::new();
        let node = registry.source(&mut plan, Arc::new(TestStore::new()));
        assert!(plan.contains(node));
        assert!(registry.contains(node));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut plan = Plan::new();
        let mut registry = Registry::new();
        let a = plan.lit(1);
        let b = plan.lit(2);
        registry.add(b, Arc::new(TestStore::new())).expect("add b");
        registry.add(a, Arc::new(TestStore::new())).expect("add a");
        let order: Vec<Node> = registry.iter().map(|(node, _)| node).collect();
        assert_eq!(order, vec![b, a]);
    }
}
