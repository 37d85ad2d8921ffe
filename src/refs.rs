use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::dom::{Document, NodeId};

/// Stable opaque id ↔ element mapping for cross-boundary references. Ids are
/// ascending strings (`ref_1`, `ref_2`, …) assigned on first exposure; an
/// element keeps its id for the lifetime of the registry.
pub struct RefRegistry {
    by_id: RefCell<HashMap<String, NodeId>>,
    by_node: RefCell<HashMap<NodeId, String>>,
    next: Cell<u64>,
}

impl Default for RefRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RefRegistry {
    pub fn new() -> Self {
        Self {
            by_id: RefCell::new(HashMap::new()),
            by_node: RefCell::new(HashMap::new()),
            next: Cell::new(1),
        }
    }

    /// The ref for an element, assigning the next id on first exposure.
    pub fn ref_for(&self, node: NodeId) -> String {
        if let Some(existing) = self.by_node.borrow().get(&node) {
            return existing.clone();
        }
        let id = format!("ref_{}", self.next.get());
        self.next.set(self.next.get() + 1);
        self.by_id.borrow_mut().insert(id.clone(), node);
        self.by_node.borrow_mut().insert(node, id.clone());
        id
    }

    /// Reverse lookup. Returns `None` for unknown ids and for elements that
    /// have gone stale (detached from their document).
    pub fn lookup(&self, doc: &Document, id: &str) -> Option<NodeId> {
        let node = *self.by_id.borrow().get(id)?;
        doc.is_connected(node).then_some(node)
    }

    /// Lookup without the staleness check, for callers that want to report
    /// "element is not connected" themselves.
    pub fn lookup_raw(&self, id: &str) -> Option<NodeId> {
        self.by_id.borrow().get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.borrow().is_empty()
    }

    /// Drop the whole table. Previously handed-out ids stop resolving; new
    /// assignments restart from `ref_1`.
    pub fn clear_all(&self) {
        self.by_id.borrow_mut().clear();
        self.by_node.borrow_mut().clear();
        self.next.set(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_ascend_and_are_stable_per_node() {
        let doc = Document::parse_fragment("<button>a</button><button>b</button>");
        let els = doc.child_elements(doc.root());
        let refs = RefRegistry::new();
        assert_eq!(refs.ref_for(els[0]), "ref_1");
        assert_eq!(refs.ref_for(els[1]), "ref_2");
        assert_eq!(refs.ref_for(els[0]), "ref_1");
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn lookup_resolves_to_the_same_element() {
        let doc = Document::parse_fragment("<button>a</button>");
        let button = doc.child_elements(doc.root())[0];
        let refs = RefRegistry::new();
        let id = refs.ref_for(button);
        assert_eq!(refs.lookup(&doc, &id), Some(button));
        assert_eq!(refs.lookup(&doc, "ref_99"), None);
    }

    #[test]
    fn detached_element_reads_as_stale() {
        let doc = Document::parse_fragment("<button>a</button>");
        let button = doc.child_elements(doc.root())[0];
        let refs = RefRegistry::new();
        let id = refs.ref_for(button);
        doc.detach(button);
        assert_eq!(refs.lookup(&doc, &id), None);
        assert_eq!(refs.lookup_raw(&id), Some(button));
    }

    #[test]
    fn clear_restarts_numbering() {
        let doc = Document::parse_fragment("<button>a</button>");
        let button = doc.child_elements(doc.root())[0];
        let refs = RefRegistry::new();
        refs.ref_for(button);
        refs.clear_all();
        assert!(refs.is_empty());
        assert_eq!(refs.ref_for(button), "ref_1");
    }
}
