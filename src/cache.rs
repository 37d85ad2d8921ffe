//! Scoped memoization for ARIA computation and selector evaluation.
//!
//! Both cache families are reference-counted sessions: `begin` increments a
//! depth counter, `end` decrements and clears every map when the count
//! reaches zero. Nested sessions share the same maps. Entries are NOT
//! invalidated by DOM mutation; callers must not hold a session across
//! mutations they care about (or call `clear_all`).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;

use crate::dom::NodeId;
use crate::roles::AriaRole;

/// Observable cache counters for tests and diagnostics. `per_map` lists
/// `(map name, entry count)` pairs; `entries` is their sum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub per_map: Vec<(&'static str, usize)>,
    pub hits: u64,
    pub misses: u64,
    pub depth: u32,
    pub active: bool,
}

#[derive(Default)]
struct AriaMaps {
    name: HashMap<(NodeId, bool), String>,
    description: HashMap<(NodeId, bool), String>,
    hidden: HashMap<NodeId, bool>,
    role: HashMap<NodeId, Option<AriaRole>>,
    pointer_events: HashMap<NodeId, bool>,
}

impl AriaMaps {
    fn len(&self) -> usize {
        self.name.len()
            + self.description.len()
            + self.hidden.len()
            + self.role.len()
            + self.pointer_events.len()
    }
}

/// Memoizes accessible name/description, hidden-for-ARIA, resolved role and
/// pointer-events per node while a session is active.
#[derive(Default)]
pub struct AriaCaches {
    maps: RefCell<AriaMaps>,
    depth: Cell<u32>,
    hits: Cell<u64>,
    misses: Cell<u64>,
}

impl AriaCaches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) {
        self.depth.set(self.depth.get() + 1);
    }

    /// Unbalanced `end` calls clamp at zero instead of underflowing.
    pub fn end(&self) {
        let depth = self.depth.get().saturating_sub(1);
        self.depth.set(depth);
        if depth == 0 {
            self.clear_all();
        }
    }

    pub fn is_active(&self) -> bool {
        self.depth.get() > 0
    }

    /// Empty every map without touching the session counter.
    pub fn clear_all(&self) {
        *self.maps.borrow_mut() = AriaMaps::default();
    }

    /// Run `f` inside a cache session; the session ends on every exit path,
    /// including panics.
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        let _session = AriaCacheSession::begin(self);
        f()
    }

    /// Like [`AriaCaches::with`], but spanning suspension points. The
    /// session also ends when the future is dropped mid-flight.
    pub async fn with_async<R, F: Future<Output = R>>(&self, f: F) -> R {
        let _session = AriaCacheSession::begin(self);
        f.await
    }

    fn record(&self, hit: bool) {
        if hit {
            self.hits.set(self.hits.get() + 1);
        } else {
            self.misses.set(self.misses.get() + 1);
        }
    }

    pub fn name_or_insert_with(
        &self,
        node: NodeId,
        include_hidden: bool,
        compute: impl FnOnce() -> String,
    ) -> String {
        if !self.is_active() {
            return compute();
        }
        if let Some(cached) = self.maps.borrow().name.get(&(node, include_hidden)) {
            self.record(true);
            return cached.clone();
        }
        self.record(false);
        let value = compute();
        self.maps
            .borrow_mut()
            .name
            .insert((node, include_hidden), value.clone());
        value
    }

    pub fn description_or_insert_with(
        &self,
        node: NodeId,
        include_hidden: bool,
        compute: impl FnOnce() -> String,
    ) -> String {
        if !self.is_active() {
            return compute();
        }
        if let Some(cached) = self.maps.borrow().description.get(&(node, include_hidden)) {
            self.record(true);
            return cached.clone();
        }
        self.record(false);
        let value = compute();
        self.maps
            .borrow_mut()
            .description
            .insert((node, include_hidden), value.clone());
        value
    }

    pub fn hidden_or_insert_with(&self, node: NodeId, compute: impl FnOnce() -> bool) -> bool {
        if !self.is_active() {
            return compute();
        }
        if let Some(&cached) = self.maps.borrow().hidden.get(&node) {
            self.record(true);
            return cached;
        }
        self.record(false);
        let value = compute();
        self.maps.borrow_mut().hidden.insert(node, value);
        value
    }

    pub fn role_or_insert_with(
        &self,
        node: NodeId,
        compute: impl FnOnce() -> Option<AriaRole>,
    ) -> Option<AriaRole> {
        if !self.is_active() {
            return compute();
        }
        if let Some(cached) = self.maps.borrow().role.get(&node) {
            self.record(true);
            return *cached;
        }
        self.record(false);
        let value = compute();
        self.maps.borrow_mut().role.insert(node, value);
        value
    }

    pub fn pointer_events_or_insert_with(
        &self,
        node: NodeId,
        compute: impl FnOnce() -> bool,
    ) -> bool {
        if !self.is_active() {
            return compute();
        }
        if let Some(&cached) = self.maps.borrow().pointer_events.get(&node) {
            self.record(true);
            return cached;
        }
        self.record(false);
        let value = compute();
        self.maps.borrow_mut().pointer_events.insert(node, value);
        value
    }

    pub fn stats(&self) -> CacheStats {
        let maps = self.maps.borrow();
        CacheStats {
            entries: maps.len(),
            per_map: vec![
                ("name", maps.name.len()),
                ("description", maps.description.len()),
                ("hidden", maps.hidden.len()),
                ("role", maps.role.len()),
                ("pointer-events", maps.pointer_events.len()),
            ],
            hits: self.hits.get(),
            misses: self.misses.get(),
            depth: self.depth.get(),
            active: self.is_active(),
        }
    }
}

/// RAII guard for an ARIA cache session.
pub struct AriaCacheSession<'a> {
    caches: &'a AriaCaches,
}

impl<'a> AriaCacheSession<'a> {
    pub fn begin(caches: &'a AriaCaches) -> Self {
        caches.begin();
        Self { caches }
    }
}

impl Drop for AriaCacheSession<'_> {
    fn drop(&mut self) {
        self.caches.end();
    }
}

/// Key for selector-cache maps: `(document, root handle, selector text)`.
/// Distinct documents and distinct shadow roots never collide.
type SelectorKey = (u64, NodeId, String);

#[derive(Default)]
struct SelectorMaps {
    query: HashMap<SelectorKey, Option<NodeId>>,
    query_all: HashMap<SelectorKey, Vec<NodeId>>,
    matches: HashMap<(u64, NodeId, String), bool>,
    text: HashMap<(u64, NodeId), String>,
}

impl SelectorMaps {
    fn len(&self) -> usize {
        self.query.len() + self.query_all.len() + self.matches.len() + self.text.len()
    }
}

/// Memoizes `query`/`query_all`/`matches` results and element text while a
/// session is active. Session semantics are identical to [`AriaCaches`].
#[derive(Default)]
pub struct SelectorCaches {
    maps: RefCell<SelectorMaps>,
    depth: Cell<u32>,
    hits: Cell<u64>,
    misses: Cell<u64>,
}

impl SelectorCaches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) {
        self.depth.set(self.depth.get() + 1);
    }

    pub fn end(&self) {
        let depth = self.depth.get().saturating_sub(1);
        self.depth.set(depth);
        if depth == 0 {
            self.clear_all();
        }
    }

    pub fn is_active(&self) -> bool {
        self.depth.get() > 0
    }

    pub fn clear_all(&self) {
        *self.maps.borrow_mut() = SelectorMaps::default();
    }

    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        let _session = SelectorCacheSession::begin(self);
        f()
    }

    pub async fn with_async<R, F: Future<Output = R>>(&self, f: F) -> R {
        let _session = SelectorCacheSession::begin(self);
        f.await
    }

    fn record(&self, hit: bool) {
        if hit {
            self.hits.set(self.hits.get() + 1);
        } else {
            self.misses.set(self.misses.get() + 1);
        }
    }

    pub fn query_or_insert_with(
        &self,
        doc_id: u64,
        root: NodeId,
        selector: &str,
        compute: impl FnOnce() -> Option<NodeId>,
    ) -> Option<NodeId> {
        if !self.is_active() {
            return compute();
        }
        let key = (doc_id, root, selector.to_string());
        if let Some(cached) = self.maps.borrow().query.get(&key) {
            self.record(true);
            return *cached;
        }
        self.record(false);
        let value = compute();
        self.maps.borrow_mut().query.insert(key, value);
        value
    }

    pub fn query_all_or_insert_with(
        &self,
        doc_id: u64,
        root: NodeId,
        selector: &str,
        compute: impl FnOnce() -> Vec<NodeId>,
    ) -> Vec<NodeId> {
        if !self.is_active() {
            return compute();
        }
        let key = (doc_id, root, selector.to_string());
        if let Some(cached) = self.maps.borrow().query_all.get(&key) {
            self.record(true);
            return cached.clone();
        }
        self.record(false);
        let value = compute();
        self.maps.borrow_mut().query_all.insert(key, value.clone());
        value
    }

    pub fn matches_or_insert_with(
        &self,
        doc_id: u64,
        node: NodeId,
        selector: &str,
        compute: impl FnOnce() -> bool,
    ) -> bool {
        if !self.is_active() {
            return compute();
        }
        let key = (doc_id, node, selector.to_string());
        if let Some(&cached) = self.maps.borrow().matches.get(&key) {
            self.record(true);
            return cached;
        }
        self.record(false);
        let value = compute();
        self.maps.borrow_mut().matches.insert(key, value);
        value
    }

    pub fn text_or_insert_with(
        &self,
        doc_id: u64,
        node: NodeId,
        compute: impl FnOnce() -> String,
    ) -> String {
        if !self.is_active() {
            return compute();
        }
        if let Some(cached) = self.maps.borrow().text.get(&(doc_id, node)) {
            self.record(true);
            return cached.clone();
        }
        self.record(false);
        let value = compute();
        self.maps
            .borrow_mut()
            .text
            .insert((doc_id, node), value.clone());
        value
    }

    pub fn stats(&self) -> CacheStats {
        let maps = self.maps.borrow();
        CacheStats {
            entries: maps.len(),
            per_map: vec![
                ("query", maps.query.len()),
                ("query-all", maps.query_all.len()),
                ("matches", maps.matches.len()),
                ("text", maps.text.len()),
            ],
            hits: self.hits.get(),
            misses: self.misses.get(),
            depth: self.depth.get(),
            active: self.is_active(),
        }
    }
}

/// RAII guard for a selector cache session.
pub struct SelectorCacheSession<'a> {
    caches: &'a SelectorCaches,
}

impl<'a> SelectorCacheSession<'a> {
    pub fn begin(caches: &'a SelectorCaches) -> Self {
        caches.begin();
        Self { caches }
    }
}

impl Drop for SelectorCacheSession<'_> {
    fn drop(&mut self) {
        self.caches.end();
    }
}
