//! DOM-level automation core: deterministic, accessibility-aware primitives
//! for robotic control of web pages. The crate consumes an in-memory
//! document model ([`dom::Document`]) populated by the host (browser
//! extension + native host) and produces decisions: selector matches,
//! accessibility snapshots, element-state verdicts, hit-target checks and
//! motion-stability reports. Transport, command dispatch and real event
//! synthesis live in the host, not here.

pub mod aria;
pub mod cache;
pub mod css;
pub mod dom;
pub mod hit_target;
pub mod keys;
pub mod refs;
pub mod retarget;
pub mod roles;
pub mod selector;
pub mod snapshot;
pub mod stability;
pub mod state;
pub mod visibility;
pub mod xpath;

use anyhow::Result;
use tokio::time::Duration;

use crate::cache::{AriaCaches, CacheStats, SelectorCaches};
use crate::dom::{Document, NodeId, Point};
use crate::refs::RefRegistry;
use crate::selector::{EngineRegistry, QueryOptions, Selectors};
use crate::snapshot::{Snapshot, SnapshotOptions};
use crate::state::{BatchStateResult, ElementState, StateCheckResult};

pub use crate::hit_target::{
    describe_element, expect_hit_target, setup_hit_target_interceptor, HitTargetAction,
    HitTargetInterceptor, HitTargetResult, InterceptorOptions,
};
pub use crate::keys::{get_key_definition, KeyDefinition};
pub use crate::retarget::{retarget, RetargetBehavior};
pub use crate::snapshot::{format_snapshot, page_text, snapshot_json};
pub use crate::stability::{
    check_element_stability, check_element_stability as wait_for_element_stable, FrameClock,
    IntervalClock, StabilityOptions, StabilityResult,
};
pub use crate::visibility::{is_element_visible, is_element_visually_visible, is_hidden_by_css};

/// Center of the element's border box, regardless of visibility.
pub fn element_center(doc: &Document, node: NodeId) -> Point {
    doc.bounding_client_rect(node).center()
}

/// The point interactions aim at: the box center of a connected element
/// with a nonzero box.
pub fn clickable_point(doc: &Document, node: NodeId) -> Option<Point> {
    if !doc.is_connected(node) {
        return None;
    }
    let rect = doc.bounding_client_rect(node);
    if rect.is_empty() {
        return None;
    }
    Some(rect.center())
}

/// Visible and able to receive pointer events.
pub fn is_element_interactable(doc: &Document, node: NodeId) -> bool {
    is_element_visible(doc, node) && doc.pointer_events_enabled(node)
}

/// Per-session state for the core: ref registry, both cache families, and
/// the custom selector-engine registry. Hosts hold one context per
/// automation session instead of sharing process-wide singletons; tests get
/// isolation for free.
#[derive(Default)]
pub struct Context {
    aria_caches: AriaCaches,
    selector_caches: SelectorCaches,
    refs: RefRegistry,
    engines: EngineRegistry,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn aria_caches(&self) -> &AriaCaches {
        &self.aria_caches
    }

    pub fn selector_caches(&self) -> &SelectorCaches {
        &self.selector_caches
    }

    pub fn refs(&self) -> &RefRegistry {
        &self.refs
    }

    pub fn engines(&self) -> &EngineRegistry {
        &self.engines
    }

    /// Selector evaluation façade bound to a document.
    pub fn selectors<'a>(&'a self, doc: &'a Document) -> Selectors<'a> {
        Selectors::new(doc, &self.aria_caches, &self.selector_caches, &self.engines)
    }

    // ── Snapshots ──

    pub fn snapshot(&self, doc: &Document, root: NodeId, opts: SnapshotOptions<'_>) -> Snapshot {
        snapshot::capture_snapshot(&self.selectors(doc), &self.refs, root, opts)
    }

    // ── Queries ──

    pub fn query_selector(
        &self,
        doc: &Document,
        root: NodeId,
        expr: &str,
        opts: QueryOptions,
    ) -> Option<NodeId> {
        self.selectors(doc).query(root, expr, opts)
    }

    pub fn query_selector_all(
        &self,
        doc: &Document,
        root: NodeId,
        expr: &str,
        opts: QueryOptions,
    ) -> Vec<NodeId> {
        self.selectors(doc).query_all(root, expr, opts)
    }

    // ── Refs ──

    pub fn element_ref(&self, node: NodeId) -> String {
        self.refs.ref_for(node)
    }

    pub fn element_by_ref(&self, doc: &Document, id: &str) -> Option<NodeId> {
        self.refs.lookup(doc, id)
    }

    pub fn clear_element_refs(&self) {
        self.refs.clear_all();
    }

    // ── ARIA ──

    pub fn aria_role(&self, doc: &Document, node: NodeId) -> Option<roles::AriaRole> {
        aria::get_aria_role(&self.aria_caches, doc, node)
    }

    pub fn accessible_name(&self, doc: &Document, node: NodeId) -> String {
        aria::get_accessible_name(&self.aria_caches, doc, node, false)
    }

    pub fn accessible_description(&self, doc: &Document, node: NodeId) -> String {
        aria::get_accessible_description(&self.aria_caches, doc, node, false)
    }

    pub fn is_hidden_for_aria(&self, doc: &Document, node: NodeId) -> bool {
        aria::is_hidden_for_aria(&self.aria_caches, doc, node)
    }

    // ── Element state ──

    pub fn check_element_state(
        &self,
        doc: &Document,
        node: NodeId,
        state: ElementState,
    ) -> Result<StateCheckResult> {
        state::check_element_state(&self.aria_caches, doc, node, state)
    }

    pub fn check_element_states(
        &self,
        doc: &Document,
        node: NodeId,
        states: &[ElementState],
    ) -> Result<BatchStateResult> {
        state::check_element_states(&self.aria_caches, doc, node, states)
    }

    pub async fn wait_for_element_state(
        &self,
        doc: &Document,
        node: NodeId,
        state: ElementState,
        timeout: Duration,
    ) -> Result<StateCheckResult> {
        state::wait_for_element_state(&self.aria_caches, doc, node, state, timeout).await
    }

    // ── Cache controls ──

    pub fn begin_aria_caches(&self) {
        self.aria_caches.begin();
    }

    pub fn end_aria_caches(&self) {
        self.aria_caches.end();
    }

    pub fn with_aria_cache<R>(&self, f: impl FnOnce() -> R) -> R {
        self.aria_caches.with(f)
    }

    pub async fn with_aria_cache_async<R, F: std::future::Future<Output = R>>(&self, f: F) -> R {
        self.aria_caches.with_async(f).await
    }

    pub fn begin_selector_caches(&self) {
        self.selector_caches.begin();
    }

    pub fn end_selector_caches(&self) {
        self.selector_caches.end();
    }

    pub fn with_selector_cache<R>(&self, f: impl FnOnce() -> R) -> R {
        self.selector_caches.with(f)
    }

    pub async fn with_selector_cache_async<R, F: std::future::Future<Output = R>>(
        &self,
        f: F,
    ) -> R {
        self.selector_caches.with_async(f).await
    }

    pub fn cache_stats(&self) -> (CacheStats, CacheStats) {
        (self.aria_caches.stats(), self.selector_caches.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Rect;

    #[test]
    fn context_round_trips_refs() {
        let ctx = Context::new();
        let doc = Document::parse_fragment("<button>Go</button>");
        let button = doc.child_elements(doc.root())[0];
        let id = ctx.element_ref(button);
        assert_eq!(ctx.element_by_ref(&doc, &id), Some(button));
        ctx.clear_element_refs();
        assert_eq!(ctx.element_by_ref(&doc, &id), None);
    }

    #[test]
    fn clickable_point_requires_connected_nonzero_box() {
        let doc = Document::parse_fragment("<button>Go</button>");
        let button = doc.child_elements(doc.root())[0];
        assert_eq!(clickable_point(&doc, button), None, "no layout yet");
        doc.set_bounds(button, Rect::new(10.0, 20.0, 100.0, 40.0));
        assert_eq!(clickable_point(&doc, button), Some(Point::new(60.0, 40.0)));
        assert_eq!(element_center(&doc, button), Point::new(60.0, 40.0));
        doc.detach(button);
        assert_eq!(clickable_point(&doc, button), None);
    }

    #[test]
    fn interactable_needs_visibility_and_pointer_events() {
        let doc = Document::parse_fragment(
            "<button id=\"a\">x</button><button id=\"b\" style=\"pointer-events:none\">x</button>",
        );
        let els = doc.child_elements(doc.root());
        doc.set_bounds(els[0], Rect::new(0.0, 0.0, 10.0, 10.0));
        doc.set_bounds(els[1], Rect::new(0.0, 0.0, 10.0, 10.0));
        assert!(is_element_interactable(&doc, els[0]));
        assert!(!is_element_interactable(&doc, els[1]));
    }

    #[test]
    fn contexts_are_isolated() {
        let doc = Document::parse_fragment("<button>Go</button>");
        let button = doc.child_elements(doc.root())[0];
        let a = Context::new();
        let b = Context::new();
        assert_eq!(a.element_ref(button), "ref_1");
        assert_eq!(b.element_ref(button), "ref_1");
        a.begin_aria_caches();
        assert!(a.aria_caches().is_active());
        assert!(!b.aria_caches().is_active());
        a.end_aria_caches();
    }

    #[tokio::test]
    async fn async_cache_helper_spans_awaits() {
        let ctx = Context::new();
        ctx.with_selector_cache_async(async {
            assert!(ctx.selector_caches().is_active());
            tokio::task::yield_now().await;
        })
        .await;
        assert!(!ctx.selector_caches().is_active());
    }
}
