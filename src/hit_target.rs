//! Hit-target verification: resolving what the browser would actually hit
//! at a point in the composed tree, describing the blocker when it is not
//! the intended target, and intercepting real events around a dispatch.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use tracing::debug;

use crate::dom::{
    DispatchedEvent, Display, Document, EventReaction, ListenerId, NodeId, Point,
};
use crate::roles::{is_boolean_attribute, is_void_tag};

const MAX_ATTR_LENGTH: usize = 500;
const MAX_TEXT_LENGTH: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitTargetResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl HitTargetResult {
    pub fn success() -> Self {
        Self {
            success: true,
            blocked: None,
            description: None,
        }
    }

    pub fn blocked(description: Option<String>) -> Self {
        Self {
            success: false,
            blocked: Some(true),
            description,
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

/// Single-line HTML-like rendering of an element: lowercase tag, attributes
/// sorted by name (`style` omitted, values capped at 500 chars), text capped
/// at 50 chars with an ellipsis standing in for nested markup, self-closing
/// form for void elements.
pub fn describe_element(doc: &Document, node: NodeId) -> String {
    let Some(tag) = doc.tag_name(node) else {
        return String::new();
    };
    let mut attrs = doc.attributes(node);
    attrs.retain(|(name, _)| name != "style");
    attrs.sort_by(|a, b| a.0.cmp(&b.0));
    let mut out = format!("<{tag}");
    for (name, value) in &attrs {
        if value.is_empty() && is_boolean_attribute(name) {
            out.push_str(&format!(" {name}"));
        } else {
            out.push_str(&format!(" {name}=\"{}\"", truncate(value, MAX_ATTR_LENGTH)));
        }
    }
    if is_void_tag(&tag) {
        out.push_str("/>");
        return out;
    }
    out.push('>');
    let text = crate::aria::normalize_whitespace(&doc.text_content(node));
    if text.is_empty() {
        if !doc.child_elements(node).is_empty() {
            out.push('…');
        }
    } else {
        out.push_str(&truncate(&text, MAX_TEXT_LENGTH));
    }
    out.push_str(&format!("</{tag}>"));
    out
}

/// The chain of tree scopes enclosing `target`, outermost first: the
/// document, then each shadow root on the way down to the target.
fn component_roots(doc: &Document, target: NodeId) -> Vec<NodeId> {
    let mut roots = Vec::new();
    let mut scope = doc.tree_scope(target);
    loop {
        roots.push(scope);
        if doc.is_shadow_root(scope) {
            match doc.parent(scope) {
                Some(host) => scope = doc.tree_scope(host),
                None => break,
            }
        } else {
            break;
        }
    }
    roots.reverse();
    roots
}

/// Resolve the element the composed tree would hit at `point`, walking the
/// component-root chain from the outermost scope inward.
fn resolve_hit_element(doc: &Document, point: Point, target: NodeId) -> Option<NodeId> {
    let roots = component_roots(doc, target);
    let mut hit = None;
    for (depth, &root) in roots.iter().enumerate() {
        let mut list = doc.elements_from_point(point, root);
        // A display:contents element can win elementFromPoint while being
        // absent from elementsFromPoint; put it back on top.
        if let Some(efp) = doc.element_from_point(point, root) {
            if doc.computed_display(efp) == Display::Contents && list.first() != Some(&efp) {
                list.insert(0, efp);
            }
        }
        // WebKit can report a shadow host above its own distributed child;
        // drop the host so the child wins.
        if list.len() >= 2 {
            let (host, child) = (list[0], list[1]);
            if doc.parent_element(child) == Some(host)
                && doc.shadow_root(host).is_some()
                && doc.assigned_slot(child).is_some()
            {
                list.remove(0);
            }
        }
        let next_host = roots.get(depth + 1).and_then(|&inner| doc.parent(inner));
        match next_host {
            Some(host) if list.contains(&host) => continue,
            _ => {
                hit = list.first().copied();
                break;
            }
        }
    }
    hit
}

/// Check that an event dispatched at `point` would reach `target`, walking
/// up the composed tree (assigned slots preferred) from the actual hit.
pub fn expect_hit_target(doc: &Document, point: Point, target: NodeId) -> HitTargetResult {
    if !doc.is_connected(target) {
        return HitTargetResult::blocked(Some("Element is not connected to the DOM".to_string()));
    }
    let Some(hit) = resolve_hit_element(doc, point, target) else {
        return HitTargetResult::blocked(None);
    };
    let mut current = Some(hit);
    while let Some(node) = current {
        if node == target {
            return HitTargetResult::success();
        }
        current = doc.composed_parent(node);
    }
    debug!(?point, blocker = %describe_element(doc, hit), "hit target blocked");
    HitTargetResult::blocked(Some(describe_element(doc, hit)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTargetAction {
    Click,
    Hover,
    Drag,
    Tap,
}

impl HitTargetAction {
    fn event_set(&self) -> &'static [&'static str] {
        match self {
            HitTargetAction::Hover => &["mousemove"],
            HitTargetAction::Click => &[
                "mousedown",
                "mouseup",
                "click",
                "dblclick",
                "auxclick",
                "contextmenu",
                "pointerdown",
                "pointerup",
            ],
            HitTargetAction::Tap => &[
                "pointerdown",
                "pointerup",
                "touchstart",
                "touchend",
                "touchcancel",
            ],
            // The dragged element occludes the drop target, so hit-testing
            // during drag is meaningless.
            HitTargetAction::Drag => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InterceptorOptions {
    /// Swallow every event in the set regardless of the verdict.
    pub block_all_events: bool,
}

/// Capture-phase event interceptor wrapped around a host dispatch. The
/// first trusted event of the action's set re-evaluates the hit target at
/// the event's own coordinates and latches the verdict; failing (or
/// `block_all_events`) dispatches are prevented and fully stopped.
pub struct HitTargetInterceptor<'d> {
    doc: &'d Document,
    listener: Option<ListenerId>,
    verdict: Rc<RefCell<Option<HitTargetResult>>>,
}

pub fn setup_hit_target_interceptor<'d>(
    doc: &'d Document,
    target: NodeId,
    hit_point: Point,
    action: HitTargetAction,
    options: InterceptorOptions,
) -> HitTargetInterceptor<'d> {
    let verdict: Rc<RefCell<Option<HitTargetResult>>> = Rc::new(RefCell::new(None));
    let events = action.event_set();
    if events.is_empty() {
        return HitTargetInterceptor {
            doc,
            listener: None,
            verdict,
        };
    }
    let preliminary = expect_hit_target(doc, hit_point, target);
    if !preliminary.success {
        *verdict.borrow_mut() = Some(preliminary);
        return HitTargetInterceptor {
            doc,
            listener: None,
            verdict,
        };
    }
    let state = Rc::clone(&verdict);
    let listener = doc.add_event_listener(events, move |doc, event| {
        if !event.trusted {
            return EventReaction::default();
        }
        if state.borrow().is_none() {
            *state.borrow_mut() = Some(expect_hit_target(doc, event.point, target));
        }
        let failed = state
            .borrow()
            .as_ref()
            .map(|r| !r.success)
            .unwrap_or(false);
        if failed || options.block_all_events {
            EventReaction {
                prevent_default: true,
                stop_propagation: true,
            }
        } else {
            EventReaction::default()
        }
    });
    HitTargetInterceptor {
        doc,
        listener: Some(listener),
        verdict,
    }
}

impl HitTargetInterceptor<'_> {
    /// The latched verdict. Environments that fire no events at all are
    /// treated as success.
    pub fn verify(&self) -> HitTargetResult {
        self.verdict
            .borrow()
            .clone()
            .unwrap_or_else(HitTargetResult::success)
    }

    /// Release listener registrations. Safe to call any number of times.
    pub fn stop(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.doc.remove_event_listener(listener);
        }
    }
}

impl Drop for HitTargetInterceptor<'_> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Rect;

    fn sized(doc: &Document, node: NodeId, rect: Rect) {
        doc.set_bounds(node, rect);
    }

    // ── describe_element ──

    #[test]
    fn description_sorts_attrs_and_drops_style() {
        let doc = Document::parse_fragment(
            "<div title=\"z\" id=\"overlay\" style=\"color:red\" class=\"veil\">Blocking</div>",
        );
        let div = doc.child_elements(doc.root())[0];
        assert_eq!(
            describe_element(&doc, div),
            "<div class=\"veil\" id=\"overlay\" title=\"z\">Blocking</div>"
        );
    }

    #[test]
    fn description_truncates_and_self_closes() {
        let doc = Document::parse_fragment("<img src=\"x.png\"><div><span>deep</span></div>");
        let els = doc.child_elements(doc.root());
        assert_eq!(describe_element(&doc, els[0]), "<img src=\"x.png\"/>");
        let doc2 = Document::parse_fragment("<div><section></section></div>");
        let wrapper = doc2.child_elements(doc2.root())[0];
        assert_eq!(describe_element(&doc2, wrapper), "<div>…</div>");
        let long = "a".repeat(80);
        let doc3 = Document::parse_fragment(&format!("<p>{long}</p>"));
        let p = doc3.child_elements(doc3.root())[0];
        let described = describe_element(&doc3, p);
        assert!(described.starts_with("<p>"));
        assert!(described.contains('…'));
        assert!(described.len() < long.len());
    }

    #[test]
    fn boolean_attributes_render_bare() {
        let doc = Document::parse_fragment("<input disabled required type=\"text\">");
        let input = doc.child_elements(doc.root())[0];
        assert_eq!(
            describe_element(&doc, input),
            "<input disabled required type=\"text\"/>"
        );
    }

    // ── expect_hit_target ──

    #[test]
    fn direct_hit_succeeds() {
        let doc = Document::parse_fragment("<button id=\"go\">Go</button>");
        let button = doc.child_elements(doc.root())[0];
        sized(&doc, button, Rect::new(0.0, 0.0, 100.0, 50.0));
        let result = expect_hit_target(&doc, Point::new(50.0, 25.0), button);
        assert_eq!(result, HitTargetResult::success());
    }

    #[test]
    fn hit_on_descendant_reaches_target() {
        let doc = Document::parse_fragment("<button id=\"go\"><span id=\"icon\">★</span></button>");
        let button = doc.child_elements(doc.root())[0];
        let icon = doc.child_elements(button)[0];
        sized(&doc, button, Rect::new(0.0, 0.0, 100.0, 50.0));
        sized(&doc, icon, Rect::new(10.0, 10.0, 20.0, 20.0));
        let result = expect_hit_target(&doc, Point::new(15.0, 15.0), button);
        assert!(result.success);
    }

    #[test]
    fn overlay_blocks_with_description() {
        let doc = Document::parse_fragment(
            "<button id=\"go\">Go</button><div id=\"overlay\">Wait…</div>",
        );
        let button = doc.child_elements(doc.root())[0];
        let overlay = doc.child_elements(doc.root())[1];
        sized(&doc, button, Rect::new(0.0, 0.0, 100.0, 50.0));
        sized(&doc, overlay, Rect::new(0.0, 0.0, 400.0, 400.0));
        let result = expect_hit_target(&doc, Point::new(50.0, 25.0), button);
        assert!(!result.success);
        assert_eq!(result.blocked, Some(true));
        assert!(result
            .description
            .as_deref()
            .unwrap()
            .starts_with("<div id=\"overlay\">"));
    }

    #[test]
    fn disconnected_target_fails() {
        let doc = Document::parse_fragment("<button>Go</button>");
        let button = doc.child_elements(doc.root())[0];
        doc.detach(button);
        let result = expect_hit_target(&doc, Point::new(0.0, 0.0), button);
        assert_eq!(
            result.description.as_deref(),
            Some("Element is not connected to the DOM")
        );
    }

    #[test]
    fn hit_resolves_through_shadow_roots() {
        let doc = Document::parse_fragment("<x-app id=\"host\"></x-app>");
        let host = doc.child_elements(doc.root())[0];
        sized(&doc, host, Rect::new(0.0, 0.0, 200.0, 200.0));
        let shadow = doc.attach_shadow(host);
        let inner = doc.append_element(shadow, "button", &[("id", "inner")]);
        sized(&doc, inner, Rect::new(10.0, 10.0, 50.0, 20.0));
        let result = expect_hit_target(&doc, Point::new(20.0, 20.0), inner);
        assert!(result.success, "descends through the host into the shadow");
        // A point on the host but off the button misses the target.
        let result = expect_hit_target(&doc, Point::new(150.0, 150.0), inner);
        assert!(!result.success);
    }

    // ── Interceptor ──

    fn overlay_fixture() -> (Document, NodeId, NodeId) {
        let doc = Document::parse_fragment(
            "<button id=\"go\">Go</button><div id=\"overlay\">Veil</div>",
        );
        let button = doc.child_elements(doc.root())[0];
        let overlay = doc.child_elements(doc.root())[1];
        doc.set_bounds(button, Rect::new(0.0, 0.0, 100.0, 50.0));
        doc.set_bounds(overlay, Rect::new(200.0, 200.0, 50.0, 50.0));
        (doc, button, overlay)
    }

    #[test]
    fn clean_dispatch_verifies_success() {
        let (doc, button, _) = overlay_fixture();
        let point = Point::new(50.0, 25.0);
        let mut interceptor = setup_hit_target_interceptor(
            &doc,
            button,
            point,
            HitTargetAction::Click,
            InterceptorOptions::default(),
        );
        let outcome = doc.dispatch_event(&DispatchedEvent::trusted("mousedown", point));
        assert!(!outcome.default_prevented);
        let outcome = doc.dispatch_event(&DispatchedEvent::trusted("click", point));
        assert!(!outcome.default_prevented);
        assert!(interceptor.verify().success);
        interceptor.stop();
        assert_eq!(doc.listener_count(), 0);
    }

    #[test]
    fn event_at_moved_coordinates_is_blocked() {
        let (doc, button, overlay) = overlay_fixture();
        let point = Point::new(50.0, 25.0);
        let mut interceptor = setup_hit_target_interceptor(
            &doc,
            button,
            point,
            HitTargetAction::Click,
            InterceptorOptions::default(),
        );
        // By dispatch time the layout shifted: the overlay now covers the
        // point the event lands on.
        doc.set_bounds(overlay, Rect::new(0.0, 0.0, 400.0, 400.0));
        let outcome = doc.dispatch_event(&DispatchedEvent::trusted("mousedown", point));
        assert!(outcome.default_prevented);
        assert!(outcome.propagation_stopped);
        let verdict = interceptor.verify();
        assert!(!verdict.success);
        assert!(verdict.description.unwrap().contains("overlay"));
        interceptor.stop();
    }

    #[test]
    fn preliminary_failure_short_circuits() {
        let (doc, button, overlay) = overlay_fixture();
        doc.set_bounds(overlay, Rect::new(0.0, 0.0, 400.0, 400.0));
        let point = Point::new(50.0, 25.0);
        let mut interceptor = setup_hit_target_interceptor(
            &doc,
            button,
            point,
            HitTargetAction::Click,
            InterceptorOptions::default(),
        );
        assert_eq!(doc.listener_count(), 0, "no listeners after early failure");
        assert!(!interceptor.verify().success);
        interceptor.stop();
    }

    #[test]
    fn untrusted_events_are_ignored() {
        let (doc, button, _) = overlay_fixture();
        let point = Point::new(50.0, 25.0);
        let interceptor = setup_hit_target_interceptor(
            &doc,
            button,
            point,
            HitTargetAction::Click,
            InterceptorOptions::default(),
        );
        doc.dispatch_event(&DispatchedEvent {
            kind: "click".into(),
            point: Point::new(999.0, 999.0),
            trusted: false,
        });
        assert!(interceptor.verify().success, "untrusted events do not latch");
    }

    #[test]
    fn block_all_events_swallows_clean_hits() {
        let (doc, button, _) = overlay_fixture();
        let point = Point::new(50.0, 25.0);
        let interceptor = setup_hit_target_interceptor(
            &doc,
            button,
            point,
            HitTargetAction::Click,
            InterceptorOptions {
                block_all_events: true,
            },
        );
        let outcome = doc.dispatch_event(&DispatchedEvent::trusted("click", point));
        assert!(outcome.default_prevented);
        assert!(interceptor.verify().success, "blocking is not a failure");
    }

    #[test]
    fn drag_action_is_bypassed() {
        let (doc, button, overlay) = overlay_fixture();
        doc.set_bounds(overlay, Rect::new(0.0, 0.0, 400.0, 400.0));
        let interceptor = setup_hit_target_interceptor(
            &doc,
            button,
            Point::new(50.0, 25.0),
            HitTargetAction::Drag,
            InterceptorOptions::default(),
        );
        assert_eq!(doc.listener_count(), 0);
        assert!(interceptor.verify().success);
    }

    #[test]
    fn stop_is_idempotent_and_drop_releases() {
        let (doc, button, _) = overlay_fixture();
        let point = Point::new(50.0, 25.0);
        let mut interceptor = setup_hit_target_interceptor(
            &doc,
            button,
            point,
            HitTargetAction::Tap,
            InterceptorOptions::default(),
        );
        assert_eq!(doc.listener_count(), 1);
        interceptor.stop();
        interceptor.stop();
        assert_eq!(doc.listener_count(), 0);
        let interceptor2 = setup_hit_target_interceptor(
            &doc,
            button,
            point,
            HitTargetAction::Hover,
            InterceptorOptions::default(),
        );
        assert_eq!(doc.listener_count(), 1);
        drop(interceptor2);
        assert_eq!(doc.listener_count(), 0);
    }
}
