//! Element-state engine: the eight-state synchronous checker, the batch
//! variant used before interactions, and the polling waiter.

use anyhow::{bail, Result};
use serde::Serialize;
use tokio::time::{sleep, Duration, Instant};

use crate::aria;
use crate::cache::AriaCaches;
use crate::dom::{Document, NodeId};
use crate::roles::AriaRole;
use crate::stability::{
    check_element_stability, FrameClock, IntervalClock, StabilityFailure, StabilityOptions,
};
use crate::visibility::is_element_visible;

pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementState {
    Visible,
    Hidden,
    Enabled,
    Disabled,
    Editable,
    Checked,
    Unchecked,
    Indeterminate,
    Stable,
}

impl ElementState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementState::Visible => "visible",
            ElementState::Hidden => "hidden",
            ElementState::Enabled => "enabled",
            ElementState::Disabled => "disabled",
            ElementState::Editable => "editable",
            ElementState::Checked => "checked",
            ElementState::Unchecked => "unchecked",
            ElementState::Indeterminate => "indeterminate",
            ElementState::Stable => "stable",
        }
    }
}

/// Outcome of a single state check. `received` is an informative label
/// (`"visible"`, `"readonly"`, `"mixed"`, `"error:notconnected"`, …).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateCheckResult {
    pub matches: bool,
    pub received: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_radio: Option<bool>,
}

impl StateCheckResult {
    fn new(matches: bool, received: &str) -> Self {
        Self {
            matches,
            received: received.to_string(),
            is_radio: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckedKind {
    Checked,
    Unchecked,
    Mixed,
}

fn native_disabled(doc: &Document, node: NodeId) -> bool {
    const DISABLEABLE: &[&str] = &[
        "button", "fieldset", "input", "optgroup", "option", "select", "textarea",
    ];
    let Some(tag) = doc.tag_name(node) else {
        return false;
    };
    if !DISABLEABLE.contains(&tag.as_str()) {
        return false;
    }
    if doc.has_attribute(node, "disabled") {
        return true;
    }
    // A disabled <fieldset> disables its descendants, except controls inside
    // the fieldset's first <legend>.
    let mut current = node;
    while let Some(parent) = doc.parent_element(current) {
        if doc.tag_name(parent).as_deref() == Some("fieldset")
            && doc.has_attribute(parent, "disabled")
        {
            let in_first_legend = doc
                .child_elements(parent)
                .into_iter()
                .find(|&c| doc.tag_name(c).as_deref() == Some("legend"))
                .map(|legend| {
                    current == legend
                        || doc.ancestors(node).contains(&legend)
                })
                .unwrap_or(false);
            if !in_first_legend {
                return true;
            }
        }
        current = parent;
    }
    // A disabled <optgroup> disables its options.
    if tag == "option" {
        if let Some(parent) = doc.parent_element(node) {
            if doc.tag_name(parent).as_deref() == Some("optgroup")
                && doc.has_attribute(parent, "disabled")
            {
                return true;
            }
        }
    }
    false
}

fn aria_disabled(caches: &AriaCaches, doc: &Document, node: NodeId) -> bool {
    if let Some(role) = aria::get_aria_role(caches, doc, node) {
        if role.supports_disabled() {
            match doc.attribute(node, "aria-disabled").as_deref() {
                Some("true") => return true,
                Some("false") => return false,
                _ => {}
            }
        }
    }
    // The attribute inherits: the nearest ancestor that sets it decides,
    // unless it explicitly sets it back to false.
    for ancestor in doc.ancestors(node) {
        match doc.attribute(ancestor, "aria-disabled").as_deref() {
            Some("true") => return true,
            Some("false") => return false,
            _ => {}
        }
    }
    false
}

/// Combined native + ARIA disabled state.
pub fn is_element_disabled(caches: &AriaCaches, doc: &Document, node: NodeId) -> bool {
    native_disabled(doc, node) || aria_disabled(caches, doc, node)
}

fn is_readonly(caches: &AriaCaches, doc: &Document, node: NodeId) -> Result<bool> {
    match doc.tag_name(node).as_deref() {
        Some("input" | "textarea" | "select") => {
            return Ok(doc.has_attribute(node, "readonly"));
        }
        _ => {}
    }
    if doc.has_attribute(node, "contenteditable") {
        return Ok(false);
    }
    if let Some(role) = aria::get_aria_role(caches, doc, node) {
        if role.supports_readonly() {
            return Ok(doc.attribute(node, "aria-readonly").as_deref() == Some("true"));
        }
    }
    bail!(
        "Element is not an <input>, <textarea>, <select> or [contenteditable] and does not have a role allowing [aria-readonly]"
    )
}

fn checked_kind(
    caches: &AriaCaches,
    doc: &Document,
    node: NodeId,
) -> Result<(CheckedKind, bool)> {
    if doc.tag_name(node).as_deref() == Some("input")
        && matches!(doc.input_type(node).as_str(), "checkbox" | "radio")
    {
        let is_radio = doc.input_type(node) == "radio";
        if doc.is_indeterminate(node) {
            return Ok((CheckedKind::Mixed, is_radio));
        }
        let kind = if doc.is_checked(node) {
            CheckedKind::Checked
        } else {
            CheckedKind::Unchecked
        };
        return Ok((kind, is_radio));
    }
    if let Some(role) = aria::get_aria_role(caches, doc, node) {
        if role.supports_checked() {
            let is_radio = matches!(role, AriaRole::Radio | AriaRole::MenuItemRadio);
            let kind = match doc.attribute(node, "aria-checked").as_deref() {
                Some("true") => CheckedKind::Checked,
                Some("mixed") => CheckedKind::Mixed,
                _ => CheckedKind::Unchecked,
            };
            return Ok((kind, is_radio));
        }
    }
    bail!("Not a checkbox or radio button")
}

/// Synchronous single-state check. Misuse (asking `editable` of a plain
/// `<div>`, `checked` of a `<button>`) is an error; everything else is a
/// structured result.
pub fn check_element_state(
    caches: &AriaCaches,
    doc: &Document,
    node: NodeId,
    state: ElementState,
) -> Result<StateCheckResult> {
    if !doc.is_connected(node) {
        // A detached element is trivially hidden; every other state is
        // unanswerable.
        if state == ElementState::Hidden {
            return Ok(StateCheckResult::new(true, "hidden"));
        }
        return Ok(StateCheckResult::new(false, "error:notconnected"));
    }
    match state {
        ElementState::Visible => {
            let visible = is_element_visible(doc, node);
            Ok(StateCheckResult::new(
                visible,
                if visible { "visible" } else { "hidden" },
            ))
        }
        ElementState::Hidden => {
            let visible = is_element_visible(doc, node);
            Ok(StateCheckResult::new(
                !visible,
                if visible { "visible" } else { "hidden" },
            ))
        }
        ElementState::Enabled | ElementState::Disabled => {
            let disabled = is_element_disabled(caches, doc, node);
            let matches = (state == ElementState::Disabled) == disabled;
            Ok(StateCheckResult::new(
                matches,
                if disabled { "disabled" } else { "enabled" },
            ))
        }
        ElementState::Editable => {
            let readonly = is_readonly(caches, doc, node)?;
            let disabled = is_element_disabled(caches, doc, node);
            let received = if readonly {
                "readonly"
            } else if disabled {
                "disabled"
            } else {
                "editable"
            };
            Ok(StateCheckResult::new(!readonly && !disabled, received))
        }
        ElementState::Checked | ElementState::Unchecked | ElementState::Indeterminate => {
            let (kind, is_radio) = checked_kind(caches, doc, node)?;
            let received = match kind {
                CheckedKind::Checked => "checked",
                CheckedKind::Unchecked => "unchecked",
                CheckedKind::Mixed => "mixed",
            };
            let matches = match state {
                ElementState::Checked => kind == CheckedKind::Checked,
                ElementState::Unchecked => kind == CheckedKind::Unchecked,
                _ => kind == CheckedKind::Mixed,
            };
            let mut result = StateCheckResult::new(matches, received);
            result.is_radio = Some(is_radio);
            Ok(result)
        }
        ElementState::Stable => {
            // Synchronous approximation: connected with a nonzero box. The
            // frame-sampling variant lives in the stability checker.
            let rect = doc.bounding_client_rect(node);
            if rect.is_empty() {
                Ok(StateCheckResult::new(false, "no-size"))
            } else {
                Ok(StateCheckResult::new(true, "stable"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchStateResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_state: Option<String>,
}

/// Check several states at once (`stable` first when requested), reporting
/// the first state that does not hold.
pub fn check_element_states(
    caches: &AriaCaches,
    doc: &Document,
    node: NodeId,
    states: &[ElementState],
) -> Result<BatchStateResult> {
    let mut ordered: Vec<ElementState> = Vec::new();
    if states.contains(&ElementState::Stable) {
        ordered.push(ElementState::Stable);
    }
    ordered.extend(states.iter().copied().filter(|&s| s != ElementState::Stable));
    for state in ordered {
        let result = check_element_state(caches, doc, node, state)?;
        if !result.matches {
            return Ok(BatchStateResult {
                success: false,
                missing_state: Some(state.as_str().to_string()),
            });
        }
    }
    Ok(BatchStateResult {
        success: true,
        missing_state: None,
    })
}

/// Poll every 50 ms until the state holds or the deadline passes. For
/// `stable` the stability checker runs directly with the full timeout.
pub async fn wait_for_element_state(
    caches: &AriaCaches,
    doc: &Document,
    node: NodeId,
    state: ElementState,
    timeout: Duration,
) -> Result<StateCheckResult> {
    if state == ElementState::Stable {
        let mut clock = IntervalClock::new();
        return Ok(wait_for_stable(doc, node, &mut clock, timeout).await);
    }
    let deadline = Instant::now() + timeout;
    loop {
        let result = check_element_state(caches, doc, node, state)?;
        if result.matches {
            return Ok(result);
        }
        if Instant::now() >= deadline {
            return Ok(StateCheckResult::new(false, "error:timeout"));
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Stability wait with an explicit frame clock, shared by the public
/// `wait_for_element_state` and the hit-target flow.
pub async fn wait_for_stable<C: FrameClock>(
    doc: &Document,
    node: NodeId,
    clock: &mut C,
    timeout: Duration,
) -> StateCheckResult {
    let result = check_element_stability(
        doc,
        node,
        clock,
        StabilityOptions {
            timeout_ms: timeout.as_secs_f64() * 1_000.0,
            ..Default::default()
        },
    )
    .await;
    if result.stable {
        StateCheckResult::new(true, "stable")
    } else {
        match result.reason {
            Some(StabilityFailure::Disconnected) => StateCheckResult::new(false, "disconnected"),
            _ => StateCheckResult::new(false, "error:timeout"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Rect;

    fn first(doc: &Document) -> NodeId {
        doc.child_elements(doc.root())[0]
    }

    // ── Visible / hidden ──

    #[test]
    fn visible_and_hidden_are_exact_negations() {
        let caches = AriaCaches::new();
        let doc = Document::parse_fragment("<button>x</button>");
        let button = first(&doc);
        doc.set_bounds(button, Rect::new(0.0, 0.0, 10.0, 10.0));
        let visible = check_element_state(&caches, &doc, button, ElementState::Visible).unwrap();
        let hidden = check_element_state(&caches, &doc, button, ElementState::Hidden).unwrap();
        assert!(visible.matches);
        assert!(!hidden.matches);
        doc.set_attribute(button, "style", "display:none");
        let visible = check_element_state(&caches, &doc, button, ElementState::Visible).unwrap();
        let hidden = check_element_state(&caches, &doc, button, ElementState::Hidden).unwrap();
        assert!(!visible.matches);
        assert!(hidden.matches);
        assert_eq!(visible.received, "hidden");
    }

    #[test]
    fn disconnected_element_labels() {
        let caches = AriaCaches::new();
        let doc = Document::parse_fragment("<button>x</button>");
        let button = first(&doc);
        doc.detach(button);
        let hidden = check_element_state(&caches, &doc, button, ElementState::Hidden).unwrap();
        assert!(hidden.matches);
        let enabled = check_element_state(&caches, &doc, button, ElementState::Enabled).unwrap();
        assert!(!enabled.matches);
        assert_eq!(enabled.received, "error:notconnected");
    }

    // ── Enabled / disabled ──

    #[test]
    fn native_and_fieldset_disabled() {
        let caches = AriaCaches::new();
        let doc = Document::parse_fragment(
            "<button disabled>a</button>\
             <fieldset disabled><legend><input id=\"in-legend\"></legend>\
             <input id=\"in-body\"></fieldset>",
        );
        let button = first(&doc);
        assert!(is_element_disabled(&caches, &doc, button));
        let fieldset = doc.child_elements(doc.root())[1];
        let legend_input = doc.descendant_elements(fieldset)
            .into_iter()
            .find(|&n| doc.id_attr(n).as_deref() == Some("in-legend"))
            .unwrap();
        let body_input = doc.descendant_elements(fieldset)
            .into_iter()
            .find(|&n| doc.id_attr(n).as_deref() == Some("in-body"))
            .unwrap();
        assert!(
            !is_element_disabled(&caches, &doc, legend_input),
            "controls in the first legend stay enabled"
        );
        assert!(is_element_disabled(&caches, &doc, body_input));
    }

    #[test]
    fn option_in_disabled_optgroup() {
        let caches = AriaCaches::new();
        let doc = Document::parse_fragment(
            "<select><optgroup disabled><option id=\"o\">x</option></optgroup></select>",
        );
        let option = doc
            .descendant_elements(doc.root())
            .into_iter()
            .find(|&n| doc.tag_name(n).as_deref() == Some("option"))
            .unwrap();
        assert!(is_element_disabled(&caches, &doc, option));
    }

    #[test]
    fn aria_disabled_applies_and_inherits() {
        let caches = AriaCaches::new();
        let doc = Document::parse_fragment(
            "<div role=\"button\" aria-disabled=\"true\" id=\"a\">x</div>\
             <div aria-disabled=\"true\"><div role=\"button\" id=\"b\">x</div></div>\
             <div aria-disabled=\"true\"><div role=\"button\" aria-disabled=\"false\" id=\"c\">x</div></div>",
        );
        let a = doc.child_elements(doc.root())[0];
        let b = doc.child_elements(doc.child_elements(doc.root())[1])[0];
        let c = doc.child_elements(doc.child_elements(doc.root())[2])[0];
        assert!(is_element_disabled(&caches, &doc, a));
        assert!(is_element_disabled(&caches, &doc, b));
        assert!(!is_element_disabled(&caches, &doc, c));
    }

    // ── Editable ──

    #[test]
    fn editable_states() {
        let caches = AriaCaches::new();
        let doc = Document::parse_fragment(
            "<input id=\"plain\"><input id=\"ro\" readonly>\
             <div id=\"ce\" contenteditable></div>\
             <div id=\"tb\" role=\"textbox\" aria-readonly=\"true\"></div>",
        );
        let els = doc.child_elements(doc.root());
        let check = |n| check_element_state(&caches, &doc, n, ElementState::Editable).unwrap();
        assert!(check(els[0]).matches);
        let ro = check(els[1]);
        assert!(!ro.matches);
        assert_eq!(ro.received, "readonly");
        assert!(check(els[2]).matches);
        assert!(!check(els[3]).matches);
    }

    #[test]
    fn editable_on_plain_div_is_misuse() {
        let caches = AriaCaches::new();
        let doc = Document::parse_fragment("<div>x</div>");
        let err = check_element_state(&caches, &doc, first(&doc), ElementState::Editable)
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Element is not an <input>, <textarea>, <select> or [contenteditable]"));
    }

    // ── Checked family ──

    #[test]
    fn checked_states_are_mutually_exclusive() {
        let caches = AriaCaches::new();
        let doc = Document::parse_fragment("<input type=\"checkbox\" checked>");
        let input = first(&doc);
        let states = [
            ElementState::Checked,
            ElementState::Unchecked,
            ElementState::Indeterminate,
        ];
        let matching: Vec<bool> = states
            .iter()
            .map(|&s| check_element_state(&caches, &doc, input, s).unwrap().matches)
            .collect();
        assert_eq!(matching.iter().filter(|&&m| m).count(), 1);
        doc.set_indeterminate(input, true);
        let result =
            check_element_state(&caches, &doc, input, ElementState::Indeterminate).unwrap();
        assert!(result.matches);
        assert_eq!(result.received, "mixed");
    }

    #[test]
    fn aria_checked_roles_and_radio_flag() {
        let caches = AriaCaches::new();
        let doc = Document::parse_fragment(
            "<div role=\"switch\" aria-checked=\"true\">x</div>\
             <input type=\"radio\"><div role=\"menuitemradio\" aria-checked=\"mixed\">x</div>",
        );
        let els = doc.child_elements(doc.root());
        let on = check_element_state(&caches, &doc, els[0], ElementState::Checked).unwrap();
        assert!(on.matches);
        assert_eq!(on.is_radio, Some(false));
        let radio = check_element_state(&caches, &doc, els[1], ElementState::Unchecked).unwrap();
        assert!(radio.matches);
        assert_eq!(radio.is_radio, Some(true));
        let mixed =
            check_element_state(&caches, &doc, els[2], ElementState::Indeterminate).unwrap();
        assert!(mixed.matches);
        assert_eq!(mixed.is_radio, Some(true));
    }

    #[test]
    fn checked_on_button_is_misuse() {
        let caches = AriaCaches::new();
        let doc = Document::parse_fragment("<button>x</button>");
        let err =
            check_element_state(&caches, &doc, first(&doc), ElementState::Checked).unwrap_err();
        assert_eq!(err.to_string(), "Not a checkbox or radio button");
    }

    // ── Batch ──

    #[test]
    fn batch_reports_first_missing_state() {
        let caches = AriaCaches::new();
        let doc = Document::parse_fragment("<button disabled>x</button>");
        let button = first(&doc);
        doc.set_bounds(button, Rect::new(0.0, 0.0, 10.0, 10.0));
        let result = check_element_states(
            &caches,
            &doc,
            button,
            &[
                ElementState::Visible,
                ElementState::Stable,
                ElementState::Enabled,
            ],
        )
        .unwrap();
        assert!(!result.success);
        assert_eq!(result.missing_state.as_deref(), Some("enabled"));
        doc.remove_attribute(button, "disabled");
        let result = check_element_states(
            &caches,
            &doc,
            button,
            &[ElementState::Visible, ElementState::Enabled],
        )
        .unwrap();
        assert!(result.success);
    }

    // ── Waiter ──

    #[tokio::test(start_paused = true)]
    async fn wait_returns_when_state_appears() {
        let caches = AriaCaches::new();
        let doc = Document::parse_fragment("<button style=\"display:none\">x</button>");
        let button = first(&doc);
        doc.set_bounds(button, Rect::new(0.0, 0.0, 10.0, 10.0));
        let wait = wait_for_element_state(
            &caches,
            &doc,
            button,
            ElementState::Visible,
            Duration::from_secs(2),
        );
        let reveal = async {
            sleep(Duration::from_millis(120)).await;
            doc.remove_attribute(button, "style");
        };
        let (result, _) = tokio::join!(wait, reveal);
        assert!(result.unwrap().matches);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_with_label() {
        let caches = AriaCaches::new();
        let doc = Document::parse_fragment("<button style=\"display:none\">x</button>");
        let button = first(&doc);
        let result = wait_for_element_state(
            &caches,
            &doc,
            button,
            ElementState::Visible,
            Duration::from_millis(200),
        )
        .await
        .unwrap();
        assert!(!result.matches);
        assert_eq!(result.received, "error:timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_stable_state() {
        let caches = AriaCaches::new();
        let doc = Document::parse_fragment("<button>x</button>");
        let button = first(&doc);
        doc.set_bounds(button, Rect::new(0.0, 0.0, 10.0, 10.0));
        let result = wait_for_element_state(
            &caches,
            &doc,
            button,
            ElementState::Stable,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert!(result.matches);
        assert_eq!(result.received, "stable");
    }
}
