//! Click-target retargeting: rewriting a requested node to the logical
//! target a user's action would reach (label → control, icon → enclosing
//! button or link).

use crate::aria;
use crate::dom::{is_form_control, Document, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetargetBehavior {
    /// Text nodes resolve to their parent element; everything else is
    /// returned as-is.
    None,
    /// Labels delegate to their control; descendants climb to the nearest
    /// actionable ancestor.
    FollowLabel,
    /// Like `FollowLabel`, but labels stay put.
    NoFollowLabel,
    /// Climb to the nearest enclosing button or link only.
    ButtonLink,
}

fn has_role(doc: &Document, node: NodeId, roles: &[&str]) -> bool {
    doc.attribute(node, "role")
        .map(|r| roles.contains(&r.as_str()))
        .unwrap_or(false)
}

fn is_button_or_link(doc: &Document, node: NodeId) -> bool {
    match doc.tag_name(node).as_deref() {
        Some("button") => true,
        Some("a") => true,
        _ => has_role(doc, node, &["button", "link"]),
    }
}

fn is_actionable(doc: &Document, node: NodeId) -> bool {
    if is_button_or_link(doc, node) {
        return true;
    }
    if doc.tag_name(node).as_deref() == Some("input")
        && matches!(doc.input_type(node).as_str(), "checkbox" | "radio")
    {
        return true;
    }
    has_role(doc, node, &["checkbox", "radio"])
}

fn nearest_matching(
    doc: &Document,
    node: NodeId,
    predicate: impl Fn(&Document, NodeId) -> bool,
) -> Option<NodeId> {
    std::iter::once(node)
        .chain(doc.ancestors(node))
        .filter(|&n| doc.is_element(n))
        .find(|&n| predicate(doc, n))
}

/// The control a label delegates to: its `for` target, the first nested
/// control, or the control mirroring the association via `aria-labelledby`.
fn label_delegate(doc: &Document, label: NodeId) -> Option<NodeId> {
    if let Some(target) = aria::label_target(doc, label) {
        return Some(target);
    }
    let label_id = doc.id_attr(label)?;
    let scope = doc.tree_scope(label);
    doc.descendant_elements(scope).into_iter().find(|&n| {
        is_form_control(doc, n)
            && doc
                .attribute(n, "aria-labelledby")
                .map(|refs| refs.split_whitespace().any(|id| id == label_id))
                .unwrap_or(false)
    })
}

/// Rewrite `node` to the element that would logically receive the action.
/// When several candidates apply, the innermost wins. Returns `None` only
/// for detached text nodes with no parent element.
pub fn retarget(doc: &Document, node: NodeId, behavior: RetargetBehavior) -> Option<NodeId> {
    let element = if doc.is_element(node) {
        node
    } else {
        doc.parent_element(node)?
    };
    match behavior {
        RetargetBehavior::None => Some(element),
        RetargetBehavior::ButtonLink => {
            // Native text entry keeps the click; a wrapping link must not
            // steal focus from it.
            if matches!(
                doc.tag_name(element).as_deref(),
                Some("input" | "textarea" | "select")
            ) || doc.has_attribute(element, "contenteditable")
            {
                return Some(element);
            }
            Some(nearest_matching(doc, element, is_button_or_link).unwrap_or(element))
        }
        RetargetBehavior::FollowLabel | RetargetBehavior::NoFollowLabel => {
            if behavior == RetargetBehavior::FollowLabel
                && doc.tag_name(element).as_deref() == Some("label")
            {
                return Some(label_delegate(doc, element).unwrap_or(element));
            }
            if is_form_control(doc, element) {
                return Some(element);
            }
            Some(nearest_matching(doc, element, is_actionable).unwrap_or(element))
        }
    }
}
