use crate::dom::{Display, Document, NodeId, Visibility};

/// CSS-level hidden test used by the ARIA subsystem. True when the element
/// is disconnected, any ancestor-or-self computes `display: none`, or the
/// inherited `visibility` is `hidden`/`collapse`. `opacity: 0` does NOT
/// hide an element from ARIA, and `display: contents` elements are not
/// hidden (their rendering flows to children).
pub fn is_hidden_by_css(doc: &Document, node: NodeId) -> bool {
    if !doc.is_connected(node) {
        return true;
    }
    if matches!(
        doc.computed_visibility(node),
        Visibility::Hidden | Visibility::Collapse
    ) {
        return true;
    }
    let mut current = Some(node);
    while let Some(n) = current {
        if doc.is_element(n) && doc.computed_display(n) == Display::None {
            return true;
        }
        current = doc.composed_parent(n);
    }
    false
}

/// Strict visual visibility: not CSS-hidden, `opacity > 0`, and a nonzero
/// border box. `display: contents` is treated as visible because rendering
/// flows to the children.
pub fn is_element_visually_visible(doc: &Document, node: NodeId) -> bool {
    if is_hidden_by_css(doc, node) {
        return false;
    }
    if doc.computed_opacity(node) <= 0.0 {
        return false;
    }
    if doc.computed_display(node) == Display::Contents {
        return true;
    }
    let rect = doc.bounding_client_rect(node);
    rect.width > 0.0 && rect.height > 0.0
}

/// The visibility predicate selector engines filter on: not hidden by CSS
/// and a nonzero bounding box.
pub fn is_element_visible(doc: &Document, node: NodeId) -> bool {
    if is_hidden_by_css(doc, node) {
        return false;
    }
    if doc.computed_display(node) == Display::Contents {
        return true;
    }
    let rect = doc.bounding_client_rect(node);
    rect.width > 0.0 && rect.height > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Rect;

    fn sized(doc: &Document, node: NodeId) {
        doc.set_bounds(node, Rect::new(0.0, 0.0, 100.0, 20.0));
    }

    #[test]
    fn display_none_hides() {
        let doc = Document::parse_fragment("<div style=\"display:none\">x</div>");
        let div = doc.child_elements(doc.root())[0];
        sized(&doc, div);
        assert!(is_hidden_by_css(&doc, div));
        assert!(!is_element_visible(&doc, div));
    }

    #[test]
    fn hidden_ancestor_hides_descendant() {
        let doc = Document::parse_fragment("<div style=\"display:none\"><button>x</button></div>");
        let div = doc.child_elements(doc.root())[0];
        let button = doc.child_elements(div)[0];
        sized(&doc, button);
        assert!(is_hidden_by_css(&doc, button));
        assert!(!is_element_visible(&doc, button));
    }

    #[test]
    fn opacity_zero_is_not_css_hidden() {
        let doc = Document::parse_fragment("<div style=\"opacity: 0\">x</div>");
        let div = doc.child_elements(doc.root())[0];
        sized(&doc, div);
        assert!(!is_hidden_by_css(&doc, div));
        assert!(is_element_visible(&doc, div));
        assert!(!is_element_visually_visible(&doc, div));
    }

    #[test]
    fn visibility_hidden_hides() {
        let doc = Document::parse_fragment("<div style=\"visibility:hidden\">x</div>");
        let div = doc.child_elements(doc.root())[0];
        sized(&doc, div);
        assert!(is_hidden_by_css(&doc, div));
    }

    #[test]
    fn disconnected_is_hidden() {
        let doc = Document::parse_fragment("<div>x</div>");
        let div = doc.child_elements(doc.root())[0];
        sized(&doc, div);
        doc.detach(div);
        assert!(is_hidden_by_css(&doc, div));
    }

    #[test]
    fn display_contents_is_visible_without_box() {
        let doc = Document::parse_fragment("<div style=\"display:contents\">x</div>");
        let div = doc.child_elements(doc.root())[0];
        assert!(!is_hidden_by_css(&doc, div));
        assert!(is_element_visible(&doc, div));
        assert!(is_element_visually_visible(&doc, div));
    }

    #[test]
    fn zero_size_box_is_not_visible() {
        let doc = Document::parse_fragment("<div>x</div>");
        let div = doc.child_elements(doc.root())[0];
        assert!(!is_hidden_by_css(&doc, div));
        assert!(!is_element_visible(&doc, div));
    }
}
