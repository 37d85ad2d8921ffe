//! Accessibility tree snapshots: an ordered, ref-bearing view of the
//! composed tree that automation clients act on, plus the indented text
//! rendering and whole-page text extraction.

use serde::Serialize;
use tracing::debug;

use crate::aria;
use crate::dom::{Display, Document, NodeId, Rect, Visibility};
use crate::refs::RefRegistry;
use crate::roles::AriaRole;
use crate::selector::{QueryOptions, Selectors};

#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotOptions<'s> {
    /// Attach each node's border box.
    pub include_bbox: bool,
    /// Keep only nodes with interactive roles (still descending through
    /// structure).
    pub interactive_only: bool,
    /// Compute accessible descriptions as well as names.
    pub include_description: bool,
    /// Scope the snapshot to the first match of this selector expression.
    pub selector: Option<&'s str>,
    /// Expand through shadow roots when resolving `selector`.
    pub pierce_shadow_dom: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxNode {
    #[serde(rename = "ref")]
    pub node_ref: String,
    pub role: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Rect>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AxNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub tree: Vec<AxNode>,
    pub node_count: usize,
}

fn aria_bool(doc: &Document, node: NodeId, attr: &str) -> Option<bool> {
    match doc.attribute(node, attr).as_deref() {
        Some("true") => Some(true),
        Some("false") => Some(false),
        _ => None,
    }
}

fn checked_value(doc: &Document, node: NodeId, role: AriaRole) -> Option<String> {
    if doc.tag_name(node).as_deref() == Some("input")
        && matches!(doc.input_type(node).as_str(), "checkbox" | "radio")
    {
        if doc.is_indeterminate(node) {
            return Some("mixed".to_string());
        }
        return Some(if doc.is_checked(node) { "true" } else { "false" }.to_string());
    }
    if role.supports_checked() {
        return match doc.attribute(node, "aria-checked").as_deref() {
            Some("mixed") => Some("mixed".to_string()),
            Some("true") => Some("true".to_string()),
            _ => Some("false".to_string()),
        };
    }
    None
}

fn control_value(doc: &Document, node: NodeId) -> Option<String> {
    match doc.tag_name(node).as_deref() {
        Some("input") if !matches!(doc.input_type(node).as_str(), "checkbox" | "radio") => {
            doc.value(node).filter(|v| !v.is_empty())
        }
        Some("textarea") => doc.value(node).filter(|v| !v.is_empty()),
        Some("select") => {
            let selected = doc
                .descendant_elements(node)
                .into_iter()
                .filter(|&n| doc.tag_name(n).as_deref() == Some("option"))
                .find(|&n| doc.has_attribute(n, "selected"))?;
            let text = aria::element_text(doc, selected, false);
            (!text.is_empty()).then_some(text)
        }
        _ => None,
    }
}

struct SnapshotBuilder<'a, 'd> {
    sel: &'a Selectors<'d>,
    refs: &'a RefRegistry,
    opts: SnapshotOptions<'a>,
    node_count: usize,
}

impl SnapshotBuilder<'_, '_> {
    fn visit(&mut self, node: NodeId, out: &mut Vec<AxNode>) {
        let doc = self.sel.doc;
        if !doc.is_element(node) {
            for child in doc.composed_children(node) {
                self.visit(child, out);
            }
            return;
        }
        if aria::is_hidden_for_aria(self.sel.aria, doc, node) {
            return;
        }
        let role = aria::get_aria_role(self.sel.aria, doc, node);
        // Generic wrappers are not emitted; their children surface at the
        // parent level.
        let include = match role {
            Some(role) if self.opts.interactive_only => role.is_interactive(),
            Some(role) => role != AriaRole::Generic,
            None => false,
        };
        if !include {
            for child in doc.composed_children(node) {
                self.visit(child, out);
            }
            return;
        }
        let role = role.expect("included nodes have a role");
        let name = aria::get_accessible_name(self.sel.aria, doc, node, false);
        let description = self
            .opts
            .include_description
            .then(|| aria::get_accessible_description(self.sel.aria, doc, node, false))
            .filter(|d| !d.is_empty());
        let mut ax = AxNode {
            node_ref: self.refs.ref_for(node),
            role: role.as_str().to_string(),
            name,
            description,
            level: (role == AriaRole::Heading)
                .then(|| aria::heading_level(self.sel.aria, doc, node))
                .flatten(),
            value: control_value(doc, node),
            checked: checked_value(doc, node, role),
            expanded: role
                .supports_expanded()
                .then(|| aria_bool(doc, node, "aria-expanded"))
                .flatten(),
            disabled: crate::state::is_element_disabled(self.sel.aria, doc, node).then_some(true),
            focused: doc.is_focused(node).then_some(true),
            bounds: self.opts.include_bbox.then(|| doc.bounding_client_rect(node)),
            children: Vec::new(),
        };
        self.node_count += 1;
        let mut children = Vec::new();
        for child in doc.composed_children(node) {
            self.visit(child, &mut children);
        }
        ax.children = children;
        out.push(ax);
    }
}

/// Produce the accessibility tree rooted at `root` (or at the first match
/// of `opts.selector`). Runs inside both cache families; every included
/// node gets a ref from the registry.
pub fn capture_snapshot(
    sel: &Selectors<'_>,
    refs: &RefRegistry,
    root: NodeId,
    opts: SnapshotOptions<'_>,
) -> Snapshot {
    sel.aria.with(|| {
        sel.cache.with(|| {
            let root = match opts.selector {
                Some(expr) => match sel.query(
                    root,
                    expr,
                    QueryOptions {
                        pierce_shadow_dom: opts.pierce_shadow_dom,
                        ..Default::default()
                    },
                ) {
                    Some(found) => found,
                    None => {
                        return Snapshot {
                            tree: Vec::new(),
                            node_count: 0,
                        }
                    }
                },
                None => root,
            };
            let mut builder = SnapshotBuilder {
                sel,
                refs,
                opts,
                node_count: 0,
            };
            let mut tree = Vec::new();
            builder.visit(root, &mut tree);
            debug!(nodes = builder.node_count, "snapshot complete");
            Snapshot {
                tree,
                node_count: builder.node_count,
            }
        })
    })
}

fn format_node(node: &AxNode, depth: usize, out: &mut String) {
    out.push_str(&"  ".repeat(depth));
    out.push_str(&node.role);
    if !node.name.is_empty() {
        out.push_str(&format!(" \"{}\"", node.name));
    }
    if let Some(level) = node.level {
        out.push_str(&format!(" [level={level}]"));
    }
    match node.checked.as_deref() {
        Some("true") => out.push_str(" [checked]"),
        Some("mixed") => out.push_str(" [checked=mixed]"),
        _ => {}
    }
    if node.disabled == Some(true) {
        out.push_str(" [disabled]");
    }
    if node.expanded == Some(true) {
        out.push_str(" [expanded]");
    }
    if node.focused == Some(true) {
        out.push_str(" [active]");
    }
    out.push_str(&format!(" [ref={}]", node.node_ref));
    out.push('\n');
    for child in &node.children {
        format_node(child, depth + 1, out);
    }
}

/// Render a snapshot as indented text, one element per line:
/// `role "name" [state…] [ref=ref_N]`.
pub fn format_snapshot(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    for node in &snapshot.tree {
        format_node(node, 0, &mut out);
    }
    out
}

/// JSON rendering for hosts that prefer structured output over the text
/// format.
pub fn snapshot_json(snapshot: &Snapshot) -> serde_json::Value {
    serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null)
}

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "div", "dl", "fieldset", "footer", "form",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre",
    "section", "table", "td", "th", "tr", "ul",
];

fn page_text_into(doc: &Document, node: NodeId, out: &mut String) {
    if let Some(text) = doc.text_data(node) {
        let trimmed = aria::normalize_whitespace(&text);
        if !trimmed.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push(' ');
            }
            out.push_str(&trimmed);
        }
        return;
    }
    if doc.is_element(node) {
        if let Some(tag) = doc.tag_name(node) {
            // `head` is display:none in the UA stylesheet.
            if matches!(
                tag.as_str(),
                "script" | "style" | "noscript" | "template" | "head" | "title"
            ) {
                return;
            }
        }
        if doc.computed_display(node) == Display::None
            || doc.computed_visibility(node) != Visibility::Visible
        {
            return;
        }
    }
    let is_block = doc
        .tag_name(node)
        .map(|t| BLOCK_TAGS.contains(&t.as_str()))
        .unwrap_or(false);
    for child in doc.composed_children(node) {
        page_text_into(doc, child, out);
    }
    if is_block && !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Visible text of the whole document, block elements separated by
/// newlines.
pub fn page_text(doc: &Document) -> String {
    let mut out = String::new();
    page_text_into(doc, doc.root(), &mut out);
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{AriaCaches, SelectorCaches};
    use crate::selector::EngineRegistry;

    macro_rules! harness {
        ($doc:expr, $sel:ident, $refs:ident) => {
            let aria_caches = AriaCaches::new();
            let selector_caches = SelectorCaches::new();
            let registry = EngineRegistry::new();
            let $sel = Selectors::new($doc, &aria_caches, &selector_caches, &registry);
            let $refs = RefRegistry::new();
        };
    }

    #[test]
    fn single_button_snapshot() {
        let doc = Document::parse_fragment("<button>Go</button>");
        harness!(&doc, sel, refs);
        let snap = capture_snapshot(&sel, &refs, doc.root(), SnapshotOptions::default());
        assert_eq!(snap.node_count, 1);
        assert_eq!(snap.tree.len(), 1);
        let node = &snap.tree[0];
        assert_eq!(node.role, "button");
        assert_eq!(node.name, "Go");
        assert_eq!(node.node_ref, "ref_1");
    }

    #[test]
    fn hidden_nodes_are_skipped() {
        let doc = Document::parse_fragment(
            "<button>Shown</button><button aria-hidden=\"true\">Ghost</button>\
             <div style=\"display:none\"><button>Invisible</button></div>",
        );
        harness!(&doc, sel, refs);
        let snap = capture_snapshot(&sel, &refs, doc.root(), SnapshotOptions::default());
        assert_eq!(snap.node_count, 1);
        assert_eq!(snap.tree[0].name, "Shown");
    }

    #[test]
    fn roleless_wrappers_descend() {
        let doc = Document::parse_fragment(
            "<form><label for=\"u\">User</label><input id=\"u\"></form>",
        );
        harness!(&doc, sel, refs);
        let snap = capture_snapshot(&sel, &refs, doc.root(), SnapshotOptions::default());
        // The unnamed form has no role; its textbox child is lifted to the
        // top level. The label itself has no role either.
        assert_eq!(snap.tree.len(), 1);
        assert_eq!(snap.tree[0].role, "textbox");
        assert_eq!(snap.tree[0].name, "User");
    }

    #[test]
    fn interactive_only_keeps_widgets() {
        let doc = Document::parse_fragment(
            "<nav><a href=\"/\">Home</a></nav><p>Intro</p><button>Go</button>",
        );
        harness!(&doc, sel, refs);
        let snap = capture_snapshot(
            &sel,
            &refs,
            doc.root(),
            SnapshotOptions {
                interactive_only: true,
                ..Default::default()
            },
        );
        let roles: Vec<&str> = snap.tree.iter().map(|n| n.role.as_str()).collect();
        assert_eq!(roles, ["link", "button"]);
    }

    #[test]
    fn states_and_level_are_captured() {
        let doc = Document::parse_fragment(
            "<h2>Title</h2><input type=\"checkbox\" checked>\
             <button disabled aria-expanded=\"true\">More</button>",
        );
        harness!(&doc, sel, refs);
        let button = doc.child_elements(doc.root())[2];
        doc.set_focus(Some(button));
        let snap = capture_snapshot(&sel, &refs, doc.root(), SnapshotOptions::default());
        assert_eq!(snap.tree[0].level, Some(2));
        assert_eq!(snap.tree[1].checked.as_deref(), Some("true"));
        let more = &snap.tree[2];
        assert_eq!(more.disabled, Some(true));
        assert_eq!(more.expanded, Some(true));
        assert_eq!(more.focused, Some(true));
    }

    #[test]
    fn selector_scopes_the_tree() {
        let doc = Document::parse_fragment(
            "<div id=\"a\"><button>One</button></div><div id=\"b\"><button>Two</button></div>",
        );
        harness!(&doc, sel, refs);
        let snap = capture_snapshot(
            &sel,
            &refs,
            doc.root(),
            SnapshotOptions {
                selector: Some("#b"),
                ..Default::default()
            },
        );
        assert_eq!(snap.node_count, 1);
        assert_eq!(snap.tree[0].name, "Two");
        let snap = capture_snapshot(
            &sel,
            &refs,
            doc.root(),
            SnapshotOptions {
                selector: Some("#missing"),
                ..Default::default()
            },
        );
        assert_eq!(snap.node_count, 0);
    }

    #[test]
    fn bbox_included_on_request() {
        let doc = Document::parse_fragment("<button>Go</button>");
        let button = doc.child_elements(doc.root())[0];
        doc.set_bounds(button, Rect::new(5.0, 6.0, 70.0, 20.0));
        harness!(&doc, sel, refs);
        let snap = capture_snapshot(
            &sel,
            &refs,
            doc.root(),
            SnapshotOptions {
                include_bbox: true,
                ..Default::default()
            },
        );
        assert_eq!(snap.tree[0].bounds, Some(Rect::new(5.0, 6.0, 70.0, 20.0)));
    }

    #[test]
    fn snapshot_descends_into_shadow_trees() {
        let doc = Document::parse_fragment("<x-app></x-app>");
        let host = doc.child_elements(doc.root())[0];
        let shadow = doc.attach_shadow(host);
        let button = doc.append_element(shadow, "button", &[]);
        doc.append_text(button, "Inside");
        harness!(&doc, sel, refs);
        let snap = capture_snapshot(&sel, &refs, doc.root(), SnapshotOptions::default());
        assert_eq!(snap.node_count, 1);
        assert_eq!(snap.tree[0].name, "Inside");
    }

    #[test]
    fn format_renders_grammar() {
        let doc = Document::parse_fragment(
            "<h1>Docs</h1><nav><a href=\"/api\">API</a></nav><input type=\"checkbox\" checked>",
        );
        harness!(&doc, sel, refs);
        let snap = capture_snapshot(&sel, &refs, doc.root(), SnapshotOptions::default());
        let text = format_snapshot(&snap);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "heading \"Docs\" [level=1] [ref=ref_1]");
        assert_eq!(lines[1], "navigation [ref=ref_2]");
        assert_eq!(lines[2], "  link \"API\" [ref=ref_3]");
        assert_eq!(lines[3], "checkbox [checked] [ref=ref_4]");
    }

    #[test]
    fn json_rendering_skips_absent_fields() {
        let doc = Document::parse_fragment("<button>Go</button>");
        harness!(&doc, sel, refs);
        let snap = capture_snapshot(&sel, &refs, doc.root(), SnapshotOptions::default());
        let json = snapshot_json(&snap);
        assert_eq!(json["node_count"], 1);
        let node = &json["tree"][0];
        assert_eq!(node["role"], "button");
        assert_eq!(node["ref"], "ref_1");
        assert!(node.get("bounds").is_none(), "bbox only on request");
        assert!(node.get("checked").is_none());
    }

    #[test]
    fn page_text_skips_hidden_and_breaks_blocks() {
        let doc = Document::parse(
            "<html><head><title>T</title><style>p{}</style></head>\
             <body><h1>Head</h1><p>One</p><p style=\"display:none\">Ghost</p>\
             <div>Two <b>bold</b></div></body></html>",
        );
        let text = page_text(&doc);
        assert!(text.contains("Head"));
        assert!(!text.contains("Ghost"));
        assert!(!text.contains("p{}"));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, ["Head", "One", "Two bold"]);
    }
}
