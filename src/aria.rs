//! ARIA primitives: role resolution per the ARIA 1.2 algorithm, accessible
//! name and description computation, hidden-for-ARIA detection and heading
//! levels. All entry points accept the ARIA cache so repeated queries inside
//! a cache session compute each value at most once per node.

use crate::cache::AriaCaches;
use crate::dom::{Display, Document, NodeId};
use crate::roles::{self, AriaRole};
use crate::visibility::is_hidden_by_css;

/// Collapse whitespace runs to single spaces and trim, the normalization
/// ARIA applies to names and descriptions.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First element with the given id inside `node`'s tree scope, in document
/// order. id references do not cross shadow boundaries.
pub fn element_by_id(doc: &Document, node: NodeId, id: &str) -> Option<NodeId> {
    let scope = doc.tree_scope(node);
    std::iter::once(scope)
        .chain(doc.descendants(scope))
        .find(|&n| doc.id_attr(n).as_deref() == Some(id))
}

// ── Role resolution ──

/// The first recognized token of the `role` attribute, if any.
pub fn explicit_role(doc: &Document, node: NodeId) -> Option<AriaRole> {
    let value = doc.attribute(node, "role")?;
    value.split_whitespace().find_map(AriaRole::from_str)
}

fn has_global_aria_attribute(doc: &Document, node: NodeId) -> bool {
    doc.attributes(node)
        .iter()
        .any(|(name, _)| roles::is_global_aria_attribute(name))
}

/// Whether the element can take focus: an explicit `tabindex`, or a native
/// interactive element that is not disabled.
pub fn is_focusable(doc: &Document, node: NodeId) -> bool {
    if doc.has_attribute(node, "disabled") {
        return false;
    }
    if doc.has_attribute(node, "tabindex") || doc.has_attribute(node, "contenteditable") {
        return true;
    }
    match doc.tag_name(node).as_deref() {
        Some("a" | "area") => doc.has_attribute(node, "href"),
        Some("input") => doc.input_type(node) != "hidden",
        Some("button" | "select" | "textarea" | "summary") => true,
        Some("audio" | "video") => doc.has_attribute(node, "controls"),
        _ => false,
    }
}

/// `role="presentation"` loses to the implicit role when the element also
/// carries global ARIA attributes or is focusable.
fn has_presentation_conflict(doc: &Document, node: NodeId) -> bool {
    has_global_aria_attribute(doc, node) || is_focusable(doc, node)
}

fn is_descendant_of_tag(doc: &Document, node: NodeId, tags: &[&str]) -> bool {
    doc.ancestors(node).iter().any(|&a| {
        doc.tag_name(a)
            .map(|t| tags.contains(&t.as_str()))
            .unwrap_or(false)
    })
}

fn has_accessible_name_hint(doc: &Document, node: NodeId) -> bool {
    let named_by = |attr: &str| {
        doc.attribute(node, attr)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    };
    named_by("aria-label") || named_by("aria-labelledby") || named_by("title")
}

/// Landmark scoping per HTML-AAM: `header`/`footer` only map to
/// `banner`/`contentinfo` outside sectioning content.
const SECTIONING_TAGS: &[&str] = &["article", "aside", "main", "nav", "section"];

fn nearest_ancestor_table_role(doc: &Document, node: NodeId) -> Option<AriaRole> {
    let table = doc
        .ancestors(node)
        .into_iter()
        .find(|&a| doc.tag_name(a).as_deref() == Some("table"))?;
    explicit_role(doc, table).or(Some(AriaRole::Table))
}

fn table_cell_role(doc: &Document, node: NodeId) -> AriaRole {
    match nearest_ancestor_table_role(doc, node) {
        Some(AriaRole::Grid) | Some(AriaRole::TreeGrid) => AriaRole::GridCell,
        _ => AriaRole::Cell,
    }
}

fn th_role(doc: &Document, node: NodeId) -> AriaRole {
    match doc.attribute(node, "scope").as_deref() {
        Some("col") | Some("colgroup") => return AriaRole::ColumnHeader,
        Some("row") | Some("rowgroup") => return AriaRole::RowHeader,
        _ => {}
    }
    // Neighborhood heuristic: a header in the table's first row labels its
    // column, a header in a later row labels its row.
    let in_first_row = doc
        .ancestors(node)
        .into_iter()
        .find(|&a| doc.tag_name(a).as_deref() == Some("tr"))
        .and_then(|row| {
            let section = doc.parent_element(row)?;
            Some(doc.child_elements(section).first() == Some(&row))
        })
        .unwrap_or(false);
    if in_first_row {
        AriaRole::ColumnHeader
    } else {
        AriaRole::RowHeader
    }
}

fn input_role(doc: &Document, node: NodeId) -> Option<AriaRole> {
    let has_list = doc.has_attribute(node, "list");
    match doc.input_type(node).as_str() {
        "button" | "image" | "reset" | "submit" => Some(AriaRole::Button),
        "checkbox" => Some(AriaRole::Checkbox),
        "radio" => Some(AriaRole::Radio),
        "range" => Some(AriaRole::Slider),
        "number" => Some(AriaRole::SpinButton),
        "search" => Some(if has_list {
            AriaRole::Combobox
        } else {
            AriaRole::SearchBox
        }),
        "hidden" | "file" => None,
        _ => Some(if has_list {
            AriaRole::Combobox
        } else {
            AriaRole::TextBox
        }),
    }
}

/// Implicit role from the HTML-AAM mapping tables, including the
/// conditional rules for `a`/`area`/`header`/`footer`/`img`/`input`/
/// `select`/`th`/`section`/`form`.
pub fn implicit_role(doc: &Document, node: NodeId) -> Option<AriaRole> {
    let tag = doc.tag_name(node)?;
    match tag.as_str() {
        "a" | "area" => Some(if doc.has_attribute(node, "href") {
            AriaRole::Link
        } else {
            AriaRole::Generic
        }),
        "article" => Some(AriaRole::Article),
        "aside" => Some(AriaRole::Complementary),
        "blockquote" => Some(AriaRole::Blockquote),
        "body" | "span" | "div" | "b" | "i" | "u" | "small" | "bdi" | "bdo" | "data" => {
            Some(AriaRole::Generic)
        }
        "button" => Some(AriaRole::Button),
        "caption" => Some(AriaRole::Caption),
        "code" => Some(AriaRole::Code),
        "datalist" => Some(AriaRole::ListBox),
        "dd" => Some(AriaRole::Definition),
        "del" => Some(AriaRole::Deletion),
        "details" => Some(AriaRole::Group),
        "dfn" | "dt" => Some(AriaRole::Term),
        "dialog" => Some(AriaRole::Dialog),
        "em" => Some(AriaRole::Emphasis),
        "fieldset" | "optgroup" => Some(AriaRole::Group),
        "figure" => Some(AriaRole::Figure),
        "footer" => Some(if is_descendant_of_tag(doc, node, SECTIONING_TAGS) {
            AriaRole::Generic
        } else {
            AriaRole::ContentInfo
        }),
        "form" => has_accessible_name_hint(doc, node).then_some(AriaRole::Form),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => Some(AriaRole::Heading),
        "header" => Some(if is_descendant_of_tag(doc, node, SECTIONING_TAGS) {
            AriaRole::Generic
        } else {
            AriaRole::Banner
        }),
        "hr" => Some(AriaRole::Separator),
        "html" => Some(AriaRole::Document),
        "img" => {
            // An empty alt with no other semantics marks the image as
            // decorative.
            if doc.attribute(node, "alt").as_deref() == Some("")
                && !has_global_aria_attribute(doc, node)
                && !is_focusable(doc, node)
            {
                Some(AriaRole::Presentation)
            } else {
                Some(AriaRole::Img)
            }
        }
        "input" => input_role(doc, node),
        "ins" => Some(AriaRole::Insertion),
        "li" => Some(AriaRole::ListItem),
        "main" => Some(AriaRole::Main),
        "math" => Some(AriaRole::Math),
        "menu" | "ol" | "ul" => Some(AriaRole::List),
        "meter" => Some(AriaRole::Meter),
        "nav" => Some(AriaRole::Navigation),
        "option" => Some(AriaRole::Option),
        "output" => Some(AriaRole::Status),
        "p" => Some(AriaRole::Paragraph),
        "progress" => Some(AriaRole::ProgressBar),
        "section" => Some(if has_accessible_name_hint(doc, node) {
            AriaRole::Region
        } else {
            AriaRole::Generic
        }),
        "select" => {
            let multiple = doc.has_attribute(node, "multiple");
            let size = doc
                .attribute(node, "size")
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(1);
            Some(if multiple || size > 1 {
                AriaRole::ListBox
            } else {
                AriaRole::Combobox
            })
        }
        "strong" => Some(AriaRole::Strong),
        "sub" => Some(AriaRole::Subscript),
        "sup" => Some(AriaRole::Superscript),
        "summary" => Some(AriaRole::Button),
        "table" => Some(AriaRole::Table),
        "tbody" | "tfoot" | "thead" => Some(AriaRole::RowGroup),
        "td" => Some(table_cell_role(doc, node)),
        "textarea" => Some(AriaRole::TextBox),
        "th" => Some(th_role(doc, node)),
        "time" => Some(AriaRole::Time),
        "tr" => Some(AriaRole::Row),
        _ => None,
    }
}

/// Whether a presentational role effectively holds on `node` (explicit and
/// unconflicted, or inherited through the structural tables).
fn presentation_holds(doc: &Document, node: NodeId) -> bool {
    if let Some(role) = explicit_role(doc, node) {
        return role.is_presentational() && !has_presentation_conflict(doc, node);
    }
    inherits_presentation(doc, node)
}

/// Structural children (`li` under `ul`, `td` under `tr`, …) lose their
/// role when the nearest valid structural ancestor is presentational.
fn inherits_presentation(doc: &Document, node: NodeId) -> bool {
    let Some(tag) = doc.tag_name(node) else {
        return false;
    };
    let Some((_, parents)) = roles::PRESENTATION_INHERITANCE
        .iter()
        .find(|(child, _)| *child == tag.as_str())
    else {
        return false;
    };
    let Some(ancestor) = doc.ancestors(node).into_iter().find(|&a| {
        doc.tag_name(a)
            .map(|t| parents.contains(&t.as_str()))
            .unwrap_or(false)
    }) else {
        return false;
    };
    presentation_holds(doc, ancestor)
}

fn compute_aria_role(doc: &Document, node: NodeId) -> Option<AriaRole> {
    if let Some(role) = explicit_role(doc, node) {
        if !role.is_presentational() {
            return Some(role);
        }
        // Conflict resolution: global ARIA attributes or focusability keep
        // the implicit role alive.
        if has_presentation_conflict(doc, node) {
            return implicit_role(doc, node).filter(|r| !r.is_presentational());
        }
        return None;
    }
    if inherits_presentation(doc, node) {
        return None;
    }
    implicit_role(doc, node).filter(|r| !r.is_presentational())
}

/// Resolve the exposed ARIA role of an element.
pub fn get_aria_role(caches: &AriaCaches, doc: &Document, node: NodeId) -> Option<AriaRole> {
    caches.role_or_insert_with(node, || compute_aria_role(doc, node))
}

// ── Hidden-for-ARIA ──

#[derive(Debug, Clone, Copy)]
pub struct HiddenOptions {
    pub include_aria: bool,
    pub include_css: bool,
}

impl Default for HiddenOptions {
    fn default() -> Self {
        Self {
            include_aria: true,
            include_css: true,
        }
    }
}

const IGNORED_FOR_ARIA_TAGS: &[&str] = &["noscript", "script", "style", "template"];

fn compute_hidden_for_aria(doc: &Document, node: NodeId, opts: HiddenOptions) -> bool {
    if !doc.is_connected(node) {
        return true;
    }
    if opts.include_css && is_hidden_by_css(doc, node) {
        return true;
    }
    let mut current = Some(node);
    while let Some(n) = current {
        if doc.is_element(n) {
            if let Some(tag) = doc.tag_name(n) {
                if IGNORED_FOR_ARIA_TAGS.contains(&tag.as_str()) {
                    return true;
                }
            }
            if opts.include_aria
                && doc.attribute(n, "aria-hidden").as_deref() == Some("true")
            {
                return true;
            }
            if doc.has_attribute(n, "inert") {
                return true;
            }
            // A light child of a shadow host that no slot picked up does not
            // render and is absent from the accessibility tree.
            if let Some(parent) = doc.parent_element(n) {
                if doc.shadow_root(parent).is_some() && doc.assigned_slot(n).is_none() {
                    return true;
                }
            }
        }
        current = doc.parent(n);
    }
    false
}

/// Hidden from the accessibility tree with the default toggles (both
/// `aria-hidden` and CSS considered). This is the cached variant.
pub fn is_hidden_for_aria(caches: &AriaCaches, doc: &Document, node: NodeId) -> bool {
    caches.hidden_or_insert_with(node, || {
        compute_hidden_for_aria(doc, node, HiddenOptions::default())
    })
}

/// Parameterized hidden check; non-default option sets bypass the cache.
pub fn is_hidden_for_aria_with(
    caches: &AriaCaches,
    doc: &Document,
    node: NodeId,
    opts: HiddenOptions,
) -> bool {
    if opts.include_aria && opts.include_css {
        return is_hidden_for_aria(caches, doc, node);
    }
    compute_hidden_for_aria(doc, node, opts)
}

/// Cached `pointer-events` resolution for the hit-target checker.
pub fn pointer_events_enabled(caches: &AriaCaches, doc: &Document, node: NodeId) -> bool {
    caches.pointer_events_or_insert_with(node, || doc.pointer_events_enabled(node))
}

// ── Text collection ──

fn element_text_into(doc: &Document, node: NodeId, include_hidden: bool, out: &mut String) {
    if let Some(text) = doc.text_data(node) {
        out.push_str(&text);
        out.push(' ');
        return;
    }
    if doc.is_element(node) {
        if let Some(tag) = doc.tag_name(node) {
            if IGNORED_FOR_ARIA_TAGS.contains(&tag.as_str()) {
                return;
            }
        }
        if !include_hidden {
            if doc.attribute(node, "aria-hidden").as_deref() == Some("true") {
                return;
            }
            if doc.computed_display(node) == Display::None {
                return;
            }
        }
    }
    for child in doc.children(node) {
        element_text_into(doc, child, include_hidden, out);
    }
}

/// Normalized text of an element's subtree as ARIA sees it: hidden branches
/// are skipped unless `include_hidden` is set.
pub fn element_text(doc: &Document, node: NodeId, include_hidden: bool) -> String {
    let mut out = String::new();
    element_text_into(doc, node, include_hidden, &mut out);
    normalize_whitespace(&out)
}

// ── Label association ──

/// The `<label>` elements associated with a form control, via `for` or
/// nesting, in document order.
pub fn labels_for_control(doc: &Document, control: NodeId) -> Vec<NodeId> {
    let mut labels = Vec::new();
    let scope = doc.tree_scope(control);
    if let Some(id) = doc.id_attr(control) {
        for n in doc.descendants(scope) {
            if doc.tag_name(n).as_deref() == Some("label")
                && doc.attribute(n, "for").as_deref() == Some(id.as_str())
            {
                labels.push(n);
            }
        }
    }
    for ancestor in doc.ancestors(control) {
        if doc.tag_name(ancestor).as_deref() == Some("label") && !labels.contains(&ancestor) {
            labels.push(ancestor);
        }
    }
    doc.sort_document_order(&mut labels);
    labels
}

/// The control a `<label>` labels: its `for` target, or the first nested
/// labelable control.
pub fn label_target(doc: &Document, label: NodeId) -> Option<NodeId> {
    if let Some(id) = doc.attribute(label, "for") {
        return element_by_id(doc, label, &id).filter(|&n| crate::dom::is_form_control(doc, n));
    }
    doc.descendant_elements(label)
        .into_iter()
        .find(|&n| crate::dom::is_form_control(doc, n))
}

// ── Accessible name and description ──

// Referenced elements contribute their text even when hidden; hiding the
// label element is a common visually-hidden labelling pattern.
fn idref_text(doc: &Document, node: NodeId, attr: &str) -> Option<String> {
    let refs = doc.attribute(node, attr)?;
    let parts: Vec<String> = refs
        .split_whitespace()
        .filter_map(|id| element_by_id(doc, node, id))
        .map(|el| element_text(doc, el, true))
        .filter(|text| !text.is_empty())
        .collect();
    let joined = parts.join(" ");
    (!joined.is_empty()).then_some(joined)
}

fn compute_accessible_name(
    caches: &AriaCaches,
    doc: &Document,
    node: NodeId,
    include_hidden: bool,
) -> String {
    // 1. aria-labelledby, dereferenced within the owning scope.
    if let Some(name) = idref_text(doc, node, "aria-labelledby") {
        return normalize_whitespace(&name);
    }
    // 2. aria-label.
    if let Some(label) = doc.attribute(node, "aria-label") {
        let trimmed = label.trim();
        if !trimmed.is_empty() {
            return normalize_whitespace(trimmed);
        }
    }
    // 3. Associated <label> text for form controls.
    if crate::dom::is_form_control(doc, node) {
        let parts: Vec<String> = labels_for_control(doc, node)
            .into_iter()
            .map(|l| element_text(doc, l, include_hidden))
            .filter(|t| !t.is_empty())
            .collect();
        if !parts.is_empty() {
            return parts.join(" ");
        }
    }
    // 4. title.
    if let Some(title) = doc.attribute(node, "title") {
        let trimmed = title.trim();
        if !trimmed.is_empty() {
            return normalize_whitespace(trimmed);
        }
    }
    // 5. alt for images.
    if matches!(doc.tag_name(node).as_deref(), Some("img" | "area"))
        || (doc.tag_name(node).as_deref() == Some("input") && doc.input_type(node) == "image")
    {
        if let Some(alt) = doc.attribute(node, "alt") {
            let trimmed = alt.trim();
            if !trimmed.is_empty() {
                return normalize_whitespace(trimmed);
            }
        }
    }
    // 6. placeholder for text entry.
    if matches!(doc.tag_name(node).as_deref(), Some("input" | "textarea")) {
        if let Some(placeholder) = doc.attribute(node, "placeholder") {
            let trimmed = placeholder.trim();
            if !trimmed.is_empty() {
                return normalize_whitespace(trimmed);
            }
        }
    }
    // 7. Contents, for roles that name from content.
    let role = get_aria_role(caches, doc, node);
    if role.map(|r| r.allows_name_from_content()).unwrap_or(false) {
        return element_text(doc, node, include_hidden);
    }
    String::new()
}

/// WAI-ARIA accessible name, simplified but deterministic. The result is a
/// normalized single-line string; elements without a name yield `""`.
pub fn get_accessible_name(
    caches: &AriaCaches,
    doc: &Document,
    node: NodeId,
    include_hidden: bool,
) -> String {
    caches.name_or_insert_with(node, include_hidden, || {
        compute_accessible_name(caches, doc, node, include_hidden)
    })
}

fn compute_accessible_description(doc: &Document, node: NodeId) -> String {
    if let Some(description) = idref_text(doc, node, "aria-describedby") {
        return normalize_whitespace(&description);
    }
    if let Some(title) = doc.attribute(node, "title") {
        return normalize_whitespace(title.trim());
    }
    String::new()
}

/// Accessible description: `aria-describedby` chain, then `title`.
pub fn get_accessible_description(
    caches: &AriaCaches,
    doc: &Document,
    node: NodeId,
    include_hidden: bool,
) -> String {
    caches.description_or_insert_with(node, include_hidden, || {
        compute_accessible_description(doc, node)
    })
}

// ── Heading level ──

/// `aria-level` when numeric and ≥ 1; otherwise derived from `h1`..`h6`;
/// role=heading elements without either default to 2.
pub fn heading_level(caches: &AriaCaches, doc: &Document, node: NodeId) -> Option<u32> {
    if let Some(level) = doc
        .attribute(node, "aria-level")
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|&v| v >= 1)
    {
        return Some(level);
    }
    if let Some(tag) = doc.tag_name(node) {
        if let Some(rest) = tag.strip_prefix('h') {
            if let Ok(level) = rest.parse::<u32>() {
                if (1..=6).contains(&level) {
                    return Some(level);
                }
            }
        }
    }
    (get_aria_role(caches, doc, node) == Some(AriaRole::Heading)).then_some(2)
}
