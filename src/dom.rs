use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use scraper::{ElementRef, Html, Node as HtmlNode};
use serde::Serialize;
use tracing::debug;

/// Process-wide document id counter. Caches key on `(doc_id, node)` so two
/// documents (e.g. a page and its iframe) never share entries.
static NEXT_DOC_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle to a node in a [`Document`] arena. Handles stay valid for
/// the lifetime of the document, even after the node is detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Border box of an element in viewport coordinates. Set by the host; an
/// element the host never laid out reports a zero rect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const ZERO: Rect = Rect {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
    };

    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    None,
    Contents,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
    Collapse,
}

/// The style properties the core reasons about, resolved from the element's
/// inline `style` attribute plus the inherited ones from ancestors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComputedStyle {
    pub display: Display,
    pub visibility: Visibility,
    pub opacity: f64,
    pub pointer_events: bool,
    pub z_index: i32,
}

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attrs: Vec<(String, String)>,
    shadow_root: Option<NodeId>,
    /// Live form properties. `None` falls back to the content attribute,
    /// mirroring how the DOM separates properties from attributes.
    checked: Option<bool>,
    indeterminate: bool,
    value: Option<String>,
}

#[derive(Debug, Clone)]
enum NodeData {
    Root,
    Element(ElementData),
    ShadowRoot,
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeSlot {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
    bounds: Option<Rect>,
}

/// A synthetic event routed through the document's capture listeners. The
/// host mirrors real input events into this record before dispatching them.
#[derive(Debug, Clone)]
pub struct DispatchedEvent {
    pub kind: String,
    pub point: Point,
    pub trusted: bool,
}

impl DispatchedEvent {
    pub fn trusted(kind: &str, point: Point) -> Self {
        Self {
            kind: kind.to_string(),
            point,
            trusted: true,
        }
    }
}

/// What a capture listener asks the dispatcher to do with an event.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventReaction {
    pub prevent_default: bool,
    pub stop_propagation: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DispatchOutcome {
    pub default_prevented: bool,
    pub propagation_stopped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ListenerCallback = Rc<dyn Fn(&Document, &DispatchedEvent) -> EventReaction>;

struct Listener {
    id: ListenerId,
    kinds: Vec<String>,
    callback: ListenerCallback,
}

/// In-memory document arena. This is the "DOM-compatible document model" the
/// core consumes: elements are arena slots referenced by stable [`NodeId`]s,
/// parent links make the graph cyclic without ownership cycles, and interior
/// mutability lets the single-threaded host mutate the tree while async
/// waiters hold a shared reference.
pub struct Document {
    doc_id: u64,
    nodes: RefCell<Vec<NodeSlot>>,
    focused: Cell<Option<NodeId>>,
    listeners: RefCell<Vec<Listener>>,
    next_listener: Cell<u64>,
}

impl Document {
    pub fn new() -> Self {
        Self {
            doc_id: NEXT_DOC_ID.fetch_add(1, Ordering::Relaxed),
            nodes: RefCell::new(vec![NodeSlot {
                parent: None,
                children: Vec::new(),
                data: NodeData::Root,
                bounds: None,
            }]),
            focused: Cell::new(None),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(1),
        }
    }

    /// Parse a full HTML document into a fresh arena. scraper handles tag
    /// soup and entity decoding; the resulting `<html>` element becomes the
    /// single child of the document root.
    pub fn parse(html: &str) -> Self {
        let doc = Self::new();
        let parsed = Html::parse_document(html);
        let root = doc.root();
        doc.import_element(parsed.root_element(), root);
        debug!(
            doc_id = doc.doc_id,
            nodes = doc.nodes.borrow().len(),
            "parsed document"
        );
        doc
    }

    /// Parse an HTML fragment; its top-level nodes become children of the
    /// document root directly.
    pub fn parse_fragment(html: &str) -> Self {
        let doc = Self::new();
        let parsed = Html::parse_fragment(html);
        let root = doc.root();
        doc.import_children(parsed.root_element(), root);
        doc
    }

    fn import_children(&self, el: ElementRef<'_>, parent: NodeId) {
        for child in el.children() {
            if let Some(child_el) = ElementRef::wrap(child) {
                self.import_element(child_el, parent);
            } else if let HtmlNode::Text(text) = child.value() {
                if !text.trim().is_empty() {
                    let id = self.create_text(&text.text);
                    self.append_child(parent, id);
                }
            }
        }
    }

    fn import_element(&self, el: ElementRef<'_>, parent: NodeId) {
        let id = self.create_element(el.value().name.local.as_ref());
        for (name, value) in el.value().attrs() {
            self.set_attribute(id, name, value);
        }
        self.append_child(parent, id);
        self.import_children(el, id);
    }

    pub fn doc_id(&self) -> u64 {
        self.doc_id
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    // ── Construction ──

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.push_node(NodeData::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            shadow_root: None,
            checked: None,
            indeterminate: false,
            value: None,
        }))
    }

    pub fn create_text(&self, text: &str) -> NodeId {
        self.push_node(NodeData::Text(text.to_string()))
    }

    fn push_node(&self, data: NodeData) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId(nodes.len() as u32);
        nodes.push(NodeSlot {
            parent: None,
            children: Vec::new(),
            data,
            bounds: None,
        });
        id
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        let mut nodes = self.nodes.borrow_mut();
        nodes[child.0 as usize].parent = Some(parent);
        nodes[parent.0 as usize].children.push(child);
    }

    /// Shorthand: create an element, apply `(name, value)` attributes, and
    /// append it under `parent`.
    pub fn append_element(&self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let id = self.create_element(tag);
        for (name, value) in attrs {
            self.set_attribute(id, name, value);
        }
        self.append_child(parent, id);
        id
    }

    pub fn append_text(&self, parent: NodeId, text: &str) -> NodeId {
        let id = self.create_text(text);
        self.append_child(parent, id);
        id
    }

    /// Attach a shadow root to `host`. The root is not a light child: it
    /// hangs off the element and its parent pointer leads back to the host
    /// for composed-tree walks.
    pub fn attach_shadow(&self, host: NodeId) -> NodeId {
        let root = self.push_node(NodeData::ShadowRoot);
        let mut nodes = self.nodes.borrow_mut();
        nodes[root.0 as usize].parent = Some(host);
        match &mut nodes[host.0 as usize].data {
            NodeData::Element(el) => el.shadow_root = Some(root),
            _ => panic!("attach_shadow on a non-element node"),
        }
        root
    }

    /// Remove a node from its parent (or its host, for shadow roots). The
    /// slot stays allocated so stale [`NodeId`]s still resolve to a node
    /// that is simply no longer connected.
    pub fn detach(&self, node: NodeId) {
        let mut nodes = self.nodes.borrow_mut();
        let Some(parent) = nodes[node.0 as usize].parent.take() else {
            return;
        };
        nodes[parent.0 as usize].children.retain(|&c| c != node);
        if let NodeData::Element(el) = &mut nodes[parent.0 as usize].data {
            if el.shadow_root == Some(node) {
                el.shadow_root = None;
            }
        }
    }

    // ── Node kind accessors ──

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(
            self.nodes.borrow()[node.0 as usize].data,
            NodeData::Element(_)
        )
    }

    pub fn is_text(&self, node: NodeId) -> bool {
        matches!(self.nodes.borrow()[node.0 as usize].data, NodeData::Text(_))
    }

    pub fn is_shadow_root(&self, node: NodeId) -> bool {
        matches!(
            self.nodes.borrow()[node.0 as usize].data,
            NodeData::ShadowRoot
        )
    }

    pub fn tag_name(&self, node: NodeId) -> Option<String> {
        match &self.nodes.borrow()[node.0 as usize].data {
            NodeData::Element(el) => Some(el.tag.clone()),
            _ => None,
        }
    }

    pub fn text_data(&self, node: NodeId) -> Option<String> {
        match &self.nodes.borrow()[node.0 as usize].data {
            NodeData::Text(text) => Some(text.clone()),
            _ => None,
        }
    }

    // ── Attributes ──

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        match &self.nodes.borrow()[node.0 as usize].data {
            NodeData::Element(el) => el
                .attrs
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        match &self.nodes.borrow()[node.0 as usize].data {
            NodeData::Element(el) => el.attrs.iter().any(|(n, _)| n == name),
            _ => false,
        }
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        let mut nodes = self.nodes.borrow_mut();
        if let NodeData::Element(el) = &mut nodes[node.0 as usize].data {
            let name = name.to_ascii_lowercase();
            if let Some(entry) = el.attrs.iter_mut().find(|(n, _)| *n == name) {
                entry.1 = value.to_string();
            } else {
                el.attrs.push((name, value.to_string()));
            }
        }
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) {
        let mut nodes = self.nodes.borrow_mut();
        if let NodeData::Element(el) = &mut nodes[node.0 as usize].data {
            el.attrs.retain(|(n, _)| n != name);
        }
    }

    pub fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        match &self.nodes.borrow()[node.0 as usize].data {
            NodeData::Element(el) => el.attrs.clone(),
            _ => Vec::new(),
        }
    }

    pub fn id_attr(&self, node: NodeId) -> Option<String> {
        self.attribute(node, "id")
    }

    pub fn classes(&self, node: NodeId) -> Vec<String> {
        self.attribute(node, "class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// The effective `type` of an `<input>`, defaulting to `text`.
    pub fn input_type(&self, node: NodeId) -> String {
        self.attribute(node, "type")
            .map(|t| t.to_ascii_lowercase())
            .unwrap_or_else(|| "text".to_string())
    }

    // ── Form properties ──

    pub fn set_checked(&self, node: NodeId, checked: bool) {
        let mut nodes = self.nodes.borrow_mut();
        if let NodeData::Element(el) = &mut nodes[node.0 as usize].data {
            el.checked = Some(checked);
        }
    }

    pub fn is_checked(&self, node: NodeId) -> bool {
        match &self.nodes.borrow()[node.0 as usize].data {
            NodeData::Element(el) => el
                .checked
                .unwrap_or_else(|| el.attrs.iter().any(|(n, _)| n == "checked")),
            _ => false,
        }
    }

    pub fn set_indeterminate(&self, node: NodeId, value: bool) {
        let mut nodes = self.nodes.borrow_mut();
        if let NodeData::Element(el) = &mut nodes[node.0 as usize].data {
            el.indeterminate = value;
        }
    }

    pub fn is_indeterminate(&self, node: NodeId) -> bool {
        match &self.nodes.borrow()[node.0 as usize].data {
            NodeData::Element(el) => el.indeterminate,
            _ => false,
        }
    }

    pub fn set_value(&self, node: NodeId, value: &str) {
        let mut nodes = self.nodes.borrow_mut();
        if let NodeData::Element(el) = &mut nodes[node.0 as usize].data {
            el.value = Some(value.to_string());
        }
    }

    pub fn value(&self, node: NodeId) -> Option<String> {
        match &self.nodes.borrow()[node.0 as usize].data {
            NodeData::Element(el) => el.value.clone().or_else(|| {
                el.attrs
                    .iter()
                    .find(|(n, _)| n == "value")
                    .map(|(_, v)| v.clone())
            }),
            _ => None,
        }
    }

    // ── Tree walking ──

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.borrow()[node.0 as usize].parent
    }

    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        self.is_element(parent).then_some(parent)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes.borrow()[node.0 as usize].children.clone()
    }

    pub fn child_elements(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .into_iter()
            .filter(|&c| self.is_element(c))
            .collect()
    }

    pub fn shadow_root(&self, node: NodeId) -> Option<NodeId> {
        match &self.nodes.borrow()[node.0 as usize].data {
            NodeData::Element(el) => el.shadow_root,
            _ => None,
        }
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if matches!(self.nodes.borrow()[current.0 as usize].data, NodeData::Root) {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Ancestor chain (plain tree, crossing shadow boundaries through the
    /// host), excluding `node` itself, innermost first.
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            out.push(parent);
            current = parent;
        }
        out
    }

    /// Pre-order light-tree descendants of `root` (elements and text),
    /// excluding `root` itself. Does not descend into shadow roots.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            for child in self.children(node).into_iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    pub fn descendant_elements(&self, root: NodeId) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&n| self.is_element(n))
            .collect()
    }

    /// The root of `node`'s tree scope: the nearest enclosing shadow root,
    /// or the document root.
    pub fn tree_scope(&self, node: NodeId) -> NodeId {
        let mut current = node;
        loop {
            if self.is_shadow_root(current) {
                return current;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    /// All shadow roots reachable from `root`, transitively.
    pub fn shadow_roots_under(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if let Some(shadow) = self.shadow_root(node) {
                out.push(shadow);
                stack.push(shadow);
            }
            for child in self.children(node) {
                stack.push(child);
            }
        }
        out
    }

    // ── Composed tree ──

    /// The `<slot>` in the host's shadow tree this light child is assigned
    /// to: the first slot whose `name` matches the node's `slot` attribute,
    /// or the first unnamed slot for nodes without one.
    pub fn assigned_slot(&self, node: NodeId) -> Option<NodeId> {
        let host = self.parent_element(node)?;
        let shadow = self.shadow_root(host)?;
        let wanted = self.attribute(node, "slot");
        self.descendants(shadow)
            .into_iter()
            .filter(|&n| self.tag_name(n).as_deref() == Some("slot"))
            .find(|&slot| self.attribute(slot, "name") == wanted)
    }

    /// Light children of the slot's host assigned to this slot; the slot's
    /// own children act as fallback content.
    pub fn slot_assigned_nodes(&self, slot: NodeId) -> Vec<NodeId> {
        let scope = self.tree_scope(slot);
        if !self.is_shadow_root(scope) {
            return Vec::new();
        }
        let Some(host) = self.parent(scope) else {
            return Vec::new();
        };
        let assigned: Vec<NodeId> = self
            .children(host)
            .into_iter()
            .filter(|&child| self.assigned_slot(child) == Some(slot))
            .collect();
        if assigned.is_empty() {
            self.children(slot)
        } else {
            assigned
        }
    }

    /// Children in the flattened (composed) tree: shadow contents for hosts,
    /// assigned nodes for slots, light children otherwise.
    pub fn composed_children(&self, node: NodeId) -> Vec<NodeId> {
        if let Some(shadow) = self.shadow_root(node) {
            return self.children(shadow);
        }
        if self.tag_name(node).as_deref() == Some("slot") {
            return self.slot_assigned_nodes(node);
        }
        self.children(node)
    }

    /// Parent in the flattened tree: assigned slot for slotted nodes, host
    /// for shadow roots, plain parent otherwise.
    pub fn composed_parent(&self, node: NodeId) -> Option<NodeId> {
        if let Some(slot) = self.assigned_slot(node) {
            return Some(slot);
        }
        let parent = self.parent(node)?;
        if self.is_shadow_root(parent) {
            return self.parent(parent);
        }
        Some(parent)
    }

    // ── Document order ──

    fn composed_path(&self, node: NodeId) -> Vec<u32> {
        let mut path = Vec::new();
        let mut current = node;
        while let Some(parent) = self.composed_parent(current) {
            let index = self
                .composed_children(parent)
                .iter()
                .position(|&c| c == current)
                .unwrap_or(0) as u32;
            path.push(index);
            current = parent;
        }
        path.reverse();
        path
    }

    /// Compare two nodes in composed-tree document order.
    pub fn compare_document_order(&self, a: NodeId, b: NodeId) -> std::cmp::Ordering {
        self.composed_path(a).cmp(&self.composed_path(b))
    }

    /// Sort and deduplicate a node list into document order.
    pub fn sort_document_order(&self, nodes: &mut Vec<NodeId>) {
        nodes.sort_by(|&a, &b| self.compare_document_order(a, b));
        nodes.dedup();
    }

    // ── Geometry ──

    pub fn set_bounds(&self, node: NodeId, rect: Rect) {
        self.nodes.borrow_mut()[node.0 as usize].bounds = Some(rect);
    }

    pub fn clear_bounds(&self, node: NodeId) {
        self.nodes.borrow_mut()[node.0 as usize].bounds = None;
    }

    pub fn bounding_client_rect(&self, node: NodeId) -> Rect {
        self.nodes.borrow()[node.0 as usize]
            .bounds
            .unwrap_or(Rect::ZERO)
    }

    // ── Computed style ──

    fn inline_style_value(&self, node: NodeId, property: &str) -> Option<String> {
        let style = self.attribute(node, "style")?;
        for declaration in style.split(';') {
            let mut parts = declaration.splitn(2, ':');
            let name = parts.next()?.trim();
            if name.eq_ignore_ascii_case(property) {
                return parts.next().map(|v| v.trim().to_ascii_lowercase());
            }
        }
        None
    }

    pub fn computed_display(&self, node: NodeId) -> Display {
        // The `hidden` content attribute and `<input type=hidden>` map to
        // display:none in the UA stylesheet.
        if self.has_attribute(node, "hidden") {
            return Display::None;
        }
        if self.tag_name(node).as_deref() == Some("input") && self.input_type(node) == "hidden" {
            return Display::None;
        }
        match self.inline_style_value(node, "display").as_deref() {
            Some("none") => Display::None,
            Some("contents") => Display::Contents,
            _ => Display::Other,
        }
    }

    /// `visibility` inherits: the nearest ancestor-or-self with an explicit
    /// value wins.
    pub fn computed_visibility(&self, node: NodeId) -> Visibility {
        let mut current = Some(node);
        while let Some(n) = current {
            match self.inline_style_value(n, "visibility").as_deref() {
                Some("hidden") => return Visibility::Hidden,
                Some("collapse") => return Visibility::Collapse,
                Some("visible") => return Visibility::Visible,
                _ => {}
            }
            current = self.composed_parent(n);
        }
        Visibility::Visible
    }

    pub fn computed_opacity(&self, node: NodeId) -> f64 {
        self.inline_style_value(node, "opacity")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(1.0)
    }

    /// `pointer-events` inherits like `visibility`.
    pub fn pointer_events_enabled(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            match self.inline_style_value(n, "pointer-events").as_deref() {
                Some("none") => return false,
                Some(_) => return true,
                None => {}
            }
            current = self.composed_parent(n);
        }
        true
    }

    pub fn z_index(&self, node: NodeId) -> i32 {
        self.inline_style_value(node, "z-index")
            .and_then(|v| v.parse::<i32>().ok())
            .unwrap_or(0)
    }

    pub fn computed_style(&self, node: NodeId) -> ComputedStyle {
        ComputedStyle {
            display: self.computed_display(node),
            visibility: self.computed_visibility(node),
            opacity: self.computed_opacity(node),
            pointer_events: self.pointer_events_enabled(node),
            z_index: self.z_index(node),
        }
    }

    // ── Text ──

    /// Concatenated raw text of the light subtree, like `Node.textContent`.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        if let Some(text) = self.text_data(node) {
            out.push_str(&text);
        }
        for child in self.descendants(node) {
            if let Some(text) = self.text_data(child) {
                out.push_str(&text);
            }
        }
        out
    }

    // ── Focus ──

    pub fn set_focus(&self, node: Option<NodeId>) {
        self.focused.set(node);
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused.get()
    }

    pub fn is_focused(&self, node: NodeId) -> bool {
        self.focused.get() == Some(node)
    }

    // ── Hit testing ──

    fn hit_candidates(&self, point: Point, scope: NodeId) -> Vec<NodeId> {
        let mut hits: Vec<NodeId> = self
            .descendants(scope)
            .into_iter()
            .filter(|&n| self.is_element(n))
            .filter(|&n| self.computed_display(n) != Display::None)
            .filter(|&n| self.computed_visibility(n) == Visibility::Visible)
            .filter(|&n| self.pointer_events_enabled(n))
            .filter(|&n| {
                let rect = self.bounding_client_rect(n);
                !rect.is_empty() && rect.contains(point)
            })
            .collect();
        // Topmost first: z-index descending, later-in-document paints above.
        hits.sort_by(|&a, &b| {
            self.z_index(b)
                .cmp(&self.z_index(a))
                .then_with(|| self.compare_document_order(b, a))
        });
        hits
    }

    /// `elementsFromPoint` within one tree scope (the document root or a
    /// shadow root), topmost first. `display: contents` elements produce no
    /// box and are excluded, matching the browser behavior the hit-target
    /// checker compensates for.
    pub fn elements_from_point(&self, point: Point, scope: NodeId) -> Vec<NodeId> {
        self.hit_candidates(point, scope)
            .into_iter()
            .filter(|&n| self.computed_display(n) != Display::Contents)
            .collect()
    }

    /// `elementFromPoint` within one tree scope. Unlike the list variant
    /// this can surface a `display: contents` element whose host-supplied
    /// rect contains the point (the WebKit divergence).
    pub fn element_from_point(&self, point: Point, scope: NodeId) -> Option<NodeId> {
        self.hit_candidates(point, scope).into_iter().next()
    }

    // ── Events ──

    pub fn add_event_listener<F>(&self, kinds: &[&str], callback: F) -> ListenerId
    where
        F: Fn(&Document, &DispatchedEvent) -> EventReaction + 'static,
    {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().push(Listener {
            id,
            kinds: kinds.iter().map(|k| k.to_string()).collect(),
            callback: Rc::new(callback),
        });
        id
    }

    /// Removing an already-removed listener is a no-op.
    pub fn remove_event_listener(&self, id: ListenerId) {
        self.listeners.borrow_mut().retain(|l| l.id != id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Route an event through the capture listeners registered on this
    /// document (the interceptor's "owner window"). The listener list is
    /// snapshotted before invocation so callbacks may inspect the document
    /// or unregister themselves.
    pub fn dispatch_event(&self, event: &DispatchedEvent) -> DispatchOutcome {
        let callbacks: Vec<ListenerCallback> = self
            .listeners
            .borrow()
            .iter()
            .filter(|l| l.kinds.iter().any(|k| k == &event.kind))
            .map(|l| Rc::clone(&l.callback))
            .collect();
        let mut outcome = DispatchOutcome::default();
        for callback in callbacks {
            let reaction = callback(self, event);
            outcome.default_prevented |= reaction.prevent_default;
            outcome.propagation_stopped |= reaction.stop_propagation;
            if reaction.stop_propagation {
                break;
            }
        }
        outcome
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Labelable form controls, the set `<label>` association targets. Buttons
/// are included; the label engine and retargeting share this definition.
pub fn is_form_control(doc: &Document, node: NodeId) -> bool {
    match doc.tag_name(node).as_deref() {
        Some("input") => doc.input_type(node) != "hidden",
        Some("button" | "meter" | "output" | "progress" | "select" | "textarea") => true,
        _ => false,
    }
}
