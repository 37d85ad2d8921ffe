//! Compositional selector engine: `>>`-chained stages of named engines
//! (`css`, `xpath`, `text`, `role`, `internal:*`, layout engines) evaluated
//! over the document arena, with scoped memoization through
//! [`SelectorCaches`] and an extension registry for out-of-tree engines.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{bail, Result};
use regex::RegexBuilder;
use tracing::warn;

use crate::aria::{self, element_text, normalize_whitespace};
use crate::cache::{AriaCaches, SelectorCaches};
use crate::css;
use crate::dom::{Document, NodeId};
use crate::roles::AriaRole;
use crate::visibility::is_element_visible;
use crate::xpath;

/// Engine names the stage parser recognizes. A stage whose prefix is not
/// listed here (or registered as a custom engine) is treated as a bare CSS
/// body.
pub const KNOWN_ENGINES: &[&str] = &[
    "css",
    "xpath",
    "text",
    "role",
    "internal:has",
    "internal:has-not",
    "internal:has-text",
    "internal:has-not-text",
    "internal:and",
    "internal:or",
    "internal:label",
    "internal:visible",
    "nth",
    "visible",
    "left-of",
    "right-of",
    "above",
    "below",
    "near",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorStage {
    pub engine: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSelector {
    pub stages: Vec<SelectorStage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Expand the query root through all shadow roots transitively before
    /// evaluating the first stage.
    pub pierce_shadow_dom: bool,
    /// Filter the final results through `is_element_visible`.
    pub visible_only: bool,
}

/// Split `expr` on a separator token at top level: quoted regions and
/// bracketed/parenthesized regions are atomic.
pub fn split_top_level(expr: &str, separator: &str) -> Vec<String> {
    let sep: Vec<char> = separator.chars().collect();
    let chars: Vec<char> = expr.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            current.push(c);
            if c == '\\' && i + 1 < chars.len() {
                current.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '"' | '\'' => {
                quote = Some(c);
                current.push(c);
            }
            '[' | '(' | '{' => {
                depth += 1;
                current.push(c);
            }
            ']' | ')' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            _ if depth == 0 && chars[i..].starts_with(&sep[..]) => {
                parts.push(current.trim().to_string());
                current = String::new();
                i += sep.len();
                continue;
            }
            _ => current.push(c),
        }
        i += 1;
    }
    parts.push(current.trim().to_string());
    parts
}

/// Split an `internal:and`/`internal:or` body into sub-selectors on
/// top-level `&&`.
pub fn parse_compound_body(body: &str) -> Vec<String> {
    split_top_level(body, "&&")
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect()
}

fn parse_stage(stage: &str, is_engine: &dyn Fn(&str) -> bool) -> SelectorStage {
    let trimmed = stage.trim();
    if is_engine(trimmed) {
        return SelectorStage {
            engine: trimmed.to_string(),
            body: String::new(),
        };
    }
    if let Some(eq) = trimmed.find('=') {
        let prefix = trimmed[..eq].trim();
        if is_engine(prefix) {
            return SelectorStage {
                engine: prefix.to_string(),
                body: trimmed[eq + 1..].trim().to_string(),
            };
        }
    }
    SelectorStage {
        engine: "css".to_string(),
        body: trimmed.to_string(),
    }
}

/// Parse a chained selector expression into stages. Unrecognized prefixes
/// fall back to the default `css` engine.
pub fn parse_selector(expr: &str) -> ParsedSelector {
    parse_selector_with(expr, &|name| KNOWN_ENGINES.contains(&name))
}

fn parse_selector_with(expr: &str, is_engine: &dyn Fn(&str) -> bool) -> ParsedSelector {
    let stages = split_top_level(expr, ">>")
        .into_iter()
        .filter(|stage| !stage.is_empty())
        .map(|stage| parse_stage(&stage, is_engine))
        .collect();
    ParsedSelector { stages }
}

// ── Text matching ──

/// Body interpretation shared by `text=`, `internal:has-text=` and
/// `internal:label=`: case-insensitive substring by default, exact match
/// when quoted, regex for `/pattern/flags` bodies.
#[derive(Debug, Clone)]
pub enum TextMatcher {
    Substring(String),
    Exact(String),
    Regex(regex::Regex),
}

impl TextMatcher {
    pub fn parse(body: &str) -> TextMatcher {
        let trimmed = body.trim();
        if trimmed.len() >= 2 {
            let first = trimmed.chars().next().unwrap();
            if (first == '"' || first == '\'') && trimmed.ends_with(first) {
                let inner = &trimmed[1..trimmed.len() - 1];
                return TextMatcher::Exact(normalize_whitespace(
                    &inner.replace(&format!("\\{first}"), &first.to_string()),
                ));
            }
            if first == '/' {
                if let Some(close) = trimmed.rfind('/').filter(|&i| i > 0) {
                    let pattern = &trimmed[1..close];
                    let flags = &trimmed[close + 1..];
                    let mut builder = RegexBuilder::new(pattern);
                    builder.case_insensitive(flags.contains('i'));
                    builder.dot_matches_new_line(flags.contains('s'));
                    builder.multi_line(flags.contains('m'));
                    match builder.build() {
                        Ok(re) => return TextMatcher::Regex(re),
                        Err(err) => {
                            // Bad regex degrades to substring semantics.
                            warn!(body = trimmed, %err, "invalid regex in text selector");
                        }
                    }
                }
            }
        }
        TextMatcher::Substring(normalize_whitespace(trimmed).to_lowercase())
    }

    pub fn matches(&self, text: &str) -> bool {
        let normalized = normalize_whitespace(text);
        match self {
            TextMatcher::Substring(needle) => normalized.to_lowercase().contains(needle.as_str()),
            TextMatcher::Exact(expected) => normalized == *expected,
            TextMatcher::Regex(re) => re.is_match(&normalized),
        }
    }
}

// ── Role queries ──

#[derive(Debug, Clone)]
struct RoleQuery {
    role: AriaRole,
    name: Option<String>,
    exact: bool,
    include_hidden: bool,
}

fn parse_role_body(body: &str) -> Result<RoleQuery, String> {
    let trimmed = body.trim();
    let (role_token, mut rest) = match trimmed.find('[') {
        Some(open) => (trimmed[..open].trim(), &trimmed[open..]),
        None => (trimmed, ""),
    };
    let role = AriaRole::from_str(role_token)
        .ok_or_else(|| format!("unknown role in role selector: {role_token:?}"))?;
    let mut query = RoleQuery {
        role,
        name: None,
        exact: false,
        include_hidden: false,
    };
    while let Some(after) = rest.strip_prefix('[') {
        let Some(close) = after.find(']') else {
            return Err(format!("unterminated attribute in role selector: {body}"));
        };
        let attr = &after[..close];
        rest = &after[close + 1..];
        let Some((key, value)) = attr.split_once('=') else {
            return Err(format!("malformed role attribute: [{attr}]"));
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        match key.trim() {
            "name" => query.name = Some(value.to_string()),
            "exact" => query.exact = value == "true",
            "include-hidden" => query.include_hidden = value == "true",
            other => return Err(format!("unsupported role attribute: {other}")),
        }
    }
    Ok(query)
}

// ── Custom engines ──

/// Out-of-tree selector engines. Built-ins are dispatched through the closed
/// set of stage names; this trait is the extension seam for hosts. Engines
/// must be pure with respect to the DOM.
pub trait SelectorEngine {
    fn query_all(&self, doc: &Document, root: NodeId, body: &str) -> Vec<NodeId>;

    fn query(&self, doc: &Document, root: NodeId, body: &str) -> Option<NodeId> {
        self.query_all(doc, root, body).into_iter().next()
    }
}

/// Registry of custom engines. Registration is expected at startup;
/// re-registering a name (or shadowing a built-in) is refused.
#[derive(Default)]
pub struct EngineRegistry {
    engines: RefCell<HashMap<String, Rc<dyn SelectorEngine>>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, engine: Rc<dyn SelectorEngine>) -> Result<()> {
        if KNOWN_ENGINES.contains(&name) {
            bail!("selector engine {name:?} is built in");
        }
        let mut engines = self.engines.borrow_mut();
        if engines.contains_key(name) {
            bail!("selector engine {name:?} is already registered");
        }
        engines.insert(name.to_string(), engine);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.engines.borrow().contains_key(name)
    }

    fn get(&self, name: &str) -> Option<Rc<dyn SelectorEngine>> {
        self.engines.borrow().get(name).cloned()
    }
}

// ── Evaluation ──

/// Selector evaluation façade bundling the document with the caches and the
/// custom-engine registry.
pub struct Selectors<'a> {
    pub doc: &'a Document,
    pub aria: &'a AriaCaches,
    pub cache: &'a SelectorCaches,
    pub registry: &'a EngineRegistry,
}

impl<'a> Selectors<'a> {
    pub fn new(
        doc: &'a Document,
        aria: &'a AriaCaches,
        cache: &'a SelectorCaches,
        registry: &'a EngineRegistry,
    ) -> Self {
        Self {
            doc,
            aria,
            cache,
            registry,
        }
    }

    fn parse(&self, expr: &str) -> ParsedSelector {
        parse_selector_with(expr, &|name| {
            KNOWN_ENGINES.contains(&name) || self.registry.contains(name)
        })
    }

    fn cache_key(expr: &str, opts: QueryOptions) -> String {
        format!(
            "{expr}\u{1}pierce={}\u{1}visible={}",
            opts.pierce_shadow_dom, opts.visible_only
        )
    }

    /// First match in document order, or `None`.
    pub fn query(&self, root: NodeId, expr: &str, opts: QueryOptions) -> Option<NodeId> {
        let key = Self::cache_key(expr, opts);
        self.cache
            .query_or_insert_with(self.doc.doc_id(), root, &key, || {
                self.evaluate(root, expr, opts).into_iter().next()
            })
    }

    /// All matches, deduplicated, in document order.
    pub fn query_all(&self, root: NodeId, expr: &str, opts: QueryOptions) -> Vec<NodeId> {
        let key = Self::cache_key(expr, opts);
        self.cache
            .query_all_or_insert_with(self.doc.doc_id(), root, &key, || {
                self.evaluate(root, expr, opts)
            })
    }

    /// Whether `node` is among the matches of `expr` within its tree scope.
    pub fn matches(&self, node: NodeId, expr: &str) -> bool {
        self.cache
            .matches_or_insert_with(self.doc.doc_id(), node, expr, || {
                let scope = self.doc.tree_scope(node);
                self.evaluate(scope, expr, QueryOptions::default())
                    .contains(&node)
            })
    }

    fn evaluate(&self, root: NodeId, expr: &str, opts: QueryOptions) -> Vec<NodeId> {
        let parsed = self.parse(expr);
        if parsed.stages.is_empty() {
            return Vec::new();
        }
        let mut scope_roots = vec![root];
        if opts.pierce_shadow_dom {
            scope_roots.extend(self.doc.shadow_roots_under(root));
        }
        let mut candidates: Option<Vec<NodeId>> = None;
        for stage in &parsed.stages {
            candidates = Some(self.run_stage(&scope_roots, candidates, stage));
        }
        let mut out = candidates.unwrap_or_default();
        if opts.visible_only {
            out.retain(|&n| is_element_visible(self.doc, n));
        }
        self.doc.sort_document_order(&mut out);
        out
    }

    fn evaluate_sub(&self, roots: &[NodeId], expr: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        for &root in roots {
            out.extend(self.evaluate(root, expr, QueryOptions::default()));
        }
        self.doc.sort_document_order(&mut out);
        out
    }

    fn run_stage(
        &self,
        scope_roots: &[NodeId],
        prev: Option<Vec<NodeId>>,
        stage: &SelectorStage,
    ) -> Vec<NodeId> {
        let doc = self.doc;
        let roots: Vec<NodeId> = prev
            .clone()
            .unwrap_or_else(|| scope_roots.to_vec());
        match stage.engine.as_str() {
            "css" | "xpath" | "text" | "role" | "internal:label" => {
                let mut out = Vec::new();
                for &root in &roots {
                    out.extend(self.produce(root, stage));
                }
                doc.sort_document_order(&mut out);
                out
            }
            // Subtree filters keep the candidate itself; as a first stage
            // the query root is the candidate, so a root whose subtree
            // matches is returned as-is (asymmetric with CSS :has()).
            "internal:has" => roots
                .into_iter()
                .filter(|&c| !self.evaluate_sub(&[c], &stage.body).is_empty())
                .collect(),
            "internal:has-not" => roots
                .into_iter()
                .filter(|&c| self.evaluate_sub(&[c], &stage.body).is_empty())
                .collect(),
            "internal:has-text" => {
                let matcher = TextMatcher::parse(&stage.body);
                roots
                    .into_iter()
                    .filter(|&c| matcher.matches(&self.subtree_text(c)))
                    .collect()
            }
            "internal:has-not-text" => {
                let matcher = TextMatcher::parse(&stage.body);
                roots
                    .into_iter()
                    .filter(|&c| !matcher.matches(&self.subtree_text(c)))
                    .collect()
            }
            "internal:visible" => roots
                .into_iter()
                .filter(|&c| is_element_visible(doc, c))
                .collect(),
            "visible" => {
                let want = stage.body.trim() != "false";
                roots
                    .into_iter()
                    .filter(|&c| is_element_visible(doc, c) == want)
                    .collect()
            }
            "nth" => {
                let Ok(index) = stage.body.trim().parse::<i64>() else {
                    warn!(body = %stage.body, "nth selector takes an integer index");
                    return Vec::new();
                };
                let mut list = roots;
                doc.sort_document_order(&mut list);
                let resolved = if index < 0 {
                    list.len() as i64 + index
                } else {
                    index
                };
                usize::try_from(resolved)
                    .ok()
                    .and_then(|i| list.get(i).copied())
                    .map(|n| vec![n])
                    .unwrap_or_default()
            }
            "internal:and" => {
                let mut sets: Vec<Vec<NodeId>> = parse_compound_body(&stage.body)
                    .iter()
                    .map(|sub| self.evaluate_sub(scope_roots, sub))
                    .collect();
                if let Some(prev) = prev {
                    sets.insert(0, prev);
                }
                let Some(first) = sets.first().cloned() else {
                    return Vec::new();
                };
                first
                    .into_iter()
                    .filter(|n| sets[1..].iter().all(|set| set.contains(n)))
                    .collect()
            }
            "internal:or" => {
                let mut out = prev.unwrap_or_default();
                for sub in parse_compound_body(&stage.body) {
                    out.extend(self.evaluate_sub(scope_roots, &sub));
                }
                doc.sort_document_order(&mut out);
                out
            }
            "left-of" | "right-of" | "above" | "below" | "near" => {
                let Some(candidates) = prev else {
                    warn!(engine = %stage.engine, "layout selector requires a preceding stage");
                    return Vec::new();
                };
                let anchors = self.evaluate_sub(scope_roots, &stage.body);
                self.layout_filter(&stage.engine, candidates, &anchors)
            }
            name => {
                if let Some(engine) = self.registry.get(name) {
                    let mut out = Vec::new();
                    for &root in &roots {
                        out.extend(engine.query_all(doc, root, &stage.body));
                    }
                    doc.sort_document_order(&mut out);
                    out
                } else {
                    warn!(engine = name, "unknown selector engine");
                    Vec::new()
                }
            }
        }
    }

    fn produce(&self, root: NodeId, stage: &SelectorStage) -> Vec<NodeId> {
        let doc = self.doc;
        match stage.engine.as_str() {
            "css" => match css::parse(&stage.body) {
                Ok(list) => css::query_all(doc, root, &list),
                Err(err) => {
                    warn!(selector = %stage.body, %err, "css selector failed to parse");
                    Vec::new()
                }
            },
            "xpath" => match xpath::evaluate(doc, root, &stage.body) {
                Ok(nodes) => nodes,
                Err(err) => {
                    warn!(selector = %stage.body, %err, "xpath expression rejected");
                    Vec::new()
                }
            },
            "text" => {
                let matcher = TextMatcher::parse(&stage.body);
                doc.descendant_elements(root)
                    .into_iter()
                    .filter(|&n| matcher.matches(&self.direct_text(n)))
                    .collect()
            }
            "role" => match parse_role_body(&stage.body) {
                Ok(query) => self.query_role(root, &query),
                Err(err) => {
                    warn!(selector = %stage.body, %err, "role selector rejected");
                    Vec::new()
                }
            },
            "internal:label" => {
                let matcher = TextMatcher::parse(&stage.body);
                let mut out: Vec<NodeId> = doc
                    .descendant_elements(root)
                    .into_iter()
                    .filter(|&n| doc.tag_name(n).as_deref() == Some("label"))
                    .filter(|&n| matcher.matches(&element_text(doc, n, false)))
                    .filter_map(|label| aria::label_target(doc, label))
                    .collect();
                doc.sort_document_order(&mut out);
                out
            }
            _ => unreachable!("produce called for a non-producer engine"),
        }
    }

    fn query_role(&self, root: NodeId, query: &RoleQuery) -> Vec<NodeId> {
        let doc = self.doc;
        doc.descendant_elements(root)
            .into_iter()
            .filter(|&n| aria::get_aria_role(self.aria, doc, n) == Some(query.role))
            .filter(|&n| query.include_hidden || !aria::is_hidden_for_aria(self.aria, doc, n))
            .filter(|&n| match &query.name {
                Some(expected) => {
                    let name = aria::get_accessible_name(self.aria, doc, n, query.include_hidden);
                    if query.exact {
                        name == *expected
                    } else {
                        name.to_lowercase().contains(&expected.to_lowercase())
                    }
                }
                None => true,
            })
            .collect()
    }

    /// Direct text the `text=` engine matches: the element's immediate text
    /// children; for text entry elements, the live value or placeholder.
    fn direct_text(&self, node: NodeId) -> String {
        let doc = self.doc;
        if matches!(doc.tag_name(node).as_deref(), Some("input" | "textarea")) {
            if let Some(value) = doc.value(node) {
                if !value.is_empty() {
                    return value;
                }
            }
            return doc.attribute(node, "placeholder").unwrap_or_default();
        }
        let mut out = String::new();
        for child in doc.children(node) {
            if let Some(text) = doc.text_data(child) {
                out.push_str(&text);
                out.push(' ');
            }
        }
        out
    }

    fn subtree_text(&self, node: NodeId) -> String {
        self.cache
            .text_or_insert_with(self.doc.doc_id(), node, || {
                element_text(self.doc, node, false)
            })
    }

    fn layout_filter(
        &self,
        kind: &str,
        candidates: Vec<NodeId>,
        anchors: &[NodeId],
    ) -> Vec<NodeId> {
        let doc = self.doc;
        let mut scored: Vec<(f64, NodeId)> = candidates
            .into_iter()
            .filter_map(|c| {
                let rect = doc.bounding_client_rect(c);
                let best = anchors
                    .iter()
                    .filter(|&&a| a != c)
                    .filter_map(|&a| {
                        layout_score(kind, rect, doc.bounding_client_rect(a))
                    })
                    .fold(None::<f64>, |acc, s| {
                        Some(acc.map_or(s, |best| best.min(s)))
                    });
                best.map(|score| (score, c))
            })
            .collect();
        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| doc.compare_document_order(a.1, b.1))
        });
        scored.into_iter().map(|(_, n)| n).collect()
    }
}

const NEAR_DISTANCE: f64 = 50.0;

fn layout_score(kind: &str, candidate: crate::dom::Rect, anchor: crate::dom::Rect) -> Option<f64> {
    if candidate.is_empty() || anchor.is_empty() {
        return None;
    }
    let cross_y = (candidate.center().y - anchor.center().y).abs();
    let cross_x = (candidate.center().x - anchor.center().x).abs();
    match kind {
        "left-of" => {
            let gap = anchor.x - candidate.right();
            (gap >= 0.0).then_some(gap + cross_y)
        }
        "right-of" => {
            let gap = candidate.x - anchor.right();
            (gap >= 0.0).then_some(gap + cross_y)
        }
        "above" => {
            let gap = anchor.y - candidate.bottom();
            (gap >= 0.0).then_some(gap + cross_x)
        }
        "below" => {
            let gap = candidate.y - anchor.bottom();
            (gap >= 0.0).then_some(gap + cross_x)
        }
        "near" => {
            let dx = (anchor.x - candidate.right()).max(candidate.x - anchor.right()).max(0.0);
            let dy = (anchor.y - candidate.bottom()).max(candidate.y - anchor.bottom()).max(0.0);
            let distance = (dx * dx + dy * dy).sqrt();
            (distance <= NEAR_DISTANCE).then_some(distance)
        }
        _ => None,
    }
}
