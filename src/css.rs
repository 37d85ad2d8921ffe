//! In-crate CSS selector matcher for the `css` engine. scraper's selectors
//! only run against its own parse tree, so the arena gets a dedicated
//! matcher covering the subset automation selectors use: type/universal/
//! id/class simple selectors, attribute operators, the four combinators,
//! selector lists, and the structural/state pseudo-classes below. Anything
//! else is a parse error the engine reports as "no match".

use crate::dom::{Document, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
    NextSibling,
    SubsequentSibling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrOp {
    Present,
    Equals(String),
    Includes(String),
    DashMatch(String),
    Prefix(String),
    Suffix(String),
    Substring(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttrSelector {
    pub name: String,
    pub op: AttrOp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pseudo {
    Not(SelectorList),
    FirstChild,
    LastChild,
    NthChild(usize),
    Checked,
    Disabled,
    Enabled,
    Empty,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compound {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrSelector>,
    pub pseudos: Vec<Pseudo>,
}

/// One complex selector: compounds with the combinator that links each to
/// the compound on its left. The first entry's combinator is unused.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexSelector {
    pub parts: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorList {
    pub selectors: Vec<ComplexSelector>,
}

pub fn parse(input: &str) -> Result<SelectorList, String> {
    let mut parser = Parser {
        chars: input.chars().collect(),
        pos: 0,
    };
    let list = parser.parse_selector_list()?;
    parser.skip_whitespace();
    if parser.pos != parser.chars.len() {
        return Err(format!("unexpected trailing input in selector: {input}"));
    }
    Ok(list)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
        self.pos != start
    }

    fn parse_selector_list(&mut self) -> Result<SelectorList, String> {
        let mut selectors = vec![self.parse_complex()?];
        loop {
            self.skip_whitespace();
            if self.peek() == Some(',') {
                self.bump();
                selectors.push(self.parse_complex()?);
            } else {
                break;
            }
        }
        Ok(SelectorList { selectors })
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector, String> {
        self.skip_whitespace();
        let mut parts = vec![(Combinator::Descendant, self.parse_compound()?)];
        loop {
            let had_space = self.skip_whitespace();
            let combinator = match self.peek() {
                Some('>') => {
                    self.bump();
                    Combinator::Child
                }
                Some('+') => {
                    self.bump();
                    Combinator::NextSibling
                }
                Some('~') => {
                    self.bump();
                    Combinator::SubsequentSibling
                }
                Some(c) if had_space && c != ',' && c != ')' => Combinator::Descendant,
                _ => break,
            };
            self.skip_whitespace();
            parts.push((combinator, self.parse_compound()?));
        }
        Ok(ComplexSelector { parts })
    }

    fn parse_identifier(&mut self) -> Result<String, String> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '\\' {
                if c == '\\' {
                    self.bump();
                    if let Some(escaped) = self.bump() {
                        out.push(escaped);
                    }
                    continue;
                }
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if out.is_empty() {
            Err(format!("expected identifier at offset {}", self.pos))
        } else {
            Ok(out)
        }
    }

    fn parse_compound(&mut self) -> Result<Compound, String> {
        let mut compound = Compound::default();
        let mut matched = false;
        if self.peek() == Some('*') {
            self.bump();
            matched = true;
        } else if matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_' || c == '\\') {
            compound.tag = Some(self.parse_identifier()?.to_ascii_lowercase());
            matched = true;
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.bump();
                    compound.id = Some(self.parse_identifier()?);
                    matched = true;
                }
                Some('.') => {
                    self.bump();
                    compound.classes.push(self.parse_identifier()?);
                    matched = true;
                }
                Some('[') => {
                    self.bump();
                    compound.attrs.push(self.parse_attribute()?);
                    matched = true;
                }
                Some(':') => {
                    self.bump();
                    compound.pseudos.push(self.parse_pseudo()?);
                    matched = true;
                }
                _ => break,
            }
        }
        if matched {
            Ok(compound)
        } else {
            Err(format!("expected selector at offset {}", self.pos))
        }
    }

    fn parse_attribute(&mut self) -> Result<AttrSelector, String> {
        self.skip_whitespace();
        let name = self.parse_identifier()?.to_ascii_lowercase();
        self.skip_whitespace();
        let op = match self.peek() {
            Some(']') => {
                self.bump();
                return Ok(AttrSelector {
                    name,
                    op: AttrOp::Present,
                });
            }
            Some('=') => {
                self.bump();
                AttrOp::Equals(String::new())
            }
            Some(c @ ('~' | '|' | '^' | '$' | '*')) => {
                self.bump();
                if self.bump() != Some('=') {
                    return Err("expected '=' in attribute operator".into());
                }
                match c {
                    '~' => AttrOp::Includes(String::new()),
                    '|' => AttrOp::DashMatch(String::new()),
                    '^' => AttrOp::Prefix(String::new()),
                    '$' => AttrOp::Suffix(String::new()),
                    _ => AttrOp::Substring(String::new()),
                }
            }
            _ => return Err("malformed attribute selector".into()),
        };
        self.skip_whitespace();
        let value = self.parse_attr_value()?;
        self.skip_whitespace();
        if self.bump() != Some(']') {
            return Err("unterminated attribute selector".into());
        }
        let op = match op {
            AttrOp::Equals(_) => AttrOp::Equals(value),
            AttrOp::Includes(_) => AttrOp::Includes(value),
            AttrOp::DashMatch(_) => AttrOp::DashMatch(value),
            AttrOp::Prefix(_) => AttrOp::Prefix(value),
            AttrOp::Suffix(_) => AttrOp::Suffix(value),
            AttrOp::Substring(_) => AttrOp::Substring(value),
            AttrOp::Present => AttrOp::Present,
        };
        Ok(AttrSelector { name, op })
    }

    fn parse_attr_value(&mut self) -> Result<String, String> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                let mut out = String::new();
                loop {
                    match self.bump() {
                        Some('\\') => {
                            if let Some(escaped) = self.bump() {
                                out.push(escaped);
                            }
                        }
                        Some(c) if c == quote => return Ok(out),
                        Some(c) => out.push(c),
                        None => return Err("unterminated string in selector".into()),
                    }
                }
            }
            _ => {
                let mut out = String::new();
                while let Some(c) = self.peek() {
                    if c == ']' || c.is_whitespace() {
                        break;
                    }
                    out.push(c);
                    self.bump();
                }
                Ok(out)
            }
        }
    }

    fn parse_pseudo(&mut self) -> Result<Pseudo, String> {
        let name = self.parse_identifier()?.to_ascii_lowercase();
        match name.as_str() {
            "first-child" => Ok(Pseudo::FirstChild),
            "last-child" => Ok(Pseudo::LastChild),
            "checked" => Ok(Pseudo::Checked),
            "disabled" => Ok(Pseudo::Disabled),
            "enabled" => Ok(Pseudo::Enabled),
            "empty" => Ok(Pseudo::Empty),
            "not" => {
                if self.bump() != Some('(') {
                    return Err(":not requires parentheses".into());
                }
                let inner = self.parse_selector_list()?;
                self.skip_whitespace();
                if self.bump() != Some(')') {
                    return Err("unterminated :not()".into());
                }
                Ok(Pseudo::Not(inner))
            }
            "nth-child" => {
                if self.bump() != Some('(') {
                    return Err(":nth-child requires parentheses".into());
                }
                self.skip_whitespace();
                let mut digits = String::new();
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    digits.push(self.bump().unwrap());
                }
                self.skip_whitespace();
                if self.bump() != Some(')') {
                    return Err("unterminated :nth-child()".into());
                }
                let n: usize = digits
                    .parse()
                    .map_err(|_| ":nth-child supports integer arguments only".to_string())?;
                Ok(Pseudo::NthChild(n))
            }
            other => Err(format!("unsupported pseudo-class :{other}")),
        }
    }
}

// ── Matching ──

fn attr_matches(doc: &Document, node: NodeId, attr: &AttrSelector) -> bool {
    let Some(value) = doc.attribute(node, &attr.name) else {
        return false;
    };
    match &attr.op {
        AttrOp::Present => true,
        AttrOp::Equals(expected) => value == *expected,
        AttrOp::Includes(expected) => value.split_whitespace().any(|part| part == expected),
        AttrOp::DashMatch(expected) => {
            value == *expected || value.starts_with(&format!("{expected}-"))
        }
        AttrOp::Prefix(expected) => !expected.is_empty() && value.starts_with(expected.as_str()),
        AttrOp::Suffix(expected) => !expected.is_empty() && value.ends_with(expected.as_str()),
        AttrOp::Substring(expected) => !expected.is_empty() && value.contains(expected.as_str()),
    }
}

fn element_index(doc: &Document, node: NodeId) -> Option<(usize, usize)> {
    let parent = doc.parent(node)?;
    let siblings = doc.child_elements(parent);
    let index = siblings.iter().position(|&s| s == node)?;
    Some((index, siblings.len()))
}

fn pseudo_matches(doc: &Document, node: NodeId, pseudo: &Pseudo) -> bool {
    match pseudo {
        Pseudo::Not(list) => !matches_list(doc, node, list),
        Pseudo::FirstChild => element_index(doc, node).map(|(i, _)| i == 0).unwrap_or(false),
        Pseudo::LastChild => element_index(doc, node)
            .map(|(i, len)| i + 1 == len)
            .unwrap_or(false),
        Pseudo::NthChild(n) => element_index(doc, node)
            .map(|(i, _)| i + 1 == *n)
            .unwrap_or(false),
        Pseudo::Checked => doc.is_checked(node),
        Pseudo::Disabled => doc.has_attribute(node, "disabled"),
        Pseudo::Enabled => !doc.has_attribute(node, "disabled"),
        Pseudo::Empty => doc.children(node).iter().all(|&c| {
            doc.text_data(c)
                .map(|t| t.trim().is_empty())
                .unwrap_or(false)
        }),
    }
}

fn compound_matches(doc: &Document, node: NodeId, compound: &Compound) -> bool {
    if !doc.is_element(node) {
        return false;
    }
    if let Some(tag) = &compound.tag {
        if doc.tag_name(node).as_deref() != Some(tag.as_str()) {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if doc.id_attr(node).as_deref() != Some(id.as_str()) {
            return false;
        }
    }
    if !compound.classes.is_empty() {
        let classes = doc.classes(node);
        if !compound.classes.iter().all(|c| classes.contains(c)) {
            return false;
        }
    }
    if !compound.attrs.iter().all(|a| attr_matches(doc, node, a)) {
        return false;
    }
    compound.pseudos.iter().all(|p| pseudo_matches(doc, node, p))
}

fn complex_matches_at(doc: &Document, node: NodeId, parts: &[(Combinator, Compound)]) -> bool {
    let (combinator, compound) = parts.last().expect("complex selector is never empty");
    if !compound_matches(doc, node, compound) {
        return false;
    }
    let rest = &parts[..parts.len() - 1];
    if rest.is_empty() {
        return true;
    }
    match combinator {
        Combinator::Descendant => {
            let mut current = doc.parent_element(node);
            while let Some(ancestor) = current {
                if complex_matches_at(doc, ancestor, rest) {
                    return true;
                }
                current = doc.parent_element(ancestor);
            }
            false
        }
        Combinator::Child => doc
            .parent_element(node)
            .map(|p| complex_matches_at(doc, p, rest))
            .unwrap_or(false),
        Combinator::NextSibling => preceding_siblings(doc, node)
            .last()
            .map(|&s| complex_matches_at(doc, s, rest))
            .unwrap_or(false),
        Combinator::SubsequentSibling => preceding_siblings(doc, node)
            .iter()
            .any(|&s| complex_matches_at(doc, s, rest)),
    }
}

fn preceding_siblings(doc: &Document, node: NodeId) -> Vec<NodeId> {
    let Some(parent) = doc.parent(node) else {
        return Vec::new();
    };
    let siblings = doc.child_elements(parent);
    match siblings.iter().position(|&s| s == node) {
        Some(index) => siblings[..index].to_vec(),
        None => Vec::new(),
    }
}

/// Whether `node` matches any selector in the list, evaluated against the
/// whole tree (the standard `Element.matches` semantics).
pub fn matches_list(doc: &Document, node: NodeId, list: &SelectorList) -> bool {
    list.selectors
        .iter()
        .any(|complex| complex_matches_at(doc, node, &complex.parts))
}

/// All element descendants of `root` matching the list, in document order
/// (the standard `querySelectorAll` scoping: selectors see the whole tree,
/// results are restricted to descendants).
pub fn query_all(doc: &Document, root: NodeId, list: &SelectorList) -> Vec<NodeId> {
    doc.descendant_elements(root)
        .into_iter()
        .filter(|&n| matches_list(doc, n, list))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(doc: &Document, nodes: &[NodeId]) -> Vec<String> {
        nodes
            .iter()
            .map(|&n| doc.id_attr(n).unwrap_or_default())
            .collect()
    }

    #[test]
    fn tag_id_class_selectors() {
        let doc = Document::parse_fragment(
            "<div id=\"a\" class=\"card wide\"></div><span id=\"b\" class=\"card\"></span>",
        );
        let all = query_all(&doc, doc.root(), &parse("div").unwrap());
        assert_eq!(ids(&doc, &all), ["a"]);
        let all = query_all(&doc, doc.root(), &parse(".card").unwrap());
        assert_eq!(ids(&doc, &all), ["a", "b"]);
        let all = query_all(&doc, doc.root(), &parse("span.card").unwrap());
        assert_eq!(ids(&doc, &all), ["b"]);
        let all = query_all(&doc, doc.root(), &parse("#a.wide").unwrap());
        assert_eq!(ids(&doc, &all), ["a"]);
    }

    #[test]
    fn attribute_operators() {
        let doc = Document::parse_fragment(
            "<input id=\"a\" type=\"text\" data-kind=\"user-name\">\
             <input id=\"b\" type=\"password\" class=\"big bold\">",
        );
        let q = |sel: &str| ids(&doc, &query_all(&doc, doc.root(), &parse(sel).unwrap()));
        assert_eq!(q("[type]"), ["a", "b"]);
        assert_eq!(q("[type=password]"), ["b"]);
        assert_eq!(q("[type=\"password\"]"), ["b"]);
        assert_eq!(q("[class~=bold]"), ["b"]);
        assert_eq!(q("[data-kind|=user]"), ["a"]);
        assert_eq!(q("[data-kind^=user]"), ["a"]);
        assert_eq!(q("[data-kind$=name]"), ["a"]);
        assert_eq!(q("[data-kind*=r-n]"), ["a"]);
    }

    #[test]
    fn combinators() {
        let doc = Document::parse_fragment(
            "<div id=\"outer\"><p id=\"p1\"></p><span id=\"s1\"></span>\
             <span id=\"s2\"><b id=\"deep\"></b></span></div>",
        );
        let q = |sel: &str| ids(&doc, &query_all(&doc, doc.root(), &parse(sel).unwrap()));
        assert_eq!(q("div b"), ["deep"]);
        assert_eq!(q("div > b"), Vec::<String>::new());
        assert_eq!(q("span > b"), ["deep"]);
        assert_eq!(q("p + span"), ["s1"]);
        assert_eq!(q("p ~ span"), ["s1", "s2"]);
    }

    #[test]
    fn selector_lists_and_not() {
        let doc = Document::parse_fragment(
            "<button id=\"a\"></button><input id=\"b\"><a id=\"c\" href=\"/\"></a>",
        );
        let q = |sel: &str| ids(&doc, &query_all(&doc, doc.root(), &parse(sel).unwrap()));
        assert_eq!(q("button, a"), ["a", "c"]);
        assert_eq!(q("*:not(input)"), ["a", "c"]);
        assert_eq!(q("input:not([type])"), ["b"]);
    }

    #[test]
    fn structural_and_state_pseudos() {
        let doc = Document::parse_fragment(
            "<ul><li id=\"one\"></li><li id=\"two\"></li><li id=\"three\"></li></ul>\
             <input id=\"c\" type=\"checkbox\" checked><input id=\"d\" disabled>",
        );
        let q = |sel: &str| ids(&doc, &query_all(&doc, doc.root(), &parse(sel).unwrap()));
        assert_eq!(q("li:first-child"), ["one"]);
        assert_eq!(q("li:last-child"), ["three"]);
        assert_eq!(q("li:nth-child(2)"), ["two"]);
        assert_eq!(q("input:checked"), ["c"]);
        assert_eq!(q("input:disabled"), ["d"]);
        assert_eq!(q("input:enabled"), ["c"]);
    }

    #[test]
    fn query_restricted_to_subtree_but_matching_sees_whole_tree() {
        let doc = Document::parse_fragment(
            "<div id=\"scope\"><span id=\"inner\"></span></div><span id=\"outside\"></span>",
        );
        let scope = doc.child_elements(doc.root())[0];
        let all = query_all(&doc, scope, &parse("span").unwrap());
        assert_eq!(ids(&doc, &all), ["inner"]);
        // Matching may climb above the query root.
        let all = query_all(&doc, scope, &parse("div span").unwrap());
        assert_eq!(ids(&doc, &all), ["inner"]);
    }

    #[test]
    fn parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("div[").is_err());
        assert!(parse("p:hover").is_err());
        assert!(parse("div >").is_err());
        assert!(parse("[a=\"unterminated]").is_err());
    }
}
