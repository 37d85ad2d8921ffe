//! Subset XPath evaluator backing the `xpath` selector engine: absolute and
//! relative location paths, `//` descent, `*` and name node tests, and the
//! predicate forms automation selectors lean on (position, `last()`,
//! attribute existence/equality, `text()` equality and `contains(…)`).
//! Expressions outside the subset are parse errors the engine surfaces as
//! "no match" with a warning.

use crate::dom::{Document, NodeId};

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Any,
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Position(usize),
    Last,
    HasAttr(String),
    AttrEquals(String, String),
    AttrContains(String, String),
    TextEquals(String),
    TextContains(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    /// True when the step was introduced by `//`.
    descendant: bool,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
struct Path {
    absolute: bool,
    steps: Vec<Step>,
}

/// Evaluate an XPath expression. Absolute paths start at the document root
/// regardless of `root`; relative paths start at `root`. Only element
/// results are returned, in document order without duplicates.
pub fn evaluate(doc: &Document, root: NodeId, expr: &str) -> Result<Vec<NodeId>, String> {
    let path = parse(expr)?;
    let start = if path.absolute { doc.root() } else { root };
    let mut contexts = vec![start];
    for step in &path.steps {
        let mut next = Vec::new();
        for &ctx in &contexts {
            next.extend(apply_step(doc, ctx, step));
        }
        doc.sort_document_order(&mut next);
        contexts = next;
    }
    contexts.retain(|&n| doc.is_element(n));
    Ok(contexts)
}

fn apply_step(doc: &Document, ctx: NodeId, step: &Step) -> Vec<NodeId> {
    let pool: Vec<NodeId> = if step.descendant {
        doc.descendants(ctx)
    } else {
        doc.children(ctx)
    };
    let mut matched: Vec<NodeId> = pool
        .into_iter()
        .filter(|&n| test_matches(doc, n, &step.test))
        .collect();
    for predicate in &step.predicates {
        let len = matched.len();
        matched = matched
            .into_iter()
            .enumerate()
            .filter(|(i, n)| predicate_matches(doc, *n, predicate, i + 1, len))
            .map(|(_, n)| n)
            .collect();
    }
    matched
}

fn test_matches(doc: &Document, node: NodeId, test: &NodeTest) -> bool {
    match test {
        NodeTest::Any => doc.is_element(node),
        NodeTest::Name(name) => doc.tag_name(node).as_deref() == Some(name.as_str()),
    }
}

fn predicate_matches(
    doc: &Document,
    node: NodeId,
    predicate: &Predicate,
    position: usize,
    len: usize,
) -> bool {
    match predicate {
        Predicate::Position(n) => position == *n,
        Predicate::Last => position == len,
        Predicate::HasAttr(name) => doc.has_attribute(node, name),
        Predicate::AttrEquals(name, value) => {
            doc.attribute(node, name).as_deref() == Some(value.as_str())
        }
        Predicate::AttrContains(name, value) => doc
            .attribute(node, name)
            .map(|v| v.contains(value.as_str()))
            .unwrap_or(false),
        Predicate::TextEquals(value) => {
            doc.text_content(node).split_whitespace().collect::<Vec<_>>().join(" ")
                == value.as_str()
        }
        Predicate::TextContains(value) => doc.text_content(node).contains(value.as_str()),
    }
}

// ── Parsing ──

fn parse(expr: &str) -> Result<Path, String> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err("empty xpath expression".into());
    }
    let mut rest = expr;
    let absolute = rest.starts_with('/');
    let mut steps = Vec::new();
    let mut descendant = false;
    if rest.starts_with("//") {
        descendant = true;
        rest = &rest[2..];
    } else if rest.starts_with('/') {
        rest = &rest[1..];
    } else {
        // A relative path like `button[1]` walks children of the context.
        descendant = false;
    }
    loop {
        let (step, remainder) = parse_step(rest, descendant)?;
        steps.push(step);
        rest = remainder;
        if rest.is_empty() {
            break;
        }
        if let Some(after) = rest.strip_prefix("//") {
            descendant = true;
            rest = after;
        } else if let Some(after) = rest.strip_prefix('/') {
            descendant = false;
            rest = after;
        } else {
            return Err(format!("unexpected input in xpath: {rest}"));
        }
    }
    Ok(Path { absolute, steps })
}

fn parse_step(input: &str, descendant: bool) -> Result<(Step, &str), String> {
    let mut rest = input;
    let test = if let Some(after) = rest.strip_prefix('*') {
        rest = after;
        NodeTest::Any
    } else {
        let end = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(format!("expected node test at: {input}"));
        }
        let name = rest[..end].to_ascii_lowercase();
        rest = &rest[end..];
        NodeTest::Name(name)
    };
    let mut predicates = Vec::new();
    while let Some(after) = rest.strip_prefix('[') {
        let close = find_matching_bracket(after)?;
        predicates.push(parse_predicate(after[..close].trim())?);
        rest = &after[close + 1..];
    }
    Ok((
        Step {
            descendant,
            test,
            predicates,
        },
        rest,
    ))
}

fn find_matching_bracket(input: &str) -> Result<usize, String> {
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err("unterminated predicate in xpath".into())
}

fn parse_quoted(input: &str) -> Result<String, String> {
    let input = input.trim();
    let Some(quote) = input.chars().next().filter(|c| *c == '"' || *c == '\'') else {
        return Err(format!("expected string literal in xpath: {input}"));
    };
    if input.len() < 2 || !input.ends_with(quote) {
        return Err(format!("unterminated string literal in xpath: {input}"));
    }
    Ok(input[1..input.len() - 1].to_string())
}

fn parse_predicate(body: &str) -> Result<Predicate, String> {
    if body == "last()" {
        return Ok(Predicate::Last);
    }
    if let Ok(n) = body.parse::<usize>() {
        if n == 0 {
            return Err("xpath positions are 1-based".into());
        }
        return Ok(Predicate::Position(n));
    }
    if let Some(args) = body
        .strip_prefix("contains(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let (lhs, rhs) = args
            .split_once(',')
            .ok_or_else(|| format!("malformed contains(): {body}"))?;
        let value = parse_quoted(rhs)?;
        let lhs = lhs.trim();
        if lhs == "text()" {
            return Ok(Predicate::TextContains(value));
        }
        if let Some(attr) = lhs.strip_prefix('@') {
            return Ok(Predicate::AttrContains(attr.to_ascii_lowercase(), value));
        }
        return Err(format!("unsupported contains() operand: {lhs}"));
    }
    if let Some((lhs, rhs)) = body.split_once('=') {
        let lhs = lhs.trim();
        let value = parse_quoted(rhs)?;
        if lhs == "text()" {
            return Ok(Predicate::TextEquals(value));
        }
        if let Some(attr) = lhs.strip_prefix('@') {
            return Ok(Predicate::AttrEquals(attr.to_ascii_lowercase(), value));
        }
        return Err(format!("unsupported comparison operand: {lhs}"));
    }
    if let Some(attr) = body.strip_prefix('@') {
        return Ok(Predicate::HasAttr(attr.to_ascii_lowercase()));
    }
    Err(format!("unsupported xpath predicate: {body}"))
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

    const SAMPLE: &str = "<div id=\"top\">\
        <button id=\"one\" class=\"primary\">Save</button>\
        <button id=\"two\">Cancel</button>\
        <section id=\"s\"><button id=\"three\">Deep</button></section>\
        </div>";

    #[test]
    fn descendant_and_child_steps() {
        let doc = Document::parse_fragment(SAMPLE);
        let all = evaluate(&doc, doc.root(), "//button").unwrap();
        assert_eq!(ids(&doc, &all), ["one", "two", "three"]);
        let top = doc.child_elements(doc.root())[0];
        let direct = evaluate(&doc, top, "button").unwrap();
        assert_eq!(ids(&doc, &direct), ["one", "two"]);
        let nested = evaluate(&doc, top, "section/button").unwrap();
        assert_eq!(ids(&doc, &nested), ["three"]);
    }

    #[test]
    fn absolute_path_ignores_context() {
        let doc = Document::parse_fragment(SAMPLE);
        let section = evaluate(&doc, doc.root(), "//section").unwrap()[0];
        let all = evaluate(&doc, section, "//div/button").unwrap();
        assert_eq!(ids(&doc, &all), ["one", "two"]);
    }

    #[test]
    fn positional_predicates() {
        let doc = Document::parse_fragment(SAMPLE);
        let first = evaluate(&doc, doc.root(), "//button[1]").unwrap();
        assert_eq!(ids(&doc, &first), ["one"]);
        let last = evaluate(&doc, doc.root(), "//button[last()]").unwrap();
        assert_eq!(ids(&doc, &last), ["three"]);
    }

    #[test]
    fn attribute_predicates() {
        let doc = Document::parse_fragment(SAMPLE);
        let q = |expr: &str| ids(&doc, &evaluate(&doc, doc.root(), expr).unwrap());
        assert_eq!(q("//button[@class]"), ["one"]);
        assert_eq!(q("//button[@class='primary']"), ["one"]);
        assert_eq!(q("//button[contains(@class, 'prim')]"), ["one"]);
        assert_eq!(q("//*[@id=\"s\"]"), ["s"]);
    }

    #[test]
    fn text_predicates() {
        let doc = Document::parse_fragment(SAMPLE);
        let q = |expr: &str| ids(&doc, &evaluate(&doc, doc.root(), expr).unwrap());
        assert_eq!(q("//button[text()='Cancel']"), ["two"]);
        assert_eq!(q("//button[contains(text(), 'Sav')]"), ["one"]);
    }

    #[test]
    fn rejects_out_of_subset_expressions() {
        let doc = Document::parse_fragment(SAMPLE);
        assert!(evaluate(&doc, doc.root(), "").is_err());
        assert!(evaluate(&doc, doc.root(), "//button[position() mod 2]").is_err());
        assert!(evaluate(&doc, doc.root(), "//button/..").is_err());
        assert!(evaluate(&doc, doc.root(), "//button[@a=unquoted]").is_err());
    }
}
