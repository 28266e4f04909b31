//! XML micro-parser.
//!
//! A deliberately small element/attribute navigator for configuration
//! documents: elements, attributes, comments and declarations are understood,
//! text content is ignored. The bootstrap pipeline only depends on the
//! scope/attribute navigation contract exposed by [`Document`] and [`Cursor`].

use crate::error::{ChassisError, Result};

#[derive(Debug, Clone)]
pub struct Element {
    pub name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
}

impl Element {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// A parsed configuration document.
#[derive(Debug, Clone)]
pub struct Document {
    root: Element,
}

impl Document {
    /// Parse `input`, failing on malformed or unbalanced markup.
    pub fn parse(input: &str) -> Result<Document> {
        let mut stack = vec![Element::new("")];
        let mut rest = input;

        while let Some(open) = rest.find('<') {
            rest = &rest[open..];
            if let Some(tail) = rest.strip_prefix("<!--") {
                let end = tail
                    .find("-->")
                    .ok_or_else(|| ChassisError::config_invalid("unterminated comment"))?;
                rest = &tail[end + 3..];
            } else if let Some(tail) = rest.strip_prefix("<?") {
                let end = tail
                    .find("?>")
                    .ok_or_else(|| ChassisError::config_invalid("unterminated declaration"))?;
                rest = &tail[end + 2..];
            } else if let Some(tail) = rest.strip_prefix("<!") {
                let end = tail
                    .find('>')
                    .ok_or_else(|| ChassisError::config_invalid("unterminated markup"))?;
                rest = &tail[end + 1..];
            } else if let Some(tail) = rest.strip_prefix("</") {
                let end = tail
                    .find('>')
                    .ok_or_else(|| ChassisError::config_invalid("unterminated closing tag"))?;
                let name = tail[..end].trim();
                let closed = stack
                    .pop()
                    .filter(|element| element.name == name)
                    .ok_or_else(|| {
                        ChassisError::config_invalid(format!("mismatched closing tag </{name}>"))
                    })?;
                let parent = stack
                    .last_mut()
                    .ok_or_else(|| ChassisError::config_invalid("closing tag at document root"))?;
                parent.children.push(closed);
                rest = &tail[end + 1..];
            } else {
                let tail = &rest[1..];
                let end = tail
                    .find('>')
                    .ok_or_else(|| ChassisError::config_invalid("unterminated tag"))?;
                let body = &tail[..end];
                let (body, self_closing) = match body.strip_suffix('/') {
                    Some(trimmed) => (trimmed, true),
                    None => (body, false),
                };
                let element = parse_tag(body)?;
                if self_closing {
                    stack
                        .last_mut()
                        .expect("element stack never empties before the synthetic root")
                        .children
                        .push(element);
                } else {
                    stack.push(element);
                }
                rest = &tail[end + 1..];
            }
        }

        if stack.len() != 1 {
            return Err(ChassisError::config_invalid(format!(
                "unclosed element <{}>",
                stack.last().map(|e| e.name.as_str()).unwrap_or("")
            )));
        }
        let root = stack.pop().expect("synthetic root");
        if root.children.is_empty() {
            return Err(ChassisError::config_invalid("document has no root element"));
        }
        Ok(Document { root })
    }

    /// Position on the first element named `name`, anywhere in the document.
    pub fn scope(&self, name: &str) -> Cursor<'_> {
        Cursor {
            node: find_named(&self.root, name),
        }
    }

    /// The document's root element.
    pub fn root(&self) -> Cursor<'_> {
        Cursor {
            node: self.root.children.first(),
        }
    }
}

fn parse_tag(body: &str) -> Result<Element> {
    let body = body.trim();
    let name_end = body
        .find(|c: char| c.is_whitespace())
        .unwrap_or(body.len());
    let name = &body[..name_end];
    if name.is_empty() {
        return Err(ChassisError::config_invalid("tag with no name"));
    }
    let mut element = Element::new(name);

    let mut rest = body[name_end..].trim_start();
    while !rest.is_empty() {
        let attr_end = rest
            .find(|c: char| c.is_whitespace() || c == '=')
            .unwrap_or(rest.len());
        let attr_name = &rest[..attr_end];
        rest = rest[attr_end..].trim_start();
        let value = if let Some(tail) = rest.strip_prefix('=') {
            let tail = tail.trim_start();
            let quote = tail
                .chars()
                .next()
                .filter(|&q| q == '"' || q == '\'')
                .ok_or_else(|| {
                    ChassisError::config_invalid(format!("unquoted value for '{attr_name}'"))
                })?;
            let inner = &tail[1..];
            let close = inner.find(quote).ok_or_else(|| {
                ChassisError::config_invalid(format!("unterminated value for '{attr_name}'"))
            })?;
            rest = inner[close + 1..].trim_start();
            inner[..close].to_string()
        } else {
            String::new()
        };
        element.attrs.push((attr_name.to_string(), value));
    }
    Ok(element)
}

fn find_named<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
    for child in &element.children {
        if child.name == name {
            return Some(child);
        }
        if let Some(found) = find_named(child, name) {
            return Some(found);
        }
    }
    None
}

/// Navigation handle over an element scope. A null cursor answers `None` and
/// `false` to every query, so missing optional nodes read naturally.
#[derive(Clone, Copy)]
pub struct Cursor<'a> {
    node: Option<&'a Element>,
}

impl<'a> Cursor<'a> {
    pub fn is_null(&self) -> bool {
        self.node.is_none()
    }

    pub fn name(&self) -> Option<&'a str> {
        self.node.map(|n| n.name.as_str())
    }

    /// Position on the first descendant element named `name`.
    pub fn scope(&self, name: &str) -> Cursor<'a> {
        Cursor {
            node: self.node.and_then(|n| find_named(n, name)),
        }
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.node.and_then(|n| {
            n.attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        })
    }

    /// Integer attribute value; `None` when absent or not numeric.
    pub fn attr_int(&self, name: &str) -> Option<i64> {
        self.attr(name).and_then(|value| value.trim().parse().ok())
    }

    /// True when the attribute carries an affirmative value.
    pub fn is_asserted(&self, name: &str) -> bool {
        self.attr(name)
            .map(|value| {
                value.eq_ignore_ascii_case("true")
                    || value.eq_ignore_ascii_case("yes")
                    || value.eq_ignore_ascii_case("on")
                    || value == "1"
            })
            .unwrap_or(false)
    }

    /// Child elements of this scope.
    pub fn children(&self) -> impl Iterator<Item = Cursor<'a>> {
        self.node
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|child| Cursor { node: Some(child) })
    }
}
