//! Exclusive XML Canonicalization 1.0, without comments.
//!
//! Operates on an element subtree of a parsed document. A namespace
//! declaration is emitted on an element only when the element or one of its
//! attributes visibly uses the prefix and the nearest output ancestor did not
//! already emit the same binding. Prefixes listed in an `InclusiveNamespaces`
//! `PrefixList` are treated as always used.

use roxmltree::{Attribute, Node, NodeId, NodeType};

/// The `xml` prefix is bound by definition and never declared.
const XML_PREFIX: &str = "xml";

#[derive(Debug, Default, Clone)]
pub struct ExclusiveCanonicalizer {
    excluded: Option<NodeId>,
    inclusive_prefixes: Vec<String>,
}

impl ExclusiveCanonicalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave `node` and its subtree out of the output (enveloped signature).
    pub fn exclude(self, node: NodeId) -> Self {
        ExclusiveCanonicalizer {
            excluded: Some(node),
            ..self
        }
    }

    /// Whitespace-separated prefix list; `#default` names the default namespace.
    pub fn inclusive_prefixes(self, prefix_list: &str) -> Self {
        let inclusive_prefixes = prefix_list
            .split_whitespace()
            .map(|p| match p {
                "#default" => String::new(),
                other => other.to_string(),
            })
            .collect();
        ExclusiveCanonicalizer {
            inclusive_prefixes,
            ..self
        }
    }

    pub fn canonicalize(&self, node: Node<'_, '_>) -> String {
        let mut out = String::new();
        match node.node_type() {
            NodeType::Root => {
                for child in node.children().filter(Node::is_element) {
                    self.write_element(child, &[], &mut out);
                }
            }
            NodeType::Element => self.write_element(node, &[], &mut out),
            _ => self.write_node(node, &[], &mut out),
        }
        out
    }

    fn write_node<'a>(
        &self,
        node: Node<'a, '_>,
        rendered: &[(&'a str, &'a str)],
        out: &mut String,
    ) {
        match node.node_type() {
            NodeType::Element => self.write_element(node, rendered, out),
            NodeType::Text => escape_text(node.text().unwrap_or_default(), out),
            NodeType::PI => {
                if let Some(pi) = node.pi() {
                    out.push_str("<?");
                    out.push_str(pi.target);
                    if let Some(value) = pi.value {
                        out.push(' ');
                        out.push_str(value);
                    }
                    out.push_str("?>");
                }
            }
            NodeType::Comment | NodeType::Root => {}
        }
    }

    fn write_element<'a>(
        &self,
        node: Node<'a, '_>,
        rendered: &[(&'a str, &'a str)],
        out: &mut String,
    ) {
        if self.excluded == Some(node.id()) {
            return;
        }

        let qname = element_qname(node);
        let mut used: Vec<&str> = vec![prefix_of(qname)];
        for attr in node.attributes() {
            let prefix = prefix_of(attribute_qname(node, &attr));
            if !prefix.is_empty() && prefix != XML_PREFIX && !used.contains(&prefix) {
                used.push(prefix);
            }
        }
        for prefix in &self.inclusive_prefixes {
            if !used.contains(&prefix.as_str()) {
                used.push(prefix.as_str());
            }
        }

        let mut declarations: Vec<(&'a str, &'a str)> = Vec::new();
        for prefix in used {
            let Some((prefix, uri)) = in_scope_binding(node, prefix) else {
                continue;
            };
            let current = rendered
                .iter()
                .rev()
                .find(|(p, _)| *p == prefix)
                .map_or("", |(_, u)| *u);
            if uri != current {
                declarations.push((prefix, uri));
            }
        }
        declarations.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let mut attributes: Vec<Attribute<'a, '_>> = node.attributes().collect();
        attributes.sort_by_key(|a| (a.namespace().unwrap_or(""), a.name()));

        out.push('<');
        out.push_str(qname);
        for (prefix, uri) in &declarations {
            if prefix.is_empty() {
                out.push_str(" xmlns=\"");
            } else {
                out.push_str(" xmlns:");
                out.push_str(prefix);
                out.push_str("=\"");
            }
            escape_attribute(uri, out);
            out.push('"');
        }
        for attr in &attributes {
            out.push(' ');
            out.push_str(attribute_qname(node, attr));
            out.push_str("=\"");
            escape_attribute(attr.value(), out);
            out.push('"');
        }
        out.push('>');

        let mut scope = rendered.to_vec();
        scope.extend(declarations);
        for child in node.children() {
            self.write_node(child, &scope, out);
        }

        out.push_str("</");
        out.push_str(qname);
        out.push('>');
    }
}

/// The element's qualified name exactly as written in the source.
fn element_qname<'input>(node: Node<'_, 'input>) -> &'input str {
    let input = node.document().input_text();
    let rest = &input[node.range().start + 1..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(rest.len());
    &rest[..end]
}

fn attribute_qname<'input>(node: Node<'_, 'input>, attr: &Attribute<'_, 'input>) -> &'input str {
    &node.document().input_text()[attr.range_qname()]
}

fn prefix_of(qname: &str) -> &str {
    qname.split_once(':').map_or("", |(prefix, _)| prefix)
}

/// The binding of `prefix` in scope at `node`, borrowed from the document.
/// An unbound default namespace is reported as the empty URI.
fn in_scope_binding<'a>(node: Node<'a, '_>, prefix: &str) -> Option<(&'a str, &'a str)> {
    match node.namespaces().find(|ns| ns.name().unwrap_or("") == prefix) {
        Some(ns) => Some((ns.name().unwrap_or(""), ns.uri())),
        None if prefix.is_empty() => Some(("", "")),
        None => None,
    }
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}
