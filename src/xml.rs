//! Accessors over the parsed `roxmltree` tree.
//!
//! The tree is read-only and typed: every node is an element, text, comment
//! or processing instruction, and attributes hang off elements. Lookups here
//! always match on the expanded name (namespace URI + local name), never on
//! the prefix used in the document.

use roxmltree::{Document, Node};

pub const NS_PROTOCOL: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
pub const NS_ASSERTION: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
pub const NS_METADATA: &str = "urn:oasis:names:tc:SAML:2.0:metadata";
pub const NS_XMLDSIG: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const NS_EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// Parse with DTDs disallowed, so no entity declarations are ever expanded.
pub fn parse(input: &str) -> Result<Document<'_>, roxmltree::Error> {
    Document::parse(input)
}

fn is_named(node: &Node<'_, '_>, namespace: &str, name: &str) -> bool {
    node.is_element() && node.has_tag_name((namespace, name))
}

pub fn children<'a, 'input: 'a, 'n>(
    node: Node<'a, 'input>,
    namespace: &'n str,
    name: &'n str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'n
where
    'a: 'n,
{
    node.children()
        .filter(move |n| is_named(n, namespace, name))
}

/// First element child with the given expanded name.
pub fn child<'a, 'input>(
    node: Node<'a, 'input>,
    namespace: &str,
    name: &str,
) -> Option<Node<'a, 'input>> {
    node.children().find(|n| is_named(n, namespace, name))
}

/// The element child with the given expanded name, if there is exactly one.
pub fn single_child<'a, 'input>(
    node: Node<'a, 'input>,
    namespace: &str,
    name: &str,
) -> Option<Node<'a, 'input>> {
    let mut found = node.children().filter(|n| is_named(n, namespace, name));
    let first = found.next()?;
    match found.next() {
        Some(_) => None,
        None => Some(first),
    }
}

/// Follow a path of element children in a single namespace.
pub fn descend<'a, 'input>(
    node: Node<'a, 'input>,
    namespace: &str,
    path: &[&str],
) -> Option<Node<'a, 'input>> {
    path.iter()
        .try_fold(node, |current, &name| child(current, namespace, name))
}

/// Concatenated text of the direct text children, untrimmed.
pub fn text(node: Node<'_, '_>) -> String {
    node.children()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect()
}
