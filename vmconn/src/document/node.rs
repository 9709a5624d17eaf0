//! Field access on document nodes.
//!
//! Nodes keep their fields as child elements with text content, e.g.
//! `<Name>web1</Name>`.

use xmltree::{Element, XMLNode};

/// Trimmed text of the named field, `None` if absent or empty.
pub fn field(node: &Element, name: &str) -> Option<String> {
    node.get_child(name)
        .and_then(|child| child.get_text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Replace the text of the named field, creating the field if missing.
pub fn set_field(node: &mut Element, name: &str, value: &str) {
    if let Some(child) = node.get_mut_child(name) {
        child.children = vec![XMLNode::Text(value.to_string())];
        return;
    }
    let mut child = Element::new(name);
    child.children.push(XMLNode::Text(value.to_string()));
    node.children.push(XMLNode::Element(child));
}

/// Direct child elements of `parent` with the given tag.
pub fn children_tagged<'a>(
    parent: &'a Element,
    tag: &'a str,
) -> impl Iterator<Item = &'a Element> {
    parent
        .children
        .iter()
        .filter_map(XMLNode::as_element)
        .filter(move |el| el.name == tag)
}
