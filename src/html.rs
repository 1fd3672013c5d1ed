//! Attribute edits on a parsed document and its serialization
//!
//! Edits go straight into the scraper tree, so every other attribute,
//! namespace prefix and node is written back by html5ever exactly as
//! it was parsed. html5ever only writes the doctype name; the public
//! and system identifiers are restored here because they decide the
//! rendering mode of the page.

use ego_tree::NodeId;
use html5ever::serialize::{
    AttrRef, HtmlSerializer, Serialize, SerializeOpts, Serializer, TraversalScope,
};
use html5ever::{LocalName, QualName, namespace_url, ns};
use scraper::node::Doctype;
use scraper::{Html, Node};
use std::io::{self, Write};
use tracing::warn;

/// Set attribute `name` of the element `id` to `value`, adding it when
/// missing. Non-element nodes are left alone.
pub fn set_attr(doc: &mut Html, id: NodeId, name: &str, value: &str) {
    if let Some(mut node) = doc.tree.get_mut(id)
        && let Node::Element(element) = node.value()
    {
        element
            .attrs
            .insert(QualName::new(None, ns!(), LocalName::from(name)), value.into());
    }
}

/// Serialize the whole document.
#[must_use]
pub fn to_html(doc: &Html) -> String {
    let opts = SerializeOpts {
        scripting_enabled: false,
        traversal_scope: TraversalScope::IncludeNode,
        create_missing_parent: false,
    };
    let mut serializer = FullDoctype {
        doctype: doc
            .tree
            .root()
            .children()
            .find_map(|child| child.value().as_doctype().map(doctype_declaration)),
        inner: HtmlSerializer::new(Vec::new(), opts),
    };

    match doc.serialize(&mut serializer, TraversalScope::IncludeNode) {
        Ok(()) => String::from_utf8_lossy(&serializer.inner.writer).into_owned(),
        Err(e) => {
            warn!(error = %e, "Serialization failed, falling back to the plain serializer");
            doc.html()
        }
    }
}

fn doctype_declaration(doctype: &Doctype) -> String {
    let name = doctype.name();
    match (doctype.public_id(), doctype.system_id()) {
        ("", "") => format!("<!DOCTYPE {name}>"),
        ("", system) => format!("<!DOCTYPE {name} SYSTEM {}>", quoted(system)),
        (public, "") => format!("<!DOCTYPE {name} PUBLIC {}>", quoted(public)),
        (public, system) => {
            format!("<!DOCTYPE {name} PUBLIC {} {}>", quoted(public), quoted(system))
        }
    }
}

fn quoted(id: &str) -> String {
    if id.contains('"') {
        format!("'{id}'")
    } else {
        format!("\"{id}\"")
    }
}

/// html5ever's serializer with the doctype written in full.
struct FullDoctype<W: Write> {
    doctype: Option<String>,
    inner: HtmlSerializer<W>,
}

impl<W: Write> Serializer for FullDoctype<W> {
    fn start_elem<'a, AttrIter>(&mut self, name: QualName, attrs: AttrIter) -> io::Result<()>
    where
        AttrIter: Iterator<Item = AttrRef<'a>>,
    {
        self.inner.start_elem(name, attrs)
    }

    fn end_elem(&mut self, name: QualName) -> io::Result<()> {
        self.inner.end_elem(name)
    }

    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.inner.write_text(text)
    }

    fn write_comment(&mut self, text: &str) -> io::Result<()> {
        self.inner.write_comment(text)
    }

    fn write_doctype(&mut self, name: &str) -> io::Result<()> {
        match &self.doctype {
            Some(declaration) => self.inner.writer.write_all(declaration.as_bytes()),
            None => self.inner.write_doctype(name),
        }
    }

    fn write_processing_instruction(&mut self, target: &str, data: &str) -> io::Result<()> {
        self.inner.write_processing_instruction(target, data)
    }
}
