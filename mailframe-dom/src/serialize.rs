//! HTML serialization of a [`Document`].
//!
//! The arena implements html5ever's [`Serialize`], so escaping, void elements
//! and raw-text elements follow html5ever's serializer. The walk keeps its own
//! stack; nesting depth is bounded only by memory.

use std::io;

use html5ever::serialize::{serialize, Serialize, SerializeOpts, Serializer, TraversalScope};
use html5ever::{LocalName, Namespace, QualName};
use log::warn;

use crate::{Document, NodeData, NodeId};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

pub(crate) fn to_html(doc: &Document, id: NodeId) -> String {
    render(doc, id, TraversalScope::IncludeNode)
}

pub(crate) fn inner_html(doc: &Document, id: NodeId) -> String {
    let parent = doc.tag_name(id).map(html_name);
    render(doc, id, TraversalScope::ChildrenOnly(parent))
}

fn render(doc: &Document, id: NodeId, traversal_scope: TraversalScope) -> String {
    let mut out = Vec::new();
    let opts = SerializeOpts {
        traversal_scope,
        ..SerializeOpts::default()
    };
    if let Err(e) = serialize(&mut out, &Subtree { doc, id }, opts) {
        warn!("serialization stopped early: {e}");
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn html_name(tag: &str) -> QualName {
    QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(tag))
}

fn attr_name(name: &str) -> QualName {
    QualName::new(None, Namespace::from(""), LocalName::from(name))
}

struct Subtree<'a> {
    doc: &'a Document,
    id: NodeId,
}

enum Step {
    Open(NodeId),
    Close(QualName),
}

impl Serialize for Subtree<'_> {
    fn serialize<S: Serializer>(
        &self,
        serializer: &mut S,
        traversal_scope: TraversalScope,
    ) -> io::Result<()> {
        let doc = self.doc;
        let children = move |id: NodeId| doc.children(id).iter().rev().map(|&c| Step::Open(c));
        let mut steps: Vec<Step> = match traversal_scope {
            TraversalScope::IncludeNode => vec![Step::Open(self.id)],
            TraversalScope::ChildrenOnly(_) => children(self.id).collect(),
        };

        while let Some(step) = steps.pop() {
            let id = match step {
                Step::Close(name) => {
                    serializer.end_elem(name)?;
                    continue;
                }
                Step::Open(id) => id,
            };
            match doc.data(id) {
                NodeData::Document => steps.extend(children(id)),
                NodeData::Doctype(name) => serializer.write_doctype(name)?,
                NodeData::Comment(text) => serializer.write_comment(text)?,
                NodeData::Text(text) => serializer.write_text(text)?,
                NodeData::Element(el) => {
                    let name = html_name(el.name());
                    let attrs: Vec<(QualName, &str)> =
                        el.attrs().map(|(k, v)| (attr_name(k), v)).collect();
                    serializer.start_elem(name.clone(), attrs.iter().map(|(k, v)| (k, *v)))?;
                    steps.push(Step::Close(name));
                    // A rewritten stylesheet replaces the original element text.
                    match doc.stylesheet_owned_by(id) {
                        Some(sheet) if el.name() == "style" => {
                            serializer.write_text(&sheet.to_css())?
                        }
                        _ => steps.extend(children(id)),
                    }
                }
            }
        }
        Ok(())
    }
}
