//! Build a [`Document`] from HTML text.
//!
//! Parsing is delegated to `scraper` (html5ever), so malformed email markup is
//! repaired exactly the way a browser would repair it; the result is then
//! copied into the mutable arena.

use log::{debug, warn};
use scraper::{Html, Node};

use crate::{Document, Element, NodeData, StyleSheet};

/// Parse a full HTML document.
///
/// `<style>` elements become inline [`StyleSheet`]s and
/// `<link rel="stylesheet">` elements become external (unreadable) sheets, in
/// document order.
pub fn parse_html(html: &str) -> Document {
    let parsed = Html::parse_document(html);
    let mut doc = Document::new();

    let mut stack = vec![(parsed.tree.root(), doc.root())];
    while let Some((src, dst)) = stack.pop() {
        for child in src.children() {
            let data = match child.value() {
                Node::Doctype(d) => NodeData::Doctype(d.name().to_string()),
                Node::Comment(c) => NodeData::Comment(String::from(&**c)),
                Node::Text(t) => NodeData::Text(String::from(&**t)),
                Node::Element(e) => {
                    let mut el = Element::new(e.name());
                    for (name, value) in e.attrs() {
                        el.set_attr(name, value);
                    }
                    NodeData::Element(el)
                }
                _ => continue,
            };
            let id = doc.append_child(dst, data);
            stack.push((child, id));
        }
    }

    collect_stylesheets(&mut doc);
    debug!(
        "parsed document with {} stylesheet(s)",
        doc.stylesheets().len()
    );
    doc
}

fn collect_stylesheets(doc: &mut Document) {
    for id in doc.descendants(doc.root()) {
        let Some(el) = doc.element(id) else {
            continue;
        };
        match el.name() {
            "style" => {
                let css = doc.text_content(id);
                let sheet = StyleSheet::parse(Some(id), &css).unwrap_or_else(|e| {
                    warn!("keeping <style> text unparsed: {e}");
                    StyleSheet::verbatim(Some(id), &css)
                });
                doc.add_stylesheet(sheet);
            }
            "link" if is_stylesheet_link(el) => {
                let href = el.attr("href").unwrap_or_default().to_string();
                doc.add_stylesheet(StyleSheet::external(Some(id), href));
            }
            _ => {}
        }
    }
}

fn is_stylesheet_link(el: &Element) -> bool {
    el.attr("rel").is_some_and(|rel| {
        rel.split_ascii_whitespace()
            .any(|r| r.eq_ignore_ascii_case("stylesheet"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SheetSource;

    #[test]
    fn builds_tree_with_implied_structure() {
        let doc = parse_html("<p class=\"x\">Hi <b>there</b></p>");
        let body = doc.body().unwrap();
        let p = doc.elements_named(body, "p")[0];
        assert_eq!(doc.attr(p, "class"), Some("x"));
        assert_eq!(doc.text_content(p), "Hi there");
        assert!(doc.elements_named(doc.root(), "head").len() == 1);
    }

    #[test]
    fn keeps_comments_and_doctype() {
        let doc = parse_html("<!DOCTYPE html><html><body><!--[if mso]>x<![endif]--></body></html>");
        let kinds: Vec<_> = doc
            .descendants(doc.root())
            .into_iter()
            .filter(|&n| matches!(doc.data(n), NodeData::Comment(_) | NodeData::Doctype(_)))
            .collect();
        assert_eq!(kinds.len(), 2);
    }

    #[test]
    fn collects_stylesheets_in_order() {
        let doc = parse_html(
            "<html><head><style>.a { font-size: 12px }</style>\
             <link rel=\"stylesheet\" href=\"https://x.test/a.css\"></head>\
             <body><style>.b { color: #333 }</style></body></html>",
        );
        let sheets = doc.stylesheets();
        assert_eq!(sheets.len(), 3);
        assert_eq!(sheets[0].source(), &SheetSource::Inline);
        assert_eq!(
            sheets[1].source(),
            &SheetSource::External {
                href: "https://x.test/a.css".to_string()
            }
        );
        assert_eq!(sheets[2].rules().unwrap().len(), 1);
    }
}
