//! Removal of mail-client and ESP artifacts that only get in the way in a
//! mobile view.

use log::debug;
use mailframe_dom::{Document, EventType, Length, ListenerAction, NodeId};

use crate::config::PipelineConfig;

/// Preview-text classes used by common email service providers.
const PREHEADER_CLASSES: &[&str] = &["preheader", "mcnPreviewText"];

/// Remove tracking pixels, hidden preheaders and empty Outlook paragraphs
/// under `container`. Returns how many elements were removed.
pub fn remove_provider_junk(doc: &mut Document, container: NodeId, config: &PipelineConfig) -> usize {
    let junk: Vec<NodeId> = doc
        .descendants(container)
        .into_iter()
        .filter(|&n| {
            is_tracking_pixel(doc, n, config.tracking_pixel_max_px)
                || is_hidden_preheader(doc, n)
                || is_empty_office_paragraph(doc, n)
        })
        .collect();

    let mut removed = 0;
    for node in junk {
        // Nested junk goes away with its ancestor.
        if doc.is_attached(node) {
            doc.remove(node);
            removed += 1;
        }
    }
    if removed > 0 {
        debug!("removed {removed} provider artifact(s)");
    }
    removed
}

/// Make every `<object>` in the container disappear when tapped.
pub fn neutralize_objects(doc: &mut Document, container: NodeId) -> usize {
    let objects = doc.elements_named(container, "object");
    for &object in &objects {
        doc.add_event_listener(object, EventType::Click, ListenerAction::HideOnClick);
    }
    objects.len()
}

fn is_tracking_pixel(doc: &Document, node: NodeId, max_px: f32) -> bool {
    if !doc.is_element(node, "img") {
        return false;
    }
    let dimension = |prop: &str| {
        let style = doc.style(node);
        let value = match style.get(prop) {
            Some(v) => v.to_string(),
            None => doc.attr(node, prop)?.to_string(),
        };
        match Length::parse(&value)? {
            Length::Px(v) => Some(v),
            Length::Pt(v) => Some(v * 96.0 / 72.0),
            _ => None,
        }
    };
    matches!(
        (dimension("width"), dimension("height")),
        (Some(w), Some(h)) if w <= max_px && h <= max_px
    )
}

fn is_hidden_preheader(doc: &Document, node: NodeId) -> bool {
    let Some(el) = doc.element(node) else {
        return false;
    };
    let style = el.style();
    let hidden = style
        .get("display")
        .is_some_and(|d| d.eq_ignore_ascii_case("none"));
    if !hidden {
        return false;
    }
    let mso_hidden = style
        .get("mso-hide")
        .is_some_and(|v| v.eq_ignore_ascii_case("all"));
    let preview_class = el
        .attr("class")
        .is_some_and(|c| c.split_whitespace().any(|c| PREHEADER_CLASSES.contains(&c)));
    mso_hidden || preview_class
}

fn is_empty_office_paragraph(doc: &Document, node: NodeId) -> bool {
    doc.is_element(node, "o:p")
        && doc.children(node).iter().all(|&c| doc.element(c).is_none())
        && doc
            .text_content(node)
            .chars()
            .all(|c| c.is_whitespace() || c == '\u{A0}')
}
