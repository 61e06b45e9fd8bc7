//! Fixes for content that is wider than the screen for no good reason: link
//! text made of one unbreakable URL, and images with a large intrinsic size.

use std::sync::LazyLock;

use log::debug;
use mailframe_dom::{format_px, Document, NodeId};
use regex::{Captures, Regex};

use crate::config::PipelineConfig;
use crate::layout::Layout;

/// Zero-width space: an invisible line-break opportunity.
pub const ZWSP: char = '\u{200B}';

const URL_SEPARATORS: &[char] = &['/', '.', '?', '&', '=', '-', '_', '#', '%'];

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+").expect("token pattern is valid"));
static URL_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?:https?|ftp)://|mailto:|www\.)").expect("url pattern is valid")
});

/// Insert break opportunities into URL-looking link text.
///
/// A token qualifies when it looks like a URL and is either longer than
/// `long_url_min_chars` or the anchor does not fit `container_width`. The
/// link target (`href`) is never changed. Returns whether any text changed.
pub fn fix_long_url(
    doc: &mut Document,
    layout: &dyn Layout,
    anchor: NodeId,
    container_width: f32,
    config: &PipelineConfig,
) -> bool {
    let overflowing = layout.scroll_width(doc, anchor) > container_width;
    let texts: Vec<NodeId> = doc
        .descendants(anchor)
        .into_iter()
        .filter(|&n| doc.text(n).is_some_and(|t| !t.contains(ZWSP)))
        .collect();

    let mut changed = false;
    for node in texts {
        let Some(text) = doc.text_mut(node) else {
            continue;
        };
        let fixed = TOKEN.replace_all(text, |caps: &Captures<'_>| {
            let token = &caps[0];
            let long = token.chars().count() > config.long_url_min_chars;
            if URL_LIKE.is_match(token) && (long || overflowing) {
                break_url(token, config.long_url_chunk_chars)
            } else {
                token.to_string()
            }
        });
        if fixed != *text {
            *text = fixed.into_owned();
            changed = true;
        }
    }
    changed
}

/// Run [`fix_long_url`] on every anchor in the container.
pub fn fix_long_urls(
    doc: &mut Document,
    layout: &dyn Layout,
    container: NodeId,
    config: &PipelineConfig,
) -> usize {
    let width = layout.offset_width(doc, container);
    let fixed = doc
        .elements_named(container, "a")
        .into_iter()
        .filter(|&a| fix_long_url(doc, layout, a, width, config))
        .count();
    if fixed > 0 {
        debug!("broke up {fixed} long link text(s)");
    }
    fixed
}

/// Break after each run of URL separators, and at least every `chunk`
/// characters.
fn break_url(token: &str, chunk: usize) -> String {
    let chunk = chunk.max(1);
    let mut out = String::with_capacity(token.len() * 2);
    let mut run = 0;
    let mut chars = token.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        run += 1;
        let Some(&next) = chars.peek() else {
            break;
        };
        let after_separator = URL_SEPARATORS.contains(&c) && !URL_SEPARATORS.contains(&next);
        if after_separator || run >= chunk {
            out.push(ZWSP);
            run = 0;
        }
    }
    out
}

/// Clamp an image to `max_width`, letting its height follow the aspect ratio.
pub fn limit_image_width(
    doc: &mut Document,
    layout: &dyn Layout,
    img: NodeId,
    max_width: f32,
) -> bool {
    if layout.offset_width(doc, img) <= max_width {
        return false;
    }
    let mut style = doc.style(img);
    style.set("width", format_px(max_width));
    style.set("height", "auto");
    doc.set_style(img, &style);
    doc.remove_attr(img, "height");
    true
}

/// Run [`limit_image_width`] on every image in the container, against the
/// container's own width.
pub fn limit_image_widths(doc: &mut Document, layout: &dyn Layout, container: NodeId) -> usize {
    let max_width = layout.offset_width(doc, container);
    let limited = doc
        .elements_named(container, "img")
        .into_iter()
        .filter(|&img| limit_image_width(doc, layout, img, max_width))
        .count();
    if limited > 0 {
        debug!("clamped {limited} image(s) to {max_width}px");
    }
    limited
}
