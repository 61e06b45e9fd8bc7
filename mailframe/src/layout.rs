//! Measurement seam between the pipeline and whatever lays the page out.
//!
//! The pipeline never computes geometry itself. It asks a [`Layout`] for the
//! same metrics a browser exposes (`scrollWidth`, `offsetWidth`, ...), so the
//! host can back it with a real engine. [`EstimatedLayout`] is a deterministic
//! stand-in good enough to drive the pipeline without one.

use std::collections::HashMap;

use mailframe_dom::{Document, Length, NodeData, NodeId, DEFAULT_FONT_SIZE_PX};

/// The visible area of the web view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    /// A media element is showing fullscreen; height reports are suppressed.
    pub fullscreen: bool,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            fullscreen: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Box metrics for nodes of a [`Document`].
///
/// Widths and heights are layout sizes: CSS transforms do not change them,
/// exactly like the DOM properties they mirror.
pub trait Layout {
    fn viewport(&self) -> Viewport;

    fn set_viewport(&mut self, viewport: Viewport);

    /// Width of the node's content including overflow.
    fn scroll_width(&self, doc: &Document, node: NodeId) -> f32;

    /// Height of the node's content including overflow.
    fn scroll_height(&self, doc: &Document, node: NodeId) -> f32;

    /// Border-box width of the node.
    fn offset_width(&self, doc: &Document, node: NodeId) -> f32;

    /// Border-box height of the node.
    fn offset_height(&self, doc: &Document, node: NodeId) -> f32;

    /// Intrinsic size of an image, if known (i.e. it has loaded).
    fn natural_size(&self, doc: &Document, img: NodeId) -> Option<Size>;
}

// ---------------------------------------------------------------------------
// EstimatedLayout
// ---------------------------------------------------------------------------

/// Average glyph advance, in em.
const CHAR_WIDTH_EM: f32 = 0.5;
const LINE_HEIGHT_EM: f32 = 1.2;

const NOT_RENDERED: &[&str] = &["head", "style", "script", "title", "meta", "link"];
const SHRINK_TO_FIT: &[&str] = &[
    "table", "td", "th", "a", "span", "font", "b", "strong", "i", "em", "u", "small", "big",
    "sup", "sub", "label",
];

/// Layout estimate from inline styles, HTML attributes and a fixed glyph
/// width. Tables rows run horizontally; everything else stacks.
#[derive(Debug, Clone)]
pub struct EstimatedLayout {
    viewport: Viewport,
    images: HashMap<String, Size>,
}

impl EstimatedLayout {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            images: HashMap::new(),
        }
    }

    /// Builder form of [`EstimatedLayout::register_image`].
    pub fn with_image(mut self, src: &str, natural: Size) -> Self {
        self.register_image(src, natural);
        self
    }

    /// Record the natural size of the image at `src`, as if it had loaded.
    pub fn register_image(&mut self, src: &str, natural: Size) {
        self.images.insert(src.to_string(), natural);
    }

    /// Content-box width of the parent, resolved from the outermost element
    /// ancestor down.
    fn width_available_to(&self, doc: &Document, node: NodeId) -> f32 {
        let mut chain = Vec::new();
        let mut cur = doc.parent(node);
        while let Some(p) = cur.filter(|&p| doc.element(p).is_some()) {
            chain.push(p);
            cur = doc.parent(p);
        }
        let mut font = cur.map_or(DEFAULT_FONT_SIZE_PX, |p| doc.computed_font_size(p));
        let mut available = self.viewport.width;
        for &ancestor in chain.iter().rev() {
            font = doc.resolve_font_size(ancestor, font);
            let border_box = self.element_width(doc, ancestor, available, font);
            available = (border_box - padding(doc, ancestor, font).horizontal()).max(0.0);
        }
        available
    }

    fn content_box_width(&self, doc: &Document, node: NodeId) -> f32 {
        let font = doc.computed_font_size(node);
        (self.offset_width(doc, node) - padding(doc, node, font).horizontal()).max(0.0)
    }

    /// Border-box width of an element laid out in `available`.
    fn element_width(&self, doc: &Document, node: NodeId, available: f32, font: f32) -> f32 {
        let Some(el) = doc.element(node) else {
            return available;
        };
        if !is_rendered(doc, node) {
            return 0.0;
        }
        if el.name() == "img" {
            return self.image_size(doc, node, available, font).width;
        }
        if let Some(w) = declared_px(doc, node, "width", available, font) {
            return w + padding(doc, node, font).horizontal();
        }
        if SHRINK_TO_FIT.contains(&el.name()) {
            return self.measure(doc, &[node], available).width(node);
        }
        available
    }

    /// Required widths and outer heights of every node under `roots`, each
    /// root laid out in `available`. Widths flow down and sizes flow back up
    /// through explicit stacks, so nesting depth does not grow the call stack.
    fn measure(&self, doc: &Document, roots: &[NodeId], available: f32) -> Measured {
        let mut order = Vec::new();
        let mut stack: Vec<(NodeId, f32, f32)> = roots
            .iter()
            .rev()
            .map(|&r| (r, available, doc.computed_font_size(r)))
            .collect();
        while let Some((node, available, font)) = stack.pop() {
            order.push((node, available, font));
            if let Some(inner) = self.inner_width(doc, node, available, font) {
                stack.extend(
                    doc.children(node)
                        .iter()
                        .rev()
                        .map(|&c| (c, inner, doc.resolve_font_size(c, font))),
                );
            }
        }

        let mut measured = Measured::default();
        for &(node, available, font) in order.iter().rev() {
            let size = self.own_size(doc, node, available, font, &measured);
            measured.sizes.insert(node, size);
        }
        measured
    }

    /// Width handed to the children of `node`, or `None` when they do not
    /// contribute to its size.
    fn inner_width(&self, doc: &Document, node: NodeId, available: f32, font: f32) -> Option<f32> {
        if doc.text(node).is_some() || !is_rendered(doc, node) {
            return None;
        }
        match doc.element(node) {
            None => Some(available),
            Some(el) if el.name() == "img" => None,
            Some(_) => {
                let own = declared_px(doc, node, "width", available, font).unwrap_or(available);
                Some(own - padding(doc, node, font).horizontal())
            }
        }
    }

    /// Size of one node once its children are in `measured`: the width it
    /// needs so nothing inside overflows, and its outer height.
    fn own_size(
        &self,
        doc: &Document,
        node: NodeId,
        available: f32,
        font: f32,
        measured: &Measured,
    ) -> Size {
        if let Some(text) = doc.text(node) {
            return Size::new(
                longest_word(text) as f32 * CHAR_WIDTH_EM * font,
                text_height(text, font, available),
            );
        }
        let Some(el) = doc.element(node) else {
            return Size::new(0.0, measured.children(doc, node).height);
        };
        if !is_rendered(doc, node) {
            return Size::new(0.0, 0.0);
        }
        if el.name() == "img" {
            return self.image_size(doc, node, available, font);
        }
        let pad = padding(doc, node, font);
        let children = measured.children(doc, node);
        let own_width = declared_px(doc, node, "width", available, font).unwrap_or(0.0);
        let height = declared_px(doc, node, "height", available, font).unwrap_or(children.height);
        Size::new(
            own_width.max(children.width) + pad.horizontal(),
            height + pad.vertical(),
        )
    }

    /// Combined size of the children of `node` laid out in `inner`.
    fn children_size(&self, doc: &Document, node: NodeId, inner: f32) -> Size {
        self.measure(doc, doc.children(node), inner)
            .children(doc, node)
    }

    /// Rendered image size: explicit dimensions first, then the natural size
    /// with its aspect ratio, then `max-width`.
    fn image_size(&self, doc: &Document, img: NodeId, available: f32, font: f32) -> Size {
        let natural = self.natural_size(doc, img);
        let aspect = natural
            .filter(|n| n.width > 0.0)
            .map(|n| n.height / n.width);
        let explicit_w = declared_px(doc, img, "width", available, font);
        let explicit_h = declared_px(doc, img, "height", available, font);

        let mut width = match (explicit_w, explicit_h, aspect) {
            (Some(w), _, _) => w,
            (None, Some(h), Some(a)) if a > 0.0 => h / a,
            _ => natural.map_or(0.0, |n| n.width),
        };
        if let Some(max) = declared_px(doc, img, "max-width", available, font) {
            width = width.min(max);
        }
        let height = match (explicit_h, aspect) {
            (Some(h), _) => h,
            (None, Some(a)) => width * a,
            (None, None) => 0.0,
        };
        Size { width, height }
    }
}

/// Sizes from one [`EstimatedLayout::measure`] pass.
#[derive(Debug, Default)]
struct Measured {
    sizes: HashMap<NodeId, Size>,
}

impl Measured {
    fn width(&self, node: NodeId) -> f32 {
        self.sizes.get(&node).map_or(0.0, |s| s.width)
    }

    fn height(&self, node: NodeId) -> f32 {
        self.sizes.get(&node).map_or(0.0, |s| s.height)
    }

    /// Children side by side across a table row, stacked otherwise.
    fn children(&self, doc: &Document, node: NodeId) -> Size {
        let sizes = doc
            .children(node)
            .iter()
            .filter_map(|c| self.sizes.get(c));
        if doc.is_element(node, "tr") {
            sizes.fold(Size::new(0.0, 0.0), |acc, s| {
                Size::new(acc.width + s.width, acc.height.max(s.height))
            })
        } else {
            sizes.fold(Size::new(0.0, 0.0), |acc, s| {
                Size::new(acc.width.max(s.width), acc.height + s.height)
            })
        }
    }
}

impl Layout for EstimatedLayout {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn scroll_width(&self, doc: &Document, node: NodeId) -> f32 {
        let offset = self.offset_width(doc, node);
        if doc.element(node).is_none() {
            return offset;
        }
        let pad = padding(doc, node, doc.computed_font_size(node)).horizontal();
        offset.max(self.children_size(doc, node, offset - pad).width + pad)
    }

    fn scroll_height(&self, doc: &Document, node: NodeId) -> f32 {
        let offset = self.offset_height(doc, node);
        if doc.element(node).is_none() {
            return offset;
        }
        let pad = padding(doc, node, doc.computed_font_size(node));
        let inner = self.content_box_width(doc, node);
        offset.max(self.children_size(doc, node, inner).height + pad.vertical())
    }

    fn offset_width(&self, doc: &Document, node: NodeId) -> f32 {
        let available = self.width_available_to(doc, node);
        match doc.data(node) {
            NodeData::Element(_) => {
                self.element_width(doc, node, available, doc.computed_font_size(node))
            }
            NodeData::Text(_) => self.measure(doc, &[node], available).width(node),
            _ => self.viewport.width,
        }
    }

    fn offset_height(&self, doc: &Document, node: NodeId) -> f32 {
        let available = self.width_available_to(doc, node);
        self.measure(doc, &[node], available).height(node)
    }

    fn natural_size(&self, doc: &Document, img: NodeId) -> Option<Size> {
        let src = doc.attr(img, "src")?;
        self.images.get(src).copied()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct Padding {
    top: f32,
    right: f32,
    bottom: f32,
    left: f32,
}

impl Padding {
    fn horizontal(&self) -> f32 {
        self.left + self.right
    }

    fn vertical(&self) -> f32 {
        self.top + self.bottom
    }
}

fn is_rendered(doc: &Document, node: NodeId) -> bool {
    match doc.element(node) {
        Some(el) => {
            !NOT_RENDERED.contains(&el.name())
                && !el
                    .style_ref()
                    .get("display")
                    .is_some_and(|d| d.eq_ignore_ascii_case("none"))
        }
        None => true,
    }
}

/// A `width`/`height`/`max-width` from the inline style, falling back to the
/// HTML attribute. Keywords such as `auto` or `initial` yield `None`.
fn declared_px(
    doc: &Document,
    node: NodeId,
    prop: &str,
    percent_base: f32,
    font: f32,
) -> Option<f32> {
    let el = doc.element(node)?;
    let len = match el.style_ref().get(prop) {
        Some(v) => Length::parse(v)?,
        None if prop == "width" || prop == "height" => el.attr(prop).and_then(Length::parse)?,
        None => return None,
    };
    Some(len.to_px(font, percent_base))
}

fn padding(doc: &Document, node: NodeId, font: f32) -> Padding {
    let Some(el) = doc.element(node) else {
        return Padding::default();
    };
    let style = el.style_ref();
    let px = |v: &str| Length::parse(v).map_or(0.0, |l| l.to_px(font, 0.0));

    let mut pad = Padding::default();
    if let Some(shorthand) = style.get("padding") {
        let values: Vec<f32> = shorthand.split_whitespace().map(px).collect();
        (pad.top, pad.right, pad.bottom, pad.left) = match values[..] {
            [all] => (all, all, all, all),
            [v, h] => (v, h, v, h),
            [t, h, b] => (t, h, b, h),
            [t, r, b, l, ..] => (t, r, b, l),
            [] => (0.0, 0.0, 0.0, 0.0),
        };
    }
    for (name, side) in [
        ("padding-top", &mut pad.top),
        ("padding-right", &mut pad.right),
        ("padding-bottom", &mut pad.bottom),
        ("padding-left", &mut pad.left),
    ] {
        if let Some(v) = style.get(name) {
            *side = px(v);
        }
    }
    pad
}

fn is_break(c: char) -> bool {
    c.is_whitespace() || c == '\u{200B}'
}

fn longest_word(text: &str) -> usize {
    text.split(is_break)
        .map(|w| w.chars().count())
        .max()
        .unwrap_or(0)
}

fn text_height(text: &str, font: f32, available: f32) -> f32 {
    let visible: usize = text
        .split(is_break)
        .filter(|w| !w.is_empty())
        .map(|w| w.chars().count() + 1)
        .sum();
    if visible == 0 {
        return 0.0;
    }
    let width = (visible - 1) as f32 * CHAR_WIDTH_EM * font;
    let lines = (width / available.max(1.0)).ceil().max(1.0);
    lines * LINE_HEIGHT_EM * font
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailframe_dom::{parse_html, Element};

    fn layout() -> EstimatedLayout {
        EstimatedLayout::new(Viewport::new(400.0, 700.0))
    }

    fn by_id(doc: &Document, id: &str) -> NodeId {
        doc.element_by_id(id).unwrap()
    }

    #[test]
    fn blocks_fill_the_viewport() {
        let doc = parse_html(r#"<div id="c"><p>short</p></div>"#);
        let l = layout();
        let c = by_id(&doc, "c");
        assert_eq!(l.offset_width(&doc, c), 400.0);
        assert_eq!(l.scroll_width(&doc, c), 400.0);
    }

    #[test]
    fn wide_tables_overflow() {
        let doc = parse_html(
            r#"<div id="c"><table width="800"><tr><td width="500">a</td><td width="300">b</td></tr></table></div>"#,
        );
        let l = layout();
        let c = by_id(&doc, "c");
        assert_eq!(l.offset_width(&doc, c), 400.0);
        assert_eq!(l.scroll_width(&doc, c), 800.0);
    }

    #[test]
    fn row_cells_add_up() {
        let doc = parse_html(
            r#"<div id="c"><table><tr><td style="width: 300px">a</td><td style="width: 250px; padding: 0 10px">b</td></tr></table></div>"#,
        );
        let c = by_id(&doc, "c");
        assert_eq!(layout().scroll_width(&doc, c), 570.0);
    }

    #[test]
    fn padding_and_long_words() {
        let word = "x".repeat(100);
        let doc = parse_html(&format!(
            r#"<div id="c" style="padding-left: 2ex; padding-right: 2ex">{word}</div>"#
        ));
        let c = by_id(&doc, "c");
        // 100 glyphs at 8px plus 16px of padding on each side.
        assert_eq!(layout().scroll_width(&doc, c), 832.0);
    }

    #[test]
    fn zero_width_space_breaks_words() {
        let long = format!("{}\u{200B}{}", "a".repeat(30), "b".repeat(30));
        let doc = parse_html(&format!(r#"<div id="c">{long}</div>"#));
        let c = by_id(&doc, "c");
        assert_eq!(layout().scroll_width(&doc, c), 400.0);
    }

    #[test]
    fn images_keep_their_aspect_ratio() {
        let doc = parse_html(
            r#"<div id="c"><img id="a" src="a.png"><img id="b" src="a.png" style="width: 300px; height: auto"><img id="n" src="none.png" width="10" height="20"></div>"#,
        );
        let l = layout().with_image("a.png", Size::new(1200.0, 600.0));
        let a = by_id(&doc, "a");
        assert_eq!(l.offset_width(&doc, a), 1200.0);
        assert_eq!(l.offset_height(&doc, a), 600.0);
        let b = by_id(&doc, "b");
        assert_eq!(l.offset_width(&doc, b), 300.0);
        assert_eq!(l.offset_height(&doc, b), 150.0);
        let n = by_id(&doc, "n");
        assert_eq!(l.offset_width(&doc, n), 10.0);
        assert_eq!(l.offset_height(&doc, n), 20.0);
    }

    #[test]
    fn max_width_clamps_images() {
        let doc = parse_html(r#"<div id="c"><img id="i" src="a.png" style="max-width: 100%"></div>"#);
        let l = layout().with_image("a.png", Size::new(1000.0, 500.0));
        let i = by_id(&doc, "i");
        assert_eq!(l.offset_width(&doc, i), 400.0);
        assert_eq!(l.offset_height(&doc, i), 200.0);
    }

    #[test]
    fn heights_stack_and_rows_take_the_tallest_cell() {
        let doc = parse_html(
            r#"<div id="c"><div style="height: 100px"></div><table><tr><td height="50">a</td><td height="80">b</td></tr></table><p style="display: none">gone</p></div>"#,
        );
        let c = by_id(&doc, "c");
        let l = layout();
        assert_eq!(l.offset_height(&doc, c), 180.0);
        assert_eq!(l.scroll_height(&doc, c), 180.0);
    }

    #[test]
    fn text_wraps_to_the_available_width() {
        // 59 glyphs * 8px = 472px, so two lines of 19.2px at 400px.
        let words = vec!["abcde"; 10].join(" ");
        let doc = parse_html(&format!(r#"<div id="c">{words}</div>"#));
        let c = by_id(&doc, "c");
        let h = layout().offset_height(&doc, c);
        assert!((h - 38.4).abs() < 0.01, "{h}");
    }

    #[test]
    fn transforms_do_not_change_metrics() {
        let doc = parse_html(
            r#"<div id="c" style="width: 800px; transform: scale(0.5); transform-origin: 0 0">x</div>"#,
        );
        let c = by_id(&doc, "c");
        assert_eq!(layout().offset_width(&doc, c), 800.0);
    }

    #[test]
    fn deep_nesting_is_measured_without_recursion() {
        let mut doc = Document::new();
        let c = doc.append_child(
            doc.root(),
            NodeData::Element(Element::new("div").with_attr("id", "c")),
        );
        let mut innermost = c;
        for _ in 0..50_000 {
            innermost = doc.append_child(innermost, NodeData::Element(Element::new("div")));
        }
        doc.append_child(innermost, NodeData::Text("deep".into()));

        let l = layout();
        assert_eq!(l.scroll_width(&doc, c), 400.0);
        assert!((l.offset_height(&doc, c) - 19.2).abs() < 0.01);
        assert!((l.scroll_height(&doc, c) - 19.2).abs() < 0.01);
        assert_eq!(l.offset_width(&doc, innermost), 400.0);
    }
}
