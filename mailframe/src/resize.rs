//! Smart resize: fit content authored for a wide desktop canvas into the
//! viewport by scaling the container down, then scaling text back up so it
//! stays readable.

use log::{debug, warn};
use mailframe_dom::{format_px, html_font_size_px, Document, Length, NodeId, SheetError, StyleSheet};

use crate::config::PipelineConfig;
use crate::error::ResizeError;
use crate::layout::Layout;

/// Geometry of one resize pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleContext {
    /// Width of the content before scaling (the container's scroll width).
    pub original_width: f32,
    /// Width the content has to fit (the viewport width).
    pub target_width: f32,
    /// `target_width / original_width`, `1.0` when nothing can be measured.
    pub ratio: f32,
}

impl ScaleContext {
    pub fn measure(doc: &Document, layout: &dyn Layout, container: NodeId) -> Self {
        let target_width = layout.viewport().width;
        let original_width = layout.scroll_width(doc, container);
        let ratio = if original_width > 0.0 {
            target_width / original_width
        } else {
            1.0
        };
        Self {
            original_width,
            target_width,
            ratio,
        }
    }

    pub fn needs_scaling(&self) -> bool {
        self.ratio < 1.0
    }
}

/// What a [`smart_resize`] pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResizeOutcome {
    /// `None` when the container could not be found.
    pub context: Option<ScaleContext>,
    pub scaled: bool,
    /// Steps that could not run. The pass continues past each of them.
    pub skipped: Vec<ResizeError>,
}

impl ResizeOutcome {
    fn skip(&mut self, err: ResizeError) {
        warn!("smart resize step skipped: {err}");
        self.skipped.push(err);
    }
}

/// Scale the container so its content fits the viewport width.
///
/// Each step is independent: one that cannot run is recorded in
/// [`ResizeOutcome::skipped`] and the pass moves on.
pub fn smart_resize(
    doc: &mut Document,
    layout: &dyn Layout,
    container: Option<NodeId>,
    config: &PipelineConfig,
) -> ResizeOutcome {
    let mut outcome = ResizeOutcome::default();

    if let Err(err) = reset_body_width(doc) {
        outcome.skip(err);
    }

    let Some(container) = container else {
        outcome.skip(ResizeError::MissingContainer);
        return outcome;
    };

    let ctx = ScaleContext::measure(doc, layout, container);
    outcome.context = Some(ctx);
    if !ctx.needs_scaling() {
        debug!(
            "content fits: {}px in {}px",
            ctx.original_width, ctx.target_width
        );
        return outcome;
    }
    debug!(
        "scaling {}px content into {}px (ratio {})",
        ctx.original_width, ctx.target_width, ctx.ratio
    );

    scale_element(doc, container, ctx.original_width, ctx.ratio);
    outcome.scaled = true;

    let zoom = 1.0 / ctx.ratio;
    for sheet in doc.stylesheets_mut() {
        if let Err(err) = zoom_font_size_in_css(sheet, zoom) {
            outcome.skip(err.into());
        }
    }
    let text_elements: Vec<NodeId> = doc
        .descendants(container)
        .into_iter()
        .filter(|&n| doc.attr(n, "style").is_some() || is_sized_font(doc, n))
        .collect();
    for el in text_elements {
        zoom_text(doc, el, zoom);
    }

    let scroll_width = layout.scroll_width(doc, container);
    let offset_width = layout.offset_width(doc, container);
    let tolerance = config.overflow_tolerance_px;
    if scroll_width > offset_width + tolerance {
        let factor = (offset_width - tolerance) / scroll_width;
        debug!("still overflowing ({scroll_width}px > {offset_width}px), shrinking cell text by {factor}");
        for el in cell_text_elements(doc, container) {
            scale_down_text(doc, el, factor);
        }
    }

    match doc.body() {
        Some(body) => {
            let height = layout.offset_height(doc, container) * ctx.ratio;
            doc.set_style_property(body, "height", format_px(height));
        }
        None => outcome.skip(ResizeError::MissingBody),
    }

    outcome
}

fn reset_body_width(doc: &mut Document) -> Result<(), ResizeError> {
    let body = doc.body().ok_or(ResizeError::MissingBody)?;
    let mut style = doc.style(body);
    style.set("min-width", "initial");
    style.set("width", "initial");
    doc.set_style(body, &style);
    Ok(())
}

/// Pin the element to `original_width` and shrink it visually by `ratio`,
/// anchored at the top-left corner.
pub fn scale_element(doc: &mut Document, el: NodeId, original_width: f32, ratio: f32) {
    let mut style = doc.style(el);
    style.set("width", format_px(original_width));
    style.set(
        "transform",
        format!("scale({})", mailframe_dom::format_number(ratio)),
    );
    style.set("transform-origin", "0 0");
    doc.set_style(el, &style);
}

/// Multiply absolute (`px`/`pt`) font sizes in a stylesheet, including those
/// nested in `@media` and other grouping rules. Returns how many changed.
pub fn zoom_font_size_in_css(sheet: &mut StyleSheet, factor: f32) -> Result<usize, SheetError> {
    let mut changed = 0;
    sheet.for_each_declarations_mut(|decls| {
        if let Some(zoomed) = decls
            .get("font-size")
            .and_then(Length::parse)
            .and_then(|len| len.scaled(factor))
        {
            decls.set("font-size", zoomed.to_string());
            changed += 1;
        }
    })?;
    Ok(changed)
}

/// Multiply an element's own absolute font size (inline `font-size`, or a
/// legacy `<font size>`) and absolute line height. Returns whether anything
/// changed.
pub fn zoom_text(doc: &mut Document, el: NodeId, factor: f32) -> bool {
    let mut style = doc.style(el);
    let mut changed = false;

    match style.get("font-size") {
        Some(value) => {
            if let Some(zoomed) = Length::parse(value).and_then(|l| l.scaled(factor)) {
                style.set("font-size", zoomed.to_string());
                changed = true;
            }
        }
        None => {
            if let Some(px) = legacy_font_px(doc, el) {
                style.set("font-size", format_px(px * factor));
                changed = true;
            }
        }
    }
    if let Some(zoomed) = style
        .get("line-height")
        .and_then(Length::parse)
        .filter(|l| !matches!(l, Length::Percent(_)))
        .and_then(|l| l.scaled(factor))
    {
        style.set("line-height", zoomed.to_string());
        changed = true;
    }

    if changed {
        doc.set_style(el, &style);
    }
    changed
}

/// Shrink the element's effective font size by `factor`.
pub fn scale_down_text(doc: &mut Document, el: NodeId, factor: f32) {
    let px = doc.computed_font_size(el) * factor;
    doc.set_style_property(el, "font-size", format_px(px));
}

/// Visual width of an element after its own `transform: scale(...)`.
pub fn visual_width(doc: &Document, layout: &dyn Layout, el: NodeId) -> f32 {
    let scale = doc
        .style(el)
        .get("transform")
        .and_then(|t| t.trim().strip_prefix("scale("))
        .and_then(|t| t.strip_suffix(')'))
        .and_then(|t| t.split(',').next())
        .and_then(|t| t.trim().parse::<f32>().ok())
        .unwrap_or(1.0);
    layout.offset_width(doc, el) * scale
}

fn is_sized_font(doc: &Document, node: NodeId) -> bool {
    doc.is_element(node, "font") && doc.attr(node, "size").is_some()
}

fn legacy_font_px(doc: &Document, el: NodeId) -> Option<f32> {
    if !doc.is_element(el, "font") {
        return None;
    }
    html_font_size_px(doc.attr(el, "size")?)
}

/// `td > a[style], td > span[style], td > font[size]`
fn cell_text_elements(doc: &Document, container: NodeId) -> Vec<NodeId> {
    doc.elements_named(container, "td")
        .into_iter()
        .flat_map(|td| doc.children(td).iter().copied())
        .filter(|&n| {
            ((doc.is_element(n, "a") || doc.is_element(n, "span")) && doc.attr(n, "style").is_some())
                || is_sized_font(doc, n)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{EstimatedLayout, Viewport};
    use mailframe_dom::parse_html;

    fn layout(width: f32) -> EstimatedLayout {
        EstimatedLayout::new(Viewport::new(width, 700.0))
    }

    fn container(doc: &Document) -> Option<NodeId> {
        doc.element_by_id("c")
    }

    #[test]
    fn narrow_content_is_untouched() {
        let mut doc = parse_html(r#"<div id="c"><p style="font-size: 14px">hello</p></div>"#);
        let c = container(&doc);
        let outcome = smart_resize(&mut doc, &layout(400.0), c, &PipelineConfig::default());
        assert!(!outcome.scaled);
        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.context.map(|ctx| ctx.ratio), Some(1.0));
        let c = c.unwrap();
        assert_eq!(doc.style(c).get("transform"), None);
        let body = doc.body().unwrap();
        assert_eq!(doc.style(body).get("width"), Some("initial"));
        assert_eq!(doc.style(body).get("height"), None);
    }

    #[test]
    fn wide_content_is_scaled_to_the_viewport() {
        let mut doc = parse_html(
            r#"<style>p { font-size: 12px } @media screen { .x { font-size: 9pt } }</style><div id="c"><table width="800" height="600"><tr><td><p style="font-size: 10px">hi</p><font size="2">old</font></td></tr></table></div>"#,
        );
        let l = layout(400.0);
        let c = container(&doc);
        let outcome = smart_resize(&mut doc, &l, c, &PipelineConfig::default());
        assert!(outcome.scaled);
        assert!(outcome.skipped.is_empty());
        let ctx = outcome.context.unwrap();
        assert_eq!(ctx.original_width, 800.0);
        assert_eq!(ctx.ratio, 0.5);

        let c = c.unwrap();
        let style = doc.style(c);
        assert_eq!(style.get("width"), Some("800px"));
        assert_eq!(style.get("transform"), Some("scale(0.5)"));
        assert_eq!(style.get("transform-origin"), Some("0 0"));
        assert_eq!(visual_width(&doc, &l, c), 400.0);

        let p = doc.elements_named(c, "p")[0];
        assert_eq!(doc.style(p).get("font-size"), Some("20px"));
        let font = doc.elements_named(c, "font")[0];
        assert_eq!(doc.style(font).get("font-size"), Some("26px"));

        let css = doc.stylesheets()[0].to_css();
        assert!(css.contains("font-size: 24px"));
        assert!(css.contains("font-size: 18pt"));

        let body = doc.body().unwrap();
        assert_eq!(doc.style(body).get("height"), Some("300px"));
    }

    #[test]
    fn external_sheets_are_skipped_not_fatal() {
        let mut doc = parse_html(
            r#"<link rel="stylesheet" href="https://cdn.example.com/mail.css"><div id="c"><div style="width: 1000px; font-size: 10px">x</div></div>"#,
        );
        let c = container(&doc);
        let outcome = smart_resize(&mut doc, &layout(500.0), c, &PipelineConfig::default());
        assert!(outcome.scaled);
        assert_eq!(
            outcome.skipped,
            [ResizeError::Stylesheet(SheetError::CrossOrigin {
                href: "https://cdn.example.com/mail.css".to_string()
            })]
        );
        // Later steps still ran.
        let inner = doc.children(c.unwrap())[0];
        assert_eq!(doc.style(inner).get("font-size"), Some("20px"));
        assert!(doc.style(doc.body().unwrap()).get("height").is_some());
    }

    #[test]
    fn missing_container_is_reported() {
        let mut doc = parse_html("<p>no container</p>");
        let outcome = smart_resize(&mut doc, &layout(400.0), None, &PipelineConfig::default());
        assert_eq!(outcome.context, None);
        assert_eq!(outcome.skipped, [ResizeError::MissingContainer]);
    }

    #[test]
    fn overflowing_cell_text_is_shrunk() {
        // After the 2x zoom the 60-glyph word needs 60 * 0.5 * 40px = 1200px,
        // wider than the 800px container.
        let word = "w".repeat(60);
        let mut doc = parse_html(&format!(
            r#"<div id="c"><table width="800"><tr><td><span style="font-size: 20px">{word}</span></td></tr></table></div>"#
        ));
        let c = container(&doc);
        let outcome = smart_resize(&mut doc, &layout(400.0), c, &PipelineConfig::default());
        assert!(outcome.scaled);
        let span = doc.elements_named(c.unwrap(), "span")[0];
        // 40px * (800 - 20) / 1200
        assert_eq!(doc.style(span).get("font-size"), Some("26px"));
    }

    #[test]
    fn zoom_text_only_touches_absolute_sizes() {
        let mut doc = parse_html(
            r#"<p id="a" style="font-size: 1.2em; line-height: 18px">a</p><p id="b" style="color: red">b</p>"#,
        );
        let a = doc.element_by_id("a").unwrap();
        let b = doc.element_by_id("b").unwrap();
        assert!(zoom_text(&mut doc, a, 2.0));
        assert_eq!(doc.attr(a, "style"), Some("font-size: 1.2em; line-height: 36px"));
        assert!(!zoom_text(&mut doc, b, 2.0));
    }
}
