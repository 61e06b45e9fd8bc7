//! Dark-mode color remapping.
//!
//! Email is authored for white backgrounds. In dark mode the page shell turns
//! the canvas dark and the default text light, which leaves two kinds of
//! explicit colors illegible: light backgrounds (now glaring, with light text
//! on top) and dark neutral text (now invisible). Only those are rewritten;
//! saturated brand colors keep their hue.

use log::debug;
use mailframe_dom::{Document, NodeId};

use crate::color::{Color, Hsl};

/// Set on elements whose colors were rewritten.
pub const DARK_MARKER: &str = "data-mf-dark";

/// Backgrounds lighter than this are darkened.
const LIGHT_BACKGROUND: f32 = 0.75;
/// Text darker than this is lightened.
const DARK_TEXT: f32 = 0.35;
/// Below this saturation a color counts as neutral (black/gray).
const NEUTRAL_SATURATION: f32 = 0.5;

const SKIPPED_ELEMENTS: &[&str] = &[
    "img", "video", "picture", "svg", "canvas", "iframe", "source", "style", "script",
];

enum Role {
    Foreground,
    Background,
}

/// Remap one element's inline and attribute colors. Returns whether anything
/// changed. Elements already carrying [`DARK_MARKER`] are left alone.
pub fn apply_dark_mode_for_node(doc: &mut Document, node: NodeId) -> bool {
    let Some(el) = doc.element(node) else {
        return false;
    };
    if el.has_attr(DARK_MARKER) || SKIPPED_ELEMENTS.contains(&el.name()) {
        return false;
    }

    let mut changed = false;

    let mut style = el.style();
    for decl in style.iter_mut() {
        let role = match decl.name.as_str() {
            "color" => Role::Foreground,
            "background-color" | "background" => Role::Background,
            _ => continue,
        };
        if let Some(value) = remap_value(&decl.value, role) {
            decl.value = value;
            changed = true;
        }
    }

    let is_font = el.name() == "font";
    let bgcolor = el
        .attr("bgcolor")
        .and_then(|v| remap_value(v, Role::Background));
    let font_color = el
        .attr("color")
        .filter(|_| is_font)
        .and_then(|v| remap_value(v, Role::Foreground));

    if !changed && bgcolor.is_none() && font_color.is_none() {
        return false;
    }

    if let Some(el) = doc.element_mut(node) {
        if changed {
            el.set_style(&style);
        }
        if let Some(v) = bgcolor {
            el.set_attr("bgcolor", v);
        }
        if let Some(v) = font_color {
            el.set_attr("color", v);
        }
        el.set_attr(DARK_MARKER, "");
    }
    true
}

/// Apply [`apply_dark_mode_for_node`] to every element under `container`,
/// deepest first, so nested overrides are resolved before their ancestors.
pub fn apply_dark_mode(doc: &mut Document, container: NodeId) -> usize {
    let mut nodes = doc.descendants(container);
    nodes.reverse();
    let changed = nodes
        .into_iter()
        .filter(|&n| apply_dark_mode_for_node(doc, n))
        .count();
    debug!("dark mode remapped {changed} element(s)");
    changed
}

/// Rewrite a property value if it is, or for backgrounds contains, a color
/// that needs it.
fn remap_value(value: &str, role: Role) -> Option<String> {
    if let Some(color) = Color::parse(value) {
        return remap(color, &role).map(|c| c.to_string());
    }
    // `background: url(...) no-repeat #fff`
    if !matches!(role, Role::Background) {
        return None;
    }
    let mut changed = false;
    let tokens: Vec<String> = top_level_tokens(value)
        .into_iter()
        .map(|token| match Color::parse(token).and_then(|c| remap(c, &role)) {
            Some(mapped) => {
                changed = true;
                mapped.to_string()
            }
            None => token.to_string(),
        })
        .collect();
    changed.then(|| tokens.join(" "))
}

/// Whitespace-separated tokens, keeping `url(...)`/`rgb(...)` whole.
fn top_level_tokens(value: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut depth = 0u32;
    let mut start = None;
    for (i, c) in value.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c.is_whitespace() && depth == 0 => {
                if let Some(s) = start.take() {
                    tokens.push(&value[s..i]);
                }
                continue;
            }
            _ => {}
        }
        start.get_or_insert(i);
    }
    if let Some(s) = start {
        tokens.push(&value[s..]);
    }
    tokens
}

fn remap(color: Color, role: &Role) -> Option<Color> {
    if color.is_transparent() {
        return None;
    }
    let hsl = color.to_hsl();
    let mapped = match role {
        Role::Background if hsl.l > LIGHT_BACKGROUND => Hsl {
            h: hsl.h,
            s: hsl.s * 0.6,
            l: 0.07 + (1.0 - hsl.l) * 0.5,
        },
        Role::Foreground if hsl.l < DARK_TEXT && hsl.s < NEUTRAL_SATURATION => Hsl {
            h: hsl.h,
            s: hsl.s,
            l: 0.9 - hsl.l * 0.5,
        },
        Role::Foreground if hsl.l < DARK_TEXT => Hsl {
            h: hsl.h,
            s: hsl.s,
            l: 0.65,
        },
        _ => return None,
    };
    Some(Color::from_hsl(mapped, color.a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailframe_dom::parse_html;

    fn lightness(value: &str) -> f32 {
        Color::parse(value).unwrap().to_hsl().l
    }

    fn first(doc: &Document, tag: &str) -> NodeId {
        doc.elements_named(doc.root(), tag)[0]
    }

    #[test]
    fn darkens_light_backgrounds_and_lightens_dark_text() {
        let mut doc = parse_html(
            r##"<div style="background-color: #ffffff; color: #222222">x</div>"##,
        );
        let div = first(&doc, "div");
        assert!(apply_dark_mode_for_node(&mut doc, div));
        let style = doc.style(div);
        assert!(lightness(style.get("background-color").unwrap()) < 0.2);
        assert!(lightness(style.get("color").unwrap()) > 0.7);
        assert!(doc.element(div).unwrap().has_attr(DARK_MARKER));
    }

    #[test]
    fn leaves_brand_colors_alone() {
        let mut doc = parse_html(
            r##"<a style="background-color: #e53935; color: #ffeb3b">Buy</a>"##,
        );
        let a = first(&doc, "a");
        assert!(!apply_dark_mode_for_node(&mut doc, a));
        assert_eq!(
            doc.attr(a, "style"),
            Some("background-color: #e53935; color: #ffeb3b")
        );
    }

    #[test]
    fn saturated_dark_text_keeps_hue() {
        let mut doc = parse_html(r##"<span style="color: #0b0080">link</span>"##);
        let span = first(&doc, "span");
        assert!(apply_dark_mode_for_node(&mut doc, span));
        let before = Color::parse("#0b0080").unwrap().to_hsl();
        let after = Color::parse(doc.style(span).get("color").unwrap())
            .unwrap()
            .to_hsl();
        assert!((before.h - after.h).abs() < 2.0);
        assert!((after.l - 0.65).abs() < 0.01);
    }

    #[test]
    fn handles_legacy_attributes_and_shorthand() {
        let mut doc = parse_html(
            r##"<table bgcolor="#FFFFFF"><tr><td style="background: #fafafa url(x.png) no-repeat"><font color="black">t</font></td></tr></table>"##,
        );
        let container = doc.body().unwrap();
        assert_eq!(apply_dark_mode(&mut doc, container), 3);
        let table = first(&doc, "table");
        assert!(lightness(doc.attr(table, "bgcolor").unwrap()) < 0.2);
        let td = first(&doc, "td");
        let bg = doc.style(td).get("background").unwrap().to_string();
        assert!(bg.contains("x.png"));
        assert!(bg.contains("no-repeat"));
        assert!(!bg.contains("#fafafa"));
        let font = first(&doc, "font");
        assert!(lightness(doc.attr(font, "color").unwrap()) > 0.7);
    }

    #[test]
    fn background_color_is_found_anywhere_in_the_shorthand() {
        assert_eq!(
            top_level_tokens("url(a b.png)  no-repeat\t#fff"),
            ["url(a b.png)", "no-repeat", "#fff"]
        );
        let mapped = remap_value("url(x.png) no-repeat #ffffff", Role::Background).unwrap();
        let last = mapped.rsplit(' ').next().unwrap();
        assert!(mapped.starts_with("url(x.png) no-repeat "));
        assert!(lightness(last) < 0.2);
        assert_eq!(remap_value("url(x.png) no-repeat #333", Role::Background), None);
        assert_eq!(remap_value("none", Role::Background), None);
    }

    #[test]
    fn keeps_importance_and_alpha() {
        let mut doc =
            parse_html(r##"<p style="background-color: rgba(255,255,255,0.5) !important">x</p>"##);
        let p = first(&doc, "p");
        assert!(apply_dark_mode_for_node(&mut doc, p));
        let style = doc.style(p);
        let decl = style.declaration("background-color").unwrap();
        assert!(decl.important);
        assert!(decl.value.starts_with("rgba("));
    }

    #[test]
    fn skips_media_and_transparent() {
        let mut doc = parse_html(
            r##"<img style="background-color: #fff"><div style="background-color: transparent">x</div>"##,
        );
        let body = doc.body().unwrap();
        assert_eq!(apply_dark_mode(&mut doc, body), 0);
    }

    #[test]
    fn idempotent() {
        let html = r##"<div style="background-color:#fff"><p style="color:#000;background:#eee">a</p><font color="#333">b</font></div>"##;
        let mut once = parse_html(html);
        let body = once.body().unwrap();
        apply_dark_mode(&mut once, body);
        let snapshot = once.to_html();

        apply_dark_mode(&mut once, body);
        assert_eq!(once.to_html(), snapshot);

        // Even without the marker the remapped colors are out of the trigger bands.
        let mut stripped = once.clone();
        for n in stripped.descendants(body) {
            stripped.remove_attr(n, DARK_MARKER);
        }
        let before = stripped.to_html();
        assert_eq!(apply_dark_mode(&mut stripped, body), 0);
        assert_eq!(stripped.to_html(), before);
    }
}
