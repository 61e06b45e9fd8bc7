//! Inline style declarations and CSS lengths.
//!
//! Email markup carries nearly all of its presentation in `style` attributes,
//! so the pipeline reads and rewrites declarations in place. Declarations are
//! parsed by lightningcss with error recovery on: invalid declarations are
//! dropped, unknown properties (`mso-hide`) are kept, and values come back in
//! lightningcss's serialized form (`#FFFFFF` reads as `#fff`).

use std::fmt;

use lightningcss::declaration::DeclarationBlock;
use lightningcss::properties::Property;
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleAttribute};
use log::debug;

/// Default font size of the page, matching the web view's user agent.
pub const DEFAULT_FONT_SIZE_PX: f32 = 16.0;

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// A single `name: value [!important]` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
    pub important: bool,
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)?;
        if self.important {
            f.write_str(" !important")?;
        }
        Ok(())
    }
}

/// Ordered list of declarations, as found in a `style` attribute or a rule body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleDecls {
    decls: Vec<Declaration>,
}

impl StyleDecls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a declaration block. Later duplicates replace earlier ones.
    pub fn parse(input: &str) -> Self {
        let options = ParserOptions {
            error_recovery: true,
            ..ParserOptions::default()
        };
        match StyleAttribute::parse(input, options) {
            Ok(attr) => Self::from_block(&attr.declarations),
            Err(e) => {
                debug!("dropping unparsable style {input:?}: {e}");
                Self::new()
            }
        }
    }

    /// Collect the declarations of a parsed lightningcss block.
    pub(crate) fn from_block(block: &DeclarationBlock<'_>) -> Self {
        let mut out = Self::new();
        let all = block
            .declarations
            .iter()
            .map(|p| (p, false))
            .chain(block.important_declarations.iter().map(|p| (p, true)));
        for (property, important) in all {
            if let Some((name, value)) = split_property(property) {
                out.set_with_priority(&name, value, important);
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.decls.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Declaration> {
        self.decls.iter_mut()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.declaration(name).map(|d| d.value.as_str())
    }

    pub fn declaration(&self, name: &str) -> Option<&Declaration> {
        self.decls.iter().find(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// Set a property, keeping the existing priority and position if present.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .decls
            .iter_mut()
            .find(|d| d.name.eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.value = value,
            None => self.decls.push(Declaration {
                name: name.to_ascii_lowercase(),
                value,
                important: false,
            }),
        }
    }

    pub fn set_with_priority(&mut self, name: &str, value: impl Into<String>, important: bool) {
        self.set(name, value);
        if let Some(d) = self
            .decls
            .iter_mut()
            .find(|d| d.name.eq_ignore_ascii_case(name))
        {
            d.important = important;
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Declaration> {
        let pos = self
            .decls
            .iter()
            .position(|d| d.name.eq_ignore_ascii_case(name))?;
        Some(self.decls.remove(pos))
    }
}

impl fmt::Display for StyleDecls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, decl) in self.decls.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{decl}")?;
        }
        Ok(())
    }
}

/// `(name, value)` of a property as lightningcss serializes it.
fn split_property(property: &Property<'_>) -> Option<(String, String)> {
    let css = property
        .to_css_string(false, PrinterOptions::default())
        .map_err(|e| debug!("cannot serialize declaration: {e}"))
        .ok()?;
    let (name, value) = css.split_once(':')?;
    let name = name.trim().to_ascii_lowercase();
    let value = value.trim();
    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some((name, value.to_string()))
}

// ---------------------------------------------------------------------------
// Lengths
// ---------------------------------------------------------------------------

/// A CSS length in one of the units email markup actually uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Length {
    Px(f32),
    Pt(f32),
    Em(f32),
    Rem(f32),
    Ex(f32),
    Percent(f32),
}

impl Length {
    /// Parse `12px`, `9pt`, `1.5em`, `50%`, or a bare number (treated as px,
    /// which is what HTML `width`/`height` attributes mean).
    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim().to_ascii_lowercase();
        let (number, ctor): (&str, fn(f32) -> Length) = if let Some(n) = s.strip_suffix("px") {
            (n, Length::Px)
        } else if let Some(n) = s.strip_suffix("pt") {
            (n, Length::Pt)
        } else if let Some(n) = s.strip_suffix("rem") {
            (n, Length::Rem)
        } else if let Some(n) = s.strip_suffix("em") {
            (n, Length::Em)
        } else if let Some(n) = s.strip_suffix("ex") {
            (n, Length::Ex)
        } else if let Some(n) = s.strip_suffix('%') {
            (n, Length::Percent)
        } else {
            (s.as_str(), Length::Px)
        };
        let value: f32 = number.trim().parse().ok()?;
        value.is_finite().then(|| ctor(value))
    }

    /// Resolve to pixels. `font_px` is the font size in effect, `percent_base`
    /// is what `100%` refers to in the current context.
    pub fn to_px(self, font_px: f32, percent_base: f32) -> f32 {
        match self {
            Length::Px(v) => v,
            Length::Pt(v) => v * 96.0 / 72.0,
            Length::Em(v) => v * font_px,
            Length::Rem(v) => v * DEFAULT_FONT_SIZE_PX,
            Length::Ex(v) => v * font_px * 0.5,
            Length::Percent(v) => v / 100.0 * percent_base,
        }
    }

    /// Absolute lengths scale; relative ones already follow their reference.
    pub fn scaled(self, factor: f32) -> Option<Self> {
        match self {
            Length::Px(v) => Some(Length::Px(v * factor)),
            Length::Pt(v) => Some(Length::Pt(v * factor)),
            _ => None,
        }
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (v, unit) = match *self {
            Length::Px(v) => (v, "px"),
            Length::Pt(v) => (v, "pt"),
            Length::Em(v) => (v, "em"),
            Length::Rem(v) => (v, "rem"),
            Length::Ex(v) => (v, "ex"),
            Length::Percent(v) => (v, "%"),
        };
        write!(f, "{}{}", format_number(v), unit)
    }
}

/// Format a number with at most four decimals and no trailing zeros.
pub fn format_number(v: f32) -> String {
    let s = format!("{v:.4}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// `format_number` with a `px` suffix.
pub fn format_px(v: f32) -> String {
    format!("{}px", format_number(v))
}

/// Map a legacy `<font size>` value (1-7, or `+n`/`-n` relative to 3) to pixels.
pub fn html_font_size_px(size: &str) -> Option<f32> {
    let s = size.trim();
    let level: i32 = if let Some(rel) = s.strip_prefix('+') {
        3 + rel.trim().parse::<i32>().ok()?
    } else if s.starts_with('-') {
        3 + s.parse::<i32>().ok()?
    } else {
        s.parse().ok()?
    };
    let px = match level.clamp(1, 7) {
        1 => 10.0,
        2 => 13.0,
        3 => 16.0,
        4 => 18.0,
        5 => 24.0,
        6 => 32.0,
        _ => 48.0,
    };
    Some(px)
}
