//! Stylesheets embedded in email markup.
//!
//! `<style>` text is parsed by lightningcss and flattened into the structure
//! needed to rewrite declarations: style rules with their selector text,
//! `@media` / `@supports` groups with nested rules, and serialized text for
//! everything else. Sheets referenced through `<link rel="stylesheet">` are
//! never fetched and refuse introspection, the way a browser refuses
//! `cssRules` on a cross-origin sheet.

use std::fmt::Write as _;

use lightningcss::rules::{CssRule as ParsedRule, CssRuleList};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet as ParsedSheet};
use lightningcss::traits::ToCss;

use crate::style::StyleDecls;
use crate::{NodeId, SheetError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSource {
    /// `<style>` element text.
    Inline,
    /// `<link rel="stylesheet" href="...">`; contents unavailable.
    External { href: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssRule {
    Style {
        selectors: String,
        declarations: StyleDecls,
    },
    Group {
        prelude: String,
        rules: Vec<CssRule>,
    },
    /// Any other rule, as serialized CSS text.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSheet {
    owner: Option<NodeId>,
    source: SheetSource,
    rules: Vec<CssRule>,
}

impl StyleSheet {
    /// Parse the text of a `<style>` element.
    pub fn parse(owner: Option<NodeId>, css: &str) -> Result<Self, SheetError> {
        let options = ParserOptions {
            error_recovery: true,
            ..ParserOptions::default()
        };
        let parsed =
            ParsedSheet::parse(css, options).map_err(|e| SheetError::Invalid(e.to_string()))?;
        Ok(Self {
            owner,
            source: SheetSource::Inline,
            rules: convert_rules(&parsed.rules)?,
        })
    }

    /// An inline sheet kept as opaque text, for CSS that could not be parsed.
    pub fn verbatim(owner: Option<NodeId>, css: &str) -> Self {
        Self {
            owner,
            source: SheetSource::Inline,
            rules: vec![CssRule::Raw(css.trim().to_string())],
        }
    }

    pub fn external(owner: Option<NodeId>, href: impl Into<String>) -> Self {
        Self {
            owner,
            source: SheetSource::External { href: href.into() },
            rules: Vec::new(),
        }
    }

    /// Node the sheet came from, if any.
    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    pub fn source(&self) -> &SheetSource {
        &self.source
    }

    pub fn rules(&self) -> Result<&[CssRule], SheetError> {
        self.check_access()?;
        Ok(&self.rules)
    }

    pub fn rules_mut(&mut self) -> Result<&mut Vec<CssRule>, SheetError> {
        self.check_access()?;
        Ok(&mut self.rules)
    }

    /// Visit every style rule's declarations, descending into grouping rules.
    pub fn for_each_declarations_mut(
        &mut self,
        mut f: impl FnMut(&mut StyleDecls),
    ) -> Result<(), SheetError> {
        fn walk(rules: &mut [CssRule], f: &mut dyn FnMut(&mut StyleDecls)) {
            for rule in rules {
                match rule {
                    CssRule::Style { declarations, .. } => f(declarations),
                    CssRule::Group { rules, .. } => walk(rules, f),
                    CssRule::Raw(_) => {}
                }
            }
        }
        walk(self.rules_mut()?, &mut f);
        Ok(())
    }

    fn check_access(&self) -> Result<(), SheetError> {
        match &self.source {
            SheetSource::Inline => Ok(()),
            SheetSource::External { href } => Err(SheetError::CrossOrigin { href: href.clone() }),
        }
    }

    /// Serialize back to CSS text. External sheets serialize to nothing.
    pub fn to_css(&self) -> String {
        let mut out = String::new();
        write_rules(&mut out, &self.rules);
        out
    }
}

fn write_rules(out: &mut String, rules: &[CssRule]) {
    for rule in rules {
        match rule {
            CssRule::Style {
                selectors,
                declarations,
            } => {
                let _ = writeln!(out, "{selectors} {{ {declarations} }}");
            }
            CssRule::Group { prelude, rules } => {
                let _ = writeln!(out, "{prelude} {{");
                write_rules(out, rules);
                out.push_str("}\n");
            }
            CssRule::Raw(text) => {
                out.push_str(text);
                out.push('\n');
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Conversion from lightningcss
// ---------------------------------------------------------------------------

fn convert_rules(rules: &CssRuleList<'_>) -> Result<Vec<CssRule>, SheetError> {
    rules.0.iter().map(convert_rule).collect()
}

fn convert_rule(rule: &ParsedRule<'_>) -> Result<CssRule, SheetError> {
    let converted = match rule {
        // Nested style rules have no flat equivalent; keep them as text.
        ParsedRule::Style(style) if style.rules.0.is_empty() => CssRule::Style {
            selectors: print(&style.selectors)?,
            declarations: StyleDecls::from_block(&style.declarations),
        },
        ParsedRule::Media(media) => CssRule::Group {
            prelude: format!("@media {}", print(&media.query)?),
            rules: convert_rules(&media.rules)?,
        },
        ParsedRule::Supports(supports) => CssRule::Group {
            prelude: format!("@supports {}", print(&supports.condition)?),
            rules: convert_rules(&supports.rules)?,
        },
        other => CssRule::Raw(print(other)?),
    };
    Ok(converted)
}

fn print(value: &impl ToCss) -> Result<String, SheetError> {
    value
        .to_css_string(PrinterOptions::default())
        .map_err(|e| SheetError::Invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(css: &str) -> StyleSheet {
        StyleSheet::parse(None, css).unwrap()
    }

    #[test]
    fn parses_style_rules() {
        let sheet = parse(".a { font-size: 12px; color: #333 } p{margin:0}");
        let rules = sheet.rules().unwrap();
        assert_eq!(rules.len(), 2);
        match &rules[0] {
            CssRule::Style {
                selectors,
                declarations,
            } => {
                assert_eq!(selectors, ".a");
                assert_eq!(declarations.get("font-size"), Some("12px"));
            }
            other => panic!("unexpected rule {other:?}"),
        }
    }

    #[test]
    fn parses_nested_media() {
        let css = "@media only screen and (max-width: 600px) { .x { font-size: 10px } .y { width: 100% } }\n.z { color: #00f }";
        let sheet = parse(css);
        let rules = sheet.rules().unwrap();
        assert_eq!(rules.len(), 2);
        match &rules[0] {
            CssRule::Group { prelude, rules } => {
                assert!(prelude.starts_with("@media"));
                assert!(prelude.contains("max-width"));
                assert_eq!(rules.len(), 2);
            }
            other => panic!("unexpected rule {other:?}"),
        }
    }

    #[test]
    fn keeps_other_at_rules_as_text() {
        let css = "@import url(\"a.css\");\n@font-face { font-family: X; src: url(x.woff) }\n";
        let sheet = parse(css);
        let rules = sheet.rules().unwrap();
        assert_eq!(rules.len(), 2);
        assert!(matches!(&rules[0], CssRule::Raw(t) if t.starts_with("@import")));
        assert!(matches!(&rules[1], CssRule::Raw(t) if t.starts_with("@font-face")));
    }

    #[test]
    fn skips_comments_and_html_markers() {
        let sheet = parse("<!-- /* hi */ .a { color: #333 } -->");
        assert_eq!(sheet.rules().unwrap().len(), 1);
    }

    #[test]
    fn recovers_from_bad_declarations() {
        let sheet = parse(".a { color: ; font-size: 12px }");
        match &sheet.rules().unwrap()[0] {
            CssRule::Style { declarations, .. } => {
                assert_eq!(declarations.get("font-size"), Some("12px"));
            }
            other => panic!("unexpected rule {other:?}"),
        }
    }

    #[test]
    fn external_sheet_refuses_access() {
        let mut sheet = StyleSheet::external(None, "https://cdn.example.com/a.css");
        assert!(matches!(
            sheet.rules(),
            Err(SheetError::CrossOrigin { href }) if href == "https://cdn.example.com/a.css"
        ));
        assert!(sheet.for_each_declarations_mut(|_| {}).is_err());
        assert_eq!(sheet.to_css(), "");
    }

    #[test]
    fn verbatim_sheet_serializes_its_text() {
        let mut sheet = StyleSheet::verbatim(None, " .a { font-size: 10px } ");
        let mut visited = 0;
        sheet.for_each_declarations_mut(|_| visited += 1).unwrap();
        assert_eq!(visited, 0);
        assert_eq!(sheet.to_css(), ".a { font-size: 10px }\n");
    }

    #[test]
    fn visits_declarations_in_groups() {
        let mut sheet = parse(".a { font-size: 10px } @media print { .b { font-size: 8px } }");
        let mut seen = Vec::new();
        sheet
            .for_each_declarations_mut(|d| seen.push(d.get("font-size").unwrap_or("").to_string()))
            .unwrap();
        assert_eq!(seen, vec!["10px", "8px"]);
    }

    #[test]
    fn serializes_back() {
        let sheet = parse("@media print { .b { font-size: 8px } } .a{color:#333}");
        assert_eq!(
            sheet.to_css(),
            "@media print {\n.b { font-size: 8px }\n}\n.a { color: #333 }\n"
        );
    }
}
