//! Host/page bridge protocol.
//!
//! The host drives the page by injecting one-line scripts of the form
//! `window.setHTML('<base64>');true;` and listens for JSON envelopes
//! `{"type": ..., "data": ...}` posted back over its message channel. Both
//! directions are encoded and decoded here so host and page agree on the wire
//! format.

use std::borrow::Cow;
use std::sync::LazyLock;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use encoding_rs::UTF_8;
use log::{trace, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeError;

// ---------------------------------------------------------------------------
// Entry point names
// ---------------------------------------------------------------------------

pub const SET_HTML: &str = "setHTML";
pub const SET_DARK_MODE: &str = "setDarkMode";
pub const SET_PREVIEW_MODE: &str = "setPreviewMode";

/// Standard alphabet, padding optional. The host's encoder always pads, but
/// hand-built payloads often do not.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

static VIEWPORT_META: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^<>]*name\s*=\s*["']?viewport["']?[^<>]*/?>"#)
        .expect("viewport meta pattern is valid")
});

static SCRIPT_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*window\.(\w+)\(\s*(?:'((?:[^'\\]|\\.)*)')?\s*\)\s*;?\s*(?:true\s*;?\s*)?$")
        .expect("script call pattern is valid")
});

/// Boolean flags cross the bridge as the literal words `true` / `false`.
/// Anything other than exactly `"true"` is false.
pub fn parse_flag(value: &str) -> bool {
    value == "true"
}

fn flag_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

// ---------------------------------------------------------------------------
// setHTML payloads
// ---------------------------------------------------------------------------

/// Decode a `setHTML` argument into markup ready to inject.
///
/// Base64 (whitespace tolerated, padding optional) → UTF-8 → viewport
/// `<meta>` removal, since the page shell owns the viewport.
///
/// The host always encodes the markup string as UTF-8, so `<meta charset>`
/// declarations left in the body describe the original message, not the
/// payload, and are ignored.
pub fn decode_html_payload(payload: &str) -> Result<String, BridgeError> {
    if payload.trim().is_empty() {
        return Err(BridgeError::EmptyPayload);
    }
    let bytes = match LENIENT_BASE64.decode(payload) {
        Ok(bytes) => bytes,
        Err(first) => {
            let cleaned: String = payload
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            LENIENT_BASE64.decode(cleaned).map_err(|_| first)?
        }
    };
    let html = decode_utf8(&bytes)?;
    Ok(strip_viewport_meta(&html).into_owned())
}

/// Strict UTF-8 with a leading BOM dropped.
fn decode_utf8(bytes: &[u8]) -> Result<String, BridgeError> {
    match UTF_8.decode_with_bom_removal(bytes) {
        (_, true) => Err(BridgeError::InvalidUtf8),
        (text, false) => Ok(text.into_owned()),
    }
}

/// Host side of [`decode_html_payload`].
pub fn encode_html_payload(html: &str) -> String {
    STANDARD.encode(html.as_bytes())
}

pub fn strip_viewport_meta(html: &str) -> Cow<'_, str> {
    VIEWPORT_META.replace_all(html, "")
}

// ---------------------------------------------------------------------------
// Host → page commands
// ---------------------------------------------------------------------------

/// A parsed `window.<name>('<argument>')` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCall {
    pub name: String,
    pub argument: String,
}

impl ScriptCall {
    pub fn parse(script: &str) -> Result<Self, BridgeError> {
        let caps = SCRIPT_CALL
            .captures(script)
            .ok_or_else(|| BridgeError::MalformedScript(script.to_string()))?;
        let name = caps[1].to_string();
        let argument = caps.get(2).map_or(String::new(), |m| unescape(m.as_str()));
        Ok(Self { name, argument })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Base64-encoded markup.
    SetHtml(String),
    SetDarkMode(bool),
    SetPreviewMode(bool),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetHtml(_) => SET_HTML,
            Command::SetDarkMode(_) => SET_DARK_MODE,
            Command::SetPreviewMode(_) => SET_PREVIEW_MODE,
        }
    }

    /// The string argument as it travels over the bridge.
    pub fn argument(&self) -> &str {
        match self {
            Command::SetHtml(payload) => payload,
            Command::SetDarkMode(flag) | Command::SetPreviewMode(flag) => flag_str(*flag),
        }
    }

    /// The script the host injects to deliver this command.
    pub fn to_script(&self) -> String {
        format!("window.{}('{}');true;", self.name(), escape(self.argument()))
    }

    pub fn from_script(script: &str) -> Result<Self, BridgeError> {
        Self::try_from(ScriptCall::parse(script)?)
    }
}

impl TryFrom<ScriptCall> for Command {
    type Error = BridgeError;

    fn try_from(call: ScriptCall) -> Result<Self, Self::Error> {
        match call.name.as_str() {
            SET_HTML => Ok(Command::SetHtml(call.argument)),
            SET_DARK_MODE => Ok(Command::SetDarkMode(parse_flag(&call.argument))),
            SET_PREVIEW_MODE => Ok(Command::SetPreviewMode(parse_flag(&call.argument))),
            _ => Err(BridgeError::UnknownEntryPoint(call.name)),
        }
    }
}

fn escape(arg: &str) -> Cow<'_, str> {
    if arg.contains(['\\', '\'']) {
        Cow::Owned(arg.replace('\\', "\\\\").replace('\'', "\\'"))
    } else {
        Cow::Borrowed(arg)
    }
}

fn unescape(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut chars = arg.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Page → host events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    IsMounted,
    OnLoad,
    HeightChange,
    ClickLink,
    Debugger,
}

/// The JSON envelope posted to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeMessage {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub data: Value,
}

/// Typed view of [`BridgeMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// Page is ready; the host should send the initial state.
    IsMounted,
    /// A processing pass finished.
    OnLoad,
    /// Content height in CSS pixels.
    HeightChange(u32),
    /// The user tapped a link; the host decides whether to navigate.
    ClickLink(String),
    /// What triggered a height recomputation.
    Debugger(String),
}

impl PageEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PageEvent::IsMounted => EventKind::IsMounted,
            PageEvent::OnLoad => EventKind::OnLoad,
            PageEvent::HeightChange(_) => EventKind::HeightChange,
            PageEvent::ClickLink(_) => EventKind::ClickLink,
            PageEvent::Debugger(_) => EventKind::Debugger,
        }
    }

    pub fn to_message(&self) -> BridgeMessage {
        let data = match self {
            PageEvent::IsMounted | PageEvent::OnLoad => Value::Bool(true),
            PageEvent::HeightChange(h) => Value::from(*h),
            PageEvent::ClickLink(s) | PageEvent::Debugger(s) => Value::from(s.as_str()),
        };
        BridgeMessage {
            kind: self.kind(),
            data,
        }
    }

    pub fn to_json(&self) -> Result<String, BridgeError> {
        Ok(serde_json::to_string(&self.to_message())?)
    }

    /// Host side: decode a posted envelope.
    pub fn from_json(json: &str) -> Result<Self, BridgeError> {
        Self::try_from(serde_json::from_str::<BridgeMessage>(json)?)
    }
}

impl TryFrom<BridgeMessage> for PageEvent {
    type Error = BridgeError;

    fn try_from(msg: BridgeMessage) -> Result<Self, Self::Error> {
        let unexpected = || BridgeError::UnexpectedData { kind: msg.kind };
        match msg.kind {
            EventKind::IsMounted => Ok(PageEvent::IsMounted),
            EventKind::OnLoad => Ok(PageEvent::OnLoad),
            EventKind::HeightChange => msg
                .data
                .as_u64()
                .and_then(|h| u32::try_from(h).ok())
                .map(PageEvent::HeightChange)
                .ok_or_else(unexpected),
            EventKind::ClickLink => msg
                .data
                .as_str()
                .map(|s| PageEvent::ClickLink(s.to_string()))
                .ok_or_else(unexpected),
            EventKind::Debugger => msg
                .data
                .as_str()
                .map(|s| PageEvent::Debugger(s.to_string()))
                .ok_or_else(unexpected),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Outbound channel to the host (the web view's message handler).
pub trait HostTransport {
    fn post_message(&mut self, json: String);
}

impl<F: FnMut(String)> HostTransport for F {
    fn post_message(&mut self, json: String) {
        self(json)
    }
}

/// Page side of the bridge. Posting without an attached transport (the page
/// opened standalone) does nothing.
#[derive(Default)]
pub struct Bridge {
    transport: Option<Box<dyn HostTransport>>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl Bridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, transport: impl HostTransport + 'static) {
        self.transport = Some(Box::new(transport));
    }

    pub fn detach(&mut self) {
        self.transport = None;
    }

    pub fn is_attached(&self) -> bool {
        self.transport.is_some()
    }

    /// Serialize `{type, data}` and hand it to the host.
    pub fn post_message(&mut self, kind: EventKind, data: Value) {
        let Some(transport) = self.transport.as_mut() else {
            trace!("no host transport, dropping {kind:?}");
            return;
        };
        match serde_json::to_string(&BridgeMessage { kind, data }) {
            Ok(json) => transport.post_message(json),
            Err(e) => warn!("failed to encode {kind:?} message: {e}"),
        }
    }

    pub fn post(&mut self, event: &PageEvent) {
        let BridgeMessage { kind, data } = event.to_message();
        self.post_message(kind, data);
    }
}
