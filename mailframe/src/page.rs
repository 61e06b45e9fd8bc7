//! The email page controller.
//!
//! [`Page`] owns the content state, the document built from it, and the two
//! debounce timers. The host drives it: entry-point calls change state, and
//! [`Page::tick`] runs whatever has come due. Nothing here blocks or spawns.

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, warn};
use mailframe_dom::{parse_html, Document, EventType, ListenerAction, NodeId};
use url::Url;

use crate::bridge::{
    decode_html_payload, parse_flag, Bridge, Command, HostTransport, PageEvent, ScriptCall,
    SET_DARK_MODE, SET_HTML, SET_PREVIEW_MODE,
};
use crate::cleanup::{neutralize_objects, remove_provider_junk};
use crate::config::PipelineConfig;
use crate::dark_mode::apply_dark_mode;
use crate::debounce::Debounce;
use crate::error::BridgeError;
use crate::layout::{Layout, Viewport};
use crate::oversize::{fix_long_urls, limit_image_widths};
use crate::resize::{smart_resize, ResizeOutcome};

/// Height report triggered by a finished pipeline pass.
pub const HTML_RELOAD: &str = "html-reload";
/// Height report triggered by an image finishing loading.
pub const IMAGE_LOAD: &str = "image-load";
/// Height report triggered by a viewport change.
pub const WINDOW_RESIZE: &str = "window-resize";

const DARK_SHELL_CSS: &str =
    "html { background-color: transparent !important; } body { color: #fff; }";
const LIGHT_SHELL_CSS: &str =
    "html { background-color: #ffffff !important; } body.mailframe { background-color: #ffffff; }";

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Everything the rendered page is derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentState {
    pub html: String,
    pub is_dark_mode: bool,
    pub is_preview_mode: bool,
    /// The html contains an `img` or `video`; preview padding is not applied.
    pub has_media_content: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing has been set yet.
    #[default]
    Idle,
    /// The document reflects new state that has not been processed.
    ContentLoaded,
    /// The pipeline ran on the current document.
    Processed,
}

/// Result of dispatching a click.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClickOutcome {
    /// The click landed on a link and its navigation was suppressed.
    pub default_prevented: bool,
    /// URL reported to the host, if any.
    pub link: Option<String>,
    /// An element hid itself in response.
    pub hidden: bool,
}

type EntryPoint<L> = fn(&mut Page<L>, &str, Instant);

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

pub struct Page<L> {
    config: PipelineConfig,
    base_url: Option<Url>,
    state: ContentState,
    phase: Phase,
    document: Document,
    layout: L,
    bridge: Bridge,
    entry_points: HashMap<&'static str, EntryPoint<L>>,
    content_debounce: Debounce<()>,
    height_debounce: Debounce<&'static str>,
    last_resize: Option<ResizeOutcome>,
}

impl<L: Layout> Page<L> {
    pub fn new(layout: L, config: PipelineConfig) -> Self {
        let base_url = config.base_url.as_deref().and_then(|base| {
            Url::parse(base)
                .map_err(|e| warn!("ignoring base url {base:?}: {e}"))
                .ok()
        });
        let state = ContentState::default();
        let document = build_document(&state, &config);
        Self {
            content_debounce: Debounce::new(config.content_debounce()),
            height_debounce: Debounce::new(config.height_debounce()),
            config,
            base_url,
            state,
            phase: Phase::Idle,
            document,
            layout,
            bridge: Bridge::new(),
            entry_points: HashMap::new(),
            last_resize: None,
        }
    }

    /// Connect the page to the host's message channel.
    pub fn attach_transport(&mut self, transport: impl HostTransport + 'static) {
        self.bridge.attach(transport);
    }

    /// Register the host entry points and tell the host the page is ready.
    pub fn mount(&mut self) {
        let entries: [(&'static str, EntryPoint<L>); 3] = [
            (SET_HTML, |page, arg, now| page.set_html(arg, now)),
            (SET_DARK_MODE, |page, arg, now| page.set_dark_mode(arg, now)),
            (SET_PREVIEW_MODE, |page, arg, now| page.set_preview_mode(arg, now)),
        ];
        self.entry_points.extend(entries);
        self.bridge.post(&PageEvent::IsMounted);
    }

    pub fn is_mounted(&self) -> bool {
        !self.entry_points.is_empty()
    }

    /// Call a registered entry point by name.
    pub fn invoke(&mut self, name: &str, argument: &str, now: Instant) -> Result<(), BridgeError> {
        let entry = *self
            .entry_points
            .get(name)
            .ok_or_else(|| BridgeError::UnknownEntryPoint(name.to_string()))?;
        entry(self, argument, now);
        Ok(())
    }

    /// Run a host-injected `window.<name>('<arg>');true;` script.
    pub fn eval_script(&mut self, script: &str, now: Instant) -> Result<(), BridgeError> {
        let call = ScriptCall::parse(script)?;
        self.invoke(&call.name, &call.argument, now)
    }

    /// Apply a typed command through the entry-point table.
    pub fn apply(&mut self, command: &Command, now: Instant) -> Result<(), BridgeError> {
        self.invoke(command.name(), command.argument(), now)
    }

    // -- Entry points --

    /// `setHTML`: decode and store new content. Undecodable payloads are
    /// logged and leave the current content in place.
    pub fn set_html(&mut self, payload: &str, now: Instant) {
        let html = match decode_html_payload(payload) {
            Ok(html) => html,
            Err(BridgeError::EmptyPayload) => {
                debug!("ignoring empty setHTML payload");
                return;
            }
            Err(e) => {
                warn!("setHTML rejected: {e}");
                return;
            }
        };
        let has_media_content = has_media(&html);
        self.update_state(now, |state| {
            state.html = html;
            state.has_media_content = has_media_content;
        });
    }

    pub fn set_dark_mode(&mut self, flag: &str, now: Instant) {
        let on = parse_flag(flag);
        self.update_state(now, |state| state.is_dark_mode = on);
    }

    pub fn set_preview_mode(&mut self, flag: &str, now: Instant) {
        let on = parse_flag(flag);
        self.update_state(now, |state| state.is_preview_mode = on);
    }

    /// Only a real change rebuilds the document and re-arms the pipeline.
    fn update_state(&mut self, now: Instant, change: impl FnOnce(&mut ContentState)) {
        let mut next = self.state.clone();
        change(&mut next);
        if next == self.state {
            return;
        }
        self.state = next;
        self.document = build_document(&self.state, &self.config);
        self.phase = if self.state.html.is_empty() {
            Phase::Idle
        } else {
            Phase::ContentLoaded
        };
        self.content_debounce.schedule(now, ());
        debug!(
            "content state changed (dark: {}, preview: {}, {} bytes), pipeline armed",
            self.state.is_dark_mode,
            self.state.is_preview_mode,
            self.state.html.len()
        );
    }

    // -- Time --

    /// Run whatever has come due at `now`. Returns whether anything ran.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut ran = false;
        if self.content_debounce.take_due(now).is_some() {
            self.run_pipeline(now);
            ran = true;
        }
        if let Some(label) = self.height_debounce.take_due(now) {
            self.report_height(label);
            ran = true;
        }
        ran
    }

    /// Earliest instant at which [`Page::tick`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (
            self.content_debounce.deadline(),
            self.height_debounce.deadline(),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn run_pipeline(&mut self, now: Instant) {
        let container = self.container();
        match container {
            Some(container) => {
                let doc = &mut self.document;
                if self.state.is_dark_mode {
                    apply_dark_mode(doc, container);
                }
                for a in doc.elements_named(container, "a") {
                    doc.add_event_listener(a, EventType::Click, ListenerAction::ReportLink);
                }
                for img in doc.elements_named(container, "img") {
                    doc.add_event_listener(img, EventType::Load, ListenerAction::ReportHeight);
                }
                neutralize_objects(doc, container);
                fix_long_urls(doc, &self.layout, container, &self.config);
                limit_image_widths(doc, &self.layout, container);
            }
            None => warn!("container #{} not found", self.config.container_id),
        }

        let outcome = smart_resize(&mut self.document, &self.layout, container, &self.config);
        self.height_debounce.schedule(now, HTML_RELOAD);
        self.last_resize = Some(outcome);

        if let Some(container) = container {
            remove_provider_junk(&mut self.document, container, &self.config);
        }

        self.phase = Phase::Processed;
        self.bridge.post(&PageEvent::OnLoad);
        debug!("pipeline finished");
    }

    /// Content height scaled to the viewport width, as reported to the host.
    pub fn measure_height(&self) -> Option<u32> {
        let container = self.container()?;
        let scroll_width = self.layout.scroll_width(&self.document, container);
        if scroll_width <= 0.0 {
            return None;
        }
        let scroll_height = self.layout.scroll_height(&self.document, container);
        let height = (scroll_height / scroll_width * self.layout.viewport().width).ceil();
        Some(height.max(0.0) as u32)
    }

    fn report_height(&mut self, label: &str) {
        self.bridge.post(&PageEvent::Debugger(label.to_string()));
        if self.layout.viewport().fullscreen {
            debug!("fullscreen, height report suppressed");
            return;
        }
        if let Some(height) = self.measure_height() {
            self.bridge.post(&PageEvent::HeightChange(height));
        }
    }

    // -- DOM events --

    /// Dispatch a click on `node`, bubbling through its ancestors.
    pub fn click(&mut self, node: NodeId) -> ClickOutcome {
        let mut outcome = ClickOutcome {
            // A tap on a link never navigates the web view itself.
            default_prevented: self.document.closest(node, "a").is_some(),
            ..ClickOutcome::default()
        };
        let mut current = Some(node);
        while let Some(target) = current {
            for action in self.document.listeners(target, EventType::Click) {
                match action {
                    ListenerAction::ReportLink if outcome.link.is_none() => {
                        let href = self.document.attr(target, "href").unwrap_or_default();
                        let link = self.resolve_href(href);
                        self.bridge.post(&PageEvent::ClickLink(link.clone()));
                        outcome.link = Some(link);
                    }
                    ListenerAction::HideOnClick => {
                        self.document
                            .set_style_property(target, "display", "none");
                        outcome.hidden = true;
                    }
                    _ => {}
                }
            }
            current = self.document.parent(target);
        }
        outcome
    }

    /// An image finished loading. Returns whether a height report was armed.
    pub fn image_loaded(&mut self, img: NodeId, now: Instant) -> bool {
        let wired = self
            .document
            .listeners(img, EventType::Load)
            .contains(&ListenerAction::ReportHeight);
        if wired {
            self.height_debounce.schedule(now, IMAGE_LOAD);
        }
        wired
    }

    /// The web view changed size (or entered/left fullscreen).
    pub fn resize(&mut self, viewport: Viewport, now: Instant) {
        self.layout.set_viewport(viewport);
        self.height_debounce.schedule(now, WINDOW_RESIZE);
    }

    fn resolve_href(&self, href: &str) -> String {
        let resolved = match &self.base_url {
            Some(base) => base.join(href),
            None => Url::parse(href),
        };
        resolved.map_or_else(|_| href.to_string(), String::from)
    }

    // -- Accessors --

    pub fn container(&self) -> Option<NodeId> {
        self.document.element_by_id(&self.config.container_id)
    }

    pub fn state(&self) -> &ContentState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn layout(&self) -> &L {
        &self.layout
    }

    pub fn layout_mut(&mut self) -> &mut L {
        &mut self.layout
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Outcome of the most recent smart-resize pass.
    pub fn last_resize(&self) -> Option<&ResizeOutcome> {
        self.last_resize.as_ref()
    }

    pub fn to_html(&self) -> String {
        self.document.to_html()
    }
}

fn has_media(html: &str) -> bool {
    let doc = parse_html(html);
    let root = doc.root();
    !doc.elements_named(root, "img").is_empty() || !doc.elements_named(root, "video").is_empty()
}

/// Page shell around the email markup: the theme stylesheet and the
/// container element the pipeline works on.
fn build_document(state: &ContentState, config: &PipelineConfig) -> Document {
    let theme = if state.is_dark_mode {
        DARK_SHELL_CSS
    } else {
        LIGHT_SHELL_CSS
    };
    let padding = if state.is_preview_mode && !state.has_media_content {
        format!(
            r#" style="padding-left: {0}; padding-right: {0}""#,
            config.preview_padding
        )
    } else {
        String::new()
    };
    let shell = format!(
        r#"<!DOCTYPE html><html><head><style>{theme}</style></head><body class="mailframe"><div id="{id}"{padding}>{html}</div></body></html>"#,
        id = config.container_id,
        html = state.html,
    );
    parse_html(&shell)
}
