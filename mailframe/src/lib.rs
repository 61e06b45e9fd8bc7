//! In-page normalization of HTML email for a mobile web view.
//!
//! The host (a native mail app) injects markup through a small script bridge;
//! the [`Page`] rebuilds its document from that state, runs the normalization
//! pipeline once input settles, and reports the resulting content height and
//! any link taps back to the host. Geometry comes from a [`Layout`], which the
//! host backs with its rendering engine or with [`EstimatedLayout`].
//!
//! The passes are also usable on their own against a
//! [`mailframe_dom::Document`]: [`apply_dark_mode`], [`fix_long_url`],
//! [`limit_image_width`], [`smart_resize`] and [`remove_provider_junk`].

pub mod bridge;
pub mod cleanup;
pub mod color;
pub mod config;
pub mod dark_mode;
pub mod debounce;
pub mod error;
pub mod layout;
pub mod oversize;
pub mod page;
pub mod resize;

pub use bridge::{
    decode_html_payload, encode_html_payload, parse_flag, Bridge, BridgeMessage, Command,
    EventKind, HostTransport, PageEvent,
};
pub use cleanup::{neutralize_objects, remove_provider_junk};
pub use color::Color;
pub use config::PipelineConfig;
pub use dark_mode::{apply_dark_mode, apply_dark_mode_for_node};
pub use debounce::Debounce;
pub use error::{BridgeError, ConfigError, ResizeError};
pub use layout::{EstimatedLayout, Layout, Size, Viewport};
pub use oversize::{fix_long_url, limit_image_width};
pub use page::{ClickOutcome, ContentState, Page, Phase};
pub use resize::{smart_resize, ResizeOutcome, ScaleContext};

pub use mailframe_dom as dom;
