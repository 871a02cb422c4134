use std::path::Path;

use framecap::config::find_font;
use framecap::overlay::{Overlay, OverlayStyle};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

pub mod camera;
pub mod video;
pub mod window;

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_env_filter(filter)
        .init();
}

/// Default overlay with the best label font available.
pub fn overlay(font: Option<&Path>) -> Overlay {
    Overlay::new(OverlayStyle::default()).with_optional_font(find_font(font).as_deref())
}
