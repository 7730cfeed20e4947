//! Upload & Annotate Panel.
//!
//! The panel logic in [`panel`] is plain Rust and runs anywhere; the `dom`
//! module binds it to the page when compiled for `wasm32`.

pub mod api;
pub mod cards;
pub mod geometry;
pub mod logging;
pub mod panel;
pub mod upload;

#[cfg(target_arch = "wasm32")]
mod dom;

pub use panel::{Panel, PanelEffect, PanelEvent};
