//! Browser bindings for the multiplexed tissue image viewer.
//!
//! Compositing, caching and overlay layout live in `cycif-core`; this crate
//! connects them to the deep-zoom viewer, the tile canvases and the overlay
//! canvas.

pub mod canvas;
pub mod loader;
pub mod viewer;

pub use viewer::ImageViewer;

use wasm_bindgen::prelude::*;

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    if console_log::init_with_level(log::Level::Debug).is_err() {
        log::warn!("logger already initialised");
    }
}
