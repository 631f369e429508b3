//! Rendering core for multiplexed tissue images viewed through a deep-zoom
//! viewer: tile cache, transfer-function compositing, and the gating overlay.
//!
//! Everything here is single-threaded and callback driven. Collaborators the
//! browser provides (tile loader, overlay canvas, animation frames, viewport
//! geometry) are traits so the logic runs and tests natively.

pub mod channel;
pub mod compositor;
pub mod config;
pub mod entity;
pub mod error;
pub mod overlay;
pub mod tile;
pub mod tile_cache;
pub mod transfer;
pub mod viewport;

pub use error::{Error, FetchError, Result};
