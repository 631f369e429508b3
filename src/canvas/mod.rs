pub mod frames;
pub mod overlay_surface;
