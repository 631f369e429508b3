//! `ImageViewer`: the object the host page wires into the deep-zoom viewer.
//!
//! The host forwards tile-loaded / tile-unloaded events, installs
//! `render_tile` as the per-tile pixel processor, forwards animation start and
//! finish, and calls the `update_*` methods from its channel, gating and
//! selection widgets.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use cycif_core::channel::{ChannelSet, ColorStop};
use cycif_core::compositor::{Compositor, RenderOutcome, TileLoader};
use cycif_core::config::{BlendMode, ViewerConfig};
use cycif_core::entity::{entity_map_from_json, ColorScheme, PhenotypePalette, SelectionState, SharedPalette};
use cycif_core::overlay::{FrameScheduler, GatingRanges, OverlaySurface, SelectionOverlay};
use cycif_core::tile::TileAddress;
use cycif_core::tile_cache::TileCache;
use cycif_core::transfer::Rgb;
use cycif_core::viewport::{Rect, ViewerGeometry, ViewportSync, ZoomState};
use js_sys::{Function, Promise};
use wasm_bindgen::prelude::*;
use wasm_bindgen::Clamped;
use wasm_bindgen_futures::future_to_promise;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, ImageData};
use crate::canvas::frames::AnimationFrames;
use crate::canvas::overlay_surface::CanvasSurface;
use crate::loader::JsTileLoader;

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Viewport state as reported by the host at animation finish.
#[derive(Clone, Copy, Debug)]
struct ViewportSnapshot {
    image_rect: Rect,
    zoom: ZoomState,
    /// Image width in pixels; one viewport unit spans the full width.
    image_width: f64,
}

impl ViewerGeometry for ViewportSnapshot {
    fn visible_image_rect(&self) -> Rect {
        self.image_rect
    }

    fn zoom(&self) -> ZoomState {
        self.zoom
    }

    fn image_to_viewport(&self, r: Rect) -> Rect {
        let s = self.image_width;
        Rect::new(r.x / s, r.y / s, r.width / s, r.height / s)
    }
}

fn parse_stop(stop: &str) -> Result<ColorStop, JsValue> {
    match stop {
        "start" | "black" => Ok(ColorStop::Start),
        "end" | "white" => Ok(ColorStop::End),
        other => Err(JsValue::from_str(&format!("unknown colour stop {other}"))),
    }
}

#[wasm_bindgen]
pub struct ImageViewer {
    config: ViewerConfig,
    cache: Rc<RefCell<TileCache>>,
    channels: Rc<RefCell<ChannelSet>>,
    selection: Rc<SelectionState>,
    palette: Rc<SharedPalette>,
    gating: Rc<RefCell<GatingRanges>>,
    compositor: Rc<Compositor>,
    overlay: SelectionOverlay,
    last_viewport: Cell<Option<ViewportSnapshot>>,
}

#[wasm_bindgen]
impl ImageViewer {
    /// `fetch_tile(url) -> Promise` queues an out-of-band tile job on the
    /// host viewer. `overlay_canvas` is the gating overlay element.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str, fetch_tile: Function, overlay_canvas: HtmlCanvasElement) -> Result<ImageViewer, JsValue> {
        let config = ViewerConfig::from_json(config_json).map_err(js_err)?;
        let cache = Rc::new(RefCell::new(TileCache::new(config.tile_cache_capacity)));
        let channels = Rc::new(RefCell::new(ChannelSet::from_config(&config).map_err(js_err)?));
        let selection = Rc::new(SelectionState::new());
        let palette = Rc::new(SharedPalette::default());
        let gating = Rc::new(RefCell::new(GatingRanges::default()));

        let loader: Rc<dyn TileLoader> = Rc::new(JsTileLoader::new(fetch_tile));
        let compositor = Rc::new(Compositor::new(
            Rc::clone(&cache),
            Rc::clone(&channels),
            Rc::clone(&selection),
            Rc::clone(&palette) as Rc<dyn ColorScheme>,
            loader,
            config.blend,
        ));

        let surface: Rc<dyn OverlaySurface> = Rc::new(CanvasSurface::new(overlay_canvas, config.overlay.px_ratio)?);
        let frames: Rc<dyn FrameScheduler> = Rc::new(AnimationFrames);
        let overlay = SelectionOverlay::new(
            surface,
            frames,
            Rc::clone(&selection),
            Rc::clone(&channels),
            Rc::clone(&gating),
            config.overlay.clone(),
        );

        log::info!(
            "image viewer ready: {} channels, label layer {}",
            config.channels.len(),
            if config.label_branch().is_some() { "present" } else { "absent" },
        );

        Ok(Self {
            config,
            cache,
            channels,
            selection,
            palette,
            gating,
            compositor,
            overlay,
            last_viewport: Cell::new(None),
        })
    }

    // ── Tile events ─────────────────────────────────────────────────────────

    pub fn tile_loaded(&self, url: &str, payload: &[u8]) -> Result<(), JsValue> {
        let address = TileAddress::parse(url).map_err(js_err)?;
        self.cache.borrow_mut().tile_loaded(address, payload).map_err(|e| {
            log::warn!("dropping undecodable tile {url}: {e}");
            js_err(e)
        })
    }

    pub fn tile_unloaded(&self, url: &str) {
        match TileAddress::parse(url) {
            Ok(address) => self.cache.borrow_mut().tile_unloaded(&address),
            Err(e) => log::debug!("{e}"),
        }
    }

    /// Pixel processor for the tile being drawn into `ctx`. The returned
    /// promise resolves once compositing (including any emergency label
    /// fetch) has finished and the pixels are back on the canvas.
    pub fn render_tile(&self, url: String, ctx: CanvasRenderingContext2d) -> Promise {
        let compositor = Rc::clone(&self.compositor);
        future_to_promise(async move {
            let address = TileAddress::parse(&url).map_err(js_err)?;
            let canvas = ctx
                .canvas()
                .ok_or_else(|| JsValue::from_str("tile context has no canvas"))?;
            let (w, h) = (canvas.width(), canvas.height());
            let image = ctx.get_image_data(0.0, 0.0, w as f64, h as f64)?;
            let mut pixels = image.data().0;

            let outcome = compositor.render_tile(&address, &mut pixels).await;
            if let RenderOutcome::Composited { .. } = outcome {
                let out = ImageData::new_with_u8_clamped_array_and_sh(Clamped(&pixels[..]), w, h)?;
                ctx.put_image_data(&out, 0.0, 0.0)?;
            }
            Ok(JsValue::from_str(&format!("{outcome:?}")))
        })
    }

    // ── Viewport events ─────────────────────────────────────────────────────

    pub fn animation_start(&self) {
        self.overlay.on_motion_start();
    }

    /// `x, y, width, height` is the visible region in image pixels.
    #[allow(clippy::too_many_arguments)]
    pub fn animation_finish(
        &self,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        zoom: f64,
        min_zoom: f64,
        max_zoom: f64,
        image_width: f64,
    ) {
        let snapshot = ViewportSnapshot {
            image_rect: Rect::new(x, y, width, height),
            zoom: ZoomState { current: zoom, min: min_zoom, max: max_zoom },
            image_width,
        };
        self.last_viewport.set(Some(snapshot));
        self.overlay.on_motion_finish(&snapshot);
    }

    /// Viewport rectangle `[x, y, width, height]` framing an image region.
    /// Empty before the first animation finish.
    pub fn focus_bounds(&self, x: f64, y: f64, width: f64, height: f64) -> Vec<f64> {
        match self.last_viewport.get() {
            Some(snapshot) => {
                let r = ViewportSync::focus_bounds(Rect::new(x, y, width, height), &snapshot);
                vec![r.x, r.y, r.width, r.height]
            }
            None => Vec::new(),
        }
    }

    // ── Channels ────────────────────────────────────────────────────────────

    pub fn update_active_channel(&self, full_name: &str, active: bool) -> Result<(), JsValue> {
        self.channels.borrow_mut().set_active(full_name, active).map_err(js_err)?;
        self.overlay.refresh();
        Ok(())
    }

    pub fn update_channel_range(&self, full_name: &str, min: f64, max: f64) -> Result<(), JsValue> {
        self.channels.borrow_mut().update_range(full_name, min, max).map_err(js_err)
    }

    /// `stop` is `"start"` or `"end"` (`"black"` / `"white"` also accepted).
    pub fn update_channel_color(&self, full_name: &str, stop: &str, r: u8, g: u8, b: u8) -> Result<(), JsValue> {
        let stop = parse_stop(stop)?;
        self.channels.borrow_mut().update_color(full_name, stop, [r, g, b]).map_err(js_err)?;
        self.overlay.refresh();
        Ok(())
    }

    /// Full channel name for a short display name.
    pub fn full_channel_name(&self, short: &str) -> Option<String> {
        self.channels.borrow().full_name(short).map(str::to_string)
    }

    pub fn short_channel_name(&self, full: &str) -> Option<String> {
        self.channels.borrow().short_name(full).map(str::to_string)
    }

    // ── Rendering mode ──────────────────────────────────────────────────────

    /// Toggle `"show-subset"` or `"show-selection"`.
    pub fn update_rendering_mode(&self, mode: &str) -> Result<(), JsValue> {
        let current = self.compositor.mode();
        let next = match mode {
            "show-subset" => current.toggle_subset(),
            "show-selection" => current.toggle_selection(),
            other => return Err(JsValue::from_str(&format!("unknown rendering mode {other}"))),
        };
        log::debug!("display mode {current:?} -> {next:?}");
        self.compositor.set_mode(next);
        Ok(())
    }

    pub fn set_blend_mode(&self, mode: &str) -> Result<(), JsValue> {
        let blend = match mode {
            "additive" => BlendMode::Additive,
            "max" => BlendMode::Max,
            other => return Err(JsValue::from_str(&format!("unknown blend mode {other}"))),
        };
        self.compositor.set_blend(blend);
        Ok(())
    }

    pub fn shows_subset(&self) -> bool {
        self.compositor.mode().shows_subset()
    }

    pub fn shows_selection(&self) -> bool {
        self.compositor.mode().shows_selection()
    }

    // ── Data layer ──────────────────────────────────────────────────────────

    /// Replace the selection with a JSON array of entity records.
    pub fn update_selection(&self, records_json: &str) -> Result<(), JsValue> {
        let records: Vec<serde_json::Value> = serde_json::from_str(records_json).map_err(js_err)?;
        self.selection
            .replace_selection(entity_map_from_json(&records, &self.config.feature_data));
        self.overlay.refresh();
        Ok(())
    }

    /// Replace the subset with a JSON array of entity records.
    pub fn update_subset(&self, records_json: &str) -> Result<(), JsValue> {
        let records: Vec<serde_json::Value> = serde_json::from_str(records_json).map_err(js_err)?;
        self.selection
            .replace_subset(entity_map_from_json(&records, &self.config.feature_data));
        Ok(())
    }

    /// `{"phenotype": [r, g, b], ...}`
    pub fn set_phenotype_colors(&self, colors_json: &str) -> Result<(), JsValue> {
        let colors: HashMap<String, Rgb> = serde_json::from_str(colors_json).map_err(js_err)?;
        self.palette.replace(PhenotypePalette::new(colors));
        Ok(())
    }

    pub fn set_gating_range(&self, full_name: &str, min: f64, max: f64) {
        self.gating.borrow_mut().set(full_name, min, max);
        self.overlay.refresh();
    }

    pub fn remove_gating_range(&self, full_name: &str) {
        self.gating.borrow_mut().remove(full_name);
        self.overlay.refresh();
    }

    pub fn cached_tiles(&self) -> usize {
        self.cache.borrow().len()
    }
}
