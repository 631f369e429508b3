//! Gating glyphs over the selected entities.
//!
//! Each selected entity inside the visible rectangle gets a pie glyph: one
//! sector per gating channel whose range contains the entity's value, coloured
//! with that channel's transfer end colour. Glyph radius follows the zoom
//! level through a square-root scale.
//!
//! Geometry is computed when a pass starts; the drawing of each glyph is
//! deferred to its own animation frame, so a pass can finish over several
//! frames. Glyphs from a pass superseded by viewport motion are skipped.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use crate::channel::ChannelSet;
use crate::config::OverlayConfig;
use crate::entity::{Entity, SelectionState};
use crate::transfer::Rgb;
use crate::viewport::{RedrawPass, ViewerGeometry, ViewportSync, ZoomState};

/// Drawing target for the overlay canvas.
pub trait OverlaySurface {
    /// Backing-store size in device pixels.
    fn size(&self) -> (f64, f64);
    fn clear(&self);
    /// Filled, outlined pie slice centred on `(cx, cy)`, bounded by both
    /// radii and the arc.
    fn draw_sector(&self, cx: f64, cy: f64, radius: f64, sector: &Sector, stroke_width: f64);
}

/// Runs a callback on a later frame.
pub trait FrameScheduler {
    /// Returns false when the frame could not be scheduled; the callback
    /// will then never run.
    fn request_frame(&self, callback: Box<dyn FnOnce()>) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sector {
    pub start: f64,
    pub end: f64,
    pub color: Rgb,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearScale {
    domain: [f64; 2],
    range: [f64; 2],
}

impl LinearScale {
    pub fn new(domain: [f64; 2], range: [f64; 2]) -> Self {
        Self { domain, range }
    }

    pub fn apply(&self, v: f64) -> f64 {
        let span = self.domain[1] - self.domain[0];
        let t = if span == 0.0 { 0.5 } else { (v - self.domain[0]) / span };
        self.range[0] + t * (self.range[1] - self.range[0])
    }
}

/// Power scale: linear interpolation over `sign(x) * |x|^exponent`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PowScale {
    exponent: f64,
    domain: [f64; 2],
    range: [f64; 2],
}

impl PowScale {
    pub fn sqrt(domain: [f64; 2], range: [f64; 2]) -> Self {
        Self { exponent: 0.5, domain, range }
    }

    fn raise(&self, v: f64) -> f64 {
        v.signum() * v.abs().powf(self.exponent)
    }

    pub fn apply(&self, v: f64) -> f64 {
        let d = [self.raise(self.domain[0]), self.raise(self.domain[1])];
        LinearScale::new(d, self.range).apply(self.raise(v))
    }
}

/// Split `[domain.0, domain.1)` into `colors.len()` equal sectors.
pub fn partition(domain: [f64; 2], colors: &[Rgb]) -> Vec<Sector> {
    let scale = LinearScale::new([0.0, colors.len() as f64], domain);
    colors
        .iter()
        .enumerate()
        .map(|(i, &color)| Sector {
            start: scale.apply(i as f64),
            end: scale.apply(i as f64 + 1.0),
            color,
        })
        .collect()
}

/// A gating range on one channel, inclusive on both ends.
#[derive(Clone, Debug, PartialEq)]
pub struct Gate {
    pub channel: String,
    pub min: f64,
    pub max: f64,
}

/// Ordered gating ranges; sector order follows this order.
#[derive(Clone, Debug, Default)]
pub struct GatingRanges {
    gates: Vec<Gate>,
}

impl GatingRanges {
    pub fn new(gates: Vec<Gate>) -> Self {
        Self { gates }
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// Set or replace the range for `channel`, keeping its position.
    pub fn set(&mut self, channel: &str, min: f64, max: f64) {
        match self.gates.iter_mut().find(|g| g.channel == channel) {
            Some(g) => {
                g.min = min;
                g.max = max;
            }
            None => self.gates.push(Gate { channel: channel.to_string(), min, max }),
        }
    }

    pub fn remove(&mut self, channel: &str) {
        self.gates.retain(|g| g.channel != channel);
    }

    /// End colours of every active gated channel whose range holds this
    /// entity's value.
    pub fn matching_colors(&self, entity: &Entity, channels: &ChannelSet) -> Vec<Rgb> {
        self.gates
            .iter()
            .filter_map(|g| {
                let ch = channels.get(&g.channel).filter(|c| c.active)?;
                let v = entity.value(&g.channel)?;
                (v >= g.min && v <= g.max).then(|| ch.transfer().end_color())
            })
            .collect()
    }
}

struct Glyph {
    x: f64,
    y: f64,
    sectors: Vec<Sector>,
}

pub struct SelectionOverlay {
    sync: Rc<RefCell<ViewportSync>>,
    surface: Rc<dyn OverlaySurface>,
    scheduler: Rc<dyn FrameScheduler>,
    selection: Rc<SelectionState>,
    channels: Rc<RefCell<ChannelSet>>,
    gating: Rc<RefCell<GatingRanges>>,
    config: OverlayConfig,
    last_zoom: Cell<Option<ZoomState>>,
}

impl SelectionOverlay {
    pub fn new(
        surface: Rc<dyn OverlaySurface>,
        scheduler: Rc<dyn FrameScheduler>,
        selection: Rc<SelectionState>,
        channels: Rc<RefCell<ChannelSet>>,
        gating: Rc<RefCell<GatingRanges>>,
        config: OverlayConfig,
    ) -> Self {
        Self {
            sync: Rc::new(RefCell::new(ViewportSync::new())),
            surface,
            scheduler,
            selection,
            channels,
            gating,
            config,
            last_zoom: Cell::new(None),
        }
    }

    pub fn viewport(&self) -> Rc<RefCell<ViewportSync>> {
        Rc::clone(&self.sync)
    }

    /// Viewer began moving: wipe the glyphs and cancel the running pass.
    pub fn on_motion_start(&self) {
        self.sync.borrow_mut().motion_start();
        self.surface.clear();
    }

    /// Viewer came to rest: redraw for the new rectangle, unless a pass is
    /// already running.
    pub fn on_motion_finish(&self, geometry: &dyn ViewerGeometry) {
        let pass = self.sync.borrow_mut().motion_finish(geometry);
        self.last_zoom.set(Some(geometry.zoom()));
        if let Some(pass) = pass {
            self.draw(pass);
        }
    }

    /// Redraw over the last known rectangle after a colour, gating or
    /// selection change. No-op before the first motion finish and while the
    /// viewport is moving; the motion finish redraws anyway.
    pub fn refresh(&self) {
        let Some(zoom) = self.last_zoom.get() else { return };
        let pass = self.sync.borrow_mut().begin_pass(zoom);
        if let Some(pass) = pass {
            self.draw(pass);
        }
    }

    fn radius(&self, zoom: ZoomState) -> f64 {
        let scale = PowScale::sqrt([zoom.min, zoom.max], self.config.radius);
        let r = (scale.apply(zoom.current) * 100.0).round() / 100.0;
        r * self.config.px_ratio
    }

    fn layout(&self, pass: &RedrawPass) -> Vec<Glyph> {
        let (w, h) = self.surface.size();
        let rect = pass.rect;
        let sx = LinearScale::new([rect.x, rect.right()], [0.0, w]);
        let sy = LinearScale::new([rect.y, rect.bottom()], [0.0, h]);

        let selection = self.selection.selection();
        let channels = self.channels.borrow();
        let gating = self.gating.borrow();

        selection
            .values()
            .filter(|e| rect.contains(e.x, e.y))
            .filter_map(|e| {
                let colors = gating.matching_colors(e, &channels);
                if colors.is_empty() {
                    return None;
                }
                Some(Glyph {
                    x: sx.apply(e.x),
                    y: sy.apply(e.y),
                    sectors: partition(self.config.angle_domain, &colors),
                })
            })
            .collect()
    }

    fn draw(&self, pass: RedrawPass) {
        self.surface.clear();
        let glyphs = self.layout(&pass);
        let generation = pass.generation;

        if glyphs.is_empty() {
            self.sync.borrow_mut().end_pass(generation);
            return;
        }

        let radius = self.radius(pass.zoom);
        let stroke = self.config.stroke * self.config.px_ratio;
        let remaining = Rc::new(Cell::new(glyphs.len()));

        for glyph in glyphs {
            let sync = Rc::clone(&self.sync);
            let surface = Rc::clone(&self.surface);
            let left = Rc::clone(&remaining);
            let scheduled = self.scheduler.request_frame(Box::new(move || {
                if sync.borrow().is_current(generation) {
                    for sector in &glyph.sectors {
                        surface.draw_sector(glyph.x, glyph.y, radius, sector, stroke);
                    }
                }
                glyph_done(&sync, &left, generation);
            }));
            if !scheduled {
                log::warn!("overlay frame not scheduled, skipping glyph");
                glyph_done(&self.sync, &remaining, generation);
            }
        }
    }
}

/// Count one glyph of a pass as finished; the last one releases the guard.
fn glyph_done(sync: &RefCell<ViewportSync>, remaining: &Cell<usize>, generation: u64) {
    remaining.set(remaining.get() - 1);
    if remaining.get() == 0 {
        sync.borrow_mut().end_pass(generation);
    }
}
