//! Per-tile compositing of channel intensity through transfer functions, with
//! selection and subset highlighting driven by the label image.
//!
//! A render request goes through two phases:
//!
//! 1. Resolve: snapshot every tile the request needs out of the cache. If the
//!    label tile is missing and a shown highlight needs it, ask the viewer's
//!    loader for it and wait for the fetch to settle. This is the only suspension point.
//! 2. Composite: a synchronous loop over the pixel buffer. Nothing in this
//!    phase touches the cache, so evictions that land meanwhile are harmless.
//!
//! Pixel rules, in order:
//!
//! - intensity = G*256 + B of the channel tile
//! - base colour = transfer lookup (black below the channel minimum); with
//!   several active channels the lookups are blended first
//! - subset modes: non-members render as greyscale context, members keep the
//!   transfer colour
//! - selection modes: members take their phenotype colour, if it has one

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use crate::channel::ChannelSet;
use crate::config::BlendMode;
use crate::entity::{ColorScheme, EntityMap, SelectionState};
use crate::error::FetchError;
use crate::tile::{intensity, label_id, TileAddress, TileBitmap};
use crate::tile_cache::TileCache;
use crate::transfer::{Rgb, TransferFunction, BLACK};

pub type FetchFuture = Pin<Box<dyn Future<Output = Result<(), FetchError>>>>;

/// The viewer's on-demand tile job queue.
///
/// A successful fetch is expected to have delivered the tile into the cache
/// (through the usual tile-loaded notification) by the time the future
/// resolves. The compositor re-reads the cache afterwards either way.
pub trait TileLoader {
    fn fetch(&self, address: &TileAddress) -> FetchFuture;
}

/// Which highlight layers are drawn over the transfer-function base.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisplayMode {
    IntensityOnly,
    Subset,
    #[default]
    Selection,
    SubsetAndSelection,
}

impl DisplayMode {
    pub fn shows_subset(self) -> bool {
        matches!(self, Self::Subset | Self::SubsetAndSelection)
    }

    pub fn shows_selection(self) -> bool {
        matches!(self, Self::Selection | Self::SubsetAndSelection)
    }

    fn from_flags(subset: bool, selection: bool) -> Self {
        match (subset, selection) {
            (false, false) => Self::IntensityOnly,
            (true, false) => Self::Subset,
            (false, true) => Self::Selection,
            (true, true) => Self::SubsetAndSelection,
        }
    }

    pub fn toggle_subset(self) -> Self {
        Self::from_flags(!self.shows_subset(), self.shows_selection())
    }

    pub fn toggle_selection(self) -> Self {
        Self::from_flags(self.shows_subset(), !self.shows_selection())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Pixels written. `labels` is false when the tile went out
    /// intensity-only because no usable label tile was at hand.
    Composited { labels: bool },
    /// Nothing to draw; buffer untouched.
    NoActiveChannel,
    /// Active channels exist but none of their tiles are cached; buffer
    /// untouched.
    NoChannelTiles,
}

struct Layer {
    tile: Rc<TileBitmap>,
    tf: Rc<TransferFunction>,
}

impl Layer {
    #[inline]
    fn lookup(&self, o: usize) -> Rgb {
        self.tf.lookup(intensity(&self.tile.pixels[o..o + 4]) as f64)
    }

    #[inline]
    fn high_byte(&self, o: usize) -> u8 {
        self.tile.pixels[o + 1]
    }
}

enum ChannelMix {
    Single(Layer),
    Blended(Vec<Layer>, BlendMode),
}

impl ChannelMix {
    fn layers(&self) -> &[Layer] {
        match self {
            Self::Single(layer) => std::slice::from_ref(layer),
            Self::Blended(layers, _) => layers,
        }
    }

    /// Transfer colour for the pixel at byte offset `o`.
    #[inline]
    fn lookup(&self, o: usize) -> Rgb {
        match self {
            Self::Single(layer) => layer.lookup(o),
            Self::Blended(layers, mode) => layers
                .iter()
                .fold(BLACK, |acc, layer| blend(*mode, acc, layer.lookup(o))),
        }
    }

    /// Greyscale context shown behind the subset.
    #[inline]
    fn context(&self, o: usize) -> Rgb {
        let v = self.layers().iter().map(|l| l.high_byte(o)).max().unwrap_or(0);
        [v, v, v]
    }
}

#[inline]
fn blend(mode: BlendMode, a: Rgb, b: Rgb) -> Rgb {
    match mode {
        BlendMode::Additive => [
            a[0].saturating_add(b[0]),
            a[1].saturating_add(b[1]),
            a[2].saturating_add(b[2]),
        ],
        BlendMode::Max => [a[0].max(b[0]), a[1].max(b[1]), a[2].max(b[2])],
    }
}

struct Highlights<'a> {
    mode: DisplayMode,
    subset: &'a EntityMap,
    selection: &'a EntityMap,
    colors: &'a dyn ColorScheme,
}

impl Highlights<'_> {
    fn needs_labels(&self) -> bool {
        (self.mode.shows_subset() && !self.subset.is_empty())
            || (self.mode.shows_selection() && !self.selection.is_empty())
    }
}

pub struct Compositor {
    cache: Rc<RefCell<TileCache>>,
    channels: Rc<RefCell<ChannelSet>>,
    selection: Rc<SelectionState>,
    colors: Rc<dyn ColorScheme>,
    loader: Rc<dyn TileLoader>,
    mode: Cell<DisplayMode>,
    blend: Cell<BlendMode>,
}

impl Compositor {
    pub fn new(
        cache: Rc<RefCell<TileCache>>,
        channels: Rc<RefCell<ChannelSet>>,
        selection: Rc<SelectionState>,
        colors: Rc<dyn ColorScheme>,
        loader: Rc<dyn TileLoader>,
        blend: BlendMode,
    ) -> Self {
        Self {
            cache,
            channels,
            selection,
            colors,
            loader,
            mode: Cell::new(DisplayMode::default()),
            blend: Cell::new(blend),
        }
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode.get()
    }

    pub fn set_mode(&self, mode: DisplayMode) {
        self.mode.set(mode);
    }

    pub fn blend(&self) -> BlendMode {
        self.blend.get()
    }

    pub fn set_blend(&self, blend: BlendMode) {
        self.blend.set(blend);
    }

    /// Composite the tile at `address` into `pixels` (RGBA, written in place).
    ///
    /// `address` may belong to any pyramid; channel and label tiles are found
    /// by swapping its branch. Alpha bytes are left as they are.
    pub async fn render_tile(&self, address: &TileAddress, pixels: &mut [u8]) -> RenderOutcome {
        let (wanted, label_addr) = {
            let channels = self.channels.borrow();
            let wanted: Vec<(TileAddress, Rc<TransferFunction>)> = channels
                .active()
                .map(|c| (address.with_branch(&c.branch), c.transfer()))
                .collect();
            let label_addr = channels.label_branch().map(|b| address.with_branch(b));
            (wanted, label_addr)
        };
        if wanted.is_empty() {
            return RenderOutcome::NoActiveChannel;
        }
        let multi = wanted.len() > 1;

        let layers: Vec<Layer> = {
            let cache = self.cache.borrow();
            wanted
                .into_iter()
                .filter_map(|(addr, tf)| cache.get(&addr).map(|tile| Layer { tile, tf }))
                .collect()
        };
        if layers.is_empty() {
            return RenderOutcome::NoChannelTiles;
        }

        // Only a highlight that can actually show justifies waiting on a
        // fetch; otherwise use the label tile if it happens to be cached.
        let label = match label_addr {
            Some(addr) if self.wants_labels() => self.resolve_label(addr).await,
            Some(addr) => self.cache.borrow().get(&addr),
            None => None,
        };

        let mix = if multi {
            ChannelMix::Blended(layers, self.blend.get())
        } else {
            let mut layers = layers;
            ChannelMix::Single(layers.remove(0))
        };

        let subset = self.selection.subset();
        let selection = self.selection.selection();
        let highlights = Highlights {
            mode: self.mode.get(),
            subset: &subset,
            selection: &selection,
            colors: self.colors.as_ref(),
        };

        let labels = composite(&mix, label.as_deref(), &highlights, pixels);
        RenderOutcome::Composited { labels }
    }

    fn wants_labels(&self) -> bool {
        let mode = self.mode.get();
        (mode.shows_subset() && !self.selection.subset().is_empty())
            || (mode.shows_selection() && !self.selection.selection().is_empty())
    }

    async fn resolve_label(&self, addr: TileAddress) -> Option<Rc<TileBitmap>> {
        let cached = self.cache.borrow().get(&addr);
        if cached.is_some() {
            return cached;
        }
        self.settle(std::slice::from_ref(&addr)).await;
        self.cache.borrow().get(&addr)
    }

    /// Issue one fetch per missing tile, then wait for all of them.
    /// Failures are logged and otherwise ignored.
    async fn settle(&self, missing: &[TileAddress]) {
        let fetches: Vec<(&TileAddress, FetchFuture)> =
            missing.iter().map(|a| (a, self.loader.fetch(a))).collect();
        for (addr, fetch) in fetches {
            match fetch.await {
                Ok(()) => log::debug!("emergency fetch settled for {addr}"),
                Err(e) => log::warn!("{e}"),
            }
        }
    }
}

/// The per-pixel loop. Returns whether label highlighting was applied.
fn composite(
    mix: &ChannelMix,
    label: Option<&TileBitmap>,
    highlights: &Highlights<'_>,
    out: &mut [u8],
) -> bool {
    let len = mix
        .layers()
        .iter()
        .map(|l| l.tile.pixels.len())
        .fold(out.len(), usize::min)
        / 4
        * 4;

    let label = label.filter(|l| {
        let fits = mix
            .layers()
            .iter()
            .all(|c| c.tile.width == l.width && c.tile.height == l.height);
        if !fits {
            log::warn!("label tile {}x{} does not match channel tile, ignoring", l.width, l.height);
        }
        fits
    });
    let use_labels = label.is_some() && highlights.needs_labels();
    let subset_mode = highlights.mode.shows_subset();
    let selection_mode = highlights.mode.shows_selection();

    for (i, px) in out[..len].chunks_exact_mut(4).enumerate() {
        let o = i * 4;
        let tf_color = mix.lookup(o);
        let mut color = if subset_mode { mix.context(o) } else { tf_color };

        if use_labels {
            let id = label.and_then(|l| label_id(&l.pixels[o..o + 4]));
            if let Some(id) = id {
                if subset_mode && highlights.subset.contains_key(&id) {
                    color = tf_color;
                }
                if selection_mode {
                    let picked = highlights
                        .selection
                        .get(&id)
                        .and_then(|e| e.phenotype.as_deref())
                        .and_then(|p| highlights.colors.phenotype_color(p));
                    if let Some(c) = picked {
                        color = c;
                    }
                }
            }
        }

        px[..3].copy_from_slice(&color);
    }

    label.is_some()
}
