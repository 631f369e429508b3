use cycif_core::overlay::{OverlaySurface, Sector};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

/// The gating overlay canvas stacked on top of the viewer.
pub struct CanvasSurface {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
}

impl CanvasSurface {
    /// Size the backing store to the element's layout size times `px_ratio`
    /// and grab its 2d context.
    pub fn new(canvas: HtmlCanvasElement, px_ratio: f64) -> Result<Self, JsValue> {
        let w = (canvas.client_width() as f64 * px_ratio) as u32;
        let h = (canvas.client_height() as f64 * px_ratio) as u32;
        if w > 0 && h > 0 {
            canvas.set_width(w);
            canvas.set_height(h);
        }
        let ctx = canvas
            .get_context("2d")?
            .ok_or_else(|| JsValue::from_str("overlay canvas has no 2d context"))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(JsValue::from)?;
        Ok(Self { canvas, ctx })
    }
}

impl OverlaySurface for CanvasSurface {
    fn size(&self) -> (f64, f64) {
        (self.canvas.width() as f64, self.canvas.height() as f64)
    }

    fn clear(&self) {
        let (w, h) = self.size();
        self.ctx.clear_rect(0.0, 0.0, w, h);
    }

    fn draw_sector(&self, cx: f64, cy: f64, radius: f64, sector: &Sector, stroke_width: f64) {
        let [r, g, b] = sector.color;
        self.ctx.set_fill_style_str(&format!("rgb({r},{g},{b})"));
        self.ctx.set_stroke_style_str("white");
        self.ctx.set_line_width(stroke_width);
        self.ctx.begin_path();
        self.ctx.move_to(cx, cy);
        if let Err(e) = self.ctx.arc(cx, cy, radius, sector.start, sector.end) {
            log::warn!("overlay arc rejected: {e:?}");
            return;
        }
        self.ctx.close_path();
        self.ctx.stroke();
        self.ctx.fill();
    }
}
