//! Visible-rectangle tracking and redraw gating for the overlay.
//!
//! The viewer reports motion start and motion finish. Motion start
//! supersedes whatever redraw pass is in flight; motion finish recomputes the
//! visible image-space rectangle and hands out at most one `RedrawPass` at a
//! time. A finish that arrives while a pass is still running is dropped, not
//! queued.

/// Axis-aligned rectangle. Used both in image pixels and viewport units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Inclusive on every edge.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomState {
    pub current: f64,
    pub min: f64,
    pub max: f64,
}

/// What the deep-zoom viewer exposes about its viewport.
pub trait ViewerGeometry {
    /// Current viewport bounds converted to image coordinates.
    fn visible_image_rect(&self) -> Rect;

    fn zoom(&self) -> ZoomState;

    /// Image-space rectangle converted to viewport coordinates.
    fn image_to_viewport(&self, rect: Rect) -> Rect;
}

/// Permission to draw one overlay pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RedrawPass {
    pub generation: u64,
    pub rect: Rect,
    pub zoom: ZoomState,
}

#[derive(Debug, Default)]
pub struct ViewportSync {
    rect: Rect,
    generation: u64,
    in_progress: bool,
    moving: bool,
}

impl ViewportSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last computed visible rectangle, image space.
    pub fn visible_rect(&self) -> Rect {
        self.rect
    }

    pub fn redraw_in_progress(&self) -> bool {
        self.in_progress
    }

    /// The viewport started moving. Any pass handed out before this point is
    /// stale from now on.
    pub fn motion_start(&mut self) {
        self.generation += 1;
        self.in_progress = false;
        self.moving = true;
    }

    /// Between a motion start and its finish.
    pub fn is_moving(&self) -> bool {
        self.moving
    }

    /// The viewport came to rest. Always refreshes the visible rectangle;
    /// returns a pass only if none is running.
    pub fn motion_finish(&mut self, geometry: &dyn ViewerGeometry) -> Option<RedrawPass> {
        self.rect = geometry.visible_image_rect();
        self.moving = false;
        self.begin_pass(geometry.zoom())
    }

    /// Start a pass over the last computed rectangle without re-reading the
    /// viewer (used after colour or gating edits).
    pub fn begin_pass(&mut self, zoom: ZoomState) -> Option<RedrawPass> {
        if self.moving {
            log::debug!("viewport moving, deferring overlay redraw to motion finish");
            return None;
        }
        if self.in_progress {
            log::debug!("overlay redraw already running, dropping trigger");
            return None;
        }
        self.in_progress = true;
        Some(RedrawPass { generation: self.generation, rect: self.rect, zoom })
    }

    /// Whether a pass may still draw.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Mark the pass finished. Passes superseded by a motion start are
    /// ignored so they cannot release a newer pass's guard.
    pub fn end_pass(&mut self, generation: u64) {
        if self.is_current(generation) {
            self.in_progress = false;
        }
    }

    /// Viewport bounds that frame `image_rect`, for fitting viewers to a
    /// region of interest.
    pub fn focus_bounds(image_rect: Rect, geometry: &dyn ViewerGeometry) -> Rect {
        geometry.image_to_viewport(image_rect)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;

    /// Viewer stand-in whose rectangle can be moved between calls.
    pub(crate) struct FakeViewer {
        pub rect: Cell<Rect>,
        pub zoom: Cell<f64>,
    }

    impl FakeViewer {
        pub(crate) fn new(rect: Rect) -> Self {
            Self { rect: Cell::new(rect), zoom: Cell::new(1.0) }
        }
    }

    impl ViewerGeometry for FakeViewer {
        fn visible_image_rect(&self) -> Rect {
            self.rect.get()
        }

        fn zoom(&self) -> ZoomState {
            ZoomState { current: self.zoom.get(), min: 1.0, max: 16.0 }
        }

        // image is 1000 px wide, viewport units are image / 1000
        fn image_to_viewport(&self, r: Rect) -> Rect {
            Rect::new(r.x / 1000.0, r.y / 1000.0, r.width / 1000.0, r.height / 1000.0)
        }
    }

    #[test]
    fn test_rect_contains_is_inclusive() {
        let r = Rect::new(10.0, 20.0, 5.0, 5.0);
        assert!(r.contains(10.0, 20.0));
        assert!(r.contains(15.0, 25.0));
        assert!(!r.contains(15.01, 25.0));
        assert!(!r.contains(9.99, 22.0));
    }

    #[test]
    fn test_second_finish_is_dropped_while_running() {
        let viewer = FakeViewer::new(Rect::new(0.0, 0.0, 100.0, 100.0));
        let mut sync = ViewportSync::new();
        let pass = sync.motion_finish(&viewer).unwrap();
        assert!(sync.redraw_in_progress());

        viewer.rect.set(Rect::new(50.0, 50.0, 100.0, 100.0));
        assert!(sync.motion_finish(&viewer).is_none());
        // the rectangle still moves even though no pass started
        assert_eq!(sync.visible_rect(), Rect::new(50.0, 50.0, 100.0, 100.0));

        sync.end_pass(pass.generation);
        let next = sync.motion_finish(&viewer).unwrap();
        assert_eq!(next.rect, Rect::new(50.0, 50.0, 100.0, 100.0));
    }

    #[test]
    fn test_motion_start_supersedes_pass() {
        let viewer = FakeViewer::new(Rect::new(0.0, 0.0, 10.0, 10.0));
        let mut sync = ViewportSync::new();
        let old = sync.motion_finish(&viewer).unwrap();
        sync.motion_start();
        assert!(!sync.is_current(old.generation));
        assert!(!sync.redraw_in_progress());

        let new = sync.motion_finish(&viewer).unwrap();
        // the stale pass finishing late must not release the new guard
        sync.end_pass(old.generation);
        assert!(sync.redraw_in_progress());
        sync.end_pass(new.generation);
        assert!(!sync.redraw_in_progress());
    }

    #[test]
    fn test_no_pass_while_moving() {
        let viewer = FakeViewer::new(Rect::new(0.0, 0.0, 10.0, 10.0));
        let mut sync = ViewportSync::new();
        let first = sync.motion_finish(&viewer).unwrap();
        sync.end_pass(first.generation);

        sync.motion_start();
        assert!(sync.is_moving());
        assert!(sync.begin_pass(viewer.zoom()).is_none());
        assert!(!sync.redraw_in_progress());

        viewer.rect.set(Rect::new(5.0, 5.0, 20.0, 20.0));
        let pass = sync.motion_finish(&viewer).unwrap();
        assert!(!sync.is_moving());
        assert_eq!(pass.rect, Rect::new(5.0, 5.0, 20.0, 20.0));
    }

    #[test]
    fn test_focus_bounds() {
        let viewer = FakeViewer::new(Rect::default());
        let vp = ViewportSync::focus_bounds(Rect::new(100.0, 200.0, 500.0, 250.0), &viewer);
        assert_eq!(vp, Rect::new(0.1, 0.2, 0.5, 0.25));
    }
}
