use cycif_core::overlay::FrameScheduler;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;

/// Defers work to `window.requestAnimationFrame`.
pub struct AnimationFrames;

impl FrameScheduler for AnimationFrames {
    fn request_frame(&self, callback: Box<dyn FnOnce()>) -> bool {
        let Some(window) = web_sys::window() else {
            log::warn!("no window; dropping overlay frame");
            return false;
        };
        let closure = Closure::once_into_js(move || callback());
        match window.request_animation_frame(closure.unchecked_ref()) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("requestAnimationFrame failed: {e:?}");
                false
            }
        }
    }
}
