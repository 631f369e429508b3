//! Emergency tile fetches through the host viewer's image job queue.

use cycif_core::compositor::{FetchFuture, TileLoader};
use cycif_core::tile::TileAddress;
use cycif_core::FetchError;
use js_sys::{Function, Promise};
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;

/// Calls a host function `(url) => Promise` that queues a tile job and
/// settles once the viewer has delivered (or given up on) the tile.
pub struct JsTileLoader {
    fetch: Function,
}

impl JsTileLoader {
    pub fn new(fetch: Function) -> Self {
        Self { fetch }
    }
}

fn fetch_error(address: &str, e: JsValue) -> FetchError {
    FetchError {
        address: address.to_string(),
        reason: e.as_string().unwrap_or_else(|| format!("{e:?}")),
    }
}

impl TileLoader for JsTileLoader {
    fn fetch(&self, address: &TileAddress) -> FetchFuture {
        let url = address.to_string();
        // Issue the job now so sibling fetches in the same batch overlap.
        let queued = self.fetch.call1(&JsValue::NULL, &JsValue::from_str(&url));
        Box::pin(async move {
            let value = queued.map_err(|e| fetch_error(&url, e))?;
            JsFuture::from(Promise::resolve(&value))
                .await
                .map(|_| ())
                .map_err(|e| fetch_error(&url, e))
        })
    }
}
