//! Platform adapter boundary.
//!
//! The core never talks to GL or does IO directly: context creation, image
//! decoding and the actual texture upload live behind [`PlatformAdapter`].
//! Texture loading is callback-based and may complete later; completions are
//! funneled back to the texture manager through a [`LoadCompletion`] and
//! drained once per frame on the render thread.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::mpsc::Sender;

use crate::texture::{LoadEvent, LoadedSource, TextureSourceId};

/// Opaque GPU texture handle minted by the adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GlTexture(pub u64);

/// Decoded image bytes ready for upload: tightly packed row-major RGBA8.
#[derive(Clone, Debug)]
pub struct ImagePayload {
    pub width: u32,
    pub height: u32,
    pub rgba8: Arc<Vec<u8>>,
}

impl ImagePayload {
    /// A transparent payload of the given dimensions.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba8: Arc::new(vec![0; (width as usize) * (height as usize) * 4]),
        }
    }
}

/// One-shot completion handle passed to a texture-source loader. Dropping it
/// without resolving leaves the source in its loading window; the manager
/// retries after the freshness timeout expires.
#[derive(Debug)]
pub struct LoadCompletion {
    source: TextureSourceId,
    tx: Sender<LoadEvent>,
}

impl LoadCompletion {
    pub(crate) fn new(source: TextureSourceId, tx: Sender<LoadEvent>) -> Self {
        Self { source, tx }
    }

    pub fn source(&self) -> TextureSourceId {
        self.source
    }

    /// Delivers a successfully loaded payload.
    pub fn resolve(self, loaded: LoadedSource) {
        // The manager may already be gone during teardown; nothing to do then.
        let _ = self.tx.send(LoadEvent {
            source: self.source,
            result: Ok(loaded),
        });
    }

    /// Reports a load failure. The core logs it and leaves the source
    /// unloaded; the caller may re-request later.
    pub fn fail(self, message: impl Into<String>) {
        let _ = self.tx.send(LoadEvent {
            source: self.source,
            result: Err(message.into()),
        });
    }
}

/// Contract the embedding platform provides to the core. All calls happen on
/// the single render thread.
pub trait PlatformAdapter {
    /// Starts loading an image source addressed by string (path, URL, data
    /// URI). Must eventually resolve or fail `completion`; completing
    /// synchronously is allowed.
    fn load_texture_source(&mut self, src: &str, completion: LoadCompletion);

    /// Uploads a payload to the GPU with linear filtering and clamp-to-edge
    /// wrapping, returning the handle.
    fn upload_texture(&mut self, payload: &ImagePayload) -> GlTexture;

    /// Frees a previously uploaded texture.
    fn delete_texture(&mut self, texture: GlTexture);

    /// Monotonic time in seconds, used for load-coalescing timestamps.
    fn hr_time(&mut self) -> f64;
}

/// In-memory adapter: registered sources, a manual clock and an optional
/// deferred-load queue. Serves as the reference implementation and as the
/// harness for the integration tests.
#[derive(Debug, Default)]
pub struct HeadlessAdapter {
    payloads: HashMap<String, LoadedSource>,
    png_bytes: HashMap<String, Vec<u8>>,
    pending: Vec<(String, LoadCompletion)>,
    defer_loads: bool,
    now: f64,
    next_handle: u64,
    live: BTreeSet<u64>,
    load_requests: u64,
}

impl HeadlessAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, loads queue up until [`HeadlessAdapter::flush_loads`],
    /// modeling platforms where decoding completes on a later frame.
    pub fn defer_loads(&mut self, defer: bool) {
        self.defer_loads = defer;
    }

    /// Registers a pre-decoded payload under a source string.
    pub fn register_payload(&mut self, src: impl Into<String>, payload: ImagePayload) {
        self.payloads.insert(src.into(), LoadedSource::new(payload));
    }

    /// Registers encoded PNG bytes; decoding happens at load time.
    pub fn register_png(&mut self, src: impl Into<String>, bytes: Vec<u8>) {
        self.png_bytes.insert(src.into(), bytes);
    }

    /// Completes all deferred loads.
    pub fn flush_loads(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for (src, completion) in pending {
            self.complete(&src, completion);
        }
    }

    pub fn pending_loads(&self) -> usize {
        self.pending.len()
    }

    /// Number of `load_texture_source` calls observed; lets tests assert
    /// that duplicate requests were coalesced.
    pub fn load_requests(&self) -> u64 {
        self.load_requests
    }

    /// Handles currently alive on the (simulated) GPU.
    pub fn live_textures(&self) -> usize {
        self.live.len()
    }

    /// Moves the manual clock forward by `dt` seconds.
    pub fn advance(&mut self, dt: f64) {
        self.now += dt;
    }

    fn complete(&mut self, src: &str, completion: LoadCompletion) {
        if let Some(loaded) = self.payloads.get(src) {
            completion.resolve(loaded.clone());
            return;
        }
        if let Some(bytes) = self.png_bytes.get(src) {
            match image::load_from_memory(bytes) {
                Ok(decoded) => {
                    let rgba = decoded.to_rgba8();
                    let (width, height) = rgba.dimensions();
                    let payload = ImagePayload {
                        width,
                        height,
                        rgba8: Arc::new(rgba.into_raw()),
                    };
                    let mut loaded = LoadedSource::new(payload);
                    loaded.render_info = Some(serde_json::json!({ "src": src }));
                    completion.resolve(loaded);
                }
                Err(err) => completion.fail(format!("decode failed for '{src}': {err}")),
            }
            return;
        }
        completion.fail(format!("unknown source '{src}'"));
    }
}

/// Shared-handle form, for tests and embeddings that need to keep driving
/// the adapter (clock, deferred loads) after handing it to the stage.
impl PlatformAdapter for std::rc::Rc<std::cell::RefCell<HeadlessAdapter>> {
    fn load_texture_source(&mut self, src: &str, completion: LoadCompletion) {
        self.borrow_mut().load_texture_source(src, completion);
    }

    fn upload_texture(&mut self, payload: &ImagePayload) -> GlTexture {
        self.borrow_mut().upload_texture(payload)
    }

    fn delete_texture(&mut self, texture: GlTexture) {
        self.borrow_mut().delete_texture(texture);
    }

    fn hr_time(&mut self) -> f64 {
        self.borrow_mut().hr_time()
    }
}

impl PlatformAdapter for HeadlessAdapter {
    fn load_texture_source(&mut self, src: &str, completion: LoadCompletion) {
        self.load_requests += 1;
        if self.defer_loads {
            self.pending.push((src.to_string(), completion));
        } else {
            self.complete(src, completion);
        }
    }

    fn upload_texture(&mut self, _payload: &ImagePayload) -> GlTexture {
        self.next_handle += 1;
        self.live.insert(self.next_handle);
        GlTexture(self.next_handle)
    }

    fn delete_texture(&mut self, texture: GlTexture) {
        self.live.remove(&texture.0);
    }

    fn hr_time(&mut self) -> f64 {
        self.now
    }
}
