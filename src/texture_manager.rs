//! Texture cache: deduplication, asynchronous loading and explicit eviction.
//!
//! Sources live in an arena owned by the manager; components reference them
//! through [`Texture`] values and a per-source reference set. Nothing is
//! freed behind the caller's back: unused GPU memory is reclaimed only by
//! [`TextureManager::free_unused_texture_sources`] or the targeted removal
//! calls.

use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender, channel};

use crate::adapter::{LoadCompletion, PlatformAdapter};
use crate::component::ComponentId;
use crate::texture::{
    LoadEvent, LoadedSource, SourceLoader, Texture, TextureSource, TextureSourceId,
};

/// Largest dimension accepted for upload.
pub const MAX_TEXTURE_DIM: u32 = 2048;

/// Window in seconds during which a repeated load request for the same
/// source is treated as already in flight.
pub const LOAD_FRESHNESS_SECS: f64 = 30.0;

/// Options for [`TextureManager::get_texture`]. A non-zero clip rectangle
/// marks the resulting texture as clipping.
#[derive(Clone, Debug, Default)]
pub struct TextureOptions {
    /// Explicit deduplication key; defaults to the source string.
    pub id: Option<String>,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

pub struct TextureManager {
    sources: Vec<Option<TextureSource>>,
    /// lookup key -> source, for deduplicating get_texture calls.
    by_key: HashMap<String, TextureSourceId>,
    /// Sources currently referenced by at least one component; kept as a
    /// fast lookup so render passes never touch unreferenced entries.
    by_id: HashMap<TextureSourceId, ()>,
    uploaded: Vec<TextureSourceId>,
    used_texture_memory: u64,
    /// Soft budget in pixels; 0 disables the full check.
    texture_memory_budget: u64,
    load_tx: Sender<LoadEvent>,
    load_rx: Receiver<LoadEvent>,
}

impl TextureManager {
    pub fn new(texture_memory_budget: u64) -> Self {
        let (load_tx, load_rx) = channel();
        Self {
            sources: Vec::new(),
            by_key: HashMap::new(),
            by_id: HashMap::new(),
            uploaded: Vec::new(),
            used_texture_memory: 0,
            texture_memory_budget,
            load_tx,
            load_rx,
        }
    }

    /// Pixels currently resident on the GPU.
    pub fn used_texture_memory(&self) -> u64 {
        self.used_texture_memory
    }

    /// Whether the soft memory budget is exceeded. Callers decide when to
    /// sweep; the manager never evicts on its own.
    pub fn is_full(&self) -> bool {
        self.texture_memory_budget > 0 && self.used_texture_memory > self.texture_memory_budget
    }

    pub fn source(&self, id: TextureSourceId) -> &TextureSource {
        self.sources[id.index()]
            .as_ref()
            .expect("texture source was removed")
    }

    pub fn source_mut(&mut self, id: TextureSourceId) -> &mut TextureSource {
        self.sources[id.index()]
            .as_mut()
            .expect("texture source was removed")
    }

    fn source_opt(&mut self, id: TextureSourceId) -> Option<&mut TextureSource> {
        self.sources.get_mut(id.index()).and_then(|s| s.as_mut())
    }

    /// Resolves a texture for a string source. Lookup order: explicit id
    /// from `options`, then the source string itself; a miss creates a new
    /// source whose loader defers to the platform adapter.
    pub fn get_texture(&mut self, src: &str, options: TextureOptions) -> Texture {
        let key = options.id.clone().unwrap_or_else(|| src.to_string());
        let id = match self.by_key.get(&key) {
            Some(&id) => id,
            None => {
                let owned = src.to_string();
                let loader: SourceLoader = Box::new(
                    move |adapter: &mut dyn PlatformAdapter, completion: LoadCompletion| {
                        adapter.load_texture_source(&owned, completion);
                    },
                );
                self.get_texture_source(loader, Some(key))
            }
        };
        Texture::with_clip(id, options.x, options.y, options.w, options.h)
    }

    /// Registers a source with a custom loader. When `lookup_id` is given
    /// and already known, the existing source is reused.
    pub fn get_texture_source(
        &mut self,
        loader: SourceLoader,
        lookup_id: Option<String>,
    ) -> TextureSourceId {
        if let Some(key) = &lookup_id
            && let Some(&id) = self.by_key.get(key)
        {
            return id;
        }
        let id = TextureSourceId::from_index(self.sources.len());
        let source = TextureSource::new(id, loader, lookup_id.clone());
        self.sources.push(Some(source));
        if let Some(key) = lookup_id {
            self.by_key.insert(key, id);
        }
        tracing::debug!(source = id.index(), "registered texture source");
        id
    }

    /// Kicks off loading for a texture's source unless it is already loaded
    /// or a request is still fresh.
    pub fn load_texture(&mut self, texture: Texture, adapter: &mut dyn PlatformAdapter) {
        self.load_texture_source(texture.source, adapter);
    }

    pub fn load_texture_source(&mut self, id: TextureSourceId, adapter: &mut dyn PlatformAdapter) {
        let now = adapter.hr_time();
        let tx = self.load_tx.clone();
        let Some(source) = self.source_opt(id) else {
            return;
        };
        if source.gl_texture.is_some() {
            return;
        }
        if let Some(since) = source.loading_since
            && now - since < LOAD_FRESHNESS_SECS
        {
            return;
        }
        source.loading_since = Some(now);
        // Detach the loader while it runs so it can borrow the adapter.
        let mut loader = std::mem::replace(&mut source.loader, Box::new(|_, _| {}));
        loader(adapter, LoadCompletion::new(id, tx));
        if let Some(source) = self.source_opt(id) {
            source.loader = loader;
        }
    }

    /// Drains load completions that arrived since the previous frame,
    /// uploading valid payloads. Returns the sources that became loaded so
    /// the caller can notify their components.
    pub fn process_loads(&mut self, adapter: &mut dyn PlatformAdapter) -> Vec<TextureSourceId> {
        let mut loaded = Vec::new();
        while let Ok(event) = self.load_rx.try_recv() {
            let id = event.source;
            let Some(source) = self.source_opt(id) else {
                continue;
            };
            source.loading_since = None;
            let result = match event.result {
                Ok(result) => result,
                Err(message) => {
                    tracing::warn!(source = id.index(), %message, "texture load failed");
                    continue;
                }
            };
            if source.gl_texture.is_some() {
                continue;
            }
            if !source.permanent && source.components.is_empty() {
                // Nothing references this source anymore; drop the payload.
                tracing::debug!(source = id.index(), "discarding load for unused source");
                continue;
            }
            let (w, h) = (result.payload.width, result.payload.height);
            if w > MAX_TEXTURE_DIM || h > MAX_TEXTURE_DIM {
                tracing::error!(
                    source = id.index(),
                    w,
                    h,
                    max = MAX_TEXTURE_DIM,
                    "texture exceeds maximum dimensions, not uploading"
                );
                continue;
            }
            self.upload_texture_source(id, result, adapter);
            loaded.push(id);
        }
        loaded
    }

    /// Records a loaded payload's metadata on the source and uploads it to
    /// the adapter, charging the pixel count against the memory budget.
    pub fn upload_texture_source(
        &mut self,
        id: TextureSourceId,
        loaded: LoadedSource,
        adapter: &mut dyn PlatformAdapter,
    ) {
        let (w, h) = (loaded.payload.width, loaded.payload.height);
        let handle = adapter.upload_texture(&loaded.payload);
        let source = self.source_mut(id);
        source.w = w;
        source.h = h;
        source.precision = loaded.precision;
        source.render_info = loaded.render_info;
        source.gl_texture = Some(handle);
        self.uploaded.push(id);
        self.used_texture_memory += (w as u64) * (h as u64);
    }

    /// Records a component reference. The first reference (re-)registers the
    /// source's lookup key and id entry so later `get_texture` calls find it.
    pub fn add_component(&mut self, id: TextureSourceId, component: ComponentId) {
        let Some(source) = self.source_opt(id) else {
            return;
        };
        if source.components.insert(component) && source.components.len() == 1 {
            self.by_id.insert(id, ());
            let key = self.source(id).lookup_id.clone();
            if let Some(key) = key {
                self.by_key.entry(key).or_insert(id);
            }
        }
    }

    /// Drops a component reference. On the last one the source leaves the
    /// atlas and the fast id lookup, but its GPU memory stays resident until
    /// an explicit sweep.
    pub fn remove_component(&mut self, id: TextureSourceId, component: ComponentId) {
        let Some(source) = self.source_opt(id) else {
            return;
        };
        if source.components.remove(&component) && source.components.is_empty() {
            source.in_texture_atlas = false;
            self.by_id.remove(&id);
        }
    }

    /// Frees every uploaded, non-permanent source with zero references.
    #[tracing::instrument(skip_all)]
    pub fn free_unused_texture_sources(&mut self, adapter: &mut dyn PlatformAdapter) {
        let uploaded = std::mem::take(&mut self.uploaded);
        let mut freed_pixels = 0u64;
        for id in uploaded {
            let Some(source) = self.source_opt(id) else {
                continue;
            };
            if source.gl_texture.is_none() {
                continue;
            }
            if !source.permanent && source.components.is_empty() {
                freed_pixels += (source.w as u64) * (source.h as u64);
                self.free_texture_source(id, adapter);
            } else {
                self.uploaded.push(id);
            }
        }
        tracing::info!(
            freed_pixels,
            resident_pixels = self.used_texture_memory,
            "freed unused texture sources"
        );
    }

    /// Releases one source's GPU texture and forgets its lookup key. The
    /// source itself stays registered and can be reloaded later.
    pub fn free_texture_source(&mut self, id: TextureSourceId, adapter: &mut dyn PlatformAdapter) {
        let Some(source) = self.source_opt(id) else {
            return;
        };
        let pixels = (source.w as u64) * (source.h as u64);
        let handle = source.gl_texture.take();
        source.loading_since = None;
        let key = source.lookup_id.clone();
        if let Some(handle) = handle {
            self.used_texture_memory -= pixels;
            adapter.delete_texture(handle);
        }
        if let Some(key) = key
            && self.by_key.get(&key) == Some(&id)
        {
            self.by_key.remove(&key);
        }
    }

    /// Frees a source regardless of references and unregisters it entirely.
    pub fn remove_texture_source(&mut self, id: TextureSourceId, adapter: &mut dyn PlatformAdapter) {
        self.free_texture_source(id, adapter);
        self.by_id.remove(&id);
        self.uploaded.retain(|&u| u != id);
    }
}

impl std::fmt::Debug for TextureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureManager")
            .field("sources", &self.sources.len())
            .field("uploaded", &self.uploaded.len())
            .field("used_texture_memory", &self.used_texture_memory)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{HeadlessAdapter, ImagePayload};

    fn component(index: usize) -> ComponentId {
        ComponentId::from_index(index)
    }

    fn manager_with(adapter: &mut HeadlessAdapter, entries: &[(&str, u32, u32)]) -> TextureManager {
        for &(src, w, h) in entries {
            adapter.register_payload(src, ImagePayload::blank(w, h));
        }
        TextureManager::new(0)
    }

    #[test]
    fn same_key_resolves_to_same_source() {
        let mut adapter = HeadlessAdapter::new();
        let mut manager = manager_with(&mut adapter, &[("a.png", 4, 4)]);
        let t1 = manager.get_texture("a.png", TextureOptions::default());
        let t2 = manager.get_texture("a.png", TextureOptions::default());
        assert_eq!(t1.source, t2.source);

        let with_id = manager.get_texture(
            "ignored.png",
            TextureOptions {
                id: Some("a.png".into()),
                ..Default::default()
            },
        );
        assert_eq!(with_id.source, t1.source);
    }

    #[test]
    fn load_uploads_and_accounts_memory() {
        let mut adapter = HeadlessAdapter::new();
        let mut manager = manager_with(&mut adapter, &[("a.png", 8, 4)]);
        let tex = manager.get_texture("a.png", TextureOptions::default());
        manager.add_component(tex.source, component(0));
        manager.load_texture(tex, &mut adapter);
        let loaded = manager.process_loads(&mut adapter);
        assert_eq!(loaded, vec![tex.source]);
        assert!(manager.source(tex.source).is_loaded());
        assert_eq!(manager.source(tex.source).dimensions(), (8, 4));
        assert_eq!(manager.used_texture_memory(), 32);
    }

    #[test]
    fn repeated_requests_within_window_are_coalesced() {
        let mut adapter = HeadlessAdapter::new();
        adapter.defer_loads(true);
        let mut manager = manager_with(&mut adapter, &[("a.png", 4, 4)]);
        let tex = manager.get_texture("a.png", TextureOptions::default());
        manager.add_component(tex.source, component(0));

        manager.load_texture(tex, &mut adapter);
        adapter.advance(10.0);
        manager.load_texture(tex, &mut adapter);
        assert_eq!(adapter.load_requests(), 1);

        // Past the freshness window a new request goes out.
        adapter.advance(25.0);
        manager.load_texture(tex, &mut adapter);
        assert_eq!(adapter.load_requests(), 2);
    }

    #[test]
    fn completion_for_unreferenced_source_is_discarded() {
        let mut adapter = HeadlessAdapter::new();
        adapter.defer_loads(true);
        let mut manager = manager_with(&mut adapter, &[("a.png", 4, 4)]);
        let tex = manager.get_texture("a.png", TextureOptions::default());
        manager.add_component(tex.source, component(0));
        manager.load_texture(tex, &mut adapter);
        manager.remove_component(tex.source, component(0));
        adapter.flush_loads();
        assert!(manager.process_loads(&mut adapter).is_empty());
        assert!(!manager.source(tex.source).is_loaded());
        assert_eq!(manager.used_texture_memory(), 0);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut adapter = HeadlessAdapter::new();
        let mut manager = TextureManager::new(0);
        adapter.register_payload(
            "big.png",
            ImagePayload {
                width: 4096,
                height: 4096,
                rgba8: std::sync::Arc::new(Vec::new()),
            },
        );
        let tex = manager.get_texture("big.png", TextureOptions::default());
        manager.add_component(tex.source, component(0));
        manager.load_texture(tex, &mut adapter);
        assert!(manager.process_loads(&mut adapter).is_empty());
        assert!(!manager.source(tex.source).is_loaded());
        assert_eq!(manager.used_texture_memory(), 0);
        assert_eq!(adapter.live_textures(), 0);
    }

    #[test]
    fn sweep_frees_only_unreferenced_non_permanent_sources() {
        let mut adapter = HeadlessAdapter::new();
        let mut manager = manager_with(
            &mut adapter,
            &[("kept.png", 2, 2), ("perm.png", 3, 3), ("gone.png", 4, 4)],
        );
        let kept = manager.get_texture("kept.png", TextureOptions::default());
        let perm = manager.get_texture("perm.png", TextureOptions::default());
        let gone = manager.get_texture("gone.png", TextureOptions::default());
        for tex in [kept, perm, gone] {
            manager.add_component(tex.source, component(0));
            manager.load_texture(tex, &mut adapter);
        }
        manager.process_loads(&mut adapter);
        manager.source_mut(perm.source).set_permanent(true);
        manager.remove_component(perm.source, component(0));
        manager.remove_component(gone.source, component(0));

        manager.free_unused_texture_sources(&mut adapter);
        assert!(manager.source(kept.source).is_loaded());
        assert!(manager.source(perm.source).is_loaded());
        assert!(!manager.source(gone.source).is_loaded());
        assert_eq!(manager.used_texture_memory(), 4 + 9);
        assert_eq!(adapter.live_textures(), 2);

        // The key was forgotten, so the next lookup builds a fresh source.
        let again = manager.get_texture("gone.png", TextureOptions::default());
        assert_ne!(again.source, gone.source);
    }

    #[test]
    fn remove_texture_source_forces_release() {
        let mut adapter = HeadlessAdapter::new();
        let mut manager = manager_with(&mut adapter, &[("a.png", 4, 4)]);
        let tex = manager.get_texture("a.png", TextureOptions::default());
        manager.add_component(tex.source, component(0));
        manager.load_texture(tex, &mut adapter);
        manager.process_loads(&mut adapter);
        // Still referenced, removed anyway.
        manager.remove_texture_source(tex.source, &mut adapter);
        assert!(!manager.source(tex.source).is_loaded());
        assert_eq!(manager.used_texture_memory(), 0);
        assert_eq!(adapter.live_textures(), 0);
    }

    #[test]
    fn budget_check_reports_full() {
        let mut adapter = HeadlessAdapter::new();
        adapter.register_payload("a.png", ImagePayload::blank(10, 10));
        let mut manager = TextureManager::new(50);
        let tex = manager.get_texture("a.png", TextureOptions::default());
        manager.add_component(tex.source, component(0));
        manager.load_texture(tex, &mut adapter);
        assert!(!manager.is_full());
        manager.process_loads(&mut adapter);
        assert!(manager.is_full());
    }
}
