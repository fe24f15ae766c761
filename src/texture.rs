//! Texture sources and their lightweight per-component views.
//!
//! A [`TextureSource`] owns the loading state and GPU handle for one image
//! and is shared by every component that displays it. A [`Texture`] is a
//! cheap value tying a source to an optional clipping rectangle; components
//! hold textures, never sources.

use std::collections::BTreeSet;
use std::fmt;

use crate::adapter::{GlTexture, ImagePayload, LoadCompletion, PlatformAdapter};
use crate::component::ComponentId;

/// Handle into the texture manager's source arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureSourceId(u32);

impl TextureSourceId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A view onto a texture source, optionally clipped to a sub-rectangle.
/// Copyable by design: components exchange these freely.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Texture {
    pub source: TextureSourceId,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    /// Whether any clipping coordinate was specified. A clip of all zeroes
    /// is distinct from no clip at all.
    pub clipping: bool,
}

impl Texture {
    pub fn new(source: TextureSourceId) -> Self {
        Self {
            source,
            x: 0.0,
            y: 0.0,
            w: 0.0,
            h: 0.0,
            clipping: false,
        }
    }

    pub fn with_clip(source: TextureSourceId, x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            source,
            x,
            y,
            w,
            h,
            clipping: x != 0.0 || y != 0.0 || w != 0.0 || h != 0.0,
        }
    }
}

/// Successful load result handed back by an adapter.
#[derive(Clone, Debug)]
pub struct LoadedSource {
    pub payload: ImagePayload,
    /// Source pixel density relative to logical coordinates.
    pub precision: f64,
    /// Free-form metadata the adapter wants to associate with the source.
    pub render_info: Option<serde_json::Value>,
}

impl LoadedSource {
    pub fn new(payload: ImagePayload) -> Self {
        Self {
            payload,
            precision: 1.0,
            render_info: None,
        }
    }
}

/// Outcome of one load request, delivered over the manager's channel.
#[derive(Debug)]
pub struct LoadEvent {
    pub source: TextureSourceId,
    pub result: Result<LoadedSource, String>,
}

/// Callback that kicks off loading for one source. Invoked with the adapter
/// and a completion to resolve; may be invoked again if a load times out.
pub type SourceLoader = Box<dyn FnMut(&mut dyn PlatformAdapter, LoadCompletion)>;

/// Shared loading state and GPU residency for one image source.
pub struct TextureSource {
    pub(crate) id: TextureSourceId,
    /// Key under which the manager deduplicates this source, usually the
    /// source string or an explicit id.
    pub(crate) lookup_id: Option<String>,
    pub(crate) loader: SourceLoader,
    /// Timestamp of the in-flight load request, if any. Repeated requests
    /// within the freshness window are coalesced.
    pub(crate) loading_since: Option<f64>,
    pub(crate) w: u32,
    pub(crate) h: u32,
    pub(crate) precision: f64,
    pub(crate) render_info: Option<serde_json::Value>,
    pub(crate) gl_texture: Option<GlTexture>,
    /// Permanent sources survive eviction even with zero references.
    pub(crate) permanent: bool,
    pub(crate) in_texture_atlas: bool,
    pub(crate) components: BTreeSet<ComponentId>,
}

impl TextureSource {
    pub(crate) fn new(id: TextureSourceId, loader: SourceLoader, lookup_id: Option<String>) -> Self {
        Self {
            id,
            lookup_id,
            loader,
            loading_since: None,
            w: 0,
            h: 0,
            precision: 1.0,
            render_info: None,
            gl_texture: None,
            permanent: false,
            in_texture_atlas: false,
            components: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> TextureSourceId {
        self.id
    }

    pub fn lookup_id(&self) -> Option<&str> {
        self.lookup_id.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.gl_texture.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.loading_since.is_some()
    }

    pub fn gl_texture(&self) -> Option<GlTexture> {
        self.gl_texture
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.w, self.h)
    }

    pub fn precision(&self) -> f64 {
        self.precision
    }

    pub fn render_info(&self) -> Option<&serde_json::Value> {
        self.render_info.as_ref()
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    pub fn set_permanent(&mut self, permanent: bool) {
        self.permanent = permanent;
    }

    pub fn is_used(&self) -> bool {
        !self.components.is_empty()
    }

    pub fn components(&self) -> &BTreeSet<ComponentId> {
        &self.components
    }
}

impl fmt::Debug for TextureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureSource")
            .field("id", &self.id)
            .field("lookup_id", &self.lookup_id)
            .field("loading_since", &self.loading_since)
            .field("w", &self.w)
            .field("h", &self.h)
            .field("gl_texture", &self.gl_texture)
            .field("permanent", &self.permanent)
            .field("components", &self.components.len())
            .finish_non_exhaustive()
    }
}
