//! stagelight: a retained-mode 2D scene-graph runtime for GPU-accelerated
//! UIs on embedded and TV devices.
//!
//! The [`stage::Stage`] owns a tree of [`component::Component`]s addressed
//! by id, a deduplicating [`texture_manager::TextureManager`] with explicit
//! eviction, per-property [`transition::Transition`]s and multi-property
//! [`animation::TimedAnimation`]s. Platform concerns (GL, image loading,
//! the clock) sit behind the [`adapter::PlatformAdapter`] trait; the
//! [`adapter::HeadlessAdapter`] runs everything in memory.
//!
//! One call to [`stage::Stage::progress_frame`] per frame drains texture
//! load completions, advances transitions and applies animations.

#![forbid(unsafe_code)]

pub mod adapter;
pub mod animation;
pub mod color;
pub mod component;
pub mod ease;
pub mod error;
pub mod property;
pub mod stage;
pub mod texture;
pub mod texture_manager;
pub mod transition;

pub use adapter::{GlTexture, HeadlessAdapter, ImagePayload, LoadCompletion, PlatformAdapter};
pub use animation::{
    ActionValue, AnimationAction, AnimationEvent, AnimationState, StopMethod, StopMethodOptions,
    TimedAnimation,
};
pub use component::{Component, ComponentId};
pub use ease::Ease;
pub use error::{StageError, StageResult};
pub use property::{PropKind, PropValue, Property};
pub use stage::{AnimationId, Stage, StageOptions};
pub use texture::{LoadedSource, Texture, TextureSource, TextureSourceId};
pub use texture_manager::{TextureManager, TextureOptions};
pub use transition::{Transition, TransitionSettings, TransitionStep};
