//! Scene-graph node storage.
//!
//! Components live in the stage's arena and reference each other through
//! [`ComponentId`] handles. The struct here is pure data plus a few local
//! accessors; all tree mutation, activity cascading and texture bookkeeping
//! go through the stage so the invariants stay in one place.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::property::{PAINT_PROPERTIES, Property};
use crate::texture::Texture;
use crate::transition::Transition;

/// Handle into the stage's component arena. Handles are not reused;
/// accessing a destroyed component panics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(u32);

impl ComponentId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Activation callback; fired after a component's whole subtree has settled
/// into the new activity state.
pub type NotifyFn = Box<dyn FnMut(&mut crate::stage::Stage, ComponentId)>;

type TransitionSlots = Box<[Option<Transition>; PAINT_PROPERTIES]>;

pub struct Component {
    pub(crate) id: ComponentId,
    pub(crate) parent: Option<ComponentId>,
    pub(crate) children: Vec<ComponentId>,
    /// Part of the renderable tree: visible, non-zero alpha and reachable
    /// from the root through active ancestors.
    pub(crate) active: bool,
    /// The 24 interpolated properties in slot encoding, indexed by
    /// [`Property::index`].
    pub(crate) paint: [f64; PAINT_PROPERTIES],
    pub(crate) visible: bool,
    pub(crate) z_index: i32,
    pub(crate) force_z_index_context: bool,
    pub(crate) clipping: bool,
    /// Lazily allocated; most components never bind a transition.
    pub(crate) transitions: Option<TransitionSlots>,
    /// Tags set on this component itself.
    pub(crate) tags: BTreeSet<String>,
    /// Tag -> every component in this subtree (self included) carrying it.
    /// Maintained incrementally on attach/detach and tag changes.
    pub(crate) tree_tags: HashMap<String, BTreeSet<ComponentId>>,
    /// What the component wants to show.
    pub(crate) texture: Option<Texture>,
    /// What is actually on screen; trails `texture` until its source loads.
    pub(crate) displayed_texture: Option<Texture>,
    pub(crate) src: Option<String>,
    pub(crate) notify_activate: Option<NotifyFn>,
    pub(crate) notify_deactivate: Option<NotifyFn>,
    /// Free-form settings keys that matched no known property.
    pub(crate) extra: BTreeMap<String, serde_json::Value>,
}

impl Component {
    pub(crate) fn new(id: ComponentId) -> Self {
        let mut paint = [0.0; PAINT_PROPERTIES];
        for p in crate::property::ALL.iter().filter(|p| p.is_paint()) {
            paint[p.index()] = p.default_value();
        }
        Self {
            id,
            parent: None,
            children: Vec::new(),
            active: false,
            paint,
            visible: true,
            z_index: 0,
            force_z_index_context: false,
            clipping: false,
            transitions: None,
            tags: BTreeSet::new(),
            tree_tags: HashMap::new(),
            texture: None,
            displayed_texture: None,
            src: None,
            notify_activate: None,
            notify_deactivate: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn parent(&self) -> Option<ComponentId> {
        self.parent
    }

    pub fn children(&self) -> &[ComponentId] {
        &self.children
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn texture(&self) -> Option<Texture> {
        self.texture
    }

    pub fn displayed_texture(&self) -> Option<Texture> {
        self.displayed_texture
    }

    pub fn src(&self) -> Option<&str> {
        self.src.as_deref()
    }

    pub fn extra(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.extra
    }

    pub(crate) fn transition(&self, property: Property) -> Option<&Transition> {
        self.transitions
            .as_ref()
            .and_then(|slots| slots[property.index()].as_ref())
    }

    pub(crate) fn transition_mut(&mut self, property: Property) -> Option<&mut Transition> {
        self.transitions
            .as_mut()
            .and_then(|slots| slots[property.index()].as_mut())
    }

    pub(crate) fn transition_slots(&mut self) -> &mut TransitionSlots {
        self.transitions
            .get_or_insert_with(|| Box::new(std::array::from_fn(|_| None)))
    }

    /// Discrete flag value in slot encoding.
    pub(crate) fn flag_slot(&self, property: Property) -> f64 {
        match property {
            Property::Visible => {
                if self.visible {
                    1.0
                } else {
                    0.0
                }
            }
            Property::ZIndex => self.z_index as f64,
            Property::ForceZIndexContext => {
                if self.force_z_index_context {
                    1.0
                } else {
                    0.0
                }
            }
            Property::Clipping => {
                if self.clipping {
                    1.0
                } else {
                    0.0
                }
            }
            _ => unreachable!("not a flag property"),
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("active", &self.active)
            .field("visible", &self.visible)
            .field("tags", &self.tags)
            .field("texture", &self.texture)
            .field("displayed_texture", &self.displayed_texture)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_component_carries_paint_defaults() {
        let c = Component::new(ComponentId::from_index(0));
        assert_eq!(c.paint[Property::X.index()], 0.0);
        assert_eq!(c.paint[Property::Alpha.index()], 1.0);
        assert_eq!(c.paint[Property::ScaleY.index()], 1.0);
        assert_eq!(c.paint[Property::PivotX.index()], 0.5);
        assert!(c.visible);
        assert!(!c.active);
        assert_eq!(c.z_index, 0);
    }

    #[test]
    fn flag_slots_encode_discrete_state() {
        let mut c = Component::new(ComponentId::from_index(0));
        assert_eq!(c.flag_slot(Property::Visible), 1.0);
        c.visible = false;
        c.z_index = 7;
        assert_eq!(c.flag_slot(Property::Visible), 0.0);
        assert_eq!(c.flag_slot(Property::ZIndex), 7.0);
    }
}
