//! The stage: component arena, frame driver and the glue between
//! components, transitions, animations and the texture cache.
//!
//! All scene mutation flows through methods here so the cross-cutting
//! invariants (activity cascading, tag aggregation, texture reference
//! counts) are maintained in one place. One call to
//! [`Stage::progress_frame`] per frame advances everything.

use serde_json::Value;

use crate::adapter::PlatformAdapter;
use crate::animation::{AnimationEvent, AnimationState, TimedAnimation};
use crate::component::{Component, ComponentId};
use crate::error::{StageError, StageResult};
use crate::property::{PropValue, Property};
use crate::texture::{Texture, TextureSourceId};
use crate::texture_manager::{TextureManager, TextureOptions};
use crate::transition::{Transition, TransitionSettings};

/// Handle into the stage's animation arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AnimationId(u32);

impl AnimationId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StageOptions {
    /// Soft GPU memory budget in pixels; 0 disables [`Stage::is_full`].
    pub texture_memory_budget: u64,
}

pub struct Stage {
    nodes: Vec<Option<Component>>,
    root: ComponentId,
    texture_manager: TextureManager,
    adapter: Box<dyn PlatformAdapter>,
    animations: Vec<Option<TimedAnimation>>,
    active_animations: Vec<AnimationId>,
    active_transitions: Vec<(ComponentId, Property)>,
    finished_transitions: Vec<(ComponentId, Property)>,
    frame_counter: u64,
    /// Count of active components with a non-zero z-index; lets a renderer
    /// skip z-sorting entirely when zero.
    z_index_usage: i64,
}

impl Stage {
    pub fn new(adapter: Box<dyn PlatformAdapter>) -> Self {
        Self::with_options(adapter, StageOptions::default())
    }

    pub fn with_options(adapter: Box<dyn PlatformAdapter>, options: StageOptions) -> Self {
        let root = ComponentId::from_index(0);
        let mut stage = Self {
            nodes: vec![Some(Component::new(root))],
            root,
            texture_manager: TextureManager::new(options.texture_memory_budget),
            adapter,
            animations: Vec::new(),
            active_animations: Vec::new(),
            active_transitions: Vec::new(),
            finished_transitions: Vec::new(),
            frame_counter: 0,
            z_index_usage: 0,
        };
        stage.update_active_flag(root);
        stage
    }

    pub fn root(&self) -> ComponentId {
        self.root
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn z_index_usage(&self) -> i64 {
        self.z_index_usage
    }

    pub fn texture_manager(&self) -> &TextureManager {
        &self.texture_manager
    }

    pub fn texture_manager_mut(&mut self) -> &mut TextureManager {
        &mut self.texture_manager
    }

    pub fn adapter_mut(&mut self) -> &mut dyn PlatformAdapter {
        self.adapter.as_mut()
    }

    pub fn is_full(&self) -> bool {
        self.texture_manager.is_full()
    }

    /// Borrows a component. Panics if `id` was destroyed; handles are not
    /// reused, so this only happens on caller bookkeeping bugs.
    pub fn component(&self, id: ComponentId) -> &Component {
        self.node(id)
    }

    pub fn exists(&self, id: ComponentId) -> bool {
        self.nodes
            .get(id.index())
            .is_some_and(|slot| slot.is_some())
    }

    fn node(&self, id: ComponentId) -> &Component {
        self.nodes[id.index()]
            .as_ref()
            .expect("component was destroyed")
    }

    fn node_mut(&mut self, id: ComponentId) -> &mut Component {
        self.nodes[id.index()]
            .as_mut()
            .expect("component was destroyed")
    }

    // ---- component lifecycle ----

    /// Creates a detached, inactive component.
    pub fn create_component(&mut self) -> ComponentId {
        let id = ComponentId::from_index(self.nodes.len());
        self.nodes.push(Some(Component::new(id)));
        id
    }

    /// Detaches a component and frees its whole subtree. The root cannot be
    /// destroyed.
    pub fn destroy_component(&mut self, id: ComponentId) -> StageResult<()> {
        if id == self.root {
            return Err(StageError::invalid_setting("cannot destroy the root component"));
        }
        if let Some(parent) = self.node(id).parent {
            self.remove_child(parent, id)?;
        }
        let mut subtree = Vec::new();
        let mut stack = vec![id];
        while let Some(cid) = stack.pop() {
            stack.extend_from_slice(&self.node(cid).children);
            subtree.push(cid);
        }
        for anim in self.animations.iter_mut().flatten() {
            if anim.subject().is_some_and(|s| subtree.contains(&s)) {
                anim.set_subject(None);
            }
        }
        self.active_transitions
            .retain(|(cid, _)| !subtree.contains(cid));
        for cid in subtree {
            self.nodes[cid.index()] = None;
        }
        Ok(())
    }

    // ---- tree structure ----

    pub fn add_child(&mut self, parent: ComponentId, child: ComponentId) -> StageResult<()> {
        let at = self.node(parent).children.len();
        self.add_child_at(parent, child, at)
    }

    pub fn add_child_at(
        &mut self,
        parent: ComponentId,
        child: ComponentId,
        index: usize,
    ) -> StageResult<()> {
        if child == parent {
            return Ok(());
        }
        let len = self.node(parent).children.len();
        if index > len {
            return Err(StageError::IndexOutOfRange { index, len });
        }
        if self.node(child).parent == Some(parent)
            && self.node(parent).children.get(index) == Some(&child)
        {
            return Ok(());
        }
        if let Some(old) = self.node(child).parent {
            self.remove_child(old, child)?;
        }
        self.set_parent(child, Some(parent));
        let at = index.min(self.node(parent).children.len());
        self.node_mut(parent).children.insert(at, child);
        Ok(())
    }

    pub fn remove_child_at(
        &mut self,
        parent: ComponentId,
        index: usize,
    ) -> StageResult<ComponentId> {
        let len = self.node(parent).children.len();
        if index >= len {
            return Err(StageError::IndexOutOfRange { index, len });
        }
        let child = self.node(parent).children[index];
        self.set_parent(child, None);
        self.node_mut(parent).children.remove(index);
        Ok(child)
    }

    /// Detaches `child` from `parent`; a child not under `parent` is a no-op.
    pub fn remove_child(&mut self, parent: ComponentId, child: ComponentId) -> StageResult<()> {
        if let Some(index) = self.get_child_index(parent, child) {
            self.remove_child_at(parent, index)?;
        }
        Ok(())
    }

    pub fn get_child_index(&self, parent: ComponentId, child: ComponentId) -> Option<usize> {
        self.node(parent).children.iter().position(|&c| c == child)
    }

    pub fn remove_children(&mut self, parent: ComponentId) {
        let children = std::mem::take(&mut self.node_mut(parent).children);
        for child in children {
            self.set_parent(child, None);
        }
    }

    pub fn set_children(
        &mut self,
        parent: ComponentId,
        children: Vec<ComponentId>,
    ) -> StageResult<()> {
        self.remove_children(parent);
        for child in children {
            self.add_child(parent, child)?;
        }
        Ok(())
    }

    /// Relinks a component, moving its subtree's tag aggregates out of the
    /// old ancestor chain and into the new one, then recomputes activity.
    fn set_parent(&mut self, child: ComponentId, parent: Option<ComponentId>) {
        let old = self.node(child).parent;
        if old == parent {
            return;
        }
        let tag_keys: Vec<String> = self.node(child).tree_tags.keys().cloned().collect();
        if let Some(old_parent) = old {
            for tag in &tag_keys {
                let members = self.node(child).tree_tags[tag].clone();
                let mut cursor = Some(old_parent);
                while let Some(ancestor) = cursor {
                    cursor = self.node(ancestor).parent;
                    let node = self.node_mut(ancestor);
                    if let Some(set) = node.tree_tags.get_mut(tag) {
                        for member in &members {
                            set.remove(member);
                        }
                        if set.is_empty() {
                            node.tree_tags.remove(tag);
                        }
                    }
                }
            }
        }
        self.node_mut(child).parent = parent;
        if let Some(new_parent) = parent {
            for tag in &tag_keys {
                let members = self.node(child).tree_tags[tag].clone();
                let mut cursor = Some(new_parent);
                while let Some(ancestor) = cursor {
                    cursor = self.node(ancestor).parent;
                    self.node_mut(ancestor)
                        .tree_tags
                        .entry(tag.clone())
                        .or_default()
                        .extend(members.iter().copied());
                }
            }
        }
        self.update_active_flag(child);
    }

    // ---- activity ----

    fn compute_active(&self, id: ComponentId) -> bool {
        let node = self.node(id);
        node.visible
            && node.paint[Property::Alpha.index()] > 0.0
            && match node.parent {
                Some(parent) => self.node(parent).active,
                None => id == self.root,
            }
    }

    /// Recomputes the active flag for `id` and, on a change, cascades
    /// through its subtree. The component's own notification fires only
    /// after the whole subtree has settled.
    fn update_active_flag(&mut self, id: ComponentId) {
        let new_active = self.compute_active(id);
        if self.node(id).active == new_active {
            return;
        }
        if new_active {
            self.activate(id);
        } else {
            self.deactivate(id);
        }
        let children = self.node(id).children.clone();
        for child in children {
            self.update_active_flag(child);
        }
        let callback = if new_active {
            self.node_mut(id).notify_activate.take()
        } else {
            self.node_mut(id).notify_deactivate.take()
        };
        if let Some(mut callback) = callback {
            callback(self, id);
            if self.exists(id) {
                let slot = if new_active {
                    &mut self.node_mut(id).notify_activate
                } else {
                    &mut self.node_mut(id).notify_deactivate
                };
                // The callback may have installed a replacement.
                if slot.is_none() {
                    *slot = Some(callback);
                }
            }
        }
    }

    fn activate(&mut self, id: ComponentId) {
        if self.node(id).z_index != 0 {
            self.z_index_usage += 1;
        }
        let texture = self.node(id).texture;
        let displayed = self.node(id).displayed_texture;
        // Re-derive the displayed texture from what is actually loaded.
        let loaded = |stage: &Self, t: Option<Texture>| {
            t.filter(|t| stage.texture_manager.source(t.source).is_loaded())
        };
        let shown = loaded(self, texture).or(loaded(self, displayed));
        self.node_mut(id).displayed_texture = shown;
        self.node_mut(id).active = true;
        if let Some(t) = texture {
            self.acquire_texture(id, t);
        }
        if let Some(d) = shown
            && texture.map_or(true, |t| t.source != d.source)
        {
            self.texture_manager.add_component(d.source, id);
        }
    }

    fn deactivate(&mut self, id: ComponentId) {
        if self.node(id).z_index != 0 {
            self.z_index_usage -= 1;
        }
        let texture = self.node(id).texture;
        let displayed = self.node(id).displayed_texture;
        if let Some(t) = texture {
            self.texture_manager.remove_component(t.source, id);
        }
        if let Some(d) = displayed
            && texture.map_or(true, |t| t.source != d.source)
        {
            self.texture_manager.remove_component(d.source, id);
        }
        self.node_mut(id).active = false;
    }

    fn acquire_texture(&mut self, id: ComponentId, texture: Texture) {
        self.texture_manager.add_component(texture.source, id);
        if !self.texture_manager.source(texture.source).is_loaded() {
            self.texture_manager
                .load_texture(texture, self.adapter.as_mut());
        }
    }

    // ---- textures on components ----

    /// Sets what the component wants to show. The previously displayed
    /// texture keeps its reference (and stays on screen) until the new
    /// source finishes loading.
    pub fn set_texture(&mut self, id: ComponentId, texture: Option<Texture>) {
        let prev = self.node(id).texture;
        if prev == texture {
            return;
        }
        self.node_mut(id).texture = texture;
        let active = self.node(id).active;
        if active && let Some(p) = prev {
            let displayed = self.node(id).displayed_texture;
            let still_held = displayed.is_some_and(|d| d.source == p.source)
                || texture.is_some_and(|t| t.source == p.source);
            if !still_held {
                self.texture_manager.remove_component(p.source, id);
            }
        }
        match texture {
            Some(t) => {
                if active {
                    self.acquire_texture(id, t);
                }
                if self.texture_manager.source(t.source).is_loaded() {
                    self.set_displayed_texture(id, Some(t));
                }
            }
            None => self.set_displayed_texture(id, None),
        }
    }

    pub fn set_displayed_texture(&mut self, id: ComponentId, texture: Option<Texture>) {
        let prev = self.node(id).displayed_texture;
        if prev == texture {
            return;
        }
        let active = self.node(id).active;
        if active && let Some(p) = prev {
            let own = self.node(id).texture;
            let still_held = own.is_some_and(|t| t.source == p.source)
                || texture.is_some_and(|n| n.source == p.source);
            if !still_held {
                self.texture_manager.remove_component(p.source, id);
            }
        }
        if active && let Some(n) = texture {
            self.texture_manager.add_component(n.source, id);
        }
        self.node_mut(id).displayed_texture = texture;
    }

    /// Convenience: resolves a texture for a source string and assigns it.
    pub fn set_src(&mut self, id: ComponentId, src: Option<&str>) {
        match src {
            Some(src) => {
                if self.node(id).src.as_deref() == Some(src) {
                    return;
                }
                let texture = self.texture_manager.get_texture(src, TextureOptions::default());
                self.node_mut(id).src = Some(src.to_string());
                self.set_texture(id, Some(texture));
            }
            None => {
                self.node_mut(id).src = None;
                self.set_texture(id, None);
            }
        }
    }

    pub fn get_texture(&mut self, src: &str, options: TextureOptions) -> Texture {
        self.texture_manager.get_texture(src, options)
    }

    pub fn load_texture(&mut self, texture: Texture) {
        self.texture_manager
            .load_texture(texture, self.adapter.as_mut());
    }

    pub fn free_unused_texture_sources(&mut self) {
        self.texture_manager
            .free_unused_texture_sources(self.adapter.as_mut());
    }

    pub fn remove_texture_source(&mut self, id: TextureSourceId) {
        self.texture_manager
            .remove_texture_source(id, self.adapter.as_mut());
    }

    // ---- property access ----

    /// Logical value: the transition target when one is bound, otherwise the
    /// immediate value.
    pub fn get(&self, id: ComponentId, property: Property) -> PropValue {
        if property.is_paint() {
            let slot = match self.node(id).transition(property) {
                Some(t) => t.target_value(),
                None => self.node(id).paint[property.index()],
            };
            PropValue::from_slot(property, slot)
        } else {
            PropValue::from_slot(property, self.node(id).flag_slot(property))
        }
    }

    /// Immediate value, ignoring any bound transition.
    pub fn get_final(&self, id: ComponentId, property: Property) -> PropValue {
        let slot = if property.is_paint() {
            self.node(id).paint[property.index()]
        } else {
            self.node(id).flag_slot(property)
        };
        PropValue::from_slot(property, slot)
    }

    /// Logical set: routes through a bound transition, otherwise applies
    /// immediately.
    pub fn set(&mut self, id: ComponentId, property: Property, value: PropValue) {
        if property.is_paint() && self.node(id).transition(property).is_some() {
            let target = value.to_slot(property);
            let current = self.node(id).paint[property.index()];
            if let Some(transition) = self.node_mut(id).transition_mut(property)
                && transition.target_value() != target
                && transition.update_target_value(target, current)
            {
                self.active_transitions.push((id, property));
            }
        } else {
            self.set_final(id, property, value);
        }
    }

    /// Immediate set, bypassing any bound transition.
    pub fn set_final(&mut self, id: ComponentId, property: Property, value: PropValue) {
        self.write_slot(id, property, value.to_slot(property));
    }

    fn write_slot(&mut self, id: ComponentId, property: Property, slot: f64) {
        if property.is_paint() {
            let index = property.index();
            let old = self.node(id).paint[index];
            self.node_mut(id).paint[index] = slot;
            if property == Property::Alpha && (old > 0.0) != (slot > 0.0) {
                self.update_active_flag(id);
            }
        } else {
            match property {
                Property::Visible => {
                    let visible = slot != 0.0;
                    if self.node(id).visible != visible {
                        self.node_mut(id).visible = visible;
                        self.update_active_flag(id);
                    }
                }
                Property::ZIndex => {
                    let z = slot as i32;
                    let node = self.node_mut(id);
                    if node.z_index != z {
                        let was = node.z_index != 0;
                        let is = z != 0;
                        node.z_index = z;
                        if node.active && was != is {
                            self.z_index_usage += if is { 1 } else { -1 };
                        }
                    }
                }
                Property::ForceZIndexContext => {
                    self.node_mut(id).force_z_index_context = slot != 0.0;
                }
                Property::Clipping => {
                    self.node_mut(id).clipping = slot != 0.0;
                }
                _ => unreachable!(),
            }
        }
    }

    // ---- transitions ----

    /// Binds (or removes, with `None`) transition settings for a property
    /// name or alias. Only interpolated properties can carry transitions.
    pub fn set_transition(
        &mut self,
        id: ComponentId,
        name: &str,
        settings: Option<TransitionSettings>,
    ) -> StageResult<()> {
        for property in resolve_properties(name)? {
            if !property.is_paint() {
                return Err(StageError::invalid_setting(format!(
                    "property '{}' cannot be animated",
                    property.name()
                )));
            }
            match settings {
                Some(settings) => {
                    let current = self.node(id).paint[property.index()];
                    let slots = self.node_mut(id).transition_slots();
                    let transition = slots[property.index()]
                        .get_or_insert_with(|| Transition::new(property, current));
                    transition.set(settings);
                }
                None => {
                    if let Some(slots) = self.node_mut(id).transitions.as_mut() {
                        slots[property.index()] = None;
                    }
                    self.active_transitions
                        .retain(|&(cid, p)| !(cid == id && p == property));
                }
            }
        }
        Ok(())
    }

    pub fn transition(&self, id: ComponentId, name: &str) -> StageResult<Option<&Transition>> {
        let property =
            Property::from_name(name).ok_or_else(|| StageError::unknown_property(name))?;
        Ok(self.node(id).transition(property))
    }

    /// Snaps a running transition to its target, firing its finish
    /// notification.
    pub fn fast_forward(&mut self, id: ComponentId, name: &str) -> StageResult<()> {
        for property in resolve_properties(name)? {
            let Some(transition) = self.node_mut(id).transition_mut(property) else {
                continue;
            };
            if !transition.is_running() {
                continue;
            }
            let target = transition.target_value();
            transition.reset(target, target, 1.0);
            transition.mark_registered(false);
            self.active_transitions
                .retain(|&(cid, p)| !(cid == id && p == property));
            self.write_slot(id, property, target);
            self.finished_transitions.push((id, property));
        }
        Ok(())
    }

    /// Drains `(component, property)` pairs whose transition reached its
    /// target since the last call.
    pub fn take_finished_transitions(&mut self) -> Vec<(ComponentId, Property)> {
        std::mem::take(&mut self.finished_transitions)
    }

    // ---- tags ----

    pub fn add_tag(&mut self, id: ComponentId, tag: &str) {
        if !self.node_mut(id).tags.insert(tag.to_string()) {
            return;
        }
        let mut cursor = Some(id);
        while let Some(cid) = cursor {
            cursor = self.node(cid).parent;
            self.node_mut(cid)
                .tree_tags
                .entry(tag.to_string())
                .or_default()
                .insert(id);
        }
    }

    pub fn remove_tag(&mut self, id: ComponentId, tag: &str) {
        if !self.node_mut(id).tags.remove(tag) {
            return;
        }
        let mut cursor = Some(id);
        while let Some(cid) = cursor {
            cursor = self.node(cid).parent;
            let node = self.node_mut(cid);
            if let Some(set) = node.tree_tags.get_mut(tag) {
                set.remove(&id);
                if set.is_empty() {
                    node.tree_tags.remove(tag);
                }
            }
        }
    }

    pub fn set_tags<S: AsRef<str>>(&mut self, id: ComponentId, tags: &[S]) {
        let current: Vec<String> = self.node(id).tags.iter().cloned().collect();
        for tag in &current {
            if !tags.iter().any(|t| t.as_ref() == tag) {
                self.remove_tag(id, tag);
            }
        }
        for tag in tags {
            self.add_tag(id, tag.as_ref());
        }
    }

    pub fn has_tag(&self, id: ComponentId, tag: &str) -> bool {
        self.node(id).tags.contains(tag)
    }

    /// All components in the subtree of `id` (itself included) carrying
    /// `tag`, in creation order.
    pub fn get_by_tag(&self, id: ComponentId, tag: &str) -> Vec<ComponentId> {
        self.node(id)
            .tree_tags
            .get(tag)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn tag(&self, id: ComponentId, tag: &str) -> Option<ComponentId> {
        self.node(id)
            .tree_tags
            .get(tag)
            .and_then(|set| set.iter().next().copied())
    }

    pub fn set_by_tag(
        &mut self,
        id: ComponentId,
        tag: &str,
        settings: &Value,
    ) -> StageResult<()> {
        for target in self.get_by_tag(id, tag) {
            self.set_settings(target, settings)?;
        }
        Ok(())
    }

    // ---- notifications ----

    pub fn on_activate(
        &mut self,
        id: ComponentId,
        callback: impl FnMut(&mut Stage, ComponentId) + 'static,
    ) {
        self.node_mut(id).notify_activate = Some(Box::new(callback));
    }

    pub fn on_deactivate(
        &mut self,
        id: ComponentId,
        callback: impl FnMut(&mut Stage, ComponentId) + 'static,
    ) {
        self.node_mut(id).notify_deactivate = Some(Box::new(callback));
    }

    // ---- bulk settings ----

    /// Applies a settings object. Property keys dispatch by name (UPPERCASE
    /// forms bypass transitions), aliases fan out, and the structural keys
    /// `tag`/`tags`, `src`, `children` and `transitions` are handled
    /// specially. Unknown keys are kept as free-form extras.
    pub fn set_settings(&mut self, id: ComponentId, settings: &Value) -> StageResult<()> {
        let object = settings
            .as_object()
            .ok_or_else(|| StageError::invalid_setting("settings must be an object"))?;
        for (key, value) in object {
            self.apply_setting(id, key, value)?;
        }
        Ok(())
    }

    fn apply_setting(&mut self, id: ComponentId, key: &str, value: &Value) -> StageResult<()> {
        if let Some(properties) = Property::alias(key) {
            for &property in properties {
                let v = json_prop_value(property, value)?;
                self.set(id, property, v);
            }
            return Ok(());
        }
        if let Some(property) = Property::from_name(key) {
            self.set(id, property, json_prop_value(property, value)?);
            return Ok(());
        }
        if let Some(property) = Property::from_final_name(key) {
            self.set_final(id, property, json_prop_value(property, value)?);
            return Ok(());
        }
        match key {
            "tag" | "tags" => {
                let tags: Vec<String> = match value {
                    Value::String(s) => vec![s.clone()],
                    Value::Array(items) => items
                        .iter()
                        .map(|v| {
                            v.as_str().map(str::to_string).ok_or_else(|| {
                                StageError::invalid_setting("tags must be strings")
                            })
                        })
                        .collect::<StageResult<_>>()?,
                    _ => {
                        return Err(StageError::invalid_setting(
                            "tags must be a string or an array of strings",
                        ));
                    }
                };
                self.set_tags(id, &tags);
            }
            "src" => {
                let src = value
                    .as_str()
                    .ok_or_else(|| StageError::invalid_setting("src must be a string"))?;
                self.set_src(id, Some(src));
            }
            "children" => {
                let items = value
                    .as_array()
                    .ok_or_else(|| StageError::invalid_setting("children must be an array"))?;
                // Validate element types (and id references) before mutating.
                let mut resolved: Vec<Option<ComponentId>> = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(_) => resolved.push(None),
                        Value::Number(n) => {
                            let existing = n
                                .as_u64()
                                .filter(|&i| i <= u32::MAX as u64)
                                .map(|i| ComponentId::from_index(i as usize))
                                .filter(|&c| self.exists(c))
                                .ok_or_else(|| {
                                    StageError::invalid_setting(format!(
                                        "unknown child component id {item}"
                                    ))
                                })?;
                            resolved.push(Some(existing));
                        }
                        _ => {
                            return Err(StageError::invalid_setting(format!(
                                "child settings must be objects or ids, got {item}"
                            )));
                        }
                    }
                }
                self.remove_children(id);
                for (item, existing) in items.iter().zip(resolved) {
                    let child = match existing {
                        Some(child) => child,
                        None => {
                            let child = self.create_component();
                            self.set_settings(child, item)?;
                            child
                        }
                    };
                    self.add_child(id, child)?;
                }
            }
            "transitions" => {
                let object = value
                    .as_object()
                    .ok_or_else(|| StageError::invalid_setting("transitions must be an object"))?;
                for (name, entry) in object {
                    if entry.is_null() {
                        self.set_transition(id, name, None)?;
                    } else {
                        let settings: TransitionSettings = serde_json::from_value(entry.clone())
                            .map_err(|e| {
                                StageError::invalid_setting(format!(
                                    "bad transition settings for '{name}': {e}"
                                ))
                            })?;
                        self.set_transition(id, name, Some(settings))?;
                    }
                }
            }
            _ => {
                self.node_mut(id)
                    .extra
                    .insert(key.to_string(), value.clone());
            }
        }
        Ok(())
    }

    /// Serializes the component (and its children, recursively) back to a
    /// settings object containing only non-default values. Quads that agree
    /// collapse to their alias form.
    pub fn get_settings_object(&self, id: ComponentId) -> Value {
        let mut map = serde_json::Map::new();
        let node = self.node(id);

        if !node.tags.is_empty() {
            map.insert(
                "tags".into(),
                Value::Array(node.tags.iter().cloned().map(Value::String).collect()),
            );
        }

        let slot = |p: Property| match node.transition(p) {
            Some(t) => t.target_value(),
            None => node.paint[p.index()],
        };
        let mut number = |key: &str, p: Property| {
            let v = slot(p);
            if v != p.default_value() {
                map.insert(key.into(), serde_json::json!(v));
            }
        };
        number("x", Property::X);
        number("y", Property::Y);
        number("w", Property::W);
        number("h", Property::H);

        let (sx, sy) = (slot(Property::ScaleX), slot(Property::ScaleY));
        if sx == sy {
            if sx != 1.0 {
                map.insert("scale".into(), serde_json::json!(sx));
            }
        } else {
            map.insert("scaleX".into(), serde_json::json!(sx));
            map.insert("scaleY".into(), serde_json::json!(sy));
        }

        let mut number = |key: &str, p: Property| {
            let v = slot(p);
            if v != p.default_value() {
                map.insert(key.into(), serde_json::json!(v));
            }
        };
        number("pivotX", Property::PivotX);
        number("pivotY", Property::PivotY);
        number("mountX", Property::MountX);
        number("mountY", Property::MountY);
        number("alpha", Property::Alpha);
        number("rotation", Property::Rotation);

        let mut quad = |key: &str, properties: &[Property]| {
            let values: Vec<f64> = properties.iter().map(|&p| slot(p)).collect();
            let default = properties[0].default_value();
            if values.iter().all(|&v| v == values[0]) {
                if values[0] != default {
                    map.insert(key.into(), json_slot(properties[0], values[0]));
                }
            } else {
                for (&p, &v) in properties.iter().zip(&values) {
                    if v != default {
                        map.insert(p.name().into(), json_slot(p, v));
                    }
                }
            }
        };
        quad("borderWidth", Property::alias("borderWidth").unwrap());
        quad("borderColor", Property::alias("borderColor").unwrap());
        quad("color", Property::alias("color").unwrap());

        if !node.visible {
            map.insert("visible".into(), Value::Bool(false));
        }
        if node.clipping {
            map.insert("clipping".into(), Value::Bool(true));
        }
        if node.z_index != 0 {
            map.insert("zIndex".into(), serde_json::json!(node.z_index));
        }
        if node.force_z_index_context {
            map.insert("forceZIndexContext".into(), Value::Bool(true));
        }
        if let Some(src) = &node.src {
            map.insert("src".into(), Value::String(src.clone()));
        }
        for (key, value) in &node.extra {
            map.insert(key.clone(), value.clone());
        }
        if !node.children.is_empty() {
            map.insert(
                "children".into(),
                Value::Array(
                    node.children
                        .iter()
                        .map(|&c| self.get_settings_object(c))
                        .collect(),
                ),
            );
        }
        Value::Object(map)
    }

    // ---- tree queries ----

    pub fn get_depth(&self, id: ComponentId) -> usize {
        let mut depth = 0;
        let mut cursor = self.node(id).parent;
        while let Some(cid) = cursor {
            depth += 1;
            cursor = self.node(cid).parent;
        }
        depth
    }

    /// Ancestor `levels` steps up, or `None` when the chain is shorter.
    pub fn get_ancestor(&self, id: ComponentId, levels: usize) -> Option<ComponentId> {
        let mut cursor = id;
        for _ in 0..levels {
            cursor = self.node(cursor).parent?;
        }
        Some(cursor)
    }

    pub fn is_ancestor_of(&self, id: ComponentId, other: ComponentId) -> bool {
        let mut cursor = self.node(other).parent;
        while let Some(cid) = cursor {
            if cid == id {
                return true;
            }
            cursor = self.node(cid).parent;
        }
        false
    }

    pub fn get_shared_ancestor(
        &self,
        a: ComponentId,
        b: ComponentId,
    ) -> Option<ComponentId> {
        let (da, db) = (self.get_depth(a), self.get_depth(b));
        let mut a = self.get_ancestor(a, da.saturating_sub(db))?;
        let mut b = self.get_ancestor(b, db.saturating_sub(da))?;
        loop {
            if a == b {
                return Some(a);
            }
            match (self.node(a).parent, self.node(b).parent) {
                (Some(pa), Some(pb)) => {
                    a = pa;
                    b = pb;
                }
                _ => return None,
            }
        }
    }

    // ---- animations ----

    pub fn add_animation(&mut self, animation: TimedAnimation) -> AnimationId {
        let id = AnimationId(self.animations.len() as u32);
        let register = animation.is_active();
        self.animations.push(Some(animation));
        if register {
            self.active_animations.push(id);
        }
        id
    }

    pub fn animation(&self, id: AnimationId) -> &TimedAnimation {
        self.animations[id.index()]
            .as_ref()
            .expect("animation is being progressed")
    }

    /// Mutable access for configuration. Use the stage-level control calls
    /// (`start_animation` and friends) to change playback state so the
    /// animation stays registered with the frame driver.
    pub fn animation_mut(&mut self, id: AnimationId) -> &mut TimedAnimation {
        self.animations[id.index()]
            .as_mut()
            .expect("animation is being progressed")
    }

    pub fn set_animation_subject(&mut self, id: AnimationId, subject: Option<ComponentId>) {
        self.animation_mut(id).set_subject(subject);
        self.sync_animation(id);
    }

    pub fn start_animation(&mut self, id: AnimationId) {
        self.animation_mut(id).start();
        self.sync_animation(id);
    }

    pub fn play_animation(&mut self, id: AnimationId) {
        self.animation_mut(id).play();
        self.sync_animation(id);
    }

    pub fn replay_animation(&mut self, id: AnimationId) {
        self.animation_mut(id).replay();
        self.sync_animation(id);
    }

    pub fn stop_animation(&mut self, id: AnimationId) {
        self.animation_mut(id).stop();
        self.sync_animation(id);
    }

    /// Stops immediately and resets the animated properties to their track
    /// start values.
    pub fn stop_animation_now(&mut self, id: AnimationId) {
        let mut animation = self.animations[id.index()]
            .take()
            .expect("animation is being progressed");
        animation.stop_now();
        if animation.take_stop_finished() {
            self.apply_animation(&animation);
            if animation.is_run_active() {
                animation.set_subject(None);
                animation.set_run_active(false);
            }
        }
        self.animations[id.index()] = Some(animation);
    }

    /// One-shot convenience: attaches `subject`, plays to the end, winds
    /// down with the stop method and detaches again.
    pub fn run_animation(&mut self, id: AnimationId, subject: ComponentId) {
        self.stop_animation_now(id);
        let animation = self.animation_mut(id);
        animation.set_subject(Some(subject));
        animation.set_run_active(true);
        animation.play();
        self.sync_animation(id);
    }

    pub fn take_animation_events(&mut self, id: AnimationId) -> Vec<AnimationEvent> {
        self.animation_mut(id).take_events()
    }

    fn sync_animation(&mut self, id: AnimationId) {
        if self.animation(id).is_active() && !self.active_animations.contains(&id) {
            self.active_animations.push(id);
        }
    }

    /// Writes the animation's current values into its subject tree.
    fn apply_animation(&mut self, animation: &TimedAnimation) {
        let Some(subject) = animation.subject() else {
            return;
        };
        if !self.exists(subject) {
            return;
        }
        let resetting = animation.state() == AnimationState::Stopped;
        let p = animation.eased_progress();
        let factor = animation.factor();
        for index in 0..animation.actions.len() {
            let action = &animation.actions[index];
            let value = if resetting {
                action.reset_value()
            } else {
                action.apply_value(p, factor)
            };
            let property = action.property;
            let targets: Vec<ComponentId> = if action.tags.is_empty() {
                vec![subject]
            } else {
                let mut set = std::collections::BTreeSet::new();
                for tag in &action.tags {
                    set.extend(self.get_by_tag(subject, tag));
                }
                set.into_iter().collect()
            };
            for target in targets {
                self.write_slot(target, property, value);
            }
        }
    }

    // ---- frame driver ----

    /// Advances the whole stage by `dt` seconds: texture load completions
    /// first, then transitions, then animations.
    #[tracing::instrument(skip(self), fields(frame = self.frame_counter))]
    pub fn progress_frame(&mut self, dt: f64) {
        self.frame_counter += 1;
        self.process_texture_loads();
        self.progress_transitions(dt);
        self.progress_animations(dt);
    }

    fn process_texture_loads(&mut self) {
        let loaded = self.texture_manager.process_loads(self.adapter.as_mut());
        for source in loaded {
            let holders: Vec<ComponentId> = self
                .texture_manager
                .source(source)
                .components()
                .iter()
                .copied()
                .collect();
            for id in holders {
                if !self.exists(id) {
                    continue;
                }
                if let Some(texture) = self.node(id).texture
                    && texture.source == source
                {
                    self.set_displayed_texture(id, Some(texture));
                }
            }
        }
    }

    fn progress_transitions(&mut self, dt: f64) {
        let running = std::mem::take(&mut self.active_transitions);
        let mut still_running = Vec::with_capacity(running.len());
        for (id, property) in running {
            if !self.exists(id) {
                continue;
            }
            let Some(slots) = self.node_mut(id).transitions.as_mut() else {
                continue;
            };
            let Some(mut transition) = slots[property.index()].take() else {
                continue;
            };
            let step = transition.progress(dt);
            if step.finished {
                transition.mark_registered(false);
            }
            // Put the transition back before applying; the write below may
            // cascade into user callbacks touching this component.
            self.node_mut(id).transition_slots()[property.index()] = Some(transition);
            self.write_slot(id, property, step.value);
            if step.finished {
                self.finished_transitions.push((id, property));
            } else {
                still_running.push((id, property));
            }
        }
        // Side effects above may have registered fresh transitions.
        still_running.append(&mut self.active_transitions);
        self.active_transitions = still_running;
    }

    fn progress_animations(&mut self, dt: f64) {
        let running = std::mem::take(&mut self.active_animations);
        let mut still_running = Vec::with_capacity(running.len());
        for id in running {
            let Some(mut animation) = self.animations[id.index()].take() else {
                continue;
            };
            if animation
                .subject()
                .is_none_or(|s| !self.exists(s))
            {
                animation.set_subject(None);
                self.animations[id.index()] = Some(animation);
                continue;
            }
            animation.progress(dt);
            self.apply_animation(&animation);
            if animation.take_stop_finished() && animation.is_run_active() {
                animation.set_subject(None);
                animation.set_run_active(false);
            }
            let keep = animation.is_active();
            self.animations[id.index()] = Some(animation);
            if keep {
                still_running.push(id);
            }
        }
        still_running.append(&mut self.active_animations);
        self.active_animations = still_running;
    }
}

fn resolve_properties(name: &str) -> StageResult<Vec<Property>> {
    if let Some(properties) = Property::alias(name) {
        Ok(properties.to_vec())
    } else if let Some(property) = Property::from_name(name) {
        Ok(vec![property])
    } else {
        Err(StageError::unknown_property(name))
    }
}

fn json_prop_value(property: Property, value: &Value) -> StageResult<PropValue> {
    use crate::property::PropKind;
    let err = || {
        StageError::invalid_setting(format!(
            "invalid value for '{}': {value}",
            property.name()
        ))
    };
    match property.kind() {
        PropKind::Color => value
            .as_u64()
            .map(|c| PropValue::Color(c as u32))
            .or_else(|| value.as_f64().map(|f| PropValue::Color(f as u32)))
            .ok_or_else(err),
        PropKind::Number => value.as_f64().map(PropValue::Number).ok_or_else(err),
        PropKind::Discrete => match property {
            Property::ZIndex => value.as_i64().map(PropValue::Int).ok_or_else(err),
            _ => value.as_bool().map(PropValue::Bool).ok_or_else(err),
        },
    }
}

/// JSON form of a slot value for its property kind.
fn json_slot(property: Property, slot: f64) -> Value {
    match property.kind() {
        crate::property::PropKind::Color => serde_json::json!(crate::color::from_slot(slot)),
        _ => serde_json::json!(slot),
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("components", &self.nodes.iter().flatten().count())
            .field("root", &self.root)
            .field("frame_counter", &self.frame_counter)
            .field("active_transitions", &self.active_transitions.len())
            .field("active_animations", &self.active_animations.len())
            .field("z_index_usage", &self.z_index_usage)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::HeadlessAdapter;

    fn stage() -> Stage {
        Stage::new(Box::new(HeadlessAdapter::new()))
    }

    fn attached_child(stage: &mut Stage) -> ComponentId {
        let child = stage.create_component();
        stage.add_child(stage.root(), child).unwrap();
        child
    }

    #[test]
    fn root_is_active_and_new_children_activate() {
        let mut s = stage();
        assert!(s.component(s.root()).is_active());
        let child = s.create_component();
        assert!(!s.component(child).is_active());
        s.add_child(s.root(), child).unwrap();
        assert!(s.component(child).is_active());
    }

    #[test]
    fn alpha_zero_deactivates_subtree() {
        let mut s = stage();
        let parent = attached_child(&mut s);
        let inner = s.create_component();
        s.add_child(parent, inner).unwrap();
        assert!(s.component(inner).is_active());

        s.set(parent, Property::Alpha, PropValue::Number(0.0));
        assert!(!s.component(parent).is_active());
        assert!(!s.component(inner).is_active());

        s.set(parent, Property::Alpha, PropValue::Number(0.5));
        assert!(s.component(inner).is_active());
    }

    #[test]
    fn invisible_components_never_activate() {
        let mut s = stage();
        let child = s.create_component();
        s.set(child, Property::Visible, PropValue::Bool(false));
        s.add_child(s.root(), child).unwrap();
        assert!(!s.component(child).is_active());
        s.set(child, Property::Visible, PropValue::Bool(true));
        assert!(s.component(child).is_active());
    }

    #[test]
    fn add_child_at_validates_index() {
        let mut s = stage();
        let child = s.create_component();
        let err = s.add_child_at(s.root(), child, 3).unwrap_err();
        assert!(matches!(err, StageError::IndexOutOfRange { index: 3, len: 0 }));
    }

    #[test]
    fn adding_to_a_new_parent_detaches_from_the_old_one() {
        let mut s = stage();
        let a = attached_child(&mut s);
        let b = attached_child(&mut s);
        let child = s.create_component();
        s.add_child(a, child).unwrap();
        s.add_child(b, child).unwrap();
        assert!(s.component(a).children().is_empty());
        assert_eq!(s.component(b).children(), &[child]);
        assert_eq!(s.component(child).parent(), Some(b));
    }

    #[test]
    fn z_index_usage_tracks_active_nonzero_components() {
        let mut s = stage();
        let child = attached_child(&mut s);
        assert_eq!(s.z_index_usage(), 0);
        s.set(child, Property::ZIndex, PropValue::Int(3));
        assert_eq!(s.z_index_usage(), 1);
        s.set(child, Property::Visible, PropValue::Bool(false));
        assert_eq!(s.z_index_usage(), 0);
        s.set(child, Property::Visible, PropValue::Bool(true));
        assert_eq!(s.z_index_usage(), 1);
        s.set(child, Property::ZIndex, PropValue::Int(0));
        assert_eq!(s.z_index_usage(), 0);
    }

    #[test]
    fn tags_aggregate_up_the_tree() {
        let mut s = stage();
        let branch = attached_child(&mut s);
        let leaf = s.create_component();
        s.add_child(branch, leaf).unwrap();
        s.add_tag(leaf, "item");
        s.add_tag(branch, "item");

        assert_eq!(s.get_by_tag(s.root(), "item"), vec![branch, leaf]);
        assert_eq!(s.get_by_tag(branch, "item"), vec![branch, leaf]);
        assert_eq!(s.tag(s.root(), "item"), Some(branch));

        s.remove_tag(leaf, "item");
        assert_eq!(s.get_by_tag(s.root(), "item"), vec![branch]);
    }

    #[test]
    fn reparenting_moves_tag_aggregates() {
        let mut s = stage();
        let a = attached_child(&mut s);
        let b = attached_child(&mut s);
        let leaf = s.create_component();
        s.add_child(a, leaf).unwrap();
        s.add_tag(leaf, "item");
        assert_eq!(s.get_by_tag(a, "item"), vec![leaf]);

        s.add_child(b, leaf).unwrap();
        assert!(s.get_by_tag(a, "item").is_empty());
        assert_eq!(s.get_by_tag(b, "item"), vec![leaf]);
        assert_eq!(s.get_by_tag(s.root(), "item"), vec![leaf]);

        s.remove_child(b, leaf).unwrap();
        assert!(s.get_by_tag(s.root(), "item").is_empty());
    }

    #[test]
    fn logical_set_routes_through_transitions() {
        let mut s = stage();
        let child = attached_child(&mut s);
        s.set_transition(
            child,
            "x",
            Some(TransitionSettings {
                duration: 1.0,
                ease: crate::ease::Ease::Linear,
                ..Default::default()
            }),
        )
        .unwrap();
        s.set(child, Property::X, PropValue::Number(100.0));

        // Logical value is the target, immediate value still the start.
        assert_eq!(s.get(child, Property::X), PropValue::Number(100.0));
        assert_eq!(s.get_final(child, Property::X), PropValue::Number(0.0));

        s.progress_frame(0.5);
        assert_eq!(s.get_final(child, Property::X), PropValue::Number(50.0));
        assert!(s.take_finished_transitions().is_empty());

        s.progress_frame(0.5);
        assert_eq!(s.get_final(child, Property::X), PropValue::Number(100.0));
        assert_eq!(s.take_finished_transitions(), vec![(child, Property::X)]);
    }

    #[test]
    fn retarget_restarts_from_current_value() {
        let mut s = stage();
        let child = attached_child(&mut s);
        s.set_transition(
            child,
            "x",
            Some(TransitionSettings {
                duration: 1.0,
                ease: crate::ease::Ease::Linear,
                ..Default::default()
            }),
        )
        .unwrap();
        s.set(child, Property::X, PropValue::Number(100.0));
        s.progress_frame(0.5);
        s.set(child, Property::X, PropValue::Number(0.0));
        s.progress_frame(0.5);
        assert_eq!(s.get_final(child, Property::X), PropValue::Number(25.0));
    }

    #[test]
    fn fast_forward_settles_and_notifies() {
        let mut s = stage();
        let child = attached_child(&mut s);
        s.set_transition(child, "x", Some(TransitionSettings::default()))
            .unwrap();
        s.set(child, Property::X, PropValue::Number(80.0));
        s.fast_forward(child, "x").unwrap();
        assert_eq!(s.get_final(child, Property::X), PropValue::Number(80.0));
        assert_eq!(s.take_finished_transitions(), vec![(child, Property::X)]);
        // The next frame has nothing left to advance.
        s.progress_frame(1.0);
        assert!(s.take_finished_transitions().is_empty());
    }

    #[test]
    fn transitions_reject_flag_properties() {
        let mut s = stage();
        let child = attached_child(&mut s);
        assert!(s
            .set_transition(child, "visible", Some(TransitionSettings::default()))
            .is_err());
        assert!(s
            .set_transition(child, "bogus", Some(TransitionSettings::default()))
            .is_err());
    }

    #[test]
    fn notify_callbacks_fire_after_subtree_settles() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut s = stage();
        let parent = s.create_component();
        let inner = s.create_component();
        s.add_child(parent, inner).unwrap();

        let log: Rc<RefCell<Vec<(&'static str, bool)>>> = Rc::default();
        let l = log.clone();
        s.on_activate(parent, move |stage, _id| {
            // By the time the parent is notified its child is already active.
            l.borrow_mut()
                .push(("activate", stage.component(inner).is_active()));
        });
        let l = log.clone();
        s.on_deactivate(parent, move |stage, _id| {
            l.borrow_mut()
                .push(("deactivate", stage.component(inner).is_active()));
        });

        s.add_child(s.root(), parent).unwrap();
        s.set(parent, Property::Visible, PropValue::Bool(false));
        s.set(parent, Property::Visible, PropValue::Bool(true));
        assert_eq!(
            log.borrow().as_slice(),
            &[("activate", true), ("deactivate", false), ("activate", true)]
        );
    }

    #[test]
    fn destroy_component_frees_the_subtree() {
        let mut s = stage();
        let parent = attached_child(&mut s);
        let inner = s.create_component();
        s.add_child(parent, inner).unwrap();
        s.add_tag(inner, "item");

        s.destroy_component(parent).unwrap();
        assert!(!s.exists(parent));
        assert!(!s.exists(inner));
        assert!(s.get_by_tag(s.root(), "item").is_empty());
        assert!(s.destroy_component(s.root()).is_err());
    }

    #[test]
    fn tree_queries() {
        let mut s = stage();
        let a = attached_child(&mut s);
        let b = s.create_component();
        s.add_child(a, b).unwrap();
        let c = attached_child(&mut s);

        assert_eq!(s.get_depth(b), 2);
        assert_eq!(s.get_ancestor(b, 1), Some(a));
        assert_eq!(s.get_ancestor(b, 3), None);
        assert!(s.is_ancestor_of(s.root(), b));
        assert!(!s.is_ancestor_of(c, b));
        assert_eq!(s.get_shared_ancestor(b, c), Some(s.root()));
        let detached = s.create_component();
        assert_eq!(s.get_shared_ancestor(b, detached), None);
    }
}
