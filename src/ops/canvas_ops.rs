// ============================================================================
// LAYER OPERATIONS - add / delete / duplicate / move / merge / properties
// ============================================================================

use kurbo::Affine;

use crate::components::history::{LayerOpCommand, LayerOperation, SingleLayerSnapshotCommand};
use crate::error::{IntraPaintError, Result};
use crate::image_stack::ImageStack;
use crate::layer::{Layer, LayerId, LayerProperty, LayerValue, next_default_name};
use crate::layer_tree::DetachedLayer;
use crate::raster::{CompositionMode, Raster};

impl ImageStack {
    /// Insert position used when the caller gives none: directly above the active layer
    /// when it shares `parent`, otherwise the end of `parent`'s children.
    fn default_insert_index(&self, parent: LayerId) -> usize {
        let tree = &self.canvas.tree;
        self.canvas
            .active_layer_id
            .filter(|active| tree.parent_of(*active) == Some(parent))
            .and_then(|active| tree.index_in_parent(active))
            .unwrap_or_else(|| tree.count(parent))
    }

    fn insert_target(&self, parent: Option<LayerId>, index: Option<usize>) -> Result<(LayerId, usize)> {
        let parent = parent.unwrap_or_else(|| self.root_id());
        if !self.canvas.tree.layer(parent)?.is_stack() {
            return Err(IntraPaintError::NotAStack(parent));
        }
        let len = self.canvas.tree.count(parent);
        let index = index.unwrap_or_else(|| self.default_insert_index(parent));
        if index > len {
            return Err(IntraPaintError::IndexOutOfRange { index, len });
        }
        Ok((parent, index))
    }

    fn commit_add(&mut self, layer: Layer, parent: LayerId, index: usize, activate: bool) -> LayerId {
        let id = layer.id;
        let active_before = self.canvas.active_layer_id;
        let active_after = if activate { Some(id) } else { active_before };
        tracing::info!(layer = %id, name = %layer.name, "adding layer");
        self.commit(Box::new(LayerOpCommand::new(LayerOperation::Add {
            id,
            name: layer.name.clone(),
            slot: (parent, index),
            layer: Some(DetachedLayer::new(layer)),
            active_before,
            active_after,
        })));
        id
    }

    /// Add an image layer and make it active. Missing content defaults to a transparent
    /// image-sized raster, a missing name to the next free `"layer N"` among siblings.
    pub fn create_layer(
        &mut self,
        name: Option<&str>,
        image_data: Option<Raster>,
        parent: Option<LayerId>,
        index: Option<usize>,
        transform: Option<Affine>,
    ) -> Result<LayerId> {
        let (parent, index) = self.insert_target(parent, index)?;
        let name = match name {
            Some(name) => name.to_string(),
            None => next_default_name(self.canvas.tree.sibling_names(parent)),
        };
        let raster = image_data.unwrap_or_else(|| Raster::from_size(self.size()));
        let mut layer = Layer::new_image(name, raster);
        if let Some(transform) = transform {
            layer.transform = transform;
        }
        Ok(self.commit_add(layer, parent, index, true))
    }

    /// Add an empty layer group. The active layer is left alone.
    pub fn create_layer_group(
        &mut self,
        name: Option<&str>,
        parent: Option<LayerId>,
        index: Option<usize>,
    ) -> Result<LayerId> {
        let (parent, index) = self.insert_target(parent, index)?;
        let name = match name {
            Some(name) => name.to_string(),
            None => next_default_name(self.canvas.tree.sibling_names(parent)),
        };
        Ok(self.commit_add(Layer::new_stack(name), parent, index, false))
    }

    /// Delete a layer (the active one by default). The root and the last remaining image
    /// layer are never removed. Returns whether anything changed.
    pub fn remove_layer(&mut self, layer: Option<LayerId>) -> Result<bool> {
        let Some(id) = self.resolve_layer(layer) else {
            return Ok(false);
        };
        let tree = &self.canvas.tree;
        if id == tree.root_id() {
            return Ok(false);
        }
        let doomed: Vec<LayerId> = std::iter::once(id).chain(tree.recursive_child_layers(id)).collect();
        if !tree.image_layers().iter().any(|leaf| !doomed.contains(leaf)) {
            tracing::debug!(layer = %id, "not removing the last image layer");
            return Ok(false);
        }

        let parent = tree.parent_of(id).ok_or(IntraPaintError::LayerNotFound(id))?;
        let index = tree.index_in_parent(id).ok_or(IntraPaintError::LayerNotFound(id))?;
        let active_before = self.canvas.active_layer_id;
        let active_after = match active_before {
            Some(active) if doomed.contains(&active) => {
                let siblings = tree.children(parent);
                siblings
                    .get(index + 1)
                    .or_else(|| index.checked_sub(1).and_then(|prev| siblings.get(prev)))
                    .copied()
                    .or_else(|| Some(parent).filter(|p| *p != tree.root_id()))
            }
            other => other,
        };
        let name = tree.layer(id)?.name.clone();

        tracing::info!(layer = %id, %name, "removing layer");
        self.commit(Box::new(LayerOpCommand::new(LayerOperation::Remove {
            id,
            name,
            slot: (parent, index),
            layer: None,
            active_before,
            active_after,
        })));
        Ok(true)
    }

    /// Duplicate a layer (with any nested layers) directly below the original. The copy
    /// becomes active.
    pub fn copy_layer(&mut self, layer: Option<LayerId>) -> Result<Option<LayerId>> {
        let Some(id) = self.resolve_layer(layer) else {
            return Ok(None);
        };
        let tree = &self.canvas.tree;
        if id == tree.root_id() {
            return Ok(None);
        }
        let parent = tree.parent_of(id).ok_or(IntraPaintError::LayerNotFound(id))?;
        let index = tree.index_in_parent(id).ok_or(IntraPaintError::LayerNotFound(id))?;

        let mut copy = tree.duplicate_subtree(id)?;
        let name = format!("{} copy", copy.layer().name);
        copy.layer_mut().name = name.clone();
        let copy_id = copy.id();

        let active_before = self.canvas.active_layer_id;
        self.commit(Box::new(LayerOpCommand::new(LayerOperation::Add {
            id: copy_id,
            name,
            slot: (parent, index + 1),
            layer: Some(copy),
            active_before,
            active_after: Some(copy_id),
        })));
        Ok(Some(copy_id))
    }

    /// Move a layer `offset` steps through the depth-first list of insertion points
    /// (negative moves up). Returns whether the layer moved.
    pub fn move_layer(&mut self, offset: isize, layer: Option<LayerId>) -> Result<bool> {
        let Some(id) = self.resolve_layer(layer) else {
            return Ok(false);
        };
        let tree = &self.canvas.tree;
        if id == tree.root_id() || offset == 0 {
            return Ok(false);
        }
        let parent = tree.parent_of(id).ok_or(IntraPaintError::LayerNotFound(id))?;
        let index = tree.index_in_parent(id).ok_or(IntraPaintError::LayerNotFound(id))?;
        let from = (parent, index);
        let to = tree.offset_position(id, offset)?;
        if to == from {
            return Ok(false);
        }
        tracing::debug!(layer = %id, ?from, ?to, "moving layer");
        self.commit(Box::new(LayerOpCommand::new(LayerOperation::Move { id, from, to })));
        Ok(true)
    }

    /// Paint a layer onto the one below it in the same group and remove it. The lower
    /// layer gets a bitmap covering both and a translation-only transform.
    pub fn merge_layer_down(&mut self, layer: Option<LayerId>) -> Result<bool> {
        let Some(top) = self.resolve_layer(layer) else {
            return Ok(false);
        };
        let tree = &self.canvas.tree;
        if top == tree.root_id() {
            return Ok(false);
        }
        let parent = tree.parent_of(top).ok_or(IntraPaintError::LayerNotFound(top))?;
        let index = tree.index_in_parent(top).ok_or(IntraPaintError::LayerNotFound(top))?;
        let Some(base) = tree.get_layer_by_index(parent, index + 1) else {
            return Ok(false);
        };

        let top_layer = tree.layer(top)?;
        let base_layer = tree.layer(base)?;
        let (Some(top_raster), Some(base_raster)) = (top_layer.raster(), base_layer.raster()) else {
            tracing::debug!(%top, %base, "merge skipped: layer groups cannot be merged");
            return Ok(false);
        };

        let merged_bounds = top_raster
            .bounds()
            .mapped_bbox(&top_layer.transform)
            .united(&base_raster.bounds().mapped_bbox(&base_layer.transform));
        let origin = Affine::translate((-merged_bounds.x as f64, -merged_bounds.y as f64));
        let mut merged = Raster::from_size(merged_bounds.size());
        merged.paint(base_raster, &(origin * base_layer.transform), CompositionMode::Normal, 1.0)?;
        merged.paint(
            top_raster,
            &(origin * top_layer.transform),
            top_layer.composition_mode,
            top_layer.opacity(),
        )?;

        let base_before = (base_raster.clone(), base_layer.transform);
        let base_after = (
            merged,
            Affine::translate((merged_bounds.x as f64, merged_bounds.y as f64)),
        );
        let active_before = self.canvas.active_layer_id;
        let active_after = match active_before {
            Some(active) if active == top || active == base => Some(base),
            other => other,
        };

        tracing::info!(%top, %base, "merging layer down");
        self.commit(Box::new(LayerOpCommand::new(LayerOperation::Merge {
            top,
            base,
            top_slot: (parent, index),
            top_layer: None,
            base_before,
            base_after,
            active_before,
            active_after,
        })));
        Ok(true)
    }

    // ---- properties ---------------------------------------------------------

    /// Record and apply one property change. Opacity and transform edits on the same
    /// layer fold into the previous entry so slider drags leave a single undo step.
    pub fn set_layer_property(&mut self, id: LayerId, value: LayerValue) -> Result<bool> {
        let layer = self.canvas.tree.layer(id)?;
        let property = value.property();
        let value = match value {
            LayerValue::Opacity(opacity) => LayerValue::Opacity(opacity.clamp(0.0, 1.0)),
            other => other,
        };
        let Some(before) = LayerValue::read(layer, property) else {
            return Ok(false);
        };
        if before == value {
            return Ok(false);
        }

        if matches!(property, LayerProperty::Opacity | LayerProperty::Transform)
            && !self.history.can_redo()
            && let Some(last) = self.history.last_action_mut()
            && let Some(command) = last.as_any_mut().downcast_mut::<LayerOpCommand>()
            && command.coalesce_property(id, &value)
        {
            value.apply(self.canvas.tree.layer_mut(id)?);
            self.canvas.notify_layer_changed(id, property);
            return Ok(true);
        }

        self.commit(Box::new(LayerOpCommand::new(LayerOperation::Property {
            id,
            before,
            after: value,
        })));
        Ok(true)
    }

    pub fn set_layer_visible(&mut self, id: LayerId, visible: bool) -> Result<bool> {
        self.set_layer_property(id, LayerValue::Visible(visible))
    }

    pub fn set_layer_saved(&mut self, id: LayerId, saved: bool) -> Result<bool> {
        self.set_layer_property(id, LayerValue::Saved(saved))
    }

    pub fn set_layer_opacity(&mut self, id: LayerId, opacity: f32) -> Result<bool> {
        self.set_layer_property(id, LayerValue::Opacity(opacity))
    }

    pub fn set_layer_composition_mode(&mut self, id: LayerId, mode: CompositionMode) -> Result<bool> {
        self.set_layer_property(id, LayerValue::CompositionMode(mode))
    }

    pub fn set_layer_transform(&mut self, id: LayerId, transform: Affine) -> Result<bool> {
        self.set_layer_property(id, LayerValue::Transform(transform))
    }

    pub fn set_layer_name(&mut self, id: LayerId, name: impl Into<String>) -> Result<bool> {
        self.set_layer_property(id, LayerValue::Name(name.into()))
    }

    // ---- pixel content ------------------------------------------------------

    /// Run `edit` on an image layer's pixels (and transform) and record a single-layer
    /// undo entry if anything changed.
    pub(crate) fn edit_layer_pixels<F>(&mut self, id: LayerId, description: &str, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut Raster, &mut Affine) -> Result<()>,
    {
        let mut command = SingleLayerSnapshotCommand::new(description, &self.canvas, id)?;
        let transform_changed = {
            let layer = self.canvas.tree.layer_mut(id)?;
            let mut transform = layer.transform;
            let raster = layer.raster_mut().ok_or(IntraPaintError::NotAnImage(id))?;
            edit(raster, &mut transform)?;
            let changed = transform != layer.transform;
            layer.transform = transform;
            changed
        };
        command.set_after(&self.canvas);
        if command.is_noop() {
            return Ok(false);
        }
        self.history.push_applied(Box::new(command));
        self.canvas.notify_layer_changed(id, LayerProperty::Content);
        if transform_changed {
            self.canvas.notify_layer_changed(id, LayerProperty::Transform);
        }
        Ok(true)
    }

    /// Swap in new pixel content for an image layer, keeping its transform.
    pub fn replace_layer_image(&mut self, id: LayerId, image: Raster) -> Result<bool> {
        self.edit_layer_pixels(id, "Replace Layer Image", move |raster, _| {
            *raster = image;
            Ok(())
        })
    }
}
