// ============================================================================
// CANVAS STATE - the mutable document model that undo commands act on
// ============================================================================

use std::collections::HashSet;

use kurbo::Affine;

use crate::error::Result;
use crate::geometry::{IntRect, IntSize, fit_rect_in_bounds};
use crate::layer::{LayerId, LayerProperty};
use crate::layer_tree::{DetachedLayer, LayerTree};
use crate::raster::Raster;
use crate::selection::SelectionLayer;
use crate::signals::{EditingState, Signals, StackEvent};

/// Single-slot clipboard: copied pixels plus the transform of the layer they came from.
#[derive(Clone, Debug, PartialEq)]
pub struct CopyBuffer {
    pub image: Raster,
    pub transform: Affine,
}

/// Everything needed to put the document back exactly as it was.
#[derive(Clone, Debug)]
pub struct StackSnapshot {
    pub(crate) tree: LayerTree,
    pub(crate) size: IntSize,
    pub(crate) selection: SelectionLayer,
    pub(crate) active_layer_id: Option<LayerId>,
    pub(crate) generation_area: IntRect,
}

impl StackSnapshot {
    pub fn memory_bytes(&self) -> usize {
        let layers: usize = self
            .tree
            .recursive_child_layers(self.tree.root_id())
            .into_iter()
            .filter_map(|id| self.tree.get_layer_by_id(id))
            .map(|layer| layer.raster().map_or(0, Raster::memory_bytes) + layer.name.len())
            .sum();
        layers + self.selection.raster().memory_bytes()
    }
}

pub struct CanvasState {
    pub(crate) tree: LayerTree,
    pub(crate) size: IntSize,
    pub(crate) selection: SelectionLayer,
    pub(crate) active_layer_id: Option<LayerId>,
    pub(crate) generation_area: IntRect,
    pub(crate) min_generation_area_size: IntSize,
    pub(crate) max_generation_area_size: IntSize,
    pub(crate) copy_buffer: Option<CopyBuffer>,
    pub(crate) editing_state: EditingState,
    /// Memoised merged image cropped to the image bounds.
    pub(crate) merged_cache: Option<Raster>,
    pub(crate) signals: Signals,
}

impl std::fmt::Debug for CanvasState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasState")
            .field("size", &self.size)
            .field("layers", &self.tree.len())
            .field("active_layer_id", &self.active_layer_id)
            .field("generation_area", &self.generation_area)
            .field("editing_state", &self.editing_state)
            .finish()
    }
}

impl CanvasState {
    pub fn new(
        size: IntSize,
        root_name: &str,
        min_generation_area_size: IntSize,
        max_generation_area_size: IntSize,
    ) -> Self {
        let generation_area = IntRect::from_size(size.bounded_to(max_generation_area_size));
        let mut selection = SelectionLayer::new(size);
        if let Err(err) = selection.update_generation_area(generation_area) {
            tracing::warn!(%err, "initial selection generation area not mapped");
        }
        Self {
            tree: LayerTree::new(root_name),
            size,
            selection,
            active_layer_id: None,
            generation_area,
            min_generation_area_size,
            max_generation_area_size,
            copy_buffer: None,
            editing_state: EditingState::NoImage,
            merged_cache: None,
            signals: Signals::new(),
        }
    }

    pub fn bounds(&self) -> IntRect {
        IntRect::from_size(self.size)
    }

    /// Configured maximum generation size, limited to the image size.
    pub fn max_generation_area_size(&self) -> IntSize {
        self.max_generation_area_size.bounded_to(self.size)
    }

    /// `rect` fitted into the image under the current size limits.
    pub(crate) fn fitted_generation_area(&self, rect: IntRect) -> IntRect {
        fit_rect_in_bounds(
            rect,
            self.min_generation_area_size,
            self.max_generation_area_size(),
            self.size,
        )
    }

    // ---- notifications ------------------------------------------------------

    pub(crate) fn emit(&mut self, event: StackEvent) {
        self.signals.emit(&event);
    }

    /// Drop the merged-image cache and announce new content.
    pub(crate) fn mark_dirty(&mut self) {
        self.merged_cache = None;
        self.emit(StackEvent::ContentChanged);
    }

    /// Announce a property change; the merged image is only invalidated when the change
    /// can be seen.
    pub(crate) fn notify_layer_changed(&mut self, id: LayerId, property: LayerProperty) {
        let visible_change = match property {
            LayerProperty::Visible => self
                .tree
                .parent_chain(id)
                .iter()
                .all(|parent| self.tree.get_layer_by_id(*parent).is_some_and(|p| p.visible)),
            LayerProperty::Name | LayerProperty::Saved => false,
            _ => self.tree.is_effectively_visible(id),
        };
        self.emit(StackEvent::LayerChanged(id, property));
        if visible_change {
            self.mark_dirty();
        }
        if matches!(property, LayerProperty::Transform | LayerProperty::Content | LayerProperty::Visible) {
            self.sync_selection_bounds();
        }
    }

    pub(crate) fn set_active(&mut self, id: Option<LayerId>) {
        let id = id.filter(|id| self.tree.contains(*id) && *id != self.tree.root_id());
        if self.active_layer_id != id {
            self.active_layer_id = id;
            self.emit(StackEvent::ActiveLayerChanged(id));
        }
    }

    pub(crate) fn set_generation_area_value(&mut self, rect: IntRect) {
        if self.generation_area == rect {
            return;
        }
        self.generation_area = rect;
        if let Err(err) = self.selection.update_generation_area(rect) {
            tracing::error!(%err, "selection generation area not updated");
        }
        self.emit(StackEvent::GenerationAreaBoundsChanged(rect));
    }

    // ---- structure ----------------------------------------------------------

    pub(crate) fn attach_layer(
        &mut self,
        layer: DetachedLayer,
        parent: LayerId,
        index: usize,
    ) -> Result<()> {
        let id = layer.id();
        self.tree.insert_layer(layer, parent, index)?;
        tracing::debug!(layer = %id, parent = %parent, index, "layer attached");
        self.emit(StackEvent::LayerAdded(id));
        self.mark_dirty();
        self.sync_selection_bounds();
        self.sync_editing_state();
        Ok(())
    }

    pub(crate) fn detach_layer(&mut self, id: LayerId) -> Result<(DetachedLayer, LayerId, usize)> {
        let removed = self.tree.remove_layer(id)?;
        tracing::debug!(layer = %id, parent = %removed.1, index = removed.2, "layer detached");
        if self.active_layer_id.is_some_and(|active| !self.tree.contains(active)) {
            self.set_active(None);
        }
        self.emit(StackEvent::LayerRemoved(id));
        self.mark_dirty();
        self.sync_selection_bounds();
        self.sync_editing_state();
        Ok(removed)
    }

    /// Relocate without add/remove notifications.
    pub(crate) fn relocate_layer(&mut self, id: LayerId, parent: LayerId, index: usize) -> Result<()> {
        let (detached, _, _) = self.tree.remove_layer(id)?;
        self.tree.insert_layer(detached, parent, index)?;
        self.emit(StackEvent::LayerMoved(id));
        self.mark_dirty();
        self.sync_selection_bounds();
        Ok(())
    }

    pub(crate) fn sync_editing_state(&mut self) {
        let state = if self.tree.is_empty() {
            EditingState::NoImage
        } else {
            EditingState::Editing
        };
        if state != self.editing_state {
            tracing::info!(?state, "editing state changed");
            self.editing_state = state;
            self.emit(StackEvent::EditingStateChanged(state));
        }
    }

    /// Keep the selection mask covering the image plus any layer content outside it.
    pub(crate) fn sync_selection_bounds(&mut self) {
        let target = self
            .bounds()
            .united(&self.tree.full_image_bounds(self.tree.root_id()));
        if self.selection.fit_to_bounds(target) {
            if let Err(err) = self.selection.update_generation_area(self.generation_area) {
                tracing::error!(%err, "selection generation area not updated");
            }
            self.emit(StackEvent::SelectionChanged);
        }
    }

    // ---- snapshots ----------------------------------------------------------

    pub fn snapshot(&self) -> StackSnapshot {
        StackSnapshot {
            tree: self.tree.clone(),
            size: self.size,
            selection: self.selection.clone(),
            active_layer_id: self.active_layer_id,
            generation_area: self.generation_area,
        }
    }

    /// Replace the whole document with `snapshot`, notifying about every difference.
    pub fn restore_snapshot(&mut self, snapshot: &StackSnapshot) {
        let old_ids: HashSet<LayerId> = self
            .tree
            .recursive_child_layers(self.tree.root_id())
            .into_iter()
            .collect();
        let new_ids = snapshot.tree.recursive_child_layers(snapshot.tree.root_id());
        let new_set: HashSet<LayerId> = new_ids.iter().copied().collect();

        let size_changed = self.size != snapshot.size;
        self.tree = snapshot.tree.clone();
        self.size = snapshot.size;
        self.selection = snapshot.selection.clone();
        self.merged_cache = None;

        for id in old_ids.iter().filter(|id| !new_set.contains(id)) {
            self.emit(StackEvent::LayerRemoved(*id));
        }
        for id in new_ids.iter().filter(|id| !old_ids.contains(id)) {
            self.emit(StackEvent::LayerAdded(*id));
        }
        if size_changed {
            self.emit(StackEvent::SizeChanged(snapshot.size));
        }
        if self.active_layer_id != snapshot.active_layer_id {
            self.active_layer_id = snapshot.active_layer_id;
            self.emit(StackEvent::ActiveLayerChanged(snapshot.active_layer_id));
        }
        // limits are not part of the snapshot, so the restored area is refitted to them
        let generation_area = self.fitted_generation_area(snapshot.generation_area);
        if let Err(err) = self.selection.update_generation_area(generation_area) {
            tracing::error!(%err, "selection generation area not updated");
        }
        if self.generation_area != generation_area {
            self.generation_area = generation_area;
            self.emit(StackEvent::GenerationAreaBoundsChanged(generation_area));
        }
        self.emit(StackEvent::SelectionChanged);
        self.emit(StackEvent::ContentChanged);
        self.sync_editing_state();
    }

    // ---- rendering ----------------------------------------------------------

    /// Root-space area covered by the image plus all visible layer content.
    pub fn content_bounds(&self) -> IntRect {
        self.bounds()
            .united(&self.tree.full_image_bounds(self.tree.root_id()))
    }

    pub(crate) fn render(&self, area: IntRect, saved_only: bool) -> Result<Raster> {
        self.tree.render(area, saved_only)
    }

    pub(crate) fn full_transform(&self, id: LayerId) -> Affine {
        self.tree.full_transform(id)
    }
}
