// ============================================================================
// IMAGE STACK - layer tree, selection, generation area and undo history
// ============================================================================
//
// Structural edits live in `ops::*` as further `impl ImageStack` blocks; this file holds
// construction, accessors, the generation area and read-only queries.

use std::borrow::Cow;

use image::{Rgba, RgbaImage};

use crate::canvas::{CanvasState, CopyBuffer};
use crate::components::history::{
    Command, GenerationAreaCommand, HistoryManager, TAG_GENERATION_AREA,
};
use crate::config::EditorConfig;
use crate::error::{IntraPaintError, Result};
use crate::geometry::{IntPoint, IntRect, IntSize};
use crate::layer::{Layer, LayerId};
use crate::layer_tree::LayerTree;
use crate::raster::Raster;
use crate::selection::SelectionLayer;
use crate::signals::{EditingState, Signals};

/// Returned by [`ImageStack::get_color_at_point`] outside the image.
pub const OUT_OF_BOUNDS_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);

#[derive(Debug)]
pub struct ImageStack {
    pub(crate) canvas: CanvasState,
    pub(crate) history: HistoryManager<CanvasState>,
    pub(crate) config: EditorConfig,
}

impl Default for ImageStack {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl ImageStack {
    pub fn new(config: EditorConfig) -> Self {
        let canvas = CanvasState::new(
            config.default_image_size,
            &config.default_stack_name,
            config.min_generation_area_size,
            config.max_generation_area_size,
        );
        let history =
            HistoryManager::with_memory_limit(config.max_undo_steps, config.max_undo_memory_bytes());
        tracing::debug!(size = ?config.default_image_size, "image stack created");
        Self { canvas, history, config }
    }

    pub fn with_size(size: IntSize) -> Self {
        Self::new(EditorConfig {
            default_image_size: size,
            ..EditorConfig::default()
        })
    }

    // ---- accessors ----------------------------------------------------------

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn size(&self) -> IntSize {
        self.canvas.size
    }

    pub fn width(&self) -> i32 {
        self.canvas.size.width
    }

    pub fn height(&self) -> i32 {
        self.canvas.size.height
    }

    pub fn bounds(&self) -> IntRect {
        self.canvas.bounds()
    }

    pub fn layer_tree(&self) -> &LayerTree {
        &self.canvas.tree
    }

    pub fn root_id(&self) -> LayerId {
        self.canvas.tree.root_id()
    }

    pub fn layer(&self, id: LayerId) -> Result<&Layer> {
        self.canvas.tree.layer(id)
    }

    /// Layers in the tree, not counting the root stack.
    pub fn layer_count(&self) -> usize {
        self.canvas.tree.len()
    }

    pub fn active_layer_id(&self) -> Option<LayerId> {
        self.canvas.active_layer_id
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.canvas
            .active_layer_id
            .and_then(|id| self.canvas.tree.get_layer_by_id(id))
    }

    /// Change which layer receives tool input. Not recorded in the undo history.
    pub fn set_active_layer_id(&mut self, id: Option<LayerId>) -> Result<()> {
        if let Some(id) = id {
            if !self.canvas.tree.contains(id) {
                return Err(IntraPaintError::LayerNotFound(id));
            }
            if id == self.root_id() {
                return Err(IntraPaintError::RootLayer);
            }
        }
        self.canvas.set_active(id);
        Ok(())
    }

    pub fn selection_layer(&self) -> &SelectionLayer {
        &self.canvas.selection
    }

    pub fn copy_buffer(&self) -> Option<&CopyBuffer> {
        self.canvas.copy_buffer.as_ref()
    }

    pub fn editing_state(&self) -> EditingState {
        self.canvas.editing_state
    }

    pub fn signals_mut(&mut self) -> &mut Signals {
        &mut self.canvas.signals
    }

    /// Resolve an optional target to the active layer.
    pub(crate) fn resolve_layer(&self, layer: Option<LayerId>) -> Option<LayerId> {
        layer
            .or(self.canvas.active_layer_id)
            .filter(|id| self.canvas.tree.contains(*id))
    }

    // ---- history ------------------------------------------------------------

    pub fn history(&self) -> &HistoryManager<CanvasState> {
        &self.history
    }

    pub fn undo(&mut self) -> Option<String> {
        self.history.undo(&mut self.canvas)
    }

    pub fn redo(&mut self) -> Option<String> {
        self.history.redo(&mut self.canvas)
    }

    /// Drop all undo entries; the current state becomes the new baseline.
    pub fn clear_history(&mut self) {
        tracing::debug!("undo history cleared");
        self.history.clear();
    }

    pub(crate) fn commit(&mut self, command: Box<dyn Command<CanvasState>>) {
        self.history.commit_action(command, &mut self.canvas);
    }

    // ---- generation area ----------------------------------------------------

    pub fn generation_area(&self) -> IntRect {
        self.canvas.generation_area
    }

    pub fn min_generation_area_size(&self) -> IntSize {
        self.canvas.min_generation_area_size
    }

    /// The configured maximum, before limiting to the image size.
    pub fn max_generation_area_size(&self) -> IntSize {
        self.canvas.max_generation_area_size
    }

    /// The maximum generation area size actually enforced.
    pub fn get_max_generation_area_size(&self) -> IntSize {
        self.canvas.max_generation_area_size()
    }

    pub(crate) fn fitted_generation_area(&self, rect: IntRect) -> IntRect {
        self.canvas.fitted_generation_area(rect)
    }

    /// Move or resize the generation area. The rect is fitted into the image first;
    /// consecutive changes collapse into one undo entry.
    pub fn set_generation_area(&mut self, rect: IntRect) {
        let fitted = self.fitted_generation_area(rect);
        let current = self.canvas.generation_area;
        if fitted == current {
            return;
        }

        if !self.history.can_redo()
            && let Some(last) = self.history.last_action_mut()
            && last.type_tag() == TAG_GENERATION_AREA
            && let Some(command) = last.as_any_mut().downcast_mut::<GenerationAreaCommand>()
        {
            command.coalesce(fitted);
            self.canvas.set_generation_area_value(fitted);
            return;
        }
        self.commit(Box::new(GenerationAreaCommand::new(current, fitted)));
    }

    /// Limits are settings rather than history. Undo and redo refit whatever area they
    /// restore to the limits in force at that time.
    pub fn set_min_generation_area_size(&mut self, size: IntSize) {
        self.canvas.min_generation_area_size = size;
        self.set_generation_area(self.canvas.generation_area);
    }

    pub fn set_max_generation_area_size(&mut self, size: IntSize) {
        self.canvas.max_generation_area_size = size;
        self.set_generation_area(self.canvas.generation_area);
    }

    // ---- queries ------------------------------------------------------------

    /// Visible layers composited together. Cropped output is memoised until a visible
    /// change; uncropped output covers every visible layer and is rendered each call.
    pub fn merged_image(&mut self, crop_to_image: bool) -> Result<Cow<'_, Raster>> {
        if !crop_to_image {
            let area = self.canvas.content_bounds();
            return Ok(Cow::Owned(self.canvas.render(area, false)?));
        }
        if self.canvas.merged_cache.is_none() {
            let merged = self.canvas.render(self.canvas.bounds(), false)?;
            self.canvas.merged_cache = Some(merged);
        }
        match &self.canvas.merged_cache {
            Some(merged) => Ok(Cow::Borrowed(merged)),
            None => Ok(Cow::Owned(Raster::from_size(self.canvas.size))),
        }
    }

    /// Composite of the layers flagged as saved, cropped to the image.
    pub fn saved_image(&self) -> Result<Raster> {
        self.canvas.render(self.canvas.bounds(), true)
    }

    pub fn rgba_image(&mut self) -> Result<RgbaImage> {
        Ok(self.merged_image(true)?.into_owned().into_image())
    }

    /// Merged colour at `point`, or opaque black outside the image.
    pub fn get_color_at_point(&mut self, point: IntPoint) -> Rgba<u8> {
        if !self.bounds().contains_point(point) {
            return OUT_OF_BOUNDS_COLOR;
        }
        match self.merged_image(true) {
            Ok(merged) => merged.pixel(point.x, point.y).unwrap_or(OUT_OF_BOUNDS_COLOR),
            Err(err) => {
                tracing::warn!(%err, "color sampling failed");
                OUT_OF_BOUNDS_COLOR
            }
        }
    }

    /// Merged content within `rect` (image coordinates).
    pub fn cropped_image_content(&mut self, rect: IntRect) -> Result<Raster> {
        Ok(self.merged_image(true)?.crop(rect))
    }

    /// A single layer's content within `rect`, in image coordinates.
    pub fn cropped_layer_content(&self, id: LayerId, rect: IntRect) -> Result<Raster> {
        self.canvas.tree.render_layer(id, rect)
    }

    /// Selection mask within `rect`, in image coordinates.
    pub fn cropped_selection_content(&self, rect: IntRect) -> Raster {
        let origin = self.canvas.selection.root_bounds().origin();
        self.canvas
            .selection
            .raster()
            .crop(rect.translated(-origin.x, -origin.y))
    }

    pub fn generation_area_content(&mut self) -> Result<Raster> {
        let area = self.canvas.generation_area;
        self.cropped_image_content(area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(size: i32) -> ImageStack {
        ImageStack::new(EditorConfig {
            default_image_size: IntSize::new(size, size),
            min_generation_area_size: IntSize::new(8, 8),
            max_generation_area_size: IntSize::new(100, 100),
            ..EditorConfig::default()
        })
    }

    #[test]
    fn generation_area_is_fitted_on_set() {
        let mut stack = stack(200);
        stack.set_generation_area(IntRect::new(190, 190, 150, 150));
        assert_eq!(stack.generation_area(), IntRect::new(100, 100, 100, 100));
        stack.set_generation_area(IntRect::new(-10, 5, 2, 2));
        assert_eq!(stack.generation_area(), IntRect::new(0, 5, 8, 8));
    }

    #[test]
    fn same_generation_area_is_not_recorded() {
        let mut stack = stack(200);
        let current = stack.generation_area();
        stack.set_generation_area(current);
        assert_eq!(stack.history().undo_count(), 0);
    }

    #[test]
    fn generation_area_changes_coalesce() {
        let mut stack = stack(200);
        let start = stack.generation_area();
        stack.set_generation_area(IntRect::new(10, 10, 50, 50));
        stack.set_generation_area(IntRect::new(20, 20, 50, 50));
        assert_eq!(stack.history().undo_count(), 1);
        stack.undo();
        assert_eq!(stack.generation_area(), start);
        stack.redo();
        assert_eq!(stack.generation_area(), IntRect::new(20, 20, 50, 50));
    }

    #[test]
    fn max_size_is_limited_to_image() {
        let mut stack = stack(64);
        assert_eq!(stack.get_max_generation_area_size(), IntSize::new(64, 64));
        stack.set_max_generation_area_size(IntSize::new(32, 32));
        assert_eq!(stack.generation_area().size(), IntSize::new(32, 32));
        stack.set_min_generation_area_size(IntSize::new(40, 40));
        assert_eq!(stack.generation_area().size(), IntSize::new(40, 40));
    }

    #[test]
    fn undo_refits_to_the_current_limits() {
        let mut stack = stack(200);
        stack.set_generation_area(IntRect::new(10, 10, 50, 50));
        stack.create_layer(None, None, None, None, None).unwrap();
        stack.set_max_generation_area_size(IntSize::new(32, 32));
        assert_eq!(stack.generation_area(), IntRect::new(10, 10, 32, 32));
        assert_eq!(stack.history().undo_count(), 3);

        stack.undo();
        assert_eq!(stack.generation_area(), IntRect::new(10, 10, 32, 32));
        stack.redo();
        assert_eq!(stack.generation_area(), IntRect::new(10, 10, 32, 32));

        while stack.undo().is_some() {}
        assert_eq!(stack.generation_area(), IntRect::new(0, 0, 32, 32));
    }

    #[test]
    fn color_outside_image_is_black() {
        let mut stack = stack(16);
        assert_eq!(stack.get_color_at_point(IntPoint::new(-1, 0)), OUT_OF_BOUNDS_COLOR);
        assert_eq!(stack.get_color_at_point(IntPoint::new(3, 3)), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn active_layer_must_exist() {
        let mut stack = stack(16);
        let root = stack.root_id();
        assert!(matches!(
            stack.set_active_layer_id(Some(root)),
            Err(IntraPaintError::RootLayer)
        ));
        assert!(stack.set_active_layer_id(None).is_ok());
    }
}
