// ============================================================================
// IMAGE-LEVEL TRANSFORMS - canvas resize, scaling, whole-image replacement
// ============================================================================

use kurbo::Affine;

use crate::components::history::SnapshotCommand;
use crate::error::{IntraPaintError, Result};
use crate::geometry::{IntPoint, IntRect, IntSize, invert_checked};
use crate::image_stack::ImageStack;
use crate::layer::{Layer, LayerId, LayerProperty, next_default_name};
use crate::layer_tree::DetachedLayer;
use crate::raster::{CompositionMode, Raster};
use crate::selection::SelectionLayer;
use crate::signals::StackEvent;

fn check_size(size: IntSize) -> Result<()> {
    if size.is_empty() {
        return Err(IntraPaintError::InvalidSize {
            width: size.width,
            height: size.height,
        });
    }
    Ok(())
}

impl ImageStack {
    /// Apply a new image size and re-fit everything that depends on it.
    fn apply_size(&mut self, size: IntSize) {
        let size_changed = self.canvas.size != size;
        self.canvas.size = size;
        if size_changed {
            self.canvas.emit(StackEvent::SizeChanged(size));
        }
        let fitted = self.fitted_generation_area(self.canvas.generation_area);
        self.canvas.set_generation_area_value(fitted);
        self.canvas.mark_dirty();
        self.canvas.sync_selection_bounds();
    }

    /// Change the image size, moving every image layer by the offset in image
    /// coordinates. Pixels are left alone: each layer's transform absorbs the shift,
    /// so content outside the new bounds survives and comes back if the canvas grows.
    pub fn resize_canvas(&mut self, new_size: IntSize, x_offset: i32, y_offset: i32) -> Result<()> {
        check_size(new_size)?;
        let shift = Affine::translate((x_offset as f64, y_offset as f64));

        // resolve every new transform first so a failure leaves the document untouched
        let tree = &self.canvas.tree;
        let mut moved = Vec::new();
        for id in tree.image_layers() {
            let parent = tree.parent_of(id).unwrap_or_else(|| tree.root_id());
            let to_parent = invert_checked(&tree.full_transform(parent))?;
            moved.push((id, to_parent * shift * tree.full_transform(id)));
        }

        let mut command = SnapshotCommand::new("Resize Canvas", &self.canvas);
        for (id, transform) in moved {
            self.canvas.tree.layer_mut(id)?.transform = transform;
            self.canvas.emit(StackEvent::LayerChanged(id, LayerProperty::Transform));
        }

        let selection_origin = self.canvas.selection.root_bounds().origin();
        self.canvas.selection.resize_canvas(
            new_size,
            IntPoint::new(selection_origin.x + x_offset, selection_origin.y + y_offset),
        );
        self.canvas.emit(StackEvent::SelectionChanged);

        tracing::info!(?new_size, x_offset, y_offset, "canvas resized");
        self.apply_size(new_size);
        command.set_after(&self.canvas);
        self.history.push_applied(Box::new(command));
        Ok(())
    }

    /// Rescale the whole image, every layer and the selection to `new_size`.
    pub fn scale(&mut self, new_size: IntSize) -> Result<()> {
        check_size(new_size)?;
        let old_size = self.size();
        if old_size == new_size {
            return Ok(());
        }
        let mut command = SnapshotCommand::new("Scale Image", &self.canvas);
        let sx = new_size.width as f64 / old_size.width.max(1) as f64;
        let sy = new_size.height as f64 / old_size.height.max(1) as f64;
        let scale = Affine::scale_non_uniform(sx, sy);
        let unscale = Affine::scale_non_uniform(1.0 / sx, 1.0 / sy);

        let mut ids = vec![self.root_id()];
        ids.extend(self.canvas.tree.recursive_child_layers(self.root_id()));
        for id in ids {
            let layer = self.canvas.tree.layer_mut(id)?;
            layer.transform = scale * layer.transform * unscale;
            if let Some(raster) = layer.raster_mut() {
                let width = (raster.width() as f64 * sx).round().max(1.0) as u32;
                let height = (raster.height() as f64 * sy).round().max(1.0) as u32;
                *raster = raster.resized(width, height);
                self.canvas.emit(StackEvent::LayerChanged(id, LayerProperty::Content));
            }
        }

        let bounds = self.canvas.selection.root_bounds();
        let scaled = IntRect::from_kurbo_bbox(scale.transform_rect_bbox(bounds.to_kurbo()));
        self.canvas.selection.scale_to(scaled);
        self.canvas.emit(StackEvent::SelectionChanged);

        tracing::info!(?old_size, ?new_size, "image scaled");
        self.apply_size(new_size);
        command.set_after(&self.canvas);
        self.history.push_applied(Box::new(command));
        Ok(())
    }

    /// Redraw a layer onto an image-sized canvas and reset its transform.
    pub fn layer_to_image_size(&mut self, layer: Option<LayerId>) -> Result<bool> {
        let Some(id) = self.resolve_layer(layer) else {
            return Ok(false);
        };
        if self.canvas.tree.is_stack(id) {
            return Ok(false);
        }
        let size = self.size();
        self.edit_layer_pixels(id, "Layer to Image Size", |raster, transform| {
            let mut fitted = Raster::from_size(size);
            fitted.paint(raster, transform, CompositionMode::Normal, 1.0)?;
            *raster = fitted;
            *transform = Affine::IDENTITY;
            Ok(())
        })
    }

    /// Discard every layer and start over with `image` as the only layer. One undo step
    /// brings back the previous layers, size and selection.
    pub fn set_image(&mut self, image: Raster) -> Result<LayerId> {
        check_size(image.size())?;
        let mut command = SnapshotCommand::new("Set Image", &self.canvas);
        let root = self.root_id();

        for child in self.canvas.tree.children(root).to_vec() {
            let (removed, _, _) = self.canvas.tree.remove_layer(child)?;
            for id in removed.ids().collect::<Vec<_>>() {
                self.canvas.emit(StackEvent::LayerRemoved(id));
            }
        }
        self.canvas.set_active(None);

        let size = image.size();
        self.canvas.selection = SelectionLayer::new(size);
        self.canvas.emit(StackEvent::SelectionChanged);
        self.apply_size(size);
        let full = self.fitted_generation_area(IntRect::from_size(size));
        self.canvas.set_generation_area_value(full);

        let name = next_default_name(self.canvas.tree.sibling_names(root));
        let layer = Layer::new_image(name, image);
        let id = layer.id;
        self.canvas.attach_layer(DetachedLayer::new(layer), root, 0)?;
        self.canvas.set_active(Some(id));

        tracing::info!(?size, layer = %id, "image replaced");
        command.set_after(&self.canvas);
        self.history.push_applied(Box::new(command));
        Ok(id)
    }
}
