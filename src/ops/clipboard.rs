// ============================================================================
// CLIPBOARD - copy / cut / paste through the single-slot copy buffer, plus
// clearing and filling the selected region of a layer
// ============================================================================

use image::Rgba;

use crate::canvas::CopyBuffer;
use crate::error::Result;
use crate::geometry::invert_checked;
use crate::image_stack::ImageStack;
use crate::layer::LayerId;
use crate::raster::{CompositionMode, Raster};

impl ImageStack {
    /// The selection (or `mask`, positioned at the image origin) resampled into an image
    /// layer's pixel grid. `None` when there is no such image layer.
    fn layer_mask(&self, layer: Option<LayerId>, mask: Option<&Raster>) -> Result<Option<(LayerId, Raster)>> {
        let Some(id) = self.resolve_layer(layer) else {
            return Ok(None);
        };
        let layer = self.canvas.tree.layer(id)?;
        let Some(raster) = layer.raster() else {
            return Ok(None);
        };
        let transform = self.canvas.full_transform(id);
        let local = match mask {
            Some(mask) => {
                let mut local = Raster::from_size(raster.size());
                local.paint(mask, &invert_checked(&transform)?, CompositionMode::Source, 1.0)?;
                local
            }
            None => self.canvas.selection.mask_in_layer_space(&transform, raster.size())?,
        };
        Ok(Some((id, local)))
    }

    /// Copy the masked part of a layer into the copy buffer and return it. Uses the
    /// selection unless an explicit mask is given.
    pub fn copy_selected(&mut self, layer: Option<LayerId>, mask: Option<&Raster>) -> Result<Option<Raster>> {
        let Some((id, local_mask)) = self.layer_mask(layer, mask)? else {
            return Ok(None);
        };
        let mut copied = match self.canvas.tree.layer(id)?.raster() {
            Some(raster) => raster.clone(),
            None => return Ok(None),
        };
        copied.multiply_alpha(&local_mask);
        self.canvas.copy_buffer = Some(CopyBuffer {
            image: copied.clone(),
            transform: self.canvas.full_transform(id),
        });
        tracing::debug!(layer = %id, "selection copied");
        Ok(Some(copied))
    }

    /// Copy, then clear the copied pixels from the layer.
    pub fn cut_selected(&mut self, layer: Option<LayerId>) -> Result<Option<Raster>> {
        let Some(copied) = self.copy_selected(layer, None)? else {
            return Ok(None);
        };
        self.clear_selected(layer)?;
        Ok(Some(copied))
    }

    /// New layer from the copy buffer, placed where the pixels were copied from.
    pub fn paste(&mut self) -> Result<Option<LayerId>> {
        let Some(buffer) = self.canvas.copy_buffer.clone() else {
            return Ok(None);
        };
        let id = self.create_layer(None, Some(buffer.image), None, None, Some(buffer.transform))?;
        Ok(Some(id))
    }

    /// Make selected pixels of a layer transparent.
    pub fn clear_selected(&mut self, layer: Option<LayerId>) -> Result<bool> {
        let Some((id, local_mask)) = self.layer_mask(layer, None)? else {
            return Ok(false);
        };
        self.edit_layer_pixels(id, "Clear Selection", |raster, _| {
            raster.subtract_alpha(&local_mask);
            Ok(())
        })
    }

    /// Paint `color` over the selected pixels of a layer.
    pub fn fill_selected(&mut self, color: Rgba<u8>, layer: Option<LayerId>) -> Result<bool> {
        let Some((id, local_mask)) = self.layer_mask(layer, None)? else {
            return Ok(false);
        };
        self.edit_layer_pixels(id, "Fill Selection", |raster, _| {
            let mut fill = Raster::filled(raster.width(), raster.height(), color);
            fill.multiply_alpha(&local_mask);
            raster.paint_at(&fill, Default::default(), CompositionMode::Normal, 1.0);
            Ok(())
        })
    }
}
