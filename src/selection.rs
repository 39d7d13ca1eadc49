// ============================================================================
// SELECTION LAYER - editable inpainting mask plus generation-area mapping
// ============================================================================

use image::Rgba;
use kurbo::Affine;

use crate::error::Result;
use crate::geometry::{IntPoint, IntRect, IntSize, integer_translation, invert_checked};
use crate::layer::{Layer, LayerId};
use crate::raster::{CompositionMode, Raster};

/// Colour written into the mask for selected pixels; only alpha is meaningful.
pub const SELECTION_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Mask layer marking the pixels eligible for editing. Its transform is always a whole-
/// pixel translation, so it can track regions that extend past the image origin.
///
/// Never part of merged or saved output.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionLayer {
    id: LayerId,
    raster: Raster,
    transform: Affine,
    gen_area_local: IntRect,
}

impl SelectionLayer {
    pub fn new(size: IntSize) -> Self {
        Self {
            id: LayerId::next(),
            raster: Raster::from_size(size),
            transform: Affine::IDENTITY,
            gen_area_local: IntRect::default(),
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    /// Image-layer view of the mask, for code that handles layers generically.
    pub fn to_layer(&self) -> Layer {
        let mut layer = Layer::new_image("selection", self.raster.clone());
        layer.id = self.id;
        layer.saved = false;
        layer.transform = self.transform;
        layer
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    fn raster_mut(&mut self) -> &mut Raster {
        &mut self.raster
    }

    pub fn transform(&self) -> Affine {
        self.transform
    }

    fn origin(&self) -> IntPoint {
        integer_translation(&self.transform).unwrap_or_default()
    }

    /// Mask bounds in image coordinates.
    pub fn root_bounds(&self) -> IntRect {
        IntRect::from_origin_size(self.origin(), self.raster().size())
    }

    pub fn is_empty(&self) -> bool {
        self.raster().is_fully_transparent()
    }

    // ---- generation area ----------------------------------------------------

    /// Recompute the generation area in this layer's local coordinates.
    pub fn update_generation_area(&mut self, gen_area: IntRect) -> Result<()> {
        let inverse = invert_checked(&self.transform)?;
        self.gen_area_local = gen_area.mapped_bbox(&inverse);
        Ok(())
    }

    /// The generation area expressed in mask pixel coordinates.
    pub fn get_selection_gen_area(&self) -> IntRect {
        self.gen_area_local
    }

    /// Mask pixels under the generation area.
    pub fn gen_area_content(&self) -> Raster {
        self.raster().crop(self.gen_area_local)
    }

    // ---- mask edits ---------------------------------------------------------

    /// Mark `rect` (image coordinates) as selected.
    pub fn select_rect(&mut self, rect: IntRect) {
        let origin = self.origin();
        self.raster_mut()
            .fill_rect(rect.translated(-origin.x, -origin.y), SELECTION_COLOR);
    }

    pub fn select_all(&mut self) {
        self.raster_mut().fill(SELECTION_COLOR);
    }

    pub fn clear(&mut self) {
        self.raster_mut().fill(Rgba([0, 0, 0, 0]));
    }

    pub fn invert(&mut self) {
        let raster = self.raster_mut();
        let (w, h) = (raster.width() as i32, raster.height() as i32);
        for y in 0..h {
            for x in 0..w {
                if let Some(px) = raster.pixel(x, y) {
                    let alpha = 255 - px[3];
                    let out = if alpha == 0 {
                        Rgba([0, 0, 0, 0])
                    } else {
                        Rgba([SELECTION_COLOR[0], SELECTION_COLOR[1], SELECTION_COLOR[2], alpha])
                    };
                    raster.put_pixel(x, y, out);
                }
            }
        }
    }

    /// Replace the mask with `mask`, whose top-left sits at the image origin.
    pub fn set_mask(&mut self, mask: &Raster) {
        let origin = self.origin();
        let raster = self.raster_mut();
        raster.fill(Rgba([0, 0, 0, 0]));
        raster.paint_at(mask, IntPoint::new(-origin.x, -origin.y), CompositionMode::Source, 1.0);
    }

    pub(crate) fn replace_raster(&mut self, raster: Raster) {
        *self.raster_mut() = raster;
    }

    /// The mask resampled into the local pixel grid of a layer with the given transform
    /// and size, ready for alpha masking.
    pub fn mask_in_layer_space(&self, layer_transform: &Affine, size: IntSize) -> Result<Raster> {
        let to_layer = invert_checked(layer_transform)? * self.transform;
        let mut out = Raster::from_size(size);
        out.paint(&self.raster, &to_layer, CompositionMode::Source, 1.0)?;
        Ok(out)
    }

    // ---- geometry changes ---------------------------------------------------

    /// Re-canvas the mask to cover exactly `rect` in image coordinates, keeping existing
    /// mask pixels where they were.
    pub fn fit_to_bounds(&mut self, rect: IntRect) -> bool {
        let current = self.root_bounds();
        if current == rect {
            return false;
        }
        let offset = IntPoint::new(current.x - rect.x, current.y - rect.y);
        let resized = self.raster().resized_canvas(rect.size(), offset);
        self.replace_raster(resized);
        self.transform = Affine::translate((rect.x as f64, rect.y as f64));
        true
    }

    /// Pad or crop to `size` with the old content placed at `offset`.
    pub fn resize_canvas(&mut self, size: IntSize, offset: IntPoint) {
        let resized = self.raster().resized_canvas(size, offset);
        self.replace_raster(resized);
        self.transform = Affine::IDENTITY;
    }

    /// Rescale the mask so it covers exactly `rect` in image coordinates.
    pub fn scale_to(&mut self, rect: IntRect) {
        let resized = self
            .raster()
            .resized(rect.width.max(0) as u32, rect.height.max(0) as u32);
        self.replace_raster(resized);
        self.transform = Affine::translate((rect.x as f64, rect.y as f64));
    }
}
