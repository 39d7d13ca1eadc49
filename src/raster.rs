// ============================================================================
// RASTER - RGBA bitmap buffer with fill / crop / paint-with-transform
// ============================================================================

use std::fmt;

use image::{Rgba, RgbaImage, imageops};
use kurbo::{Affine, Point};
use rayon::prelude::*;

use crate::error::Result;
use crate::geometry::{IntPoint, IntRect, IntSize, integer_translation, invert_checked};

/// How a painted source combines with the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CompositionMode {
    /// Source-over.
    #[default]
    Normal,
    Multiply,
    Screen,
    Darken,
    Lighten,
    Additive,
    /// Removes destination coverage where the source is drawn.
    Clear,
    /// Replaces the destination with the source.
    Source,
    /// Keeps destination only where the source has coverage.
    DestinationIn,
    /// Keeps destination only where the source has no coverage.
    DestinationOut,
}

impl CompositionMode {
    pub fn all() -> &'static [CompositionMode] {
        &[
            CompositionMode::Normal,
            CompositionMode::Multiply,
            CompositionMode::Screen,
            CompositionMode::Darken,
            CompositionMode::Lighten,
            CompositionMode::Additive,
            CompositionMode::Clear,
            CompositionMode::Source,
            CompositionMode::DestinationIn,
            CompositionMode::DestinationOut,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            CompositionMode::Normal => "Normal",
            CompositionMode::Multiply => "Multiply",
            CompositionMode::Screen => "Screen",
            CompositionMode::Darken => "Darken",
            CompositionMode::Lighten => "Lighten",
            CompositionMode::Additive => "Additive",
            CompositionMode::Clear => "Clear",
            CompositionMode::Source => "Source",
            CompositionMode::DestinationIn => "Destination In",
            CompositionMode::DestinationOut => "Destination Out",
        }
    }

    /// Convert to a stable u8 tag
    pub fn to_u8(&self) -> u8 {
        match self {
            CompositionMode::Normal => 0,
            CompositionMode::Multiply => 1,
            CompositionMode::Screen => 2,
            CompositionMode::Darken => 3,
            CompositionMode::Lighten => 4,
            CompositionMode::Additive => 5,
            CompositionMode::Clear => 6,
            CompositionMode::Source => 7,
            CompositionMode::DestinationIn => 8,
            CompositionMode::DestinationOut => 9,
        }
    }

    /// Reconstruct from a u8 (defaults to Normal for unknown values)
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => CompositionMode::Multiply,
            2 => CompositionMode::Screen,
            3 => CompositionMode::Darken,
            4 => CompositionMode::Lighten,
            5 => CompositionMode::Additive,
            6 => CompositionMode::Clear,
            7 => CompositionMode::Source,
            8 => CompositionMode::DestinationIn,
            9 => CompositionMode::DestinationOut,
            _ => CompositionMode::Normal,
        }
    }
}

#[inline]
fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Combine one straight-alpha source pixel into a destination pixel.
pub fn blend_pixel(dst: [u8; 4], src: [u8; 4], mode: CompositionMode, opacity: f32) -> [u8; 4] {
    let opacity = opacity.clamp(0.0, 1.0);
    let sa = src[3] as f32 / 255.0 * opacity;
    let da = dst[3] as f32 / 255.0;

    match mode {
        CompositionMode::Clear => {
            let a = da * (1.0 - sa);
            if a <= 0.0 {
                [0, 0, 0, 0]
            } else {
                [dst[0], dst[1], dst[2], to_u8(a)]
            }
        }
        CompositionMode::DestinationIn => {
            let a = da * sa;
            if a <= 0.0 { [0, 0, 0, 0] } else { [dst[0], dst[1], dst[2], to_u8(a)] }
        }
        CompositionMode::DestinationOut => {
            let a = da * (1.0 - sa);
            if a <= 0.0 { [0, 0, 0, 0] } else { [dst[0], dst[1], dst[2], to_u8(a)] }
        }
        CompositionMode::Source => {
            if opacity >= 1.0 {
                return src;
            }
            // Interpolate premultiplied values between destination and source.
            let src_a = src[3] as f32 / 255.0;
            let out_a = src_a * opacity + da * (1.0 - opacity);
            if out_a <= 0.0 {
                return [0, 0, 0, 0];
            }
            let mut out = [0u8; 4];
            for c in 0..3 {
                let s = src[c] as f32 / 255.0;
                let d = dst[c] as f32 / 255.0;
                out[c] = to_u8((s * src_a * opacity + d * da * (1.0 - opacity)) / out_a);
            }
            out[3] = to_u8(out_a);
            out
        }
        _ => {
            if sa <= 0.0 {
                return dst;
            }
            let out_a = sa + da * (1.0 - sa);
            let mut out = [0u8; 4];
            for c in 0..3 {
                let s = src[c] as f32 / 255.0;
                let d = dst[c] as f32 / 255.0;
                let b = match mode {
                    CompositionMode::Multiply => s * d,
                    CompositionMode::Screen => s + d - s * d,
                    CompositionMode::Darken => s.min(d),
                    CompositionMode::Lighten => s.max(d),
                    CompositionMode::Additive => (s + d).min(1.0),
                    _ => s,
                };
                let mixed = (1.0 - da) * s + da * b;
                out[c] = to_u8((mixed * sa + d * da * (1.0 - sa)) / out_a);
            }
            out[3] = to_u8(out_a);
            out
        }
    }
}

/// Straight-alpha RGBA bitmap.
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    image: RgbaImage,
}

impl fmt::Debug for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .finish()
    }
}

impl Default for Raster {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl Raster {
    // ---- construction -------------------------------------------------------

    /// Fully transparent bitmap.
    pub fn new(width: u32, height: u32) -> Self {
        Self { image: RgbaImage::new(width, height) }
    }

    pub fn from_size(size: IntSize) -> Self {
        Self::new(size.width.max(0) as u32, size.height.max(0) as u32)
    }

    pub fn filled(width: u32, height: u32, color: Rgba<u8>) -> Self {
        Self { image: RgbaImage::from_pixel(width, height, color) }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    // ---- queries ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> IntSize {
        IntSize::new(self.image.width() as i32, self.image.height() as i32)
    }

    pub fn bounds(&self) -> IntRect {
        IntRect::from_size(self.size())
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgba<u8>> {
        if x < 0 || y < 0 || x as u32 >= self.image.width() || y as u32 >= self.image.height() {
            return None;
        }
        Some(*self.image.get_pixel(x as u32, y as u32))
    }

    pub fn put_pixel(&mut self, x: i32, y: i32, color: Rgba<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < self.image.width() && (y as u32) < self.image.height() {
            self.image.put_pixel(x as u32, y as u32, color);
        }
    }

    pub fn is_fully_transparent(&self) -> bool {
        self.image.pixels().all(|p| p[3] == 0)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.image.as_raw().clone()
    }

    pub fn memory_bytes(&self) -> usize {
        self.image.as_raw().len()
    }

    // ---- whole-buffer edits -------------------------------------------------

    pub fn fill(&mut self, color: Rgba<u8>) {
        for px in self.image.pixels_mut() {
            *px = color;
        }
    }

    /// Overwrite every pixel inside `rect` with `color`.
    pub fn fill_rect(&mut self, rect: IntRect, color: Rgba<u8>) {
        let area = rect.intersected(&self.bounds());
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                self.image.put_pixel(x as u32, y as u32, color);
            }
        }
    }

    /// Copy of the region `rect`; parts outside this raster come back transparent.
    pub fn crop(&self, rect: IntRect) -> Raster {
        let mut out = Raster::from_size(rect.size());
        out.paint_at(self, IntPoint::new(-rect.x, -rect.y), CompositionMode::Source, 1.0);
        out
    }

    /// New canvas of `size` with this content pasted at `offset`.
    pub fn resized_canvas(&self, size: IntSize, offset: IntPoint) -> Raster {
        let mut out = Raster::from_size(size);
        out.paint_at(self, offset, CompositionMode::Source, 1.0);
        out
    }

    /// Rescaled copy.
    pub fn resized(&self, width: u32, height: u32) -> Raster {
        if self.is_empty() || width == 0 || height == 0 {
            return Raster::new(width, height);
        }
        Raster {
            image: imageops::resize(&self.image, width, height, imageops::FilterType::Triangle),
        }
    }

    /// Multiply alpha by the mask's alpha; pixels outside the mask become transparent.
    pub fn multiply_alpha(&mut self, mask: &Raster) {
        let mask_img = &mask.image;
        self.image.enumerate_pixels_mut().for_each(|(x, y, px)| {
            let m = if x < mask_img.width() && y < mask_img.height() {
                mask_img.get_pixel(x, y)[3] as u32
            } else {
                0
            };
            px[3] = ((px[3] as u32 * m + 127) / 255) as u8;
            if px[3] == 0 {
                *px = Rgba([0, 0, 0, 0]);
            }
        });
    }

    /// Reduce alpha wherever the mask has coverage.
    pub fn subtract_alpha(&mut self, mask: &Raster) {
        let mask_img = &mask.image;
        self.image.enumerate_pixels_mut().for_each(|(x, y, px)| {
            if x < mask_img.width() && y < mask_img.height() {
                let m = mask_img.get_pixel(x, y)[3] as u32;
                px[3] = ((px[3] as u32 * (255 - m) + 127) / 255) as u8;
                if px[3] == 0 {
                    *px = Rgba([0, 0, 0, 0]);
                }
            }
        });
    }

    // ---- compositing --------------------------------------------------------

    /// Paint `src` into this raster. `transform` maps source pixel coordinates into
    /// this raster's pixel coordinates.
    pub fn paint(
        &mut self,
        src: &Raster,
        transform: &Affine,
        mode: CompositionMode,
        opacity: f32,
    ) -> Result<()> {
        if let Some(offset) = integer_translation(transform) {
            self.paint_at(src, offset, mode, opacity);
            return Ok(());
        }
        let inverse = invert_checked(transform)?;
        let area = src.bounds().mapped_bbox(transform).intersected(&self.bounds());
        if area.is_empty() || src.is_empty() {
            return Ok(());
        }
        let stride = self.image.width() as usize * 4;
        let (sw, sh) = (src.width() as f64, src.height() as f64);
        let src_img = &src.image;

        self.image
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as i32;
                if y < area.y || y >= area.bottom() {
                    return;
                }
                for x in area.x..area.right() {
                    let p = inverse * Point::new(x as f64 + 0.5, y as f64 + 0.5);
                    let (sx, sy) = (p.x.floor(), p.y.floor());
                    if sx < 0.0 || sy < 0.0 || sx >= sw || sy >= sh {
                        continue;
                    }
                    let s = src_img.get_pixel(sx as u32, sy as u32).0;
                    let i = x as usize * 4;
                    let d = [row[i], row[i + 1], row[i + 2], row[i + 3]];
                    row[i..i + 4].copy_from_slice(&blend_pixel(d, s, mode, opacity));
                }
            });
        Ok(())
    }

    /// Paint `src` with its top-left corner at `offset`.
    pub fn paint_at(&mut self, src: &Raster, offset: IntPoint, mode: CompositionMode, opacity: f32) {
        let area = src
            .bounds()
            .translated(offset.x, offset.y)
            .intersected(&self.bounds());
        if area.is_empty() {
            return;
        }
        let stride = self.image.width() as usize * 4;
        let src_img = &src.image;

        self.image
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as i32;
                if y < area.y || y >= area.bottom() {
                    return;
                }
                let sy = (y - offset.y) as u32;
                for x in area.x..area.right() {
                    let s = src_img.get_pixel((x - offset.x) as u32, sy).0;
                    let i = x as usize * 4;
                    let d = [row[i], row[i + 1], row[i + 2], row[i + 3]];
                    row[i..i + 4].copy_from_slice(&blend_pixel(d, s, mode, opacity));
                }
            });
    }

    /// Stroke a straight segment with a round brush of diameter `width`.
    pub fn draw_line(
        &mut self,
        from: IntPoint,
        to: IntPoint,
        width: u32,
        color: Rgba<u8>,
        mode: CompositionMode,
    ) {
        let radius = (width.max(1) as f64) / 2.0;
        let (ax, ay) = (from.x as f64 + 0.5, from.y as f64 + 0.5);
        let (bx, by) = (to.x as f64 + 0.5, to.y as f64 + 0.5);
        let pad = radius.ceil() as i32 + 1;
        let area = IntRect::new(
            from.x.min(to.x) - pad,
            from.y.min(to.y) - pad,
            (from.x - to.x).abs() + pad * 2 + 1,
            (from.y - to.y).abs() + pad * 2 + 1,
        )
        .intersected(&self.bounds());

        let (dx, dy) = (bx - ax, by - ay);
        let len_sq = dx * dx + dy * dy;
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
                let t = if len_sq == 0.0 {
                    0.0
                } else {
                    (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0)
                };
                let (cx, cy) = (ax + t * dx, ay + t * dy);
                let dist_sq = (px - cx) * (px - cx) + (py - cy) * (py - cy);
                if dist_sq <= radius * radius {
                    let d = self.image.get_pixel(x as u32, y as u32).0;
                    self.image
                        .put_pixel(x as u32, y as u32, Rgba(blend_pixel(d, color.0, mode, 1.0)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    #[test]
    fn opaque_source_over_replaces_destination() {
        assert_eq!(
            blend_pixel(BLUE.0, RED.0, CompositionMode::Normal, 1.0),
            RED.0
        );
        assert_eq!(
            blend_pixel(BLUE.0, [9, 9, 9, 0], CompositionMode::Normal, 1.0),
            BLUE.0
        );
    }

    #[test]
    fn half_opacity_over_transparent_keeps_color() {
        let out = blend_pixel([0, 0, 0, 0], RED.0, CompositionMode::Normal, 0.5);
        assert_eq!(out, [255, 0, 0, 128]);
    }

    #[test]
    fn clear_erases_coverage() {
        assert_eq!(
            blend_pixel(BLUE.0, RED.0, CompositionMode::Clear, 1.0),
            [0, 0, 0, 0]
        );
    }

    #[test]
    fn crop_outside_bounds_is_transparent() {
        let raster = Raster::filled(4, 4, RED);
        let cropped = raster.crop(IntRect::new(2, 2, 4, 4));
        assert_eq!(cropped.pixel(0, 0), Some(RED));
        assert_eq!(cropped.pixel(3, 3), Some(Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn paint_with_integer_translation_offsets_content() {
        let mut dst = Raster::new(6, 6);
        let src = Raster::filled(2, 2, BLUE);
        dst.paint(&src, &Affine::translate((3.0, 1.0)), CompositionMode::Normal, 1.0)
            .unwrap();
        assert_eq!(dst.pixel(3, 1), Some(BLUE));
        assert_eq!(dst.pixel(4, 2), Some(BLUE));
        assert_eq!(dst.pixel(2, 1), Some(Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn paint_with_scale_covers_mapped_area() {
        let mut dst = Raster::new(8, 8);
        let src = Raster::filled(2, 2, RED);
        dst.paint(&src, &Affine::scale(2.0), CompositionMode::Normal, 1.0)
            .unwrap();
        assert_eq!(dst.pixel(3, 3), Some(RED));
        assert_eq!(dst.pixel(4, 4), Some(Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn draw_line_then_erase_restores_transparency() {
        let mut raster = Raster::new(10, 10);
        raster.draw_line(IntPoint::new(1, 5), IntPoint::new(8, 5), 3, RED, CompositionMode::Normal);
        assert_eq!(raster.pixel(5, 5), Some(RED));
        raster.draw_line(IntPoint::new(0, 5), IntPoint::new(9, 5), 5, RED, CompositionMode::Clear);
        assert!(raster.is_fully_transparent());
    }

    #[test]
    fn mask_alpha_helpers() {
        let mut mask = Raster::new(2, 1);
        mask.put_pixel(0, 0, Rgba([255, 255, 255, 255]));

        let mut kept = Raster::filled(2, 1, RED);
        kept.multiply_alpha(&mask);
        assert_eq!(kept.pixel(0, 0), Some(RED));
        assert_eq!(kept.pixel(1, 0), Some(Rgba([0, 0, 0, 0])));

        let mut cut = Raster::filled(2, 1, RED);
        cut.subtract_alpha(&mask);
        assert_eq!(cut.pixel(0, 0), Some(Rgba([0, 0, 0, 0])));
        assert_eq!(cut.pixel(1, 0), Some(RED));
    }

    #[test]
    fn composition_mode_tags_are_stable() {
        for mode in CompositionMode::all() {
            assert_eq!(CompositionMode::from_u8(mode.to_u8()), *mode);
        }
    }
}
