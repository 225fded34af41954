//! Page bitmaps and page geometry
//!
//! A [`PageBitmap`] is an immutable RGBA image behind an `Arc`, so handing the
//! same cached page to several readers never copies pixel data.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::Arc;

/// Points per inch in PDF user space. Rendering at this scale maps one
/// point to one pixel.
pub const DPI_PER_INCH: f64 = 72.0;

/// Page dimensions in PDF points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    /// Page width in points
    pub width: f32,

    /// Page height in points
    pub height: f32,
}

impl PageSize {
    /// Create a new page size
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// US Letter (612 x 792 points)
    pub fn letter() -> Self {
        Self::new(612.0, 792.0)
    }

    /// Pixel dimensions of this page rendered at a DPI-equivalent `scale`
    ///
    /// Each dimension is at least one pixel.
    pub fn pixel_dimensions(&self, scale: f64) -> (u32, u32) {
        let factor = scale / DPI_PER_INCH;
        (
            scaled_dimension(self.width as f64, factor),
            scaled_dimension(self.height as f64, factor),
        )
    }

    /// Scale at which this page renders exactly `width` pixels wide
    ///
    /// Returns 0.0 for degenerate pages with no width.
    pub fn scale_for_width(&self, width: f32) -> f64 {
        if self.width <= 0.0 {
            return 0.0;
        }
        DPI_PER_INCH * (width as f64 / self.width as f64)
    }
}

/// Scale one dimension, rounding to the nearest pixel and never reaching zero
fn scaled_dimension(length: f64, factor: f64) -> u32 {
    (length * factor).round().max(1.0) as u32
}

/// Rendered page bitmap (RGBA, 4 bytes per pixel)
///
/// Cloning is cheap: clones share the underlying pixel buffer.
#[derive(Debug, Clone)]
pub struct PageBitmap {
    pixels: Arc<RgbaImage>,
}

impl PageBitmap {
    /// Wrap an RGBA image
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    /// Convert rasterizer output of any pixel layout into a page bitmap
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self::new(image.into_rgba8())
    }

    /// Create a bitmap filled with a single colour
    pub fn filled(width: u32, height: u32, color: [u8; 4]) -> Self {
        Self::new(RgbaImage::from_pixel(width, height, Rgba(color)))
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// (width, height) in pixels
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Number of pixels; the unit cache budgets are expressed in
    pub fn pixel_count(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Borrow the underlying RGBA image
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// True if both handles point at the same pixel buffer
    pub fn same_bitmap(&self, other: &PageBitmap) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }

    /// Resample this bitmap by `factor` in both dimensions
    ///
    /// Used for the approximate fast path: a stand-in derived from an
    /// earlier exact render while the exact one is produced. Nearest
    /// neighbour sampling keeps a full-page resample cheap.
    pub fn rescaled(&self, factor: f64) -> PageBitmap {
        let (width, height) = self.dimensions();
        if width == 0 || height == 0 {
            return self.clone();
        }

        let new_width = scaled_dimension(width as f64, factor);
        let new_height = scaled_dimension(height as f64, factor);
        PageBitmap::new(imageops::resize(
            &*self.pixels,
            new_width,
            new_height,
            FilterType::Nearest,
        ))
    }
}

impl PartialEq for PageBitmap {
    fn eq(&self, other: &Self) -> bool {
        self.same_bitmap(other)
            || (self.dimensions() == other.dimensions()
                && self.pixels.as_raw() == other.pixels.as_raw())
    }
}

impl From<RgbaImage> for PageBitmap {
    fn from(pixels: RgbaImage) -> Self {
        Self::new(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_dimensions_at_native_scale() {
        let size = PageSize::letter();
        assert_eq!(size.pixel_dimensions(72.0), (612, 792));
    }

    #[test]
    fn test_pixel_dimensions_double_scale() {
        let size = PageSize::letter();
        assert_eq!(size.pixel_dimensions(144.0), (1224, 1584));
    }

    #[test]
    fn test_pixel_dimensions_never_zero() {
        let size = PageSize::new(10.0, 10.0);
        assert_eq!(size.pixel_dimensions(0.5), (1, 1));
    }

    #[test]
    fn test_scale_for_width() {
        let size = PageSize::letter();
        let scale = size.scale_for_width(153.0);
        assert!((scale - 18.0).abs() < 1e-9);
        assert_eq!(size.pixel_dimensions(scale).0, 153);

        assert_eq!(PageSize::new(0.0, 100.0).scale_for_width(100.0), 0.0);
    }

    #[test]
    fn test_filled_bitmap() {
        let bitmap = PageBitmap::filled(4, 3, [10, 20, 30, 255]);
        assert_eq!(bitmap.dimensions(), (4, 3));
        assert_eq!(bitmap.pixel_count(), 12);
        assert_eq!(bitmap.pixels().get_pixel(3, 2), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_clone_shares_pixels() {
        let bitmap = PageBitmap::filled(8, 8, [0, 0, 0, 255]);
        let clone = bitmap.clone();
        assert!(bitmap.same_bitmap(&clone));
        assert_eq!(bitmap, clone);

        let copy = PageBitmap::new(bitmap.pixels().clone());
        assert!(!bitmap.same_bitmap(&copy));
        assert_eq!(bitmap, copy);
    }

    #[test]
    fn test_rescaled_dimensions() {
        let bitmap = PageBitmap::filled(190, 95, [255, 255, 255, 255]);
        let rescaled = bitmap.rescaled(100.0 / 95.0);
        assert_eq!(rescaled.dimensions(), (200, 100));
        assert!(!rescaled.same_bitmap(&bitmap));
    }

    #[test]
    fn test_rescaled_keeps_solid_colour() {
        let bitmap = PageBitmap::filled(40, 40, [200, 100, 50, 255]);
        let smaller = bitmap.rescaled(0.5);
        assert_eq!(smaller.dimensions(), (20, 20));
        assert_eq!(smaller.pixels().get_pixel(10, 10), &Rgba([200, 100, 50, 255]));
    }

    #[test]
    fn test_rescaled_empty_bitmap() {
        let empty = PageBitmap::new(RgbaImage::new(0, 0));
        let rescaled = empty.rescaled(2.0);
        assert_eq!(rescaled.pixel_count(), 0);
    }

    #[test]
    fn test_from_dynamic_converts_to_rgba() {
        let gray = DynamicImage::new_luma8(5, 7);
        let bitmap = PageBitmap::from_dynamic(gray);
        assert_eq!(bitmap.dimensions(), (5, 7));
        assert_eq!(bitmap.pixels().get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
    }
}
