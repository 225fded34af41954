//! Backend-free rasterizer
//!
//! Renders every page as a single solid colour at the correct pixel size.
//! Useful wherever page geometry matters but content does not: placeholder
//! documents, demos and the cache/worker test suites.

use crate::bitmap::PageSize;
use crate::rasterizer::{check_page_index, Rasterizer, RenderError, RenderResult};
use image::{DynamicImage, Rgba, RgbaImage};

/// Default fill colour (opaque white, like an empty sheet of paper)
const PAPER_WHITE: [u8; 4] = [255, 255, 255, 255];

/// Rasterizer that fills each page with one colour
#[derive(Debug, Clone)]
pub struct SolidRasterizer {
    page_sizes: Vec<PageSize>,
    color: Rgba<u8>,
}

impl SolidRasterizer {
    /// Create a rasterizer for pages of the given sizes
    pub fn new(page_sizes: Vec<PageSize>) -> Self {
        Self {
            page_sizes,
            color: Rgba(PAPER_WHITE),
        }
    }

    /// Create a rasterizer for `page_count` pages of the same size
    pub fn uniform(page_count: usize, size: PageSize) -> Self {
        Self::new(vec![size; page_count])
    }

    /// Set the fill colour
    pub fn with_color(mut self, color: [u8; 4]) -> Self {
        self.color = Rgba(color);
        self
    }

    fn render(&self, page_index: usize, scale: f64) -> RenderResult<DynamicImage> {
        check_page_index(page_index, self.page_sizes.len())?;

        if !scale.is_finite() || scale <= 0.0 {
            return Err(RenderError::Rasterize {
                page_index,
                message: format!("scale must be positive, got {}", scale),
            });
        }

        let (width, height) = self.page_sizes[page_index].pixel_dimensions(scale);
        Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width, height, self.color,
        )))
    }
}

impl Rasterizer for SolidRasterizer {
    fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    fn page_size(&self, page_index: usize) -> RenderResult<PageSize> {
        check_page_index(page_index, self.page_sizes.len())?;
        Ok(self.page_sizes[page_index])
    }

    fn render_page(&self, page_index: usize, scale: f64) -> RenderResult<DynamicImage> {
        self.render(page_index, scale)
    }

    fn render_thumbnail(&self, page_index: usize, scale: f64) -> RenderResult<DynamicImage> {
        self.render(page_index, scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    #[test]
    fn test_uniform_page_count() {
        let rasterizer = SolidRasterizer::uniform(7, PageSize::letter());
        assert_eq!(rasterizer.page_count(), 7);
        assert_eq!(rasterizer.page_size(6).unwrap(), PageSize::letter());
        assert!(rasterizer.page_size(7).is_err());
    }

    #[test]
    fn test_render_page_size_follows_scale() {
        let rasterizer = SolidRasterizer::new(vec![PageSize::new(144.0, 72.0)]);

        let image = rasterizer.render_page(0, 72.0).unwrap();
        assert_eq!(image.dimensions(), (144, 72));

        let image = rasterizer.render_page(0, 36.0).unwrap();
        assert_eq!(image.dimensions(), (72, 36));
    }

    #[test]
    fn test_render_uses_fill_colour() {
        let rasterizer =
            SolidRasterizer::uniform(1, PageSize::new(10.0, 10.0)).with_color([1, 2, 3, 255]);
        let image = rasterizer.render_thumbnail(0, 72.0).unwrap().into_rgba8();
        assert_eq!(image.get_pixel(5, 5), &Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn test_render_invalid_page() {
        let rasterizer = SolidRasterizer::uniform(2, PageSize::letter());
        assert!(matches!(
            rasterizer.render_page(2, 72.0),
            Err(RenderError::InvalidPageIndex { .. })
        ));
    }

    #[test]
    fn test_render_rejects_bad_scale() {
        let rasterizer = SolidRasterizer::uniform(1, PageSize::letter());
        assert!(rasterizer.render_page(0, 0.0).is_err());
        assert!(rasterizer.render_page(0, f64::NAN).is_err());
    }

    #[test]
    fn test_boxed_rasterizer_delegates() {
        let boxed: Box<dyn Rasterizer> = Box::new(SolidRasterizer::uniform(3, PageSize::letter()));
        assert_eq!(boxed.page_count(), 3);
        assert_eq!(boxed.render_page(1, 72.0).unwrap().dimensions(), (612, 792));
    }
}
